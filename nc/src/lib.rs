//! Nebula Console - operator console for Nebula execution plans
//!
//! The console lists the engine's execution plans, walks the operator
//! through a selected plan's flow step by step, collects per-step inputs,
//! and submits executions, approvals and prompts to the engine. Live status
//! arrives by polling and over a WebSocket channel.
//!
//! # Modules
//!
//! - [`domain`] - Plan schema, addressing and validation
//! - [`inputs`] - Per-step operator inputs
//! - [`controller`] - Step wizard for one selected plan
//! - [`browser`] - Plan list and selection
//! - [`client`] - Engine API over HTTP and the realtime channel
//! - [`session`] - Bearer token ownership
//! - [`notify`] - Operator notifications
//! - [`monitor`] - Background polling
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface
//! - [`tui`] - Interactive terminal console

pub mod browser;
pub mod cli;
pub mod client;
pub mod config;
pub mod controller;
pub mod domain;
pub mod inputs;
pub mod monitor;
pub mod notify;
pub mod session;
pub mod tui;

pub use browser::{Completion, PlanBrowser, SelectionTicket};
pub use client::{EngineApi, EngineError, HttpEngineClient, RealtimeChannel, RealtimeEvent};
pub use config::Config;
pub use controller::{ActionOutcome, FlowController, OperatorInputError};
pub use domain::{ExecutionPlan, FlowDocument, FlowPath, StepKey, ValidationError};
pub use inputs::{StepInput, StepInputField, StepInputStore};
pub use notify::{Notification, NotificationBus};
pub use session::Session;
