//! TUI application state
//!
//! Pure data structures for the TUI. No rendering logic here.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::browser::PlanBrowser;
use crate::domain::{DashboardStats, ExecutionPlanStatus, StepKey};
use crate::inputs::StepInputField;
use crate::monitor::MonitorEvent;
use crate::notify::{Notification, NotificationKind};

/// Which view is currently displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Plans,
    Flow,
    Monitor,
}

/// Top-level views in Tab order
pub const TOP_LEVEL_VIEWS: [View; 3] = [View::Plans, View::Flow, View::Monitor];

impl View {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Plans => "Plans",
            Self::Flow => "Flow",
            Self::Monitor => "Monitor",
        }
    }

    pub fn next(self) -> Self {
        let idx = TOP_LEVEL_VIEWS.iter().position(|v| *v == self).unwrap_or(0);
        TOP_LEVEL_VIEWS[(idx + 1) % TOP_LEVEL_VIEWS.len()]
    }

    pub fn prev(self) -> Self {
        let idx = TOP_LEVEL_VIEWS.iter().position(|v| *v == self).unwrap_or(0);
        TOP_LEVEL_VIEWS[(idx + TOP_LEVEL_VIEWS.len() - 1) % TOP_LEVEL_VIEWS.len()]
    }
}

/// Text being typed into one step input field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEdit {
    /// Selection generation the edit was started in; a reselection voids it
    pub generation: u64,
    pub key: StepKey,
    pub field: StepInputField,
    pub buffer: String,
}

/// Interaction mode (modal)
#[derive(Debug, Clone, Default)]
pub enum InteractionMode {
    /// Normal navigation mode
    #[default]
    Normal,
    /// Editing a step input field
    Edit(FieldEdit),
    /// Typing a natural-language prompt
    Prompt(String),
    /// Entering a bearer token
    Login(String),
    /// Feedback for an approval decision
    Feedback { key: StepKey, approved: bool, buffer: String },
    /// Confirmation dialog
    Confirm(ConfirmDialog),
    /// Help overlay
    Help,
}

impl InteractionMode {
    /// Get the input buffer if in an input mode
    pub fn input_buffer(&self) -> Option<&str> {
        match self {
            Self::Prompt(s) | Self::Login(s) => Some(s),
            Self::Edit(edit) => Some(&edit.buffer),
            Self::Feedback { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    /// Get mutable input buffer
    pub fn input_buffer_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::Prompt(s) | Self::Login(s) => Some(s),
            Self::Edit(edit) => Some(&mut edit.buffer),
            Self::Feedback { buffer, .. } => Some(buffer),
            _ => None,
        }
    }
}

/// Confirmation dialog for actions with engine-side effects
#[derive(Debug, Clone)]
pub struct ConfirmDialog {
    pub message: String,
    pub action: ConfirmAction,
    pub selected_button: bool, // false = No, true = Yes
}

impl ConfirmDialog {
    pub fn new(action: ConfirmAction, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            action,
            selected_button: false,
        }
    }

    pub fn execute_flow(plan_name: &str) -> Self {
        Self::new(ConfirmAction::ExecuteFlow, format!("Execute the whole plan {}?", plan_name))
    }

    pub fn stop_execution(plan_name: &str) -> Self {
        Self::new(ConfirmAction::StopExecution, format!("Stop execution of {}?", plan_name))
    }
}

/// Action to perform on confirm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    ExecuteFlow,
    StopExecution,
}

/// Work for the runner, which owns the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    RefreshPlans,
    SelectPlan(String),
    ExecuteStep(StepKey),
    ExecuteFlow,
    StopExecution,
    Approval {
        key: StepKey,
        approved: bool,
        feedback: Option<String>,
    },
    SubmitPrompt(String),
    Login(String),
}

/// Selection state for list views
#[derive(Debug, Default, Clone)]
pub struct SelectionState {
    pub selected_index: usize,
}

impl SelectionState {
    pub fn select_next(&mut self, max_items: usize) {
        if max_items > 0 && self.selected_index < max_items - 1 {
            self.selected_index += 1;
        }
    }

    pub fn select_prev(&mut self) {
        if self.selected_index > 0 {
            self.selected_index -= 1;
        }
    }

    /// Ensure selection is within bounds
    pub fn clamp(&mut self, max_items: usize) {
        if max_items == 0 {
            self.selected_index = 0;
        } else if self.selected_index >= max_items {
            self.selected_index = max_items - 1;
        }
    }
}

/// A notification on screen
#[derive(Debug, Clone)]
pub struct Toast {
    pub notification: Notification,
    pub shown_at: Instant,
}

/// Most toasts kept on screen at once
const MAX_TOASTS: usize = 4;

/// Main TUI application state
#[derive(Debug)]
pub struct AppState {
    /// Current view
    pub current_view: View,
    /// Current interaction mode
    pub interaction_mode: InteractionMode,
    /// Should the app quit
    pub should_quit: bool,

    /// Plan list and the selected plan's controller
    pub browser: PlanBrowser,
    pub plans_selection: SelectionState,
    /// Cursor in the step input form
    pub form_selection: SelectionState,

    // === Monitor data ===
    pub active_executions: Vec<ExecutionPlanStatus>,
    pub dashboard: Option<DashboardStats>,
    pub plan_status: Option<ExecutionPlanStatus>,
    pub realtime_connected: bool,

    // === Toasts ===
    pub toasts: VecDeque<Toast>,
    pub toast_ttl: Duration,

    /// Actions waiting for the runner
    pub pending_actions: VecDeque<PendingAction>,
    /// Requests in flight
    pub in_flight: usize,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            current_view: View::default(),
            interaction_mode: InteractionMode::default(),
            should_quit: false,
            browser: PlanBrowser::new(),
            plans_selection: SelectionState::default(),
            form_selection: SelectionState::default(),
            active_executions: Vec::new(),
            dashboard: None,
            plan_status: None,
            realtime_connected: false,
            toasts: VecDeque::new(),
            toast_ttl: Duration::from_secs(4),
            pending_actions: VecDeque::new(),
            in_flight: 0,
        }
    }
}

impl AppState {
    /// Create new AppState
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_toast_ttl(toast_ttl: Duration) -> Self {
        Self {
            toast_ttl,
            ..Self::default()
        }
    }

    pub fn queue(&mut self, action: PendingAction) {
        self.pending_actions.push_back(action);
    }

    pub fn take_pending(&mut self) -> Option<PendingAction> {
        self.pending_actions.pop_front()
    }

    /// Plan id under the cursor in the Plans view
    pub fn highlighted_plan_id(&self) -> Option<String> {
        self.browser
            .plans()
            .get(self.plans_selection.selected_index)
            .map(|p| p.plan_id.clone())
    }

    /// Field under the cursor in the input form
    pub fn selected_field(&self) -> StepInputField {
        let idx = self.form_selection.selected_index.min(StepInputField::ALL.len() - 1);
        StepInputField::ALL[idx]
    }

    /// Show a notification; a re-auth request switches to login mode
    pub fn push_toast(&mut self, notification: Notification) {
        if notification.kind == NotificationKind::ReauthRequired {
            self.interaction_mode = InteractionMode::Login(String::new());
        }
        self.toasts.push_back(Toast {
            notification,
            shown_at: Instant::now(),
        });
        while self.toasts.len() > MAX_TOASTS {
            self.toasts.pop_front();
        }
    }

    /// Drop toasts older than the TTL
    pub fn expire_toasts(&mut self, now: Instant) {
        let ttl = self.toast_ttl;
        self.toasts.retain(|t| now.duration_since(t.shown_at) < ttl);
    }

    /// Fold a poll result into the display data
    pub fn apply_monitor_event(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::ActiveExecutions(executions) => self.active_executions = executions,
            MonitorEvent::DashboardStats(stats) => self.dashboard = Some(stats),
            MonitorEvent::PlanStatus(status) => self.apply_status(status),
            MonitorEvent::Plans(plans) => {
                self.browser.set_plans(plans);
                self.plans_selection.clamp(self.browser.plans().len());
            }
            MonitorEvent::PollFailed { .. } => {}
        }
    }

    /// Status for the selected plan; updates for other plans are ignored
    pub fn apply_status(&mut self, status: ExecutionPlanStatus) {
        if self.browser.selected_plan_id() == Some(status.plan_id.as_str()) {
            self.plan_status = Some(status);
        }
    }

    /// Per-tick housekeeping
    pub fn tick(&mut self) {
        self.expire_toasts(Instant::now());
    }
}
