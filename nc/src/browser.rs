//! Plan browser
//!
//! Lists the engine's plans and owns the one that is selected. Selecting a
//! plan drops the previous flow controller, together with its operator
//! inputs, and fetches the new flow. Responses are applied only if they
//! belong to the latest selection; anything older is discarded.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::client::{EngineApi, EngineError};
use crate::controller::{FlowController, OperatorInputError};
use crate::domain::{ExecutionPlan, FlowDocument, PromptRequest, PromptResponse, validate_flow_document};
use crate::notify::{Notification, NotificationBus};

/// `source` sent with every prompt
pub const PROMPT_SOURCE: &str = "nebula-console";

/// Proof of one selection event
///
/// Only the ticket of the latest selection can complete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTicket {
    generation: u64,
    plan_id: String,
}

impl SelectionTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }
}

/// How a selection response was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The flow is now shown
    Loaded,
    /// The document failed validation; see [`PlanBrowser::display_error`]
    Invalid,
    /// The plan no longer exists; the selection was cleared
    Missing,
    /// The request failed; the plan stays selected without a flow
    Failed,
    /// A newer selection superseded this one; nothing changed
    Discarded { generation: u64, current: u64 },
}

/// Plan list plus the selected plan's controller
#[derive(Debug, Default)]
pub struct PlanBrowser {
    plans: Vec<ExecutionPlan>,
    generation: u64,
    selected: Option<String>,
    controller: Option<FlowController>,
    display_error: Option<String>,
}

impl PlanBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plans(&self) -> &[ExecutionPlan] {
        &self.plans
    }

    /// Replace the plan list
    pub fn set_plans(&mut self, plans: Vec<ExecutionPlan>) {
        debug!(count = plans.len(), "set_plans: called");
        self.plans = plans;
    }

    /// Reload the plan list; on failure the previous list is kept
    pub async fn refresh(&mut self, engine: &dyn EngineApi) -> Result<usize, EngineError> {
        debug!("refresh: called");
        let plans = engine.list_plans().await?;
        let count = plans.len();
        self.set_plans(plans);
        Ok(count)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selected_plan_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Plan-list entry of the current selection
    pub fn selected_plan(&self) -> Option<&ExecutionPlan> {
        let selected = self.selected.as_deref()?;
        self.plans.iter().find(|p| p.plan_id == selected)
    }

    pub fn controller(&self) -> Option<&FlowController> {
        self.controller.as_ref()
    }

    pub fn controller_mut(&mut self) -> Option<&mut FlowController> {
        self.controller.as_mut()
    }

    /// Why no flow is shown for the selected plan
    pub fn display_error(&self) -> Option<&str> {
        self.display_error.as_deref()
    }

    /// Start selecting `plan_id`
    ///
    /// Drops the current controller and its inputs and invalidates every
    /// outstanding ticket.
    pub fn begin_selection(&mut self, plan_id: &str) -> SelectionTicket {
        self.generation += 1;
        info!(%plan_id, generation = self.generation, "begin_selection");
        self.selected = Some(plan_id.to_string());
        self.controller = None;
        self.display_error = None;
        SelectionTicket {
            generation: self.generation,
            plan_id: plan_id.to_string(),
        }
    }

    /// Apply the flow fetched for `ticket`
    pub fn complete_selection(&mut self, ticket: SelectionTicket, result: Result<FlowDocument, EngineError>) -> Completion {
        if ticket.generation != self.generation {
            debug!(
                plan_id = %ticket.plan_id,
                generation = ticket.generation,
                current = self.generation,
                "complete_selection: stale response discarded"
            );
            return Completion::Discarded {
                generation: ticket.generation,
                current: self.generation,
            };
        }

        match result {
            Ok(mut document) => {
                if document.plan_id.is_empty() {
                    document.plan_id = ticket.plan_id.clone();
                }
                if let Err(err) = validate_flow_document(&document) {
                    warn!(plan_id = %ticket.plan_id, error = %err, "complete_selection: flow rejected");
                    self.display_error = Some(err.to_string());
                    return Completion::Invalid;
                }
                info!(plan_id = %ticket.plan_id, generation = ticket.generation, "complete_selection: flow loaded");
                self.controller = Some(FlowController::new(document));
                self.display_error = None;
                Completion::Loaded
            }
            Err(EngineError::Validation(err)) => {
                warn!(plan_id = %ticket.plan_id, error = %err, "complete_selection: flow rejected");
                self.display_error = Some(err.to_string());
                Completion::Invalid
            }
            Err(err) if err.is_not_found() => {
                info!(plan_id = %ticket.plan_id, "complete_selection: plan is gone");
                self.selected = None;
                self.plans.retain(|p| p.plan_id != ticket.plan_id);
                self.display_error = Some(format!("Plan {} no longer exists", ticket.plan_id));
                Completion::Missing
            }
            Err(err) => {
                debug!(plan_id = %ticket.plan_id, error = %err, "complete_selection: request failed");
                self.display_error = Some(err.to_string());
                Completion::Failed
            }
        }
    }

    /// Select and fetch in one go
    pub async fn load(&mut self, engine: &dyn EngineApi, plan_id: &str) -> Completion {
        let ticket = self.begin_selection(plan_id);
        let result = engine.get_flow(plan_id).await;
        self.complete_selection(ticket, result)
    }

    /// Deselect; also invalidates outstanding tickets
    pub fn clear_selection(&mut self) {
        self.generation += 1;
        self.selected = None;
        self.controller = None;
        self.display_error = None;
    }
}

/// Prompt body with the console's context
pub fn build_prompt_request(text: &str) -> Result<PromptRequest, OperatorInputError> {
    let prompt = text.trim();
    if prompt.is_empty() {
        return Err(OperatorInputError::EmptyPrompt);
    }
    let mut context = Map::new();
    context.insert("source".to_string(), Value::String(PROMPT_SOURCE.to_string()));
    context.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
    Ok(PromptRequest {
        prompt: prompt.to_string(),
        context: Some(context),
    })
}

/// Submit a prompt and toast the outcome
///
/// Returns the engine's answer when the request went through.
pub async fn submit_prompt(engine: &dyn EngineApi, notifications: &NotificationBus, text: &str) -> Option<PromptResponse> {
    let request = match build_prompt_request(text) {
        Ok(request) => request,
        Err(err) => {
            notifications.publish(Notification::input_blocked(err.to_string()));
            return None;
        }
    };

    let response = engine.process_prompt(&request).await.ok()?;
    if response.success {
        let message = match (&response.plan_id, response.message.is_empty()) {
            (Some(plan_id), true) => format!("Plan {} created", plan_id),
            _ if !response.message.is_empty() => response.message.clone(),
            _ => "Prompt processed".to_string(),
        };
        notifications.publish(Notification::success(message));
    } else {
        let message = if response.message.is_empty() {
            "Prompt was not accepted".to_string()
        } else {
            response.message.clone()
        };
        notifications.publish(Notification::rejected(message));
    }
    Some(response)
}
