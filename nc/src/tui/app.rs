//! TUI application - event handling and state management
//!
//! The App struct owns the AppState and handles all keyboard events.
//! Engine work is queued as [`PendingAction`]s for the runner; nothing here
//! blocks or renders.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;

use super::state::{AppState, ConfirmAction, ConfirmDialog, FieldEdit, InteractionMode, PendingAction, View};
use crate::inputs::{EditOutcome, StepInputField};
use crate::notify::Notification;

/// TUI application
#[derive(Debug, Default)]
pub struct App {
    /// Application state
    state: AppState,
}

impl App {
    /// Create a new application instance
    pub fn new() -> Self {
        Self { state: AppState::new() }
    }

    pub fn with_state(state: AppState) -> Self {
        Self { state }
    }

    /// Get reference to state
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get mutable reference to state
    pub fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    /// Handle a key event
    ///
    /// Returns true if the application should exit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }

        match &self.state.interaction_mode {
            InteractionMode::Normal => self.handle_normal_key(key),
            InteractionMode::Edit(_) => self.handle_edit_key(key),
            InteractionMode::Prompt(_) => self.handle_prompt_key(key),
            InteractionMode::Login(_) => self.handle_login_key(key),
            InteractionMode::Feedback { .. } => self.handle_feedback_key(key),
            InteractionMode::Confirm(_) => self.handle_confirm_key(key),
            InteractionMode::Help => self.handle_help_key(key),
        }
    }

    /// Handle key in normal mode
    fn handle_normal_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => {
                self.state.should_quit = true;
            }
            KeyCode::Char('?') | KeyCode::F(1) => {
                self.state.interaction_mode = InteractionMode::Help;
            }
            KeyCode::Tab => {
                self.state.current_view = self.state.current_view.next();
            }
            KeyCode::BackTab => {
                self.state.current_view = self.state.current_view.prev();
            }
            KeyCode::Char('p') => {
                self.state.interaction_mode = InteractionMode::Prompt(String::new());
            }
            KeyCode::Char('L') => {
                self.state.interaction_mode = InteractionMode::Login(String::new());
            }
            KeyCode::Char('r') => {
                self.state.queue(PendingAction::RefreshPlans);
            }
            _ => match self.state.current_view {
                View::Plans => self.handle_plans_key(key),
                View::Flow => self.handle_flow_key(key),
                View::Monitor => {}
            },
        }

        false
    }

    fn handle_plans_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.state.plans_selection.select_prev(),
            KeyCode::Down | KeyCode::Char('j') => {
                let max = self.state.browser.plans().len();
                self.state.plans_selection.select_next(max);
            }
            KeyCode::Enter => {
                if let Some(plan_id) = self.state.highlighted_plan_id() {
                    debug!(%plan_id, "handle_plans_key: select plan");
                    self.state.form_selection.selected_index = 0;
                    self.state.plan_status = None;
                    self.state.current_view = View::Flow;
                    self.state.queue(PendingAction::SelectPlan(plan_id));
                }
            }
            _ => {}
        }
    }

    fn handle_flow_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Esc {
            self.state.current_view = View::Plans;
            return;
        }
        let Some(controller) = self.state.browser.controller_mut() else {
            return;
        };

        match key.code {
            KeyCode::Left | KeyCode::Char('h') => {
                controller.retreat();
            }
            KeyCode::Right | KeyCode::Char('l') => {
                controller.advance();
            }
            KeyCode::Up | KeyCode::Char('k') => self.state.form_selection.select_prev(),
            KeyCode::Down | KeyCode::Char('j') => self.state.form_selection.select_next(StepInputField::ALL.len()),
            KeyCode::Enter | KeyCode::Char('e') => self.begin_edit(),
            KeyCode::Char('x') => {
                if let Some(key) = controller.current_key() {
                    self.state.queue(PendingAction::ExecuteStep(key));
                }
            }
            KeyCode::Char('X') => {
                let dialog = ConfirmDialog::execute_flow(controller.plan_name());
                self.state.interaction_mode = InteractionMode::Confirm(dialog);
            }
            KeyCode::Char('s') => {
                let dialog = ConfirmDialog::stop_execution(controller.plan_name());
                self.state.interaction_mode = InteractionMode::Confirm(dialog);
            }
            KeyCode::Char('a') | KeyCode::Char('d') => {
                if let Some(step) = controller.current_key() {
                    self.state.interaction_mode = InteractionMode::Feedback {
                        key: step,
                        approved: key.code == KeyCode::Char('a'),
                        buffer: String::new(),
                    };
                }
            }
            _ => {}
        }
    }

    /// Open the editor on the selected field of the active step
    fn begin_edit(&mut self) {
        let field = self.state.selected_field();
        let generation = self.state.browser.generation();
        let Some(controller) = self.state.browser.controller() else {
            return;
        };
        let Some(key) = controller.current_key() else {
            return;
        };
        let input = controller.inputs().get(&key);
        let buffer = match field {
            StepInputField::Instruction => input.instruction,
            StepInputField::Configuration => controller.configuration_text(&key),
            StepInputField::ExternalApiUrl => input.external_api_url.unwrap_or_default(),
            StepInputField::ApiKey => input.api_key.unwrap_or_default(),
            StepInputField::ClientId => input.client_id.unwrap_or_default(),
            StepInputField::ClientSecret => input.client_secret.unwrap_or_default(),
        };
        self.state.interaction_mode = InteractionMode::Edit(FieldEdit {
            generation,
            key,
            field,
            buffer,
        });
    }

    /// Apply the edit to the controller it was started against
    fn commit_edit(&mut self, edit: FieldEdit) {
        if self.state.browser.generation() != edit.generation {
            debug!(generation = edit.generation, "commit_edit: selection changed, edit dropped");
            return;
        }
        let Some(controller) = self.state.browser.controller_mut() else {
            return;
        };
        if let EditOutcome::Retained { error } = controller.set_input(&edit.key, edit.field, &edit.buffer) {
            self.state
                .push_toast(Notification::input_blocked(format!("Configuration not applied: {}", error)));
        }
    }

    fn handle_edit_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.state.interaction_mode = InteractionMode::Normal;
            }
            KeyCode::Enter => {
                if let InteractionMode::Edit(edit) = std::mem::take(&mut self.state.interaction_mode) {
                    self.commit_edit(edit);
                }
            }
            _ => self.edit_buffer(key),
        }

        false
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.state.interaction_mode = InteractionMode::Normal;
            }
            KeyCode::Enter => {
                if let InteractionMode::Prompt(text) = std::mem::take(&mut self.state.interaction_mode) {
                    self.state.queue(PendingAction::SubmitPrompt(text));
                }
            }
            _ => self.edit_buffer(key),
        }

        false
    }

    fn handle_login_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.state.interaction_mode = InteractionMode::Normal;
            }
            KeyCode::Enter => {
                if let InteractionMode::Login(token) = std::mem::take(&mut self.state.interaction_mode) {
                    let token = token.trim().to_string();
                    if !token.is_empty() {
                        self.state.queue(PendingAction::Login(token));
                    }
                }
            }
            _ => self.edit_buffer(key),
        }

        false
    }

    fn handle_feedback_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.state.interaction_mode = InteractionMode::Normal;
            }
            KeyCode::Enter => {
                if let InteractionMode::Feedback { key, approved, buffer } =
                    std::mem::take(&mut self.state.interaction_mode)
                {
                    let feedback = buffer.trim();
                    let feedback = if feedback.is_empty() { None } else { Some(feedback.to_string()) };
                    self.state.queue(PendingAction::Approval { key, approved, feedback });
                }
            }
            _ => self.edit_buffer(key),
        }

        false
    }

    /// Typing and backspace for every text-entry mode
    fn edit_buffer(&mut self, key: KeyEvent) {
        let Some(buf) = self.state.interaction_mode.input_buffer_mut() else {
            return;
        };
        match key.code {
            KeyCode::Backspace => {
                buf.pop();
            }
            KeyCode::Char(c) => buf.push(c),
            _ => {}
        }
    }

    /// Handle key in confirm dialog
    fn handle_confirm_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.state.interaction_mode = InteractionMode::Normal;
            }
            KeyCode::Enter => {
                if let InteractionMode::Confirm(dialog) = std::mem::take(&mut self.state.interaction_mode) {
                    if dialog.selected_button {
                        let action = match dialog.action {
                            ConfirmAction::ExecuteFlow => PendingAction::ExecuteFlow,
                            ConfirmAction::StopExecution => PendingAction::StopExecution,
                        };
                        self.state.queue(action);
                    }
                }
            }
            KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let InteractionMode::Confirm(dialog) = &mut self.state.interaction_mode {
                    if key.code == KeyCode::Char('y') || key.code == KeyCode::Char('Y') {
                        dialog.selected_button = true;
                    } else {
                        dialog.selected_button = !dialog.selected_button;
                    }
                }
            }
            _ => {}
        }

        false
    }

    /// Handle key in help mode
    fn handle_help_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q') => {
                self.state.interaction_mode = InteractionMode::Normal;
            }
            _ => {}
        }

        false
    }
}
