//! TUI Runner - main loop that owns the terminal and the engine
//!
//! The TuiRunner is responsible for:
//! - Dispatching queued actions to the engine on spawned tasks
//! - Feeding poll results, realtime updates and notifications into the state
//! - Rendering after every event

use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::Tui;
use super::app::App;
use super::events::{Event, EventHandler};
use super::state::{AppState, PendingAction};
use super::views;
use crate::browser::{self, Completion, SelectionTicket};
use crate::client::{EngineApi, EngineError, RealtimeChannel, RealtimeEvent};
use crate::config::Config;
use crate::controller::{ActionOutcome, FlowController};
use crate::domain::{ExecutionPlan, FlowDocument, PromptResponse};
use crate::monitor::{self, MonitorEvent, PollerHandle};
use crate::notify::{Notification, NotificationBus};
use crate::session::Session;

/// Result of a spawned engine request
#[derive(Debug)]
enum TaskResult {
    Plans(Result<Vec<ExecutionPlan>, EngineError>),
    Flow(SelectionTicket, Result<FlowDocument, EngineError>),
    Action(ActionOutcome),
    Prompt(Option<PromptResponse>),
}

/// TUI Runner that manages the terminal and event loop
pub struct TuiRunner {
    app: App,
    terminal: Tui,
    config: Config,
    engine: Arc<dyn EngineApi>,
    session: Arc<Session>,
    notifications: NotificationBus,
    notification_rx: broadcast::Receiver<Notification>,
    task_tx: mpsc::UnboundedSender<TaskResult>,
    task_rx: mpsc::UnboundedReceiver<TaskResult>,
    monitor_tx: mpsc::UnboundedSender<MonitorEvent>,
    monitor_rx: mpsc::UnboundedReceiver<MonitorEvent>,
    dashboard: Vec<PollerHandle>,
    plan_status: Option<PollerHandle>,
    realtime: Option<RealtimeChannel>,
    event_handler: EventHandler,
}

impl TuiRunner {
    pub fn new(
        terminal: Tui,
        config: Config,
        engine: Arc<dyn EngineApi>,
        session: Arc<Session>,
        notifications: NotificationBus,
    ) -> Self {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (monitor_tx, monitor_rx) = mpsc::unbounded_channel();
        let state = AppState::with_toast_ttl(Duration::from_millis(config.ui.toast_ms));
        let event_handler = EventHandler::new(Duration::from_millis(config.ui.tick_ms));
        let notification_rx = notifications.subscribe();

        Self {
            app: App::with_state(state),
            terminal,
            config,
            engine,
            session,
            notifications,
            notification_rx,
            task_tx,
            task_rx,
            monitor_tx,
            monitor_rx,
            dashboard: Vec::new(),
            plan_status: None,
            realtime: None,
            event_handler,
        }
    }

    /// Run the TUI main loop
    pub async fn run(&mut self) -> Result<()> {
        info!("TuiRunner::run: starting");
        self.dashboard = monitor::spawn_dashboard(Arc::clone(&self.engine), &self.config.polling, self.monitor_tx.clone());

        loop {
            self.terminal.draw(|frame| views::render(self.app.state(), frame))?;

            tokio::select! {
                event = self.event_handler.next() => match event? {
                    Event::Key(key) => {
                        if self.app.handle_key(key) {
                            break;
                        }
                    }
                    Event::Resize(width, height) => debug!(width, height, "terminal resized"),
                    Event::Tick => self.app.state_mut().tick(),
                },
                Some(result) = self.task_rx.recv() => self.apply_task_result(result),
                Some(event) = self.monitor_rx.recv() => self.app.state_mut().apply_monitor_event(event),
                notification = self.notification_rx.recv() => match notification {
                    Ok(notification) => self.app.state_mut().push_toast(notification),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => warn!(skipped, "notifications lagged"),
                    Err(broadcast::error::RecvError::Closed) => {}
                },
            }

            self.drain_realtime();
            while let Some(action) = self.app.state_mut().take_pending() {
                self.dispatch(action);
            }

            if self.app.state().should_quit {
                break;
            }
        }

        info!("TuiRunner::run: exiting");
        Ok(())
    }

    /// Spawn an engine request; its result comes back through the task channel
    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        self.app.state_mut().in_flight += 1;
        let tx = self.task_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(task.await);
        });
    }

    fn dispatch(&mut self, action: PendingAction) {
        let engine = Arc::clone(&self.engine);
        let bus = self.notifications.clone();

        match action {
            PendingAction::RefreshPlans => {
                debug!("dispatch: refresh plans");
                self.spawn(async move { TaskResult::Plans(engine.list_plans().await) });
            }
            PendingAction::SelectPlan(plan_id) => {
                debug!(%plan_id, "dispatch: select plan");
                let ticket = self.app.state_mut().browser.begin_selection(&plan_id);
                self.app.state_mut().plan_status = None;
                self.watch_plan(&plan_id);
                self.spawn(async move {
                    let result = engine.get_flow(&plan_id).await;
                    TaskResult::Flow(ticket, result)
                });
            }
            PendingAction::Login(token) => {
                info!("dispatch: new session token");
                self.session.issue(token);
                bus.publish(Notification::info("Logged in"));
                if let Some(plan_id) = self.app.state().browser.selected_plan_id().map(str::to_string) {
                    self.watch_plan(&plan_id);
                }
                self.app.state_mut().queue(PendingAction::RefreshPlans);
            }
            PendingAction::SubmitPrompt(text) => {
                debug!("dispatch: submit prompt");
                self.spawn(async move { TaskResult::Prompt(browser::submit_prompt(engine.as_ref(), &bus, &text).await) });
            }
            PendingAction::ExecuteStep(key) => {
                let Some(controller) = self.selected_controller() else {
                    return;
                };
                debug!(%key, "dispatch: execute step");
                self.spawn(async move { TaskResult::Action(controller.execute_step(engine.as_ref(), &bus, &key).await) });
            }
            PendingAction::ExecuteFlow => {
                let Some(controller) = self.selected_controller() else {
                    return;
                };
                debug!(plan_id = %controller.plan_id(), "dispatch: execute flow");
                self.spawn(async move { TaskResult::Action(controller.execute_flow(engine.as_ref(), &bus).await) });
            }
            PendingAction::StopExecution => {
                let Some(controller) = self.selected_controller() else {
                    return;
                };
                debug!(plan_id = %controller.plan_id(), "dispatch: stop execution");
                self.spawn(async move { TaskResult::Action(controller.stop_execution(engine.as_ref(), &bus).await) });
            }
            PendingAction::Approval { key, approved, feedback } => {
                let Some(controller) = self.selected_controller() else {
                    return;
                };
                debug!(%key, approved, "dispatch: approval");
                self.spawn(async move {
                    let outcome = controller
                        .submit_approval(engine.as_ref(), &bus, &key, approved, feedback)
                        .await;
                    TaskResult::Action(outcome)
                });
            }
        }
    }

    /// Snapshot of the loaded plan's controller for a spawned action
    fn selected_controller(&self) -> Option<FlowController> {
        let controller = self.app.state().browser.controller().cloned();
        if controller.is_none() {
            debug!("no plan loaded, action ignored");
        }
        controller
    }

    /// Point the status poller and realtime channel at `plan_id`
    fn watch_plan(&mut self, plan_id: &str) {
        self.plan_status = Some(monitor::spawn_plan_status(
            Arc::clone(&self.engine),
            plan_id,
            &self.config.polling,
            self.monitor_tx.clone(),
        ));
        self.app.state_mut().realtime_connected = false;
        self.realtime = match RealtimeChannel::open(&self.config.engine.ws_url, Some(plan_id), self.session.token()) {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!(%plan_id, error = %e, "realtime channel unavailable, polling only");
                None
            }
        };
    }

    fn stop_watching(&mut self) {
        self.plan_status = None;
        self.realtime = None;
        let state = self.app.state_mut();
        state.realtime_connected = false;
        state.plan_status = None;
    }

    fn drain_realtime(&mut self) {
        let Some(channel) = self.realtime.as_mut() else {
            return;
        };
        let mut closed = false;
        while let Some(event) = channel.try_recv() {
            match event {
                RealtimeEvent::Connected => self.app.state_mut().realtime_connected = true,
                RealtimeEvent::Status(status) => self.app.state_mut().apply_status(status),
                RealtimeEvent::Closed { reason } => {
                    debug!(reason = reason.as_deref().unwrap_or("closed"), "realtime channel ended");
                    closed = true;
                }
            }
        }
        if closed {
            self.realtime = None;
            self.app.state_mut().realtime_connected = false;
        }
    }

    fn apply_task_result(&mut self, result: TaskResult) {
        let state = self.app.state_mut();
        state.in_flight = state.in_flight.saturating_sub(1);

        match result {
            TaskResult::Plans(Ok(plans)) => state.apply_monitor_event(MonitorEvent::Plans(plans)),
            TaskResult::Plans(Err(e)) => debug!(error = %e, "plan refresh failed"),
            TaskResult::Flow(ticket, result) => {
                let plan_id = ticket.plan_id().to_string();
                match state.browser.complete_selection(ticket, result) {
                    Completion::Missing => {
                        state.plans_selection.clamp(state.browser.plans().len());
                        self.stop_watching();
                    }
                    Completion::Discarded { generation, current } => {
                        debug!(%plan_id, generation, current, "stale flow response dropped");
                    }
                    completion => debug!(%plan_id, ?completion, "flow response applied"),
                }
            }
            TaskResult::Action(outcome) => debug!(accepted = outcome.is_accepted(), "action finished"),
            TaskResult::Prompt(Some(response)) if response.success && response.plan_id.is_some() => {
                state.queue(PendingAction::RefreshPlans);
            }
            TaskResult::Prompt(_) => {}
        }
    }
}
