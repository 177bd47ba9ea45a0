//! Polling loops
//!
//! Each poller is an independent tokio task with its own interval. Results
//! go out as [`MonitorEvent`]s; a failed poll is reported and the loop waits
//! for the next tick. Dropping a [`PollerHandle`] aborts its task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::client::EngineApi;
use crate::config::PollingConfig;
use crate::domain::{DashboardStats, ExecutionPlan, ExecutionPlanStatus};

/// What a poller fetches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTarget {
    ActiveExecutions,
    DashboardStats,
    PlanStatus(String),
    PlanList,
}

impl std::fmt::Display for PollTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ActiveExecutions => write!(f, "active-executions"),
            Self::DashboardStats => write!(f, "dashboard-stats"),
            Self::PlanStatus(plan_id) => write!(f, "plan-status:{}", plan_id),
            Self::PlanList => write!(f, "plan-list"),
        }
    }
}

/// One poll result
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    ActiveExecutions(Vec<ExecutionPlanStatus>),
    DashboardStats(DashboardStats),
    PlanStatus(ExecutionPlanStatus),
    Plans(Vec<ExecutionPlan>),
    PollFailed { target: PollTarget, error: String },
}

/// Running poller; aborted on drop
#[derive(Debug)]
pub struct PollerHandle {
    target: PollTarget,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    pub fn target(&self) -> &PollTarget {
        &self.target
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        debug!(poller = %self.target, "PollerHandle::drop: aborting");
        self.handle.abort();
    }
}

/// Fetch `target` once
pub async fn poll_once(engine: &dyn EngineApi, target: &PollTarget) -> MonitorEvent {
    let result = match target {
        PollTarget::ActiveExecutions => engine.active_executions().await.map(MonitorEvent::ActiveExecutions),
        PollTarget::DashboardStats => engine.dashboard_stats().await.map(MonitorEvent::DashboardStats),
        PollTarget::PlanStatus(plan_id) => engine.plan_status(plan_id).await.map(MonitorEvent::PlanStatus),
        PollTarget::PlanList => engine.list_plans().await.map(MonitorEvent::Plans),
    };
    result.unwrap_or_else(|err| MonitorEvent::PollFailed {
        target: target.clone(),
        error: err.to_string(),
    })
}

/// Spawn a loop polling `target` every `every`, starting immediately
///
/// The loop ends by itself once the receiver is dropped.
pub fn spawn_poller(
    engine: Arc<dyn EngineApi>,
    target: PollTarget,
    every: Duration,
    tx: mpsc::UnboundedSender<MonitorEvent>,
) -> PollerHandle {
    info!(poller = %target, every_ms = every.as_millis() as u64, "spawn_poller");
    let task_target = target.clone();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let event = poll_once(engine.as_ref(), &task_target).await;
            if let MonitorEvent::PollFailed { error, .. } = &event {
                debug!(poller = %task_target, %error, "poll failed, retrying next tick");
            }
            if tx.send(event).is_err() {
                debug!(poller = %task_target, "receiver gone, poller exiting");
                break;
            }
        }
    });
    PollerHandle { target, handle }
}

/// The console-wide pollers: active executions, dashboard stats, plan list
pub fn spawn_dashboard(
    engine: Arc<dyn EngineApi>,
    config: &PollingConfig,
    tx: mpsc::UnboundedSender<MonitorEvent>,
) -> Vec<PollerHandle> {
    vec![
        spawn_poller(
            Arc::clone(&engine),
            PollTarget::ActiveExecutions,
            Duration::from_millis(config.active_executions_ms),
            tx.clone(),
        ),
        spawn_poller(
            Arc::clone(&engine),
            PollTarget::DashboardStats,
            Duration::from_millis(config.dashboard_stats_ms),
            tx.clone(),
        ),
        spawn_poller(
            engine,
            PollTarget::PlanList,
            Duration::from_millis(config.plan_list_ms),
            tx,
        ),
    ]
}

/// Status poller for the selected plan
pub fn spawn_plan_status(
    engine: Arc<dyn EngineApi>,
    plan_id: &str,
    config: &PollingConfig,
    tx: mpsc::UnboundedSender<MonitorEvent>,
) -> PollerHandle {
    spawn_poller(
        engine,
        PollTarget::PlanStatus(plan_id.to_string()),
        Duration::from_millis(config.plan_status_ms),
        tx,
    )
}
