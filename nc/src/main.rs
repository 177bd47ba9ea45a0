use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use colored::*;
use eyre::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use nebula_console::browser::{self, Completion, PlanBrowser};
use nebula_console::cli::{Cli, Command, OutputFormat};
use nebula_console::client::{EngineApi, HttpEngineClient, RealtimeChannel, RealtimeEvent};
use nebula_console::config::Config;
use nebula_console::controller::{ActionOutcome, FlowController, OutlineRow};
use nebula_console::domain::{ExecutionPlanStatus, FlowPath, StepKey, parse_plan};
use nebula_console::inputs::{EditOutcome, StepInputField};
use nebula_console::monitor::{self, MonitorEvent, PollTarget};
use nebula_console::notify::{Level, Notification, NotificationBus};
use nebula_console::session::Session;
use nebula_console::tui;

/// Setup logging to file
fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nebula-console")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to the log file only; the terminal belongs to the console
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("console.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

/// Engine handle plus the notification feed for one CLI invocation
struct Console {
    config: Config,
    engine: Arc<dyn EngineApi>,
    session: Arc<Session>,
    notifications: NotificationBus,
    notification_rx: broadcast::Receiver<Notification>,
    format: OutputFormat,
}

impl Console {
    fn new(config: Config, token: Option<String>, format: OutputFormat) -> Result<Self> {
        let session = match token.or_else(|| config.engine.token_from_env()) {
            Some(token) => Session::with_token(token),
            None => Session::new(),
        };
        let session = Arc::new(session);
        let notifications = NotificationBus::default();
        let notification_rx = notifications.subscribe();
        let client = HttpEngineClient::from_config(&config.engine, Arc::clone(&session), notifications.clone())
            .context("Failed to create engine client")?;

        Ok(Self {
            config,
            engine: Arc::new(client),
            session,
            notifications,
            notification_rx,
            format,
        })
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Print every notification published so far to stderr
    fn flush_notifications(&mut self) {
        loop {
            match self.notification_rx.try_recv() {
                Ok(notification) => print_notification(&notification),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "notifications lagged");
                }
                Err(_) => break,
            }
        }
    }
}

fn print_notification(notification: &Notification) {
    let marker = match notification.level {
        Level::Success => "✓".green(),
        Level::Info => "•".cyan(),
        Level::Warning => "!".yellow(),
        Level::Error => "✗".red(),
    };
    eprintln!("{} {}", marker, notification.message);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(base_url = %config.engine.base_url, "nebula-console loaded config");

    let command = match cli.command {
        Some(command) => command,
        None => {
            Cli::command().print_help()?;
            println!();
            return Ok(());
        }
    };

    // Offline: no engine client needed
    if let Command::Validate { file } = &command {
        return cmd_validate(file, &cli.format);
    }

    let mut console = Console::new(config, cli.token, cli.format)?;

    let result = match command {
        Command::Plans => cmd_plans(&mut console).await,
        Command::Show { plan_id } => cmd_show(&mut console, &plan_id).await,
        Command::Validate { .. } => Ok(()),
        Command::Execute { plan_id } => cmd_execute(&mut console, &plan_id).await,
        Command::Step {
            plan_id,
            step_id,
            path,
            instruction,
            configuration,
            api_url,
            api_key,
            client_id,
            client_secret,
        } => {
            let fields = [
                (StepInputField::Instruction, instruction),
                (StepInputField::Configuration, configuration),
                (StepInputField::ExternalApiUrl, api_url),
                (StepInputField::ApiKey, api_key),
                (StepInputField::ClientId, client_id),
                (StepInputField::ClientSecret, client_secret),
            ];
            cmd_step(&mut console, &plan_id, &step_id, path.as_deref(), fields).await
        }
        Command::Status { plan_id, watch } => cmd_status(&mut console, &plan_id, watch).await,
        Command::Agents { plan_id } => cmd_agents(&mut console, &plan_id).await,
        Command::Stop { plan_id } => cmd_stop(&mut console, &plan_id).await,
        Command::Approve {
            plan_id,
            step_id,
            reject,
            feedback,
        } => cmd_approve(&mut console, &plan_id, &step_id, !reject, feedback).await,
        Command::Prompt { text } => cmd_prompt(&mut console, &text.join(" ")).await,
        Command::Monitor { watch } => cmd_monitor(&mut console, watch).await,
        Command::Watch { plan_id } => cmd_watch(&mut console, plan_id.as_deref()).await,
        Command::Tui => {
            let Console {
                config,
                engine,
                session,
                notifications,
                ..
            } = console;
            return tui::run(config, engine, session, notifications).await;
        }
    };

    console.flush_notifications();
    result
}

/// Validate a local plan document
fn cmd_validate(file: &Path, format: &OutputFormat) -> Result<()> {
    let text = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;

    match parse_plan(&text) {
        Ok(plan) => {
            if *format == OutputFormat::Json {
                let report = serde_json::json!({ "valid": true, "planId": plan.plan_id, "issues": [] });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} {} is valid ({} steps, {} agents)",
                    "✓".green(),
                    plan.display_name().cyan(),
                    plan.execution_flow.steps.len(),
                    plan.agents.len()
                );
            }
            Ok(())
        }
        Err(err) => {
            if *format == OutputFormat::Json {
                let report = serde_json::json!({ "valid": false, "issues": err.issues });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{} {} is invalid", "✗".red(), file.display());
                for issue in &err.issues {
                    println!("  {}: {}", issue.location.yellow(), issue.message);
                }
            }
            std::process::exit(1);
        }
    }
}

/// List execution plans
async fn cmd_plans(console: &mut Console) -> Result<()> {
    let mut browser = PlanBrowser::new();
    let count = browser.refresh(console.engine.as_ref()).await?;

    if console.json() {
        println!("{}", serde_json::to_string_pretty(browser.plans())?);
        return Ok(());
    }

    if count == 0 {
        println!("No plans found");
        return Ok(());
    }

    println!("{:<38} {:<12} {:>5}  {}", "PLAN", "FLOW", "STEPS", "NAME");
    for plan in browser.plans() {
        println!(
            "{:<38} {:<12} {:>5}  {}",
            plan.plan_id.cyan(),
            plan.execution_flow.flow_type.to_string(),
            plan.execution_flow.steps.len(),
            plan.display_name()
        );
    }
    Ok(())
}

/// Load one plan's flow; prints why when it cannot be shown
async fn load_controller(console: &mut Console, plan_id: &str) -> Result<FlowController> {
    let mut browser = PlanBrowser::new();
    match browser.load(console.engine.as_ref(), plan_id).await {
        Completion::Loaded => browser
            .controller()
            .cloned()
            .ok_or_else(|| eyre::eyre!("Plan {} has no flow", plan_id)),
        Completion::Invalid | Completion::Missing => {
            let message = browser
                .display_error()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Plan {} no longer exists", plan_id));
            Err(eyre::eyre!(message))
        }
        Completion::Failed | Completion::Discarded { .. } => Err(eyre::eyre!("Failed to load plan {}", plan_id)),
    }
}

/// Show a plan's flow as an outline
async fn cmd_show(console: &mut Console, plan_id: &str) -> Result<()> {
    let controller = load_controller(console, plan_id).await?;
    let rows = controller.outline();

    if console.json() {
        let doc = serde_json::json!({
            "planId": controller.plan_id(),
            "planName": controller.plan_name(),
            "flowType": controller.flow().flow_type.to_string(),
            "steps": rows,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("Plan: {} ({})", controller.plan_name().cyan(), controller.plan_id());
    println!("  Flow: {}", controller.flow().flow_type);
    println!("  Agents: {}", controller.agents().len());
    println!();
    for row in &rows {
        print_outline_row(row);
    }
    Ok(())
}

fn print_outline_row(row: &OutlineRow) {
    let indent = "  ".repeat(row.depth + 1);
    let scope = row.scope.map(|s| format!("[{}] ", s)).unwrap_or_default();
    let mut line = format!("{}{}{} {} ({})", indent, scope, row.key.step_id.cyan(), row.name, row.step_type);
    if let Some(agent) = &row.agent {
        line.push_str(&format!(" @ {}", agent));
    }
    if let Some(detail) = &row.detail {
        line.push_str(&format!(" - {}", detail));
    }
    if row.approval {
        line.push_str(&format!(" {}", "approval".yellow()));
    }
    if row.disabled {
        println!("{}", line.dimmed());
    } else {
        println!("{}", line);
    }
}

/// Print an action outcome; non-accepted outcomes become an error exit
fn finish_action(console: &mut Console, outcome: ActionOutcome) -> Result<()> {
    if console.json() {
        let doc = match &outcome {
            ActionOutcome::Accepted(response) | ActionOutcome::Rejected(response) => serde_json::to_value(response)?,
            other => serde_json::json!({ "success": false, "message": other.message() }),
        };
        println!("{}", serde_json::to_string_pretty(&doc)?);
    }
    console.flush_notifications();

    if outcome.is_accepted() {
        Ok(())
    } else {
        debug!(dispatched = outcome.was_dispatched(), "action not accepted");
        std::process::exit(1);
    }
}

/// Start the whole plan
async fn cmd_execute(console: &mut Console, plan_id: &str) -> Result<()> {
    let controller = load_controller(console, plan_id).await?;
    let outcome = controller
        .execute_flow(console.engine.as_ref(), &console.notifications)
        .await;
    finish_action(console, outcome)
}

/// Submit one step with operator inputs
async fn cmd_step(
    console: &mut Console,
    plan_id: &str,
    step_id: &str,
    path: Option<&str>,
    fields: [(StepInputField, Option<String>); 6],
) -> Result<()> {
    let flow: FlowPath = path
        .unwrap_or_default()
        .parse()
        .map_err(|e: String| eyre::eyre!("Invalid --path: {}", e))?;
    let key = StepKey::new(flow, step_id);

    let mut controller = load_controller(console, plan_id).await?;
    for (field, value) in fields {
        let Some(value) = value else {
            continue;
        };
        if let EditOutcome::Retained { error } = controller.set_input(&key, field, &value) {
            return Err(eyre::eyre!("Invalid {}: {}", field, error));
        }
    }

    let outcome = controller
        .execute_step(console.engine.as_ref(), &console.notifications, &key)
        .await;
    finish_action(console, outcome)
}

fn print_status(status: &ExecutionPlanStatus) {
    let state = if status.status.is_terminal() {
        status.status.to_string().yellow()
    } else {
        status.status.to_string().green()
    };
    println!("Plan: {}", status.plan_id.cyan());
    println!("  Status: {}", state);
    println!(
        "  Progress: {}% ({}/{} steps)",
        status.percent(),
        status.completed_steps,
        status.total_steps
    );
    println!("  Agents: {}/{} active", status.active_agents, status.total_agents);
    if let Some(step) = &status.current_step {
        println!("  Current step: {}", step);
    }
    if let Some(error) = &status.error {
        println!("  Error: {}", error.red());
    }
}

fn emit_status(console: &Console, status: &ExecutionPlanStatus) -> Result<()> {
    if console.json() {
        println!("{}", serde_json::to_string(status)?);
    } else {
        print_status(status);
    }
    Ok(())
}

/// Show a plan's execution status
async fn cmd_status(console: &mut Console, plan_id: &str, watch: bool) -> Result<()> {
    if !watch {
        let status = console.engine.plan_status(plan_id).await?;
        return emit_status(console, &status);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _poller = monitor::spawn_plan_status(Arc::clone(&console.engine), plan_id, &console.config.polling, tx);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(MonitorEvent::PlanStatus(status)) => {
                    emit_status(console, &status)?;
                    if status.status.is_terminal() {
                        break;
                    }
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
        console.flush_notifications();
    }
    Ok(())
}

/// List the agents taking part in a plan's execution
async fn cmd_agents(console: &mut Console, plan_id: &str) -> Result<()> {
    let agents = console.engine.plan_agents(plan_id).await?;

    if console.json() {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    if agents.is_empty() {
        println!("No agents for {}", plan_id);
        return Ok(());
    }
    for agent in &agents {
        let status = agent.status.map(|s| s.to_string()).unwrap_or_default();
        println!("{:<24} {:<10} {}", agent.agent_id.cyan(), status, agent.profile());
    }
    Ok(())
}

/// Stop a running execution
async fn cmd_stop(console: &mut Console, plan_id: &str) -> Result<()> {
    let controller = load_controller(console, plan_id).await?;
    let outcome = controller
        .stop_execution(console.engine.as_ref(), &console.notifications)
        .await;
    finish_action(console, outcome)
}

/// Approve or reject a gated step
async fn cmd_approve(
    console: &mut Console,
    plan_id: &str,
    step_id: &str,
    approved: bool,
    feedback: Option<String>,
) -> Result<()> {
    let controller = load_controller(console, plan_id).await?;
    let key = controller
        .outline()
        .into_iter()
        .map(|row| row.key)
        .find(|key| key.step_id == step_id)
        .unwrap_or_else(|| StepKey::top(step_id));

    let outcome = controller
        .submit_approval(console.engine.as_ref(), &console.notifications, &key, approved, feedback)
        .await;
    finish_action(console, outcome)
}

/// Turn a natural-language prompt into a plan
async fn cmd_prompt(console: &mut Console, text: &str) -> Result<()> {
    let response = browser::submit_prompt(console.engine.as_ref(), &console.notifications, text).await;

    match response {
        Some(response) => {
            if console.json() {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if let Some(result) = &response.result {
                println!("{}", result);
            }
            console.flush_notifications();
            if !response.success {
                std::process::exit(1);
            }
            Ok(())
        }
        None => {
            console.flush_notifications();
            std::process::exit(1);
        }
    }
}

fn emit_monitor_event(console: &Console, event: &MonitorEvent) -> Result<()> {
    match event {
        MonitorEvent::DashboardStats(stats) => {
            if console.json() {
                println!("{}", serde_json::to_string(stats)?);
            } else {
                println!("Dashboard:");
                println!("  Agents: {}", stats.total_agents);
                println!(
                    "  Executions: {} active, {} completed, {} failed",
                    stats.active_executions.to_string().green(),
                    stats.completed_executions,
                    stats.failed_executions.to_string().red()
                );
                println!("  Average execution time: {:.1}s", stats.average_execution_time);
            }
        }
        MonitorEvent::ActiveExecutions(executions) => {
            if console.json() {
                println!("{}", serde_json::to_string(executions)?);
            } else if executions.is_empty() {
                println!("No active executions");
            } else {
                println!("Active executions ({}):", executions.len());
                for status in executions {
                    println!(
                        "  {:<38} {:<10} {:>3}%",
                        status.plan_id.cyan(),
                        status.status.to_string(),
                        status.percent()
                    );
                }
            }
        }
        MonitorEvent::PollFailed { target, error } => {
            debug!(poller = %target, %error, "poll failed");
        }
        MonitorEvent::PlanStatus(_) | MonitorEvent::Plans(_) => {}
    }
    Ok(())
}

/// Show active executions and dashboard stats
async fn cmd_monitor(console: &mut Console, watch: bool) -> Result<()> {
    if !watch {
        for target in [PollTarget::DashboardStats, PollTarget::ActiveExecutions] {
            let event = monitor::poll_once(console.engine.as_ref(), &target).await;
            emit_monitor_event(console, &event)?;
        }
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _pollers = monitor::spawn_dashboard(Arc::clone(&console.engine), &console.config.polling, tx);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => emit_monitor_event(console, &event)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
        console.flush_notifications();
    }
    Ok(())
}

/// Stream realtime status updates
async fn cmd_watch(console: &mut Console, plan_id: Option<&str>) -> Result<()> {
    let mut channel = RealtimeChannel::open(&console.config.engine.ws_url, plan_id, console.session.token())?;

    loop {
        tokio::select! {
            event = channel.recv() => match event {
                Some(RealtimeEvent::Connected) => {
                    if !console.json() {
                        println!("{} Connected to {}", "✓".green(), console.config.engine.ws_url);
                    }
                }
                Some(RealtimeEvent::Status(status)) => emit_status(console, &status)?,
                Some(RealtimeEvent::Closed { reason }) => {
                    if let Some(reason) = reason {
                        return Err(eyre::eyre!("Realtime channel closed: {}", reason));
                    }
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    channel.close();
    Ok(())
}
