//! TUI views and rendering

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Gauge, List, ListItem, Paragraph, Row, Table, Wrap};

use super::state::{AppState, InteractionMode, TOP_LEVEL_VIEWS, View};
use crate::controller::{FlowController, detail};
use crate::domain::{ExecutionPlanStatus, ExecutionStatus, StepKey};
use crate::inputs::StepInputField;
use crate::notify::Level;

/// Main render function
pub fn render(state: &AppState, frame: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Footer / input line
        ])
        .split(frame.area());

    render_header(state, frame, chunks[0]);

    match state.current_view {
        View::Plans => render_plans(state, frame, chunks[1]),
        View::Flow => render_flow(state, frame, chunks[1]),
        View::Monitor => render_monitor(state, frame, chunks[1]),
    }

    render_footer(state, frame, chunks[2]);
    render_toasts(state, frame, chunks[1]);

    match &state.interaction_mode {
        InteractionMode::Help => render_help_overlay(frame, chunks[1]),
        InteractionMode::Confirm(dialog) => render_confirm(&dialog.message, dialog.selected_button, frame, chunks[1]),
        _ => {}
    }
}

fn status_color(status: &ExecutionStatus) -> Color {
    match status {
        ExecutionStatus::Running => Color::Green,
        ExecutionStatus::Pending | ExecutionStatus::Paused => Color::Yellow,
        ExecutionStatus::Completed => Color::Blue,
        ExecutionStatus::Failed => Color::Red,
        ExecutionStatus::Cancelled | ExecutionStatus::Other(_) => Color::Gray,
    }
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Info => Color::Cyan,
        Level::Success => Color::Green,
        Level::Warning => Color::Yellow,
        Level::Error => Color::Red,
    }
}

fn bold(text: &str) -> Span<'_> {
    Span::styled(text, Style::default().add_modifier(Modifier::BOLD))
}

/// Render the header bar
fn render_header(state: &AppState, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
        Span::styled("Nebula ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("│ "),
    ];
    for view in TOP_LEVEL_VIEWS {
        let style = if view == state.current_view {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!("{} ", view.display_name()), style));
    }
    spans.push(Span::raw("│ "));
    spans.push(Span::styled(
        format!("{} active", state.active_executions.len()),
        Style::default().fg(Color::Green),
    ));
    if let Some(plan_id) = state.browser.selected_plan_id() {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(plan_id.to_string(), Style::default().fg(Color::Cyan)));
    }
    if state.realtime_connected {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled("live", Style::default().fg(Color::Green)));
    }
    if state.in_flight > 0 {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(
            format!("{} pending", state.in_flight),
            Style::default().fg(Color::Yellow),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title(" Console "));
    frame.render_widget(header, area);
}

/// Render the plan list with a preview of the highlighted plan
fn render_plans(state: &AppState, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let selected = state.browser.selected_plan_id();
    let items: Vec<ListItem> = state
        .browser
        .plans()
        .iter()
        .enumerate()
        .map(|(i, plan)| {
            let marker = if selected == Some(plan.plan_id.as_str()) { "●" } else { " " };
            let content = Line::from(vec![
                Span::styled(format!("{} ", marker), Style::default().fg(Color::Green)),
                Span::styled(
                    format!("{:<28} ", plan.display_name()),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("{} steps ", plan.execution_flow.steps.len()),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(plan.plan_id.clone(), Style::default().fg(Color::DarkGray)),
            ]);
            if i == state.plans_selection.selected_index {
                ListItem::new(content).style(Style::default().bg(Color::DarkGray).fg(Color::White))
            } else {
                ListItem::new(content)
            }
        })
        .collect();

    let title = format!(" Plans ({}) ", state.browser.plans().len());
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(list, chunks[0]);

    let preview = match state.browser.plans().get(state.plans_selection.selected_index) {
        Some(plan) => {
            let mut lines = vec![
                Line::from(vec![bold("ID: "), Span::raw(plan.plan_id.as_str())]),
                Line::from(vec![bold("Name: "), Span::raw(plan.display_name())]),
                Line::from(vec![bold("Version: "), Span::raw(plan.version.as_str())]),
                Line::from(vec![bold("Flow: "), Span::raw(plan.execution_flow.flow_type.to_string())]),
                Line::from(vec![bold("Agents: "), Span::raw(plan.agents.len().to_string())]),
                Line::from(vec![bold("Created by: "), Span::raw(plan.metadata.created_by.as_str())]),
            ];
            if !plan.metadata.tags.is_empty() {
                lines.push(Line::from(vec![bold("Tags: "), Span::raw(plan.metadata.tags.join(", "))]));
            }
            if let Some(hitl) = plan.human_in_the_loop.as_ref().filter(|h| h.enabled) {
                lines.push(Line::from(vec![
                    bold("Approval: "),
                    Span::styled(hitl.approval_required.join(", "), Style::default().fg(Color::Yellow)),
                ]));
            }
            lines.push(Line::from(""));
            lines.push(Line::from(plan.metadata.description.as_str()));
            lines
        }
        None => vec![Line::from("No plans. Press r to refresh or p to create one from a prompt.")],
    };
    let preview = Paragraph::new(preview)
        .block(Block::default().borders(Borders::ALL).title(" Preview "))
        .wrap(Wrap { trim: true });
    frame.render_widget(preview, chunks[1]);
}

/// Render the selected plan's step wizard
fn render_flow(state: &AppState, frame: &mut Frame, area: Rect) {
    let Some(controller) = state.browser.controller() else {
        let (text, color) = match (state.browser.display_error(), state.browser.selected_plan_id()) {
            (Some(error), _) => (error.to_string(), Color::Red),
            (None, Some(plan_id)) => (format!("Loading {}...", plan_id), Color::Yellow),
            (None, None) => ("Select a plan in the Plans view".to_string(), Color::DarkGray),
        };
        let placeholder = Paragraph::new(Span::styled(text, Style::default().fg(color)))
            .block(Block::default().borders(Borders::ALL).title(" Flow "))
            .wrap(Wrap { trim: true });
        frame.render_widget(placeholder, area);
        return;
    };

    let status_height = if state.plan_status.is_some() { 3 } else { 0 };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(status_height),
        ])
        .split(area);

    render_stepper(controller, frame, rows[0]);

    let Some(key) = controller.current_key() else {
        let empty = Paragraph::new("This plan has no steps")
            .block(Block::default().borders(Borders::ALL).title(format!(" {} ", controller.plan_name())));
        frame.render_widget(empty, rows[1]);
        return;
    };

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[1]);
    render_step_detail(controller, &key, frame, columns[0]);
    render_input_form(state, controller, &key, frame, columns[1]);

    if let Some(status) = &state.plan_status {
        render_status_gauge(status, frame, rows[2]);
    }
}

/// One cell per top-level step, the active one highlighted
fn render_stepper(controller: &FlowController, frame: &mut Frame, area: Rect) {
    let mut spans = Vec::new();
    for (i, step) in controller.flow().steps.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" › ", Style::default().fg(Color::DarkGray)));
        }
        let style = if i == controller.active_index() {
            Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else if !step.enabled {
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT)
        } else {
            Style::default()
        };
        spans.push(Span::styled(format!(" {} ", step.display_name()), style));
    }
    let title = format!(
        " {} · step {}/{} ",
        controller.plan_name(),
        controller.active_index() + 1,
        controller.len()
    );
    let stepper = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(stepper, area);
}

fn render_step_detail(controller: &FlowController, key: &StepKey, frame: &mut Frame, area: Rect) {
    let Some(step) = controller.step(key) else {
        return;
    };

    let agent = match (step.agent_id.as_deref(), controller.agent_for(step)) {
        (_, Some(agent)) => agent.profile(),
        (Some(id), None) => format!("{} (not declared)", id),
        (None, None) => "-".to_string(),
    };
    let mut lines = vec![
        Line::from(vec![bold("Step: "), Span::styled(key.to_string(), Style::default().fg(Color::Cyan))]),
        Line::from(vec![bold("Type: "), Span::raw(step.type_name())]),
        Line::from(vec![bold("Agent: "), Span::raw(agent)]),
    ];
    if !step.declared_instruction().is_empty() {
        lines.push(Line::from(vec![bold("Instruction: "), Span::raw(step.declared_instruction())]));
    }
    if !step.description.is_empty() {
        lines.push(Line::from(vec![bold("Description: "), Span::raw(step.description.as_str())]));
    }
    if let Some(detail) = detail(step, controller.agents()) {
        lines.push(Line::from(vec![bold("Detail: "), Span::raw(detail)]));
    }
    if step.human_approval_required {
        lines.push(Line::from(Span::styled(
            "Requires operator approval (a approve, d reject)",
            Style::default().fg(Color::Yellow),
        )));
    }
    if !step.enabled {
        lines.push(Line::from(Span::styled("Disabled", Style::default().fg(Color::DarkGray))));
    }

    let nested = controller.step_outline(key);
    if !nested.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(bold("Nested steps")));
        for row in nested {
            let indent = "  ".repeat(row.depth + 1);
            let scope = row.scope.map(|s| format!("[{}] ", s)).unwrap_or_default();
            let mut spans = vec![
                Span::raw(indent),
                Span::styled(scope, Style::default().fg(Color::DarkGray)),
                Span::raw(row.name),
                Span::styled(format!(" ({})", row.step_type), Style::default().fg(Color::Cyan)),
            ];
            if let Some(agent) = row.agent {
                spans.push(Span::styled(format!(" @{}", agent), Style::default().fg(Color::Green)));
            }
            if let Some(detail) = row.detail {
                spans.push(Span::styled(format!("  {}", detail), Style::default().fg(Color::DarkGray)));
            }
            lines.push(Line::from(spans));
        }
    }

    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Step "))
        .wrap(Wrap { trim: false });
    frame.render_widget(panel, area);
}

/// Text shown for a field that is not being edited
pub(crate) fn field_display(controller: &FlowController, key: &StepKey, field: StepInputField) -> (String, bool) {
    let input = controller.inputs().get(key);
    let value = match field {
        StepInputField::Instruction => {
            if input.instruction.trim().is_empty() {
                let declared = controller.step(key).map(|s| s.declared_instruction()).unwrap_or_default();
                return (declared.to_string(), true);
            }
            input.instruction
        }
        StepInputField::Configuration => {
            let text = controller.configuration_text(key);
            let inherited = !controller.inputs().has_configuration(key) && controller.inputs().draft(key).is_none();
            return (text.split_whitespace().collect::<Vec<_>>().join(" "), inherited);
        }
        StepInputField::ExternalApiUrl => input.external_api_url.unwrap_or_default(),
        StepInputField::ApiKey => input.api_key.unwrap_or_default(),
        StepInputField::ClientId => input.client_id.unwrap_or_default(),
        StepInputField::ClientSecret => input.client_secret.unwrap_or_default(),
    };
    if field.is_secret() {
        (mask(&value), false)
    } else {
        (value, false)
    }
}

/// Mask a secret for display
pub(crate) fn mask(value: &str) -> String {
    "•".repeat(value.chars().count().min(12))
}

fn render_input_form(state: &AppState, controller: &FlowController, key: &StepKey, frame: &mut Frame, area: Rect) {
    let editing = match &state.interaction_mode {
        InteractionMode::Edit(edit) if edit.key == *key => Some(edit),
        _ => None,
    };

    let mut lines = Vec::new();
    for (i, field) in StepInputField::ALL.iter().enumerate() {
        let selected = i == state.form_selection.selected_index;
        let label_style = if selected {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        };
        lines.push(Line::from(Span::styled(
            format!("{} {}", if selected { "▸" } else { " " }, field.label()),
            label_style,
        )));

        let value = match editing {
            Some(edit) if edit.field == *field => {
                let shown = if field.is_secret() { mask(&edit.buffer) } else { edit.buffer.clone() };
                Span::styled(format!("  {}▏", shown), Style::default().fg(Color::White).bg(Color::DarkGray))
            }
            _ => {
                let (text, inherited) = field_display(controller, key, *field);
                if text.is_empty() {
                    Span::styled("  -", Style::default().fg(Color::DarkGray))
                } else if inherited {
                    Span::styled(format!("  {} (declared)", text), Style::default().fg(Color::DarkGray))
                } else {
                    Span::raw(format!("  {}", text))
                }
            }
        };
        lines.push(Line::from(value));
    }
    if let Some(draft) = controller.inputs().draft(key) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Unsaved configuration draft: {}", draft),
            Style::default().fg(Color::Red),
        )));
    }

    let form = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Inputs (e edit, x execute) "))
        .wrap(Wrap { trim: false });
    frame.render_widget(form, area);
}

fn render_status_gauge(status: &ExecutionPlanStatus, frame: &mut Frame, area: Rect) {
    let mut label = format!("{} {}%", status.status, status.percent());
    if let Some(step) = &status.current_step {
        label.push_str(&format!(" · {}", step));
    }
    if let Some(error) = &status.error {
        label.push_str(&format!(" · {}", error));
    }
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Execution "))
        .gauge_style(Style::default().fg(status_color(&status.status)))
        .percent(status.percent())
        .label(label);
    frame.render_widget(gauge, area);
}

/// Render dashboard numbers and active executions
fn render_monitor(state: &AppState, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(0)])
        .split(area);

    let stats = state.dashboard.clone().unwrap_or_default();
    let rows = vec![
        Row::new(vec![Cell::from("Agents"), Cell::from(stats.total_agents.to_string())]),
        Row::new(vec![
            Cell::from("Active executions"),
            Cell::from(stats.active_executions.to_string()),
        ]),
        Row::new(vec![
            Cell::from("Completed"),
            Cell::from(stats.completed_executions.to_string()),
        ]),
        Row::new(vec![Cell::from("Failed"), Cell::from(stats.failed_executions.to_string())]),
        Row::new(vec![
            Cell::from("Avg execution time"),
            Cell::from(format!("{:.1}s", stats.average_execution_time)),
        ]),
    ];
    let title = if state.dashboard.is_some() { " Dashboard " } else { " Dashboard (waiting) " };
    let table = Table::new(rows, [Constraint::Percentage(50), Constraint::Percentage(50)])
        .block(Block::default().borders(Borders::ALL).title(title))
        .header(Row::new(vec!["Metric", "Value"]).style(Style::default().add_modifier(Modifier::BOLD)));
    frame.render_widget(table, chunks[0]);

    let rows: Vec<Row> = state
        .active_executions
        .iter()
        .map(|exec| {
            Row::new(vec![
                Cell::from(exec.plan_id.clone()),
                Cell::from(exec.status.to_string()).style(Style::default().fg(status_color(&exec.status))),
                Cell::from(format!("{}%", exec.percent())),
                Cell::from(format!("{}/{}", exec.completed_steps, exec.total_steps)),
                Cell::from(format!("{}/{}", exec.active_agents, exec.total_agents)),
                Cell::from(exec.current_step.clone().unwrap_or_else(|| "-".to_string())),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(25),
            Constraint::Percentage(12),
            Constraint::Percentage(10),
            Constraint::Percentage(13),
            Constraint::Percentage(13),
            Constraint::Percentage(27),
        ],
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Active executions ({}) ", state.active_executions.len())),
    )
    .header(
        Row::new(vec!["Plan", "Status", "Progress", "Steps", "Agents", "Current step"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    );
    frame.render_widget(table, chunks[1]);
}

/// Render the footer: the active input line, or key hints
fn render_footer(state: &AppState, frame: &mut Frame, area: Rect) {
    let prompt = match &state.interaction_mode {
        InteractionMode::Prompt(text) => Some(("Prompt", text.clone())),
        InteractionMode::Login(token) => Some(("Token", mask(token))),
        InteractionMode::Feedback { approved, buffer, .. } => {
            Some((if *approved { "Approve, feedback" } else { "Reject, feedback" }, buffer.clone()))
        }
        _ => None,
    };

    let line = match prompt {
        Some((label, text)) => Line::from(vec![
            Span::styled(format!(" {}: ", label), Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::raw(text),
            Span::styled("▏", Style::default().fg(Color::Yellow)),
        ]),
        None => {
            let hints: &[(&str, &str)] = match state.current_view {
                _ if matches!(state.interaction_mode, InteractionMode::Edit(_)) => &[("Enter", "Save"), ("Esc", "Cancel")],
                View::Plans => &[("q", "Quit"), ("?", "Help"), ("Tab", "View"), ("Enter", "Open"), ("r", "Refresh"), ("p", "Prompt")],
                View::Flow => &[("h/l", "Step"), ("j/k", "Field"), ("e", "Edit"), ("x", "Execute step"), ("X", "Execute plan"), ("s", "Stop")],
                View::Monitor => &[("q", "Quit"), ("?", "Help"), ("Tab", "View"), ("L", "Login")],
            };
            let mut spans = Vec::new();
            for (key, action) in hints {
                spans.push(Span::styled(
                    format!(" {}", key),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ));
                spans.push(Span::raw(format!(" {} ", action)));
            }
            Line::from(spans)
        }
    };

    let footer = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, area);
}

/// Stack toasts in the top-right corner of `area`
fn render_toasts(state: &AppState, frame: &mut Frame, area: Rect) {
    let width = area.width.min(48);
    let mut y = area.y;
    for toast in &state.toasts {
        if y + 3 > area.y + area.height {
            break;
        }
        let rect = Rect::new(area.x + area.width - width, y, width, 3);
        let color = level_color(toast.notification.level);
        let widget = Paragraph::new(toast.notification.message.as_str())
            .style(Style::default().fg(color))
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color)));
        frame.render_widget(Clear, rect);
        frame.render_widget(widget, rect);
        y += 3;
    }
}

fn render_confirm(message: &str, yes_selected: bool, frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(50, 25, area);
    frame.render_widget(Clear, popup_area);

    let selected = Style::default().fg(Color::Black).bg(Color::Yellow);
    let (yes, no) = if yes_selected {
        (selected, Style::default())
    } else {
        (Style::default(), selected)
    };
    let text = vec![
        Line::from(message),
        Line::from(""),
        Line::from(vec![Span::styled(" Yes ", yes), Span::raw("   "), Span::styled(" No ", no)]),
    ];
    let dialog = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(" Confirm "))
        .wrap(Wrap { trim: true });
    frame.render_widget(dialog, popup_area);
}

/// Render help overlay
fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 70, area);
    frame.render_widget(Clear, popup_area);

    let entry = |keys: &'static str, what: &'static str| {
        Line::from(vec![Span::styled(format!("{:<11}", keys), Style::default().fg(Color::Cyan)), Span::raw(what)])
    };
    let section = |title: &'static str| Line::from(bold(title));

    let help_text = vec![
        Line::from(Span::styled(
            "Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )),
        Line::from(""),
        entry("q, Ctrl+c", "Quit"),
        entry("?, F1", "Toggle help"),
        entry("Tab", "Next view"),
        entry("r", "Refresh plans"),
        entry("p", "Create a plan from a prompt"),
        entry("L", "Log in with a new token"),
        Line::from(""),
        section("Plans"),
        entry("↑/↓, j/k", "Move"),
        entry("Enter", "Open plan"),
        Line::from(""),
        section("Flow"),
        entry("←/→, h/l", "Previous/next step"),
        entry("↑/↓, j/k", "Select input field"),
        entry("e, Enter", "Edit field"),
        entry("x", "Execute step"),
        entry("X", "Execute whole plan"),
        entry("s", "Stop execution"),
        entry("a / d", "Approve / reject step"),
        entry("Esc", "Back to plans"),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help ")
                .style(Style::default().bg(Color::DarkGray)),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(help, popup_area);
}

/// Helper to create a centered rect
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
