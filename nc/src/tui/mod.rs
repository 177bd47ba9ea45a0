//! Terminal User Interface for the operator console
//!
//! Three views share one screen:
//! - Plans: the engine's plans, Enter opens one
//! - Flow: the selected plan as a step wizard with the operator input form
//! - Monitor: dashboard numbers and active executions

mod app;
mod events;
mod runner;
pub mod state;
mod views;

pub use app::App;
pub use events::{Event, EventHandler};
pub use runner::TuiRunner;
pub use state::{AppState, InteractionMode, PendingAction, View};

use std::io::{self, Stdout};
use std::sync::Arc;

use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use eyre::Result;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::client::EngineApi;
use crate::config::Config;
use crate::notify::NotificationBus;
use crate::session::Session;

/// Terminal type alias
pub type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Initialize the terminal for TUI mode
pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore the terminal to normal mode
pub fn restore() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(())
}

/// Run the console until the operator quits
pub async fn run(config: Config, engine: Arc<dyn EngineApi>, session: Arc<Session>, notifications: NotificationBus) -> Result<()> {
    let terminal = init()?;

    // Use a guard to ensure terminal is restored even on early return/error
    struct TerminalGuard;
    impl Drop for TerminalGuard {
        fn drop(&mut self) {
            let _ = restore();
        }
    }
    let _guard = TerminalGuard;

    let mut runner = TuiRunner::new(terminal, config, engine, session, notifications);
    runner.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _: fn() -> App = App::new;
        let _: fn() -> AppState = AppState::new;
    }
}
