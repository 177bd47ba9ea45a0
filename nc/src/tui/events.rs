//! TUI event handling
//!
//! Crossterm is polled on a plain thread and events are forwarded over a
//! tokio channel so the runner can `select!` them against engine results.

use std::time::Duration;

use crossterm::event::{self, KeyEvent, KeyEventKind};
use eyre::Result;
use tokio::sync::mpsc;

/// Terminal events
#[derive(Debug)]
pub enum Event {
    /// Key press
    Key(KeyEvent),
    /// Terminal resize
    Resize(u16, u16),
    /// Tick (periodic refresh)
    Tick,
}

/// Event handler for the TUI
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
    /// Create a new event handler with the given tick rate
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || {
            loop {
                if event::poll(tick_rate).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        let event = match evt {
                            // Windows reports releases too
                            event::Event::Key(key) if key.kind == KeyEventKind::Press => Event::Key(key),
                            event::Event::Resize(w, h) => Event::Resize(w, h),
                            _ => continue,
                        };

                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                } else if tx.send(Event::Tick).is_err() {
                    break;
                }
            }
        });

        Self { rx }
    }

    /// Get the next event (async)
    pub async fn next(&mut self) -> Result<Event> {
        self.rx.recv().await.ok_or_else(|| eyre::eyre!("Event channel closed"))
    }
}
