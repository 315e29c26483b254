//! Terminal event loop
//!
//! The console is just another bus subscriber: it folds `Stat` and `Alert`
//! payloads into the [`View`] and redraws once a second. It owns the main
//! thread; pressing `q` or Ctrl-C cancels the shared shutdown token.

use crate::bus::Link;
use crate::dashboard::view::View;
use crate::error::MessageError;
use crate::messages::{self, AlertMessage, MessageKind, StatMessage};
use crate::shutdown::ShutdownToken;
use crossterm::event::{Event, KeyCode, KeyModifiers};
use log::{debug, info};
use ratatui::DefaultTerminal;
use std::io;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

const RENDER_INTERVAL: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bus subscriber rendering snapshots and alerts on the terminal.
pub struct Console<L: Link> {
    link: L,
    view: View,
}

impl<L: Link> Console<L> {
    /// `window` is the history window of the total series, in seconds.
    pub fn new(link: L, window: i64) -> Self {
        Self {
            link,
            view: View::new(window),
        }
    }

    /// Take over the terminal until the token is cancelled or the user quits.
    pub fn run(mut self, token: ShutdownToken) -> io::Result<()> {
        let mut terminal = ratatui::init();
        let result = self.event_loop(&mut terminal, &token);
        ratatui::restore();
        result
    }

    fn event_loop(
        &mut self,
        terminal: &mut DefaultTerminal,
        token: &ShutdownToken,
    ) -> io::Result<()> {
        terminal.draw(|frame| self.view.render(frame))?;
        let mut last_render = Instant::now();

        loop {
            if token.is_cancelled() {
                info!("console: shutdown signal received, exiting");
                return Ok(());
            }

            while crossterm::event::poll(Duration::ZERO)? {
                if let Event::Key(key) = crossterm::event::read()? {
                    let ctrl_c = key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL);
                    if key.code == KeyCode::Char('q') || ctrl_c {
                        info!("console: quit key pressed, shutting down");
                        token.cancel();
                        return Ok(());
                    }
                }
            }

            match self.link.recv_timeout(POLL_INTERVAL) {
                Ok(payload) => {
                    if let Err(err) = self.process_payload(&payload) {
                        debug!("console: dropping message: {err}");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("console: bus closed, exiting");
                    return Ok(());
                }
            }

            if last_render.elapsed() >= RENDER_INTERVAL {
                terminal.draw(|frame| self.view.render(frame))?;
                last_render = Instant::now();
            }
        }
    }

    /// Fold one `Stat` or `Alert` payload into the view.
    fn process_payload(&mut self, payload: &[u8]) -> Result<(), MessageError> {
        match messages::peek_kind(payload)? {
            MessageKind::Stat => {
                let msg: StatMessage = serde_json::from_slice(payload)?;
                self.view.apply_snapshot(&msg);
                Ok(())
            }
            MessageKind::Alert => {
                let msg: AlertMessage = serde_json::from_slice(payload)?;
                self.view.push_alert(msg.severity, &msg.text);
                Ok(())
            }
            MessageKind::Entry => Err(MessageError::WrongKind),
        }
    }
}
