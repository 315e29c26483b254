//! Access log file tailer
//!
//! Watches one file for appended writes and turns every complete new line
//! into a parsed entry on the `Data` topic. Only bytes appended after startup
//! are processed; historical content is never read.
//!
//! Rotation by truncate-in-place is detected (the file shrinks) and restarts
//! reading from offset zero. Rotation by remove-and-recreate replaces the
//! inode and is not handled here.

use crate::bus::Link;
use crate::clf;
use crate::error::TailError;
use crate::messages::{EntryMessage, Message, Topic};
use crate::shutdown::{ShutdownToken, WaitGroup};
use log::{debug, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

/// Upper bound on a single wait so cancellation is observed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Worker that converts file writes into a stream of parsed entries.
pub struct FileTailer<L: Link> {
    path: PathBuf,
    file: File,
    /// Offset up to which content has been processed
    bookmark: u64,
    /// Held for its side effect: dropping it stops the watch
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<notify::Event>>,
    link: L,
}

impl<L: Link> FileTailer<L> {
    /// Open the file, seek to its current end and register a write watch.
    ///
    /// Any failure here is fatal: the caller is expected to abort before the
    /// pipeline enters steady state.
    pub fn open(path: impl Into<PathBuf>, link: L) -> Result<Self, TailError> {
        let path = path.into();

        let mut file = File::open(&path).map_err(|source| TailError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let bookmark = file.seek(SeekFrom::End(0))?;

        let (tx, events) = mpsc::channel();
        let mut watcher =
            notify::recommended_watcher(tx).map_err(|source| TailError::Watch {
                path: path.display().to_string(),
                source,
            })?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|source| TailError::Watch {
                path: path.display().to_string(),
                source,
            })?;

        info!(
            "tailer: watching {} from offset {}",
            path.display(),
            bookmark
        );

        Ok(Self {
            path,
            file,
            bookmark,
            _watcher: watcher,
            events,
            link,
        })
    }

    /// Worker loop: read new content on every write notification, exit on
    /// cancellation.
    pub fn run(mut self, token: ShutdownToken, wg: WaitGroup) {
        info!("tailer: waiting for file writes");

        loop {
            if token.is_cancelled() {
                info!("tailer: shutdown signal received, exiting");
                break;
            }

            match self.events.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(event)) if event.kind.is_modify() => {
                    if let Err(err) = self.drain_new_lines() {
                        warn!("tailer: failed reading {}: {err}", self.path.display());
                    }
                }
                Ok(Ok(event)) => debug!("tailer: ignoring event {:?}", event.kind),
                Ok(Err(err)) => warn!("tailer: watch error: {err}"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("tailer: watcher channel closed, exiting");
                    break;
                }
            }
        }

        wg.done();
    }

    /// Read every complete line between the bookmark and end of file.
    ///
    /// A shrunk file means truncate-in-place rotation: reading restarts from
    /// offset zero. A trailing line without a newline is left unconsumed so
    /// the next notification retries it, possibly completed.
    fn drain_new_lines(&mut self) -> Result<(), TailError> {
        let eof = self.file.seek(SeekFrom::End(0))?;
        if eof < self.bookmark {
            info!(
                "tailer: truncation detected on {}, restarting from the beginning",
                self.path.display()
            );
            self.bookmark = 0;
        }
        self.file.seek(SeekFrom::Start(self.bookmark))?;

        let mut complete = Vec::new();
        let mut reader = BufReader::new(&mut self.file);
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            if !line.ends_with('\n') {
                // Partial write: the bookmark stays put so the next round
                // re-attempts this line.
                break;
            }

            self.bookmark += read as u64;
            complete.push(line.trim_end_matches('\n').to_string());
        }

        for line in &complete {
            self.publish_line(line);
        }

        Ok(())
    }

    /// Parse one line and publish it; unparseable lines are logged and
    /// skipped without aborting the batch.
    fn publish_line(&self, line: &str) {
        match clf::parse(line) {
            Ok(entry) => {
                debug!("tailer: publishing entry for {}", entry.request.path);
                if let Err(err) = self
                    .link
                    .send(Topic::Data, &Message::Entry(EntryMessage::new(entry)))
                {
                    warn!("tailer: failed publishing entry: {err}");
                }
            }
            Err(err) => warn!("tailer: skipping unparseable line {line:?}: {err}"),
        }
    }
}
