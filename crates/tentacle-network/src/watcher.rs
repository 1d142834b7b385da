//! Socket directory watching.
//!
//! Adaptors learn that the hub restarted, and the hub learns that an adaptor
//! went away, by watching socket files appear and disappear in the shared
//! directory. [`SocketWatcher`] bridges the blocking `notify` callback into a
//! tokio channel so those events can be awaited.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::error::{NetworkError, Result};

/// A socket file appeared in or vanished from the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Created(String),
    Removed(String),
}

impl SocketEvent {
    /// File name the event refers to.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            SocketEvent::Created(name) | SocketEvent::Removed(name) => name,
        }
    }
}

/// Watches one directory, non-recursively.
pub struct SocketWatcher {
    dir: PathBuf,
    events: mpsc::UnboundedReceiver<SocketEvent>,
    _watcher: RecommendedWatcher,
}

impl SocketWatcher {
    /// Start watching `dir`, creating it if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for socket_event in translate(event) {
                    // receiver gone means nobody is watching anymore
                    let _ = tx.send(socket_event);
                }
            }
            Err(e) => warn!("Socket watch error: {}", e),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        trace!("Watching {}", dir.display());
        Ok(Self {
            dir,
            events,
            _watcher: watcher,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Next event, or `Closed` if the watcher stopped delivering.
    pub async fn next(&mut self) -> Result<SocketEvent> {
        self.events.recv().await.ok_or(NetworkError::Closed)
    }

    /// Wait until the file `name` is removed.
    pub async fn wait_removed(&mut self, name: &str) -> Result<()> {
        loop {
            if let SocketEvent::Removed(removed) = self.next().await?
                && removed == name
            {
                return Ok(());
            }
        }
    }

    /// Wait until the file `name` is created.
    pub async fn wait_created(&mut self, name: &str) -> Result<()> {
        loop {
            if let SocketEvent::Created(created) = self.next().await?
                && created == name
            {
                return Ok(());
            }
        }
    }
}

fn translate(event: Event) -> Vec<SocketEvent> {
    let names = event
        .paths
        .iter()
        .filter_map(|path| path.file_name()?.to_str().map(str::to_owned));

    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            names.map(SocketEvent::Created).collect()
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            names.map(SocketEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut names = names;
            let mut translated = Vec::with_capacity(2);
            if let Some(from) = names.next() {
                translated.push(SocketEvent::Removed(from));
            }
            if let Some(to) = names.next() {
                translated.push(SocketEvent::Created(to));
            }
            translated
        }
        _ => Vec::new(),
    }
}
