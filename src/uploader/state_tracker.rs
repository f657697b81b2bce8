use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::config::Preset;
use crate::errors::AppResult;

use super::session::{ResultPayload, SessionStatus};

/// What the session looked like right before a submission started, so a
/// cancelled upload can put it back.
#[derive(Debug, Clone)]
pub struct RestorePoint {
    pub status: SessionStatus,
    pub result: Option<Arc<ResultPayload>>,
    pub error_message: Option<String>,
}

/// Mutable state of one upload session. Only touched under the tracker lock.
#[derive(Debug)]
pub struct SessionState {
    pub source_image: Option<Arc<Vec<u8>>>,
    pub filename: Option<String>,
    pub preset: Preset,
    pub status: SessionStatus,
    pub result: Option<Arc<ResultPayload>>,
    pub error_message: Option<String>,
    /// Bumped whenever an in-flight submission must be ignored on arrival
    pub generation: u64,
    pub restore_point: Option<RestorePoint>,
}

impl SessionState {
    pub fn new(preset: Preset) -> Self {
        Self {
            source_image: None,
            filename: None,
            preset,
            status: SessionStatus::Idle,
            result: None,
            error_message: None,
            generation: 0,
            restore_point: None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            filename: self.filename.clone(),
            image_size: self.source_image.as_ref().map(|image| image.len()),
            preset: self.preset.clone(),
            result: self.result.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub filename: Option<String>,
    pub image_size: Option<usize>,
    pub preset: Preset,
    pub result: Option<Arc<ResultPayload>>,
    pub error_message: Option<String>,
}

pub struct StateTracker {
    state: Mutex<SessionState>,
    notifier: watch::Sender<SessionSnapshot>,
}

impl StateTracker {
    pub fn new(initial: SessionState) -> Self {
        let (notifier, _) = watch::channel(initial.snapshot());
        Self {
            state: Mutex::new(initial),
            notifier,
        }
    }

    fn lock(&self, operation: &str) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::warn!(
                "Session state lock was poisoned during {} (recovering)",
                operation
            );
            poisoned.into_inner()
        })
    }

    /// Apply a change and notify subscribers if the visible state moved.
    /// A change that returns an error must leave the state untouched.
    pub fn update<F, R>(&self, operation: &str, f: F) -> AppResult<R>
    where
        F: FnOnce(&mut SessionState) -> AppResult<R>,
    {
        let mut state = self.lock(operation);
        let result = f(&mut state)?;
        let snapshot = state.snapshot();
        drop(state);

        let changed = self.notifier.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });

        if changed {
            log::debug!("Session state changed after {}", operation);
        }

        Ok(result)
    }

    pub fn read<F, R>(&self, operation: &str, f: F) -> R
    where
        F: FnOnce(&SessionState) -> R,
    {
        let state = self.lock(operation);
        f(&state)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.read("snapshot", SessionState::snapshot)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.notifier.subscribe()
    }
}
