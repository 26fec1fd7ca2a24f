//! Push-style status observation by polling the store.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream};

use vtrack_models::{Task, TaskId};

use crate::error::StoreResult;
use crate::store::TaskStore;

/// Polling cadence for status watchers.
#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    /// Delay between reads
    pub interval: Duration,
    /// Consecutive misses after which an unknown id stops being watched
    pub missing_grace: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            missing_grace: 30,
        }
    }
}

impl WatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: std::env::var("STATUS_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            missing_grace: std::env::var("STATUS_MISSING_GRACE_POLLS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.missing_grace),
        }
    }
}

struct WatchState {
    store: Arc<dyn TaskStore>,
    id: TaskId,
    config: WatchConfig,
    misses: u32,
    first: bool,
    done: bool,
}

/// Stream the record for `id` once per interval.
///
/// The stream ends after yielding a terminal record, after a store error, or
/// once the id has been missing for `missing_grace` consecutive polls.
pub fn watch_task(store: Arc<dyn TaskStore>, id: TaskId, config: WatchConfig) -> impl Stream<Item = StoreResult<Task>> + Send {
    let state = WatchState {
        store,
        id,
        config,
        misses: 0,
        first: true,
        done: false,
    };

    stream::unfold(state, |mut s| async move {
        loop {
            if s.done {
                return None;
            }
            if !s.first {
                tokio::time::sleep(s.config.interval).await;
            }
            s.first = false;

            match s.store.get(&s.id).await {
                Ok(Some(task)) => {
                    s.misses = 0;
                    s.done = task.is_terminal();
                    return Some((Ok(task), s));
                }
                Ok(None) => {
                    s.misses += 1;
                    if s.misses >= s.config.missing_grace {
                        return None;
                    }
                }
                Err(e) => {
                    s.done = true;
                    return Some((Err(e), s));
                }
            }
        }
    })
}
