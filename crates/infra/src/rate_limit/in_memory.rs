use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{RateLimitError, RateLimitStore};

/// Process-local sliding-window counters.
///
/// Each key keeps the instants of its hits inside the window; older ones are
/// pruned on access. Keys with no hits left are dropped, at most once per
/// window by a sweep over the whole map.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    state: Mutex<Windows>,
}

#[derive(Debug, Default)]
struct Windows {
    keys: HashMap<String, Window>,
    last_sweep: Option<Instant>,
}

#[derive(Debug)]
struct Window {
    hits: VecDeque<Instant>,
    span: Duration,
}

impl Window {
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.hits.front() {
            if now.duration_since(oldest) >= self.span {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Windows {
    fn sweep(&mut self, now: Instant, every: Duration) {
        if self.last_sweep.is_some_and(|at| now.duration_since(at) < every) {
            return;
        }
        self.last_sweep = Some(now);
        self.keys.retain(|_, window| {
            window.prune(now);
            !window.hits.is_empty()
        });
    }
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn try_acquire(&self, key: &str, max: u32, window: Duration) -> Result<bool, RateLimitError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.sweep(now, window);

        let entry = state.keys.entry(key.to_string()).or_insert_with(|| Window {
            hits: VecDeque::new(),
            span: window,
        });
        entry.span = window;
        entry.prune(now);
        if entry.hits.len() >= max as usize {
            return Ok(false);
        }
        entry.hits.push_back(now);
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<(), RateLimitError> {
        let mut state = self.state.lock().await;
        if let Some(window) = state.keys.get_mut(key) {
            window.hits.pop_back();
            if window.hits.is_empty() {
                state.keys.remove(key);
            }
        }
        Ok(())
    }
}
