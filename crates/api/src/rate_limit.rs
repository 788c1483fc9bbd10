use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window request counter keyed by client address.
#[derive(Debug, Clone)]
pub struct ClientRateLimiter {
    inner: Arc<Mutex<Windows>>,
    window: Duration,
    max_requests: usize,
}

#[derive(Debug, Default)]
struct Windows {
    clients: HashMap<String, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl ClientRateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Windows::default())),
            window,
            max_requests,
        }
    }

    pub fn allow(&self, client: &str) -> bool {
        self.allow_at(client, Instant::now())
    }

    fn allow_at(&self, client: &str, now: Instant) -> bool {
        let window = self.window;
        let mut guard = self.inner.lock();

        // At most once per window, forget clients with no hit left inside it.
        let sweep_due = guard
            .last_sweep
            .map_or(true, |last| now.duration_since(last) >= window);
        if sweep_due {
            guard.clients.retain(|_, hits| {
                prune(hits, now, window);
                !hits.is_empty()
            });
            guard.last_sweep = Some(now);
        }

        let hits = guard.clients.entry(client.to_string()).or_default();
        prune(hits, now, window);

        if hits.len() >= self.max_requests {
            if hits.is_empty() {
                guard.clients.remove(client);
            }
            return false;
        }

        hits.push_back(now);
        true
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.inner.lock().clients.len()
    }
}

fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while hits
        .front()
        .is_some_and(|first| now.duration_since(*first) > window)
    {
        hits.pop_front();
    }
}
