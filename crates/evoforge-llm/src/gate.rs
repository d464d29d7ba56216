use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use evoforge_core::error::Result;
use evoforge_core::traits::ModelClient;
use evoforge_core::types::{ModelRequest, ModelResponse};

/// Sliding-window admission control: at most `limit` calls start in any
/// trailing window. Callers over the limit are suspended, not rejected.
pub struct CallGate {
    limit: usize,
    window: Duration,
    starts: Mutex<VecDeque<Instant>>,
}

impl CallGate {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            starts: Mutex::new(VecDeque::with_capacity(limit.max(1))),
        }
    }

    /// Gate admitting `calls_per_minute` calls in any trailing minute.
    pub fn per_minute(calls_per_minute: usize) -> Self {
        Self::new(calls_per_minute, Duration::from_secs(60))
    }

    /// Wait until a call may start, then record it.
    pub async fn admit(&self) {
        loop {
            let wake_at = {
                let mut starts = self.starts.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = starts.front() {
                    if now.duration_since(oldest) >= self.window {
                        starts.pop_front();
                    } else {
                        break;
                    }
                }
                if starts.len() < self.limit {
                    starts.push_back(now);
                    return;
                }
                match starts.front() {
                    Some(&oldest) => oldest + self.window,
                    None => continue,
                }
            };
            debug!(limit = self.limit, "Call gate full, waiting");
            tokio::time::sleep_until(wake_at).await;
        }
    }

    /// Calls started within the current window.
    pub async fn in_flight_window(&self) -> usize {
        let starts = self.starts.lock().await;
        let now = Instant::now();
        starts
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window)
            .count()
    }
}

/// Model client whose calls pass through a [`CallGate`].
pub struct GatedClient {
    inner: Arc<dyn ModelClient>,
    gate: Arc<CallGate>,
}

impl GatedClient {
    pub fn new(inner: Arc<dyn ModelClient>, gate: Arc<CallGate>) -> Self {
        Self { inner, gate }
    }
}

impl ModelClient for GatedClient {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        Box::pin(async move {
            self.gate.admit().await;
            self.inner.complete(request).await
        })
    }
}
