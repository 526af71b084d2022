//! Sliding-window limiter for outbound summarisation calls.
//!
//! Keeps a log of call timestamps for the trailing window (60 s by
//! default). A caller that would push the log past the per-minute limit
//! sleeps until the oldest entry ages out, then tries again.
//!
//! Timestamps come from `tokio::time::Instant`, so tests running with a
//! paused clock see the window advance without real waiting.

use std::collections::VecDeque;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Length of the window the per-minute limit applies to.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Timestamp log shared by every summarisation task of one run.
#[derive(Debug)]
pub struct RateWindow {
    limit: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateWindow {
    /// At most `per_minute` calls in any trailing 60-second window.
    /// A limit of 0 is treated as 1.
    pub fn per_minute(per_minute: u32) -> Self {
        Self::new(per_minute as usize, RATE_WINDOW)
    }

    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait for a slot and record the call.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    calls.pop_front();
                }

                if calls.len() < self.limit {
                    calls.push_back(now);
                    return;
                }

                match calls.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!("Rate window full ({} calls), waiting {:?}", self.limit, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls recorded in the current window.
    pub async fn in_flight(&self) -> usize {
        let calls = self.calls.lock().await;
        let now = Instant::now();
        calls
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
