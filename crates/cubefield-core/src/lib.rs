// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::time::{Duration, Instant};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used (e.g. `"info"`).
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

/// Counts presented frames and reports once per window.
pub struct FpsCounter {
    window: Duration,
    frames: u32,
    since: Instant,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: Duration, now: Instant) -> Self {
        Self {
            window,
            frames: 0,
            since: now,
        }
    }

    pub fn frame(&mut self) {
        self.frames = self.frames.saturating_add(1);
    }

    /// Drops the running count, e.g. while the window is paused.
    pub fn reset(&mut self, now: Instant) {
        self.frames = 0;
        self.since = now;
    }

    /// Returns the frame count once the window has elapsed and starts a new one.
    pub fn poll(&mut self, now: Instant) -> Option<u32> {
        if now.duration_since(self.since) < self.window {
            return None;
        }
        let frames = self.frames;
        self.reset(now);
        Some(frames)
    }
}
