//! Cooling-off window for reconnect-triggered cycles.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct ReconnectThrottle {
    cooldown: Duration,
    last: Mutex<Option<Instant>>,
}

impl ReconnectThrottle {
    pub const fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: Mutex::new(None),
        }
    }

    /// True when the window has elapsed since the last accepted trigger; the
    /// window then restarts.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(previous) if now.duration_since(previous) < self.cooldown => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
