//! Single in-flight cycle enforcement.

use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Running,
}

/// Shared idle/running state. Only one [`CycleToken`] exists at a time;
/// a caller that fails to get one drops its work instead of queueing it.
#[derive(Debug, Clone)]
pub struct CycleGuard {
    state: Arc<Mutex<CycleState>>,
}

impl Default for CycleGuard {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(CycleState::Idle)),
        }
    }
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move from idle to running, or `None` if a cycle already holds the token.
    pub fn try_begin(&self) -> Option<CycleToken> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            CycleState::Running => None,
            CycleState::Idle => {
                *state = CycleState::Running;
                Some(CycleToken {
                    state: Arc::clone(&self.state),
                })
            }
        }
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.state() == CycleState::Running
    }
}

/// Proof of holding the running state. Dropping it returns the guard to idle,
/// including on early return or panic.
#[derive(Debug)]
pub struct CycleToken {
    state: Arc<Mutex<CycleState>>,
}

impl Drop for CycleToken {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = CycleState::Idle;
    }
}
