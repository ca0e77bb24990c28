//! Network-state observer.
//!
//! Holds the current online/offline state and broadcasts transitions to
//! subscribers. State is fed either by a platform signal through
//! [`NetworkObserver::set`] or by polling a [`ConnectivityProbe`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::remote::ConnectivityProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl From<bool> for Connectivity {
    fn from(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

/// Cloneable handle; all clones observe the same state.
#[derive(Debug, Clone)]
pub struct NetworkObserver {
    state: Arc<watch::Sender<Connectivity>>,
}

impl NetworkObserver {
    pub fn new(initial: Connectivity) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn current(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Record the latest observation. Returns true when it was a transition;
    /// only transitions wake subscribers.
    pub fn set(&self, connectivity: Connectivity) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == connectivity {
                false
            } else {
                *current = connectivity;
                true
            }
        });
        if changed {
            info!(?connectivity, "Connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Poll `probe` every `interval` until `shutdown` flips to true.
    pub async fn run_probe<P: ConnectivityProbe>(
        &self,
        probe: &P,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let online = probe.check().await;
                    self.set(Connectivity::from(online));
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

impl Default for NetworkObserver {
    fn default() -> Self {
        Self::new(Connectivity::Offline)
    }
}

/// Wait for the next offline-to-online transition. Returns `None` once the
/// observer is gone.
pub async fn next_online(receiver: &mut watch::Receiver<Connectivity>) -> Option<()> {
    loop {
        receiver.changed().await.ok()?;
        if receiver.borrow_and_update().is_online() {
            return Some(());
        }
    }
}
