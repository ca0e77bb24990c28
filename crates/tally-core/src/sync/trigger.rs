//! Background reconciliation trigger.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::{CycleOutcome, DeferredSync, ReconnectThrottle, SyncEngine};
use crate::config::EngineConfig;
use crate::network::next_online;
use crate::remote::RemoteEntries;

/// Tag used for the deferred sync registration made on reconnect.
pub const SYNC_TAG: &str = "sync-entries";

/// Runs cycles periodically and on every offline-to-online transition.
pub struct ReconciliationTrigger<R> {
    engine: SyncEngine<R>,
    deferred: Arc<DeferredSync>,
    throttle: ReconnectThrottle,
    interval: Duration,
}

impl<R: RemoteEntries> ReconciliationTrigger<R> {
    pub fn new(engine: SyncEngine<R>, config: &EngineConfig) -> Self {
        Self {
            engine,
            deferred: Arc::new(DeferredSync::new()),
            throttle: ReconnectThrottle::new(config.reconnect_cooldown),
            interval: config.sync_interval,
        }
    }

    pub const fn deferred(&self) -> &Arc<DeferredSync> {
        &self.deferred
    }

    /// React to the network coming back. Outside the cooling-off window a
    /// cycle runs directly; when it cannot finish, a deferred sync retries
    /// it with backoff. Throttled transitions do nothing.
    pub async fn on_online(&self) -> Option<CycleOutcome> {
        if !self.throttle.try_acquire() {
            debug!("Reconnect cycle throttled");
            return None;
        }
        match self.engine.run_cycle().await {
            Ok(outcome) => {
                if matches!(outcome, CycleOutcome::Offline) {
                    self.deferred.register_retry(SYNC_TAG);
                }
                Some(outcome)
            }
            Err(error) => {
                warn!(%error, "Reconnect cycle failed");
                self.deferred.register_retry(SYNC_TAG);
                None
            }
        }
    }

    async fn on_tick(&self) {
        if let Err(error) = self.engine.run_cycle().await {
            warn!(%error, "Periodic cycle failed");
        }
    }

    /// Drive cycles until `shutdown` flips to true.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let mut connectivity = self.engine.network().subscribe();
        let mut listen_shutdown = shutdown.clone();

        let listen = async {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.on_tick().await,
                    online = next_online(&mut connectivity) => {
                        if online.is_none() {
                            break;
                        }
                        self.on_online().await;
                    }
                    result = listen_shutdown.changed() => {
                        if result.is_err() || *listen_shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        };

        tokio::join!(listen, self.deferred.run(&self.engine, shutdown));
    }
}
