//! Periodic now-playing refresh.
//!
//! One timer exists at a time.  It is bound to the station that was current
//! when it was armed and is cancelled when dropped.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use vtfm_proto::catalog::StationId;

use crate::coordinator::CoordinatorEvent;

pub struct RefreshTimer {
    station: StationId,
    cancel: CancellationToken,
}

impl RefreshTimer {
    /// Start ticking every `period`, first tick one period from now.  The
    /// timer holds only a weak sender so it never keeps the coordinator alive.
    pub fn arm(
        station: StationId,
        period: Duration,
        tx: mpsc::WeakSender<CoordinatorEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(tx) = tx.upgrade() else { break };
                        if tx.send(CoordinatorEvent::RefreshTick { station }).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("refresh timer for station {} stopped", station);
        });

        debug!("refresh timer armed for station {} every {:?}", station, period);
        Self { station, cancel }
    }

    pub fn station(&self) -> StationId {
        self.station
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
