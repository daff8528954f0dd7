use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::StationConfig;
use crate::error::Error;
use crate::message::{self, MessageKind};

use super::Inner;

/// Shortest interval the ticker accepts.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Beacon text for `station`, or `None` when beacons are off or there is no
/// callsign to send.
pub(super) fn beacon(station: &StationConfig) -> Option<String> {
    if !station.heartbeat || station.callsign.is_empty() {
        return None;
    }
    Some(message::heartbeat_text(&station.callsign, &station.grid))
}

pub(super) async fn run(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut period = inner.config().station.heartbeat_period().max(MIN_PERIOD);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    debug!("heartbeat worker started ({}s)", period.as_secs());

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let config = inner.config();
        if let Some(text) = beacon(&config.station) {
            let message = inner.new_message("", &text);
            match inner.enqueue(message, MessageKind::Heartbeat) {
                Ok(()) => info!("heartbeat queued: {text}"),
                Err(Error::QueueFull) => warn!("transmit queue full, heartbeat skipped"),
                Err(Error::NotRunning) => debug!("heartbeat not queued: engine stopping"),
                Err(e) => warn!("heartbeat {text:?} not sendable: {e}"),
            }
        }

        let wanted = config.station.heartbeat_period().max(MIN_PERIOD);
        if wanted != period {
            debug!("heartbeat interval now {}s", wanted.as_secs());
            period = wanted;
            ticker = time::interval_at(Instant::now() + period, period);
        }
    }
    debug!("heartbeat worker stopped");
}
