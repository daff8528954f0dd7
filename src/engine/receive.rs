use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use js8_protocol::Decoder;
use log::{debug, trace, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::message;
use crate::pool::PooledBuffer;

use super::{Inner, Received};

/// Seconds of audio needed before a batch triggers a decode.
pub const DECODE_THRESHOLD_SECS: usize = 3;
/// Most audio held at once.
pub const MAX_BUFFER_SECS: usize = 15;
/// Audio kept when the buffer overflows.
pub const KEEP_SECS: usize = 10;
/// Idle decode cadence.
pub const IDLE_TICK: Duration = Duration::from_secs(1);

/// Rolling sample buffer: grows to fifteen seconds, then drops the oldest
/// audio down to the last ten.
#[derive(Debug)]
pub struct RollingBuffer {
    samples: Vec<f32>,
    rate: usize,
}

impl RollingBuffer {
    pub fn new(sample_rate: u32) -> Self {
        let rate = sample_rate as usize;
        Self {
            samples: Vec::with_capacity(rate * MAX_BUFFER_SECS),
            rate,
        }
    }

    pub fn extend(&mut self, batch: &[f32]) {
        self.samples.extend_from_slice(batch);
        if self.samples.len() > self.rate * MAX_BUFFER_SECS {
            let excess = self.samples.len() - self.rate * KEEP_SECS;
            self.samples.drain(..excess);
        }
    }

    /// Enough audio for a batch-triggered decode.
    pub fn ready(&self) -> bool {
        self.samples.len() >= self.rate * DECODE_THRESHOLD_SECS
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Texts accepted within the last window. The buffer is decoded again as
/// it grows, so one transmission can come back several times.
#[derive(Debug)]
pub struct RecentDecodes {
    window: Duration,
    seen: VecDeque<(String, Instant)>,
}

impl RecentDecodes {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: VecDeque::new(),
        }
    }

    /// `true` the first time `text` shows up within the window.
    pub fn accept(&mut self, text: &str, now: Instant) -> bool {
        while let Some((_, at)) = self.seen.front() {
            if now.duration_since(*at) > self.window {
                self.seen.pop_front();
            } else {
                break;
            }
        }
        if self.seen.iter().any(|(t, _)| t == text) {
            return false;
        }
        self.seen.push_back((text.to_string(), now));
        true
    }
}

pub(super) async fn run(
    inner: Arc<Inner>,
    mut capture: mpsc::Receiver<PooledBuffer>,
    decoder: Arc<dyn Decoder>,
    queue: mpsc::Sender<Received>,
    sample_rate: u32,
    cancel: CancellationToken,
) {
    debug!("receive worker started at {sample_rate} Hz");
    let mut buffer = RollingBuffer::new(sample_rate);
    let mut recent = RecentDecodes::new(inner.submode().tx_duration());
    let mut ticker = time::interval_at(Instant::now() + IDLE_TICK, IDLE_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut idle = true;
    let mut open = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            batch = capture.recv(), if open => match batch {
                Some(batch) => {
                    buffer.extend(&batch);
                    drop(batch);
                    idle = false;
                    if buffer.ready() {
                        attempt(&inner, &decoder, buffer.samples(), sample_rate, &mut recent, &queue).await;
                    }
                }
                None => {
                    debug!("capture channel closed");
                    open = false;
                }
            },
            _ = ticker.tick() => {
                if idle && !buffer.is_empty() {
                    attempt(&inner, &decoder, buffer.samples(), sample_rate, &mut recent, &queue).await;
                    buffer.clear();
                }
                idle = true;
            }
        }
    }
    debug!("receive worker stopped");
}

/// Run the decoder once on the blocking pool and queue every new result.
async fn attempt(
    inner: &Inner,
    decoder: &Arc<dyn Decoder>,
    samples: &[f32],
    sample_rate: u32,
    recent: &mut RecentDecodes,
    queue: &mpsc::Sender<Received>,
) {
    let len = samples.len();
    let samples = samples.to_vec();
    let decoder = Arc::clone(decoder);
    let results = match task::spawn_blocking(move || decoder.decode(&samples, sample_rate)).await {
        Ok(results) => results,
        Err(e) => {
            warn!("decoder task failed: {e}");
            return;
        }
    };
    if inner.verbose {
        debug!("decode over {len} samples: {} result(s)", results.len());
    }
    if results.is_empty() {
        return;
    }

    let now = Instant::now();
    let dial = inner.state.read().frequency;
    let mode = inner.submode().tag();
    for result in results {
        if !recent.accept(&result.message, now) {
            trace!("repeat decode of {:?}", result.message);
            continue;
        }
        let (message, kind) = message::from_decode(inner.next_id(), &result, dial, mode);
        match queue.try_send(Received { message, kind }) {
            Ok(()) => {}
            Err(TrySendError::Full(r)) => {
                warn!("receive queue full, dropped message from {}", r.message.from);
            }
            Err(TrySendError::Closed(_)) => debug!("receive queue closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_buffer_caps() {
        let mut buffer = RollingBuffer::new(100);
        buffer.extend(&[1.0; 299]);
        assert!(!buffer.ready());
        buffer.extend(&[1.0; 1]);
        assert!(buffer.ready());

        buffer.extend(&[2.0; 1200]);
        assert_eq!(buffer.len(), 1500);

        buffer.extend(&[3.0; 1]);
        assert_eq!(buffer.len(), 1000);
        assert_eq!(*buffer.samples().last().unwrap(), 3.0);
        assert_eq!(buffer.samples()[0], 2.0);

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_recent_decodes_window() {
        let start = Instant::now();
        let mut recent = RecentDecodes::new(Duration::from_secs(15));
        assert!(recent.accept("CQ N0CALL", start));
        assert!(!recent.accept("CQ N0CALL", start + Duration::from_secs(5)));
        assert!(recent.accept("N0CALL EM12", start + Duration::from_secs(5)));
        assert!(recent.accept("CQ N0CALL", start + Duration::from_secs(16)));
    }
}
