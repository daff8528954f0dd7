use std::sync::Arc;

use js8_protocol::Modulator;
use log::{debug, info, trace, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::message::{Direction, MessageKind};

use super::{Inner, Outgoing};

/// Frame type sent for each kind of message.
pub(super) fn frame_type(kind: MessageKind) -> u8 {
    match kind {
        MessageKind::Heartbeat => 0,
        MessageKind::Directed | MessageKind::AutoReply => 3,
        MessageKind::Broadcast => 4,
    }
}

/// Keeps PTT asserted for its lifetime.
struct PttGuard<'a> {
    inner: &'a Inner,
}

impl<'a> PttGuard<'a> {
    fn key(inner: &'a Inner) -> Self {
        if let Err(e) = inner.set_ptt(true) {
            warn!("PTT on: {e}");
        }
        inner.refresh_display();
        Self { inner }
    }
}

impl Drop for PttGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.inner.set_ptt(false) {
            warn!("PTT off: {e}");
        }
        self.inner.refresh_display();
    }
}

pub(super) async fn run(inner: Arc<Inner>, mut queue: mpsc::Receiver<Outgoing>, cancel: CancellationToken) {
    debug!("transmit worker started");
    loop {
        let outgoing = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = queue.recv() => match next {
                Some(outgoing) => outgoing,
                None => break,
            },
        };
        transmit(&inner, outgoing, &cancel).await;
    }
    debug!("transmit worker stopped");
}

/// One transmission: key, encode, play, hold for the sub-mode period,
/// unkey. PTT drops on every exit path, including cancellation.
async fn transmit(inner: &Inner, outgoing: Outgoing, cancel: &CancellationToken) {
    let Outgoing { message, kind } = outgoing;
    let config = inner.config();
    let submode = inner.submode();
    let hardware = inner.hardware();

    let _ptt = PttGuard::key(inner);

    let text = message.frame_text();
    let frame = match inner.encoder.encode(&text, frame_type(kind)) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("cannot encode message {} ({text:?}): {e}", message.id);
            return;
        }
    };

    let rate = hardware
        .with_audio(|audio| Ok(audio.output_sample_rate()))
        .unwrap_or(config.hardware.audio.output_sample_rate);
    let samples = Modulator::new(rate, config.engine.base_frequency, submode).generate(&frame);
    if inner.verbose {
        debug!("message {}: {} samples at {rate} Hz", message.id, samples.len());
    } else {
        trace!("message {}: {} samples", message.id, samples.len());
    }

    if let Err(e) = hardware.with_audio(|audio| {
        audio.start_output()?;
        audio.queue_samples(&samples)
    }) {
        warn!("playback failed for message {}: {e}", message.id);
        return;
    }
    info!(
        "TX {} -> {}: {text}",
        message.from,
        if message.to.is_empty() { "all" } else { message.to.as_str() }
    );

    let completed = tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(submode.tx_duration()) => true,
    };

    if let Err(e) = hardware.with_audio(|audio| audio.stop_output()) {
        debug!("stopping output: {e}");
    }

    if completed {
        if let Err(e) = inner.store.store_message(&message, Direction::Outgoing, kind) {
            warn!("could not record message {}: {e}", message.id);
        }
    } else {
        info!("transmission of message {} cut short", message.id);
    }
}
