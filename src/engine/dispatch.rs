use std::sync::Arc;

use js8_protocol::directed;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::message::{self, Direction, Message, MessageKind, UNKNOWN_SENDER};

use super::{Inner, Received};

pub(super) async fn run(inner: Arc<Inner>, mut queue: mpsc::Receiver<Received>, cancel: CancellationToken) {
    debug!("dispatch worker started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = queue.recv() => match next {
                Some(received) => handle(&inner, received),
                None => break,
            },
        }
    }
    debug!("dispatch worker stopped");
}

fn handle(inner: &Inner, received: Received) {
    let Received { message, kind } = received;
    info!(
        "RX {} -> {}: {} ({:+} dB)",
        message.from,
        if message.to.is_empty() { "all" } else { message.to.as_str() },
        message.text,
        message.snr
    );

    if let Err(e) = inner.store.store_message(&message, Direction::Incoming, kind) {
        warn!("could not record message {}: {e}", message.id);
    }
    inner.set_last_heard(format!("{}: {}", message.from, message.text));
    inner.refresh_display();

    let callsign = inner.config().station.callsign.clone();
    if let Some(text) = auto_reply(&message, &callsign) {
        let reply = inner.new_message(&message.from, &text);
        match inner.enqueue(reply, MessageKind::AutoReply) {
            Ok(()) => info!("auto-reply to {}: {text}", message.from),
            Err(e) => warn!("auto-reply to {} dropped: {e}", message.from),
        }
    }
}

/// Reply text for `message` when it is addressed to `callsign` and asks for
/// something answered automatically. Only SNR queries are answered today;
/// other auto-reply commands are recognised and left alone.
pub fn auto_reply(message: &Message, callsign: &str) -> Option<String> {
    if callsign.is_empty()
        || message.to != callsign
        || message.from == callsign
        || message.from == UNKNOWN_SENDER
    {
        return None;
    }

    let command = directed::command_in_body(&message.text)?;
    if command.is_snr_query() {
        return Some(message::snr_report(message.snr));
    }
    if command.is_autoreply() {
        debug!("no automatic answer for{} from {}", command.key, message.from);
    }
    None
}
