use std::time::{SystemTime, UNIX_EPOCH};

use js8_protocol::varicode::{self, FRAME_CHARS};
use js8_protocol::{DecodeResult, directed, grid};
use serde::{Deserialize, Serialize};

/// Sender recorded when a received frame names no recognisable callsign.
pub const UNKNOWN_SENDER: &str = "UNKNOWN";

/// Filler used between words and after the text in an on-air frame.
pub const FRAME_FILL: char = '-';

/// A sent or received message. Never changed once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub from: String,
    /// Empty for broadcasts.
    pub to: String,
    pub text: String,
    pub snr: i32,
    /// Dial frequency plus audio offset, in Hz.
    pub frequency: u64,
    pub mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Directed,
    Broadcast,
    Heartbeat,
    AutoReply,
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Message {
    pub fn is_broadcast(&self) -> bool {
        self.to.is_empty()
    }

    /// The 12 characters that go on the air: recipient and text joined by
    /// a space, spaces turned into fill, cut or padded to frame length.
    pub fn frame_text(&self) -> String {
        let full = if self.to.is_empty() {
            self.text.clone()
        } else {
            format!("{} {}", self.to, self.text)
        };
        let filled: String = full.trim().chars().map(|c| if c == ' ' { FRAME_FILL } else { c }).collect();
        varicode::pad_message(&filled, FRAME_FILL)
    }
}

/// Turn fill back into spaces and drop the padding.
pub fn normalize_frame_text(text: &str) -> String {
    if text.contains(' ') {
        return text.trim().to_string();
    }
    text.trim_end_matches(FRAME_FILL)
        .chars()
        .map(|c| if c == FRAME_FILL { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sender, recipient and body recovered from received text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    pub from: String,
    pub to: String,
    pub body: String,
    pub kind: MessageKind,
}

/// Split received text into its parts.
///
/// CQ calls and heartbeats are broadcasts from the first callsign they
/// contain. `CALL GRID` with nothing else is a beacon from `CALL`.
/// Otherwise the text is read as `FROM: TO body`; when no sender can be
/// found it becomes [`UNKNOWN_SENDER`].
pub fn parse_received(text: &str) -> Parsed {
    let first_call = || {
        directed::extract_callsigns(text)
            .into_iter()
            .next()
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string())
    };

    if directed::is_cq(text) || directed::is_heartbeat(text) {
        let kind = if directed::is_cq(text) {
            MessageKind::Broadcast
        } else {
            MessageKind::Heartbeat
        };
        return Parsed {
            from: first_call(),
            to: String::new(),
            body: text.to_string(),
            kind,
        };
    }

    match directed::parse_directed(text) {
        Some(d) if d.from.is_none() && d.command.is_none() && grid::is_grid(&d.body) => Parsed {
            from: d.to,
            to: String::new(),
            body: d.body,
            kind: MessageKind::Heartbeat,
        },
        Some(d) => Parsed {
            from: d.from.unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
            to: d.to,
            body: d.body,
            kind: MessageKind::Directed,
        },
        None => Parsed {
            from: UNKNOWN_SENDER.to_string(),
            to: String::new(),
            body: text.to_string(),
            kind: MessageKind::Broadcast,
        },
    }
}

/// Build a received message from a decoder result.
pub fn from_decode(id: u64, result: &DecodeResult, dial_frequency: u64, mode: &str) -> (Message, MessageKind) {
    let text = normalize_frame_text(&result.message);
    let parsed = parse_received(&text);
    let message = Message {
        id,
        timestamp: unix_now(),
        from: parsed.from,
        to: parsed.to,
        text: parsed.body,
        snr: result.snr,
        frequency: dial_frequency + result.frequency_offset.max(0.0).round() as u64,
        mode: mode.to_string(),
    };
    (message, parsed.kind)
}

/// Text of an SNR report, e.g. `SNR -07`.
pub fn snr_report(snr: i32) -> String {
    format!("SNR {snr:+03}")
}

/// Beacon text: callsign and grid, cut to frame length.
pub fn heartbeat_text(callsign: &str, grid: &str) -> String {
    let text = format!("{callsign} {grid}");
    text.trim().chars().take(FRAME_CHARS).collect()
}
