use crate::grid;

/// Directed command table: key → command number. Negative numbers are
/// heartbeat forms, which are directed at nobody. Keys match exactly as
/// written, leading space included.
pub const DIRECTED_COMMANDS: &[(&str, i8)] = &[
    (" HEARTBEAT", -1),
    (" HB", -1),
    (" SNR?", 0),
    ("?", 0),
    (" DIT DIT", 1),
    (" NACK", 2),
    (" HEARING?", 3),
    (" GRID?", 4),
    (">", 5),
    (" STATUS?", 6),
    (" STATUS", 7),
    (" HEARING", 8),
    (" MSG", 9),
    (" MSG TO:", 10),
    (" QUERY", 11),
    (" QUERY MSGS", 12),
    (" QUERY MSGS?", 12),
    (" QUERY CALL", 13),
    (" GRID", 15),
    (" INFO?", 16),
    (" INFO", 17),
    (" FB", 18),
    (" HW CPY?", 19),
    (" SK", 20),
    (" RR", 21),
    (" QSL?", 22),
    (" QSL", 23),
    (" CMD", 24),
    (" SNR", 25),
    (" NO", 26),
    (" YES", 27),
    (" 73", 28),
    (" ACK", 29),
    (" AGN?", 30),
];

/// Commands that request an automatic reply.
pub const AUTOREPLY_COMMANDS: &[i8] = &[0, 3, 4, 6, 9, 10, 11, 12, 13, 16, 30];

/// Commands whose body spans multiple frames and is buffered before use.
pub const BUFFERED_COMMANDS: &[i8] = &[5, 9, 10, 11, 12, 13, 15, 24];

/// Commands that carry an SNR report.
pub const SNR_COMMANDS: &[i8] = &[25];

/// Buffered commands that end with a checksum.
pub const CHECKSUM_COMMANDS: &[i8] = &[5, 9, 10, 11, 12, 13];

/// SNR query command number.
pub const SNR_QUERY: i8 = 0;

/// A recognised directed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectedCommand {
    pub key: &'static str,
    pub number: i8,
}

impl DirectedCommand {
    pub fn is_autoreply(&self) -> bool {
        AUTOREPLY_COMMANDS.contains(&self.number)
    }

    pub fn is_buffered(&self) -> bool {
        BUFFERED_COMMANDS.contains(&self.number)
    }

    pub fn is_checksummed(&self) -> bool {
        CHECKSUM_COMMANDS.contains(&self.number)
    }

    pub fn is_snr(&self) -> bool {
        SNR_COMMANDS.contains(&self.number)
    }

    pub fn is_snr_query(&self) -> bool {
        self.number == SNR_QUERY
    }

    pub fn is_heartbeat(&self) -> bool {
        self.number < 0
    }
}

/// Exact table lookup.
pub fn lookup(key: &str) -> Option<DirectedCommand> {
    DIRECTED_COMMANDS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|&(key, number)| DirectedCommand { key, number })
}

/// Longest command key at the start of `rest` that ends on a word boundary.
///
/// `rest` is the text immediately following a callsign, so a spaced command
/// keeps its leading space (`" SNR?"`) and the bare forms (`"?"`, `">"`)
/// follow without one.
pub fn command_prefix(rest: &str) -> Option<DirectedCommand> {
    DIRECTED_COMMANDS
        .iter()
        .filter(|&&(k, _)| {
            rest.strip_prefix(k)
                .is_some_and(|tail| tail.is_empty() || tail.starts_with(' ') || k.ends_with(['?', '>', ':']))
        })
        .max_by_key(|(k, _)| k.len())
        .map(|&(key, number)| DirectedCommand { key, number })
}

/// Classify the body of a message addressed to a station, as stored after
/// the recipient callsign (leading whitespace already removed).
pub fn command_in_body(body: &str) -> Option<DirectedCommand> {
    if body.starts_with('?') || body.starts_with('>') {
        command_prefix(body)
    } else {
        command_prefix(&format!(" {body}"))
    }
}

pub fn is_snr_query(body: &str) -> bool {
    command_in_body(body).is_some_and(|c| c.is_snr_query())
}

pub fn is_autoreply(body: &str) -> bool {
    command_in_body(body).is_some_and(|c| c.is_autoreply())
}

pub fn is_buffered(body: &str) -> bool {
    command_in_body(body).is_some_and(|c| c.is_buffered())
}

pub fn is_checksummed(body: &str) -> bool {
    command_in_body(body).is_some_and(|c| c.is_checksummed())
}

/// `true` for CQ calls: text starting with `CQ` or containing ` CQ `.
pub fn is_cq(text: &str) -> bool {
    let text = text.trim_end();
    text == "CQ" || text.starts_with("CQ ") || text.starts_with("CQ-") || text.contains(" CQ ") || text.ends_with(" CQ")
}

/// `true` for heartbeat beacons: `HB`/`HEARTBEAT` at the start, or after a
/// callsign (`N0CALL: HB EM12`).
pub fn is_heartbeat(text: &str) -> bool {
    let starts = |t: &str| {
        ["HB", "HEARTBEAT"]
            .iter()
            .any(|p| t.strip_prefix(p).is_some_and(|tail| tail.is_empty() || tail.starts_with(' ')))
    };
    if starts(text) {
        return true;
    }
    match text.split_once(':') {
        Some((_, rest)) => starts(rest.trim_start()),
        None => false,
    }
}

/// Callsign shape: 3 to 9 characters of `A-Z`, `0-9` and `/`, with at least
/// one digit and one letter. A leading `@` marks a group.
pub fn is_callsign(token: &str) -> bool {
    let body = token.strip_prefix('@').unwrap_or(token);
    (3..=9).contains(&body.len())
        && body.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '/')
        && body.chars().any(|c| c.is_ascii_digit())
        && body.chars().any(|c| c.is_ascii_uppercase())
}

/// Group callsigns start with `@` (e.g. `@ALLCALL`) and need no digit.
pub fn is_group(token: &str) -> bool {
    token
        .strip_prefix('@')
        .is_some_and(|g| (2..=9).contains(&g.len()) && g.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()))
}

/// All callsign-shaped tokens, in order, with trailing `:`/`?`/`>` removed.
pub fn extract_callsigns(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.trim_end_matches([':', '?', '>', ',']))
        .filter(|t| is_callsign(t) || is_group(t))
        .map(str::to_string)
        .collect()
}

/// First grid-square token in `text`.
pub fn extract_grid(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|t| t.trim_end_matches([',', '.']))
        .find(|t| grid::is_grid(t))
        .map(str::to_string)
}

/// A directed message split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directed {
    pub from: Option<String>,
    pub to: String,
    pub command: Option<DirectedCommand>,
    /// Everything after the recipient, leading whitespace removed.
    pub body: String,
}

/// Parse `FROM: TO<command> rest` (the `FROM:` part is optional).
///
/// Returns `None` when no recipient callsign follows the sender.
pub fn parse_directed(text: &str) -> Option<Directed> {
    let text = text.trim();
    let (from, rest) = match text.split_once(':') {
        Some((f, r)) if is_callsign(f.trim()) => (Some(f.trim().to_string()), r.trim_start()),
        _ => (None, text),
    };

    let end = rest
        .find(|c: char| c == ' ' || c == '?' || c == '>')
        .unwrap_or(rest.len());
    let (to, after) = rest.split_at(end);
    if !(is_callsign(to) || is_group(to)) {
        return None;
    }

    Some(Directed {
        from,
        to: to.to_string(),
        command: command_prefix(after),
        body: after.trim_start().to_string(),
    })
}
