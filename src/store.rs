use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::Result;
use crate::message::{Direction, Message, MessageKind, UNKNOWN_SENDER};

/// Messages kept by a default [`MemoryStore`].
pub const DEFAULT_CAPACITY: usize = 1000;

/// Messages returned when a filter sets no limit.
pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    #[serde(flatten)]
    pub message: Message,
    pub direction: Direction,
    pub kind: MessageKind,
    pub read: bool,
}

impl StoredMessage {
    /// The other station in the exchange, if there is one.
    pub fn remote(&self) -> Option<&str> {
        let call = match self.direction {
            Direction::Incoming => self.message.from.as_str(),
            Direction::Outgoing => self.message.to.as_str(),
        };
        (!call.is_empty() && call != UNKNOWN_SENDER).then_some(call)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    /// Most recent messages to return.
    pub limit: Option<usize>,
    /// Only messages with a timestamp at or after this (Unix seconds).
    pub since: Option<u64>,
    /// Only messages exchanged with this station.
    pub callsign: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub callsign: String,
    pub last_message: Message,
    pub message_count: usize,
    pub unread: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub incoming: usize,
    pub outgoing: usize,
    pub unread: usize,
    pub stations: usize,
}

/// Message history. [`MemoryStore`] keeps a bounded history in memory.
pub trait MessageStore: Send + Sync {
    fn store_message(&self, message: &Message, direction: Direction, kind: MessageKind) -> Result<()>;

    /// Matching messages, oldest first.
    fn get_messages(&self, filter: &MessageFilter) -> Result<Vec<StoredMessage>>;

    /// One entry per remote station, most recently active first.
    fn get_conversations(&self, limit: usize) -> Result<Vec<Conversation>>;

    /// Mark everything received from `callsign` as read. Returns how many
    /// messages changed.
    fn mark_read(&self, callsign: &str) -> Result<usize>;

    fn get_stats(&self) -> Result<StoreStats>;
}

/// Bounded in-memory history. The oldest message goes when full.
#[derive(Debug)]
pub struct MemoryStore {
    messages: Mutex<VecDeque<StoredMessage>>,
    capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<StoredMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageStore for MemoryStore {
    fn store_message(&self, message: &Message, direction: Direction, kind: MessageKind) -> Result<()> {
        let mut messages = self.lock();
        if messages.len() == self.capacity {
            messages.pop_front();
        }
        messages.push_back(StoredMessage {
            message: message.clone(),
            direction,
            kind,
            read: direction == Direction::Outgoing,
        });
        Ok(())
    }

    fn get_messages(&self, filter: &MessageFilter) -> Result<Vec<StoredMessage>> {
        let messages = self.lock();
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT);
        let mut out: Vec<StoredMessage> = messages
            .iter()
            .rev()
            .filter(|m| filter.since.is_none_or(|since| m.message.timestamp >= since))
            .filter(|m| filter.callsign.as_deref().is_none_or(|call| m.remote() == Some(call)))
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        Ok(out)
    }

    fn get_conversations(&self, limit: usize) -> Result<Vec<Conversation>> {
        let messages = self.lock();
        let mut by_call: HashMap<&str, Conversation> = HashMap::new();
        for m in messages.iter() {
            let Some(call) = m.remote() else {
                continue;
            };
            let entry = by_call.entry(call).or_insert_with(|| Conversation {
                callsign: call.to_string(),
                last_message: m.message.clone(),
                message_count: 0,
                unread: 0,
            });
            entry.last_message = m.message.clone();
            entry.message_count += 1;
            if !m.read {
                entry.unread += 1;
            }
        }

        let mut conversations: Vec<Conversation> = by_call.into_values().collect();
        conversations.sort_by(|a, b| {
            (b.last_message.timestamp, b.last_message.id).cmp(&(a.last_message.timestamp, a.last_message.id))
        });
        conversations.truncate(limit);
        Ok(conversations)
    }

    fn mark_read(&self, callsign: &str) -> Result<usize> {
        let mut messages = self.lock();
        let mut changed = 0;
        for m in messages.iter_mut() {
            if m.direction == Direction::Incoming && !m.read && m.message.from == callsign {
                m.read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn get_stats(&self) -> Result<StoreStats> {
        let messages = self.lock();
        let mut stats = StoreStats::default();
        let mut stations = std::collections::HashSet::new();
        for m in messages.iter() {
            stats.total += 1;
            match m.direction {
                Direction::Incoming => stats.incoming += 1,
                Direction::Outgoing => stats.outgoing += 1,
            }
            if !m.read {
                stats.unread += 1;
            }
            if let Some(call) = m.remote() {
                stations.insert(call);
            }
        }
        stats.stations = stations.len();
        Ok(stats)
    }
}
