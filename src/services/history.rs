//! Fixed-capacity buffer of received chat messages.
//!
//! When full, the entry with the smallest receive time is overwritten in place.
//! Slot order means nothing; [`ChatHistory::ordered`] sorts by time.

pub const CHAT_HISTORY_CAPACITY: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviousMessage {
    pub address: u16,
    /// Device uptime in milliseconds when the message arrived.
    pub time_ms: u32,
    pub text: String,
}

#[derive(Debug)]
pub struct ChatHistory {
    capacity: usize,
    slots: Vec<PreviousMessage>,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(CHAT_HISTORY_CAPACITY)
    }
}

impl ChatHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Store a message, returning the evicted entry when the buffer was full.
    pub fn insert(&mut self, message: PreviousMessage) -> Option<PreviousMessage> {
        if self.slots.len() < self.capacity {
            self.slots.push(message);
            return None;
        }
        let oldest = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| m.time_ms)
            .map(|(i, _)| i)?;
        Some(std::mem::replace(&mut self.slots[oldest], message))
    }

    /// Entries sorted by receive time, oldest first.
    pub fn ordered(&self) -> Vec<PreviousMessage> {
        let mut out = self.slots.clone();
        out.sort_by_key(|m| m.time_ms);
        out
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
