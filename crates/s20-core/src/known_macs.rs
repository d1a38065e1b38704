//! Bounded record of MACs already announced through `on_found_device`.
//!
//! Append-only: once full, new MACs are no longer announced. Nothing is
//! evicted.

use crate::protocol::MacAddr;

#[derive(Debug, Clone)]
pub struct KnownMacCache {
    macs: Vec<MacAddr>,
    capacity: usize,
}

impl KnownMacCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            macs: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `mac`; `true` if it was new and fit.
    pub fn insert(&mut self, mac: MacAddr) -> bool {
        if self.is_full() || self.contains(&mac) {
            return false;
        }
        self.macs.push(mac);
        true
    }

    pub fn contains(&self, mac: &MacAddr) -> bool {
        self.macs.contains(mac)
    }

    pub fn is_full(&self) -> bool {
        self.macs.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.macs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macs.is_empty()
    }
}
