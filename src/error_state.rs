//! Per-thread last-error channel.
//!
//! Every public operation returns a typed [`crate::VfsError`], and also
//! leaves its message here so callers that only check success can ask
//! "what went wrong" afterwards, from the same thread.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct ErrorRecord {
    message: String,
    available: bool,
}

/// Table of last-error records, keyed by thread
#[derive(Debug, Default)]
pub struct ErrorState {
    records: Mutex<HashMap<ThreadId, ErrorRecord>>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` as the calling thread's last error
    pub fn set_error(&self, message: impl Into<String>) {
        let mut records = self.records.lock();
        let record = records.entry(thread::current().id()).or_default();
        record.message = message.into();
        record.available = true;
    }

    /// Take the calling thread's last error, if one is pending
    pub fn last_error(&self) -> Option<String> {
        let mut records = self.records.lock();
        let record = records.get_mut(&thread::current().id())?;
        if !record.available {
            return None;
        }
        record.available = false;
        Some(std::mem::take(&mut record.message))
    }

    /// Drop every thread's record
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}
