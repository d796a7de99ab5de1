//! ==============================================================================
//! buffer.rs - shared batch buffer between sampler and uploader
//! ==============================================================================
//!
//! purpose:
//!     the only state shared by the two tasks. the sampler appends serialized
//!     records, the uploader drains the whole batch at once.
//!
//! locking:
//!     a std mutex guards the batch. it is held for one append or one
//!     drain+reset and never across a sensor poll or a network call, so a
//!     blocking lock is fine even from async code.
//!
//! ==============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// separator between records inside a batch
pub const SEPARATOR: char = ',';

/// accumulated, not-yet-uploaded records
///
/// either empty or `r1,r2,...,rn` with no leading or trailing separator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    content: String,
    records: usize,
}

impl Batch {
    pub fn push(&mut self, record: &str) {
        if !self.content.is_empty() {
            self.content.push(SEPARATOR);
        }
        self.content.push_str(record);
        self.records += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// number of records in the batch
    pub fn len(&self) -> usize {
        self.records
    }

    /// size of the joined records in bytes
    pub fn byte_len(&self) -> usize {
        self.content.len()
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// wraps the records as a json array body
    pub fn to_payload(&self) -> String {
        format!("[{}]", self.content)
    }
}

/// clone-able handle to the batch and its lock
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    batch: Arc<Mutex<Batch>>,
    max_bytes: Option<usize>,
    dropped: Arc<AtomicU64>,
}

impl SharedBuffer {
    /// unbounded buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// buffer that discards its pending batch rather than grow past `max_bytes`
    pub fn with_max_bytes(max_bytes: Option<usize>) -> Self {
        Self { max_bytes, ..Self::default() }
    }

    // every mutation leaves the batch well formed, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, Batch> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// appends one record, waiting as long as it takes for the lock
    pub fn append(&self, record: &str) {
        let mut batch = self.lock();
        if let Some(max) = self.max_bytes {
            let grown = batch.byte_len() + record.len() + 1;
            if !batch.is_empty() && grown > max {
                tracing::warn!(
                    records = batch.len(),
                    bytes = batch.byte_len(),
                    max_bytes = max,
                    "batch full, dropping pending records"
                );
                *batch = Batch::default();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        batch.push(record);
    }

    /// takes the current batch and leaves an empty one behind
    pub fn drain(&self) -> Batch {
        std::mem::take(&mut *self.lock())
    }

    /// records currently waiting for upload
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// batches discarded because of the byte cap
    pub fn dropped_batches(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
