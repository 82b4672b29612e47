//! BatchWriter: accumulate decoded records and hand them to the datastore
//! in fixed-size batches.
//!
//! Only one batch is ever held in memory. After each flush the buffer is
//! released and the worker yields, optionally sleeping for `yield_delay`.

use std::time::Duration;

use tracing::trace;

use crate::config::ImportOptions;
use crate::error::Result;
use crate::types::{EntityFamily, Record};

use super::traits::Datastore;

pub struct BatchWriter<'a, D: Datastore> {
    store: &'a D,
    family: EntityFamily,
    batch_size: usize,
    yield_delay: Duration,
    pending: Vec<Record>,
    written: usize,
    flushes: usize,
}

impl<'a, D: Datastore> BatchWriter<'a, D> {
    pub fn new(store: &'a D, family: EntityFamily, opts: &ImportOptions) -> Self {
        let batch_size = opts.effective_batch_size();
        Self {
            store,
            family,
            batch_size,
            yield_delay: opts.yield_delay,
            pending: Vec::with_capacity(batch_size.min(1024)),
            written: 0,
            flushes: 0,
        }
    }

    /// Queue a record, flushing when the batch is full.
    pub fn push(&mut self, record: Record) -> Result<()> {
        self.pending.push(record);
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write out whatever is queued.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.store.put_batch(self.family, &self.pending)?;
        self.written += self.pending.len();
        self.flushes += 1;
        trace!(
            family = %self.family,
            batch = self.pending.len(),
            written = self.written,
            "batch flushed"
        );
        // Drop the buffers rather than keeping their capacity around.
        self.pending = Vec::with_capacity(self.batch_size.min(1024));
        std::thread::yield_now();
        if !self.yield_delay.is_zero() {
            std::thread::sleep(self.yield_delay);
        }
        Ok(())
    }

    /// Flush the remainder and return `(records written, batches flushed)`.
    pub fn finish(mut self) -> Result<(usize, usize)> {
        self.flush()?;
        Ok((self.written, self.flushes))
    }
}
