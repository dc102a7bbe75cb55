use crate::repositories::results::ResultUpsert;
use crate::services::scoring_store::{ScoringStore, StoreError};

/// Buffers result upserts and writes them in bounded bulk requests.
///
/// `add` writes the buffer as soon as it reaches capacity; `flush` writes
/// whatever is left and must be called once the producer is done. A failed
/// write drops the entries it carried; earlier batches stay committed.
pub(crate) struct ResultBatcher<'a, S: ScoringStore + ?Sized> {
    store: &'a S,
    capacity: usize,
    buffer: Vec<ResultUpsert>,
    batches_flushed: u64,
    rows_written: u64,
}

impl<'a, S: ScoringStore + ?Sized> ResultBatcher<'a, S> {
    pub(crate) fn new(store: &'a S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            store,
            capacity,
            buffer: Vec::with_capacity(capacity),
            batches_flushed: 0,
            rows_written: 0,
        }
    }

    pub(crate) async fn add(&mut self, entry: ResultUpsert) -> Result<(), StoreError> {
        self.buffer.push(entry);
        if self.buffer.len() >= self.capacity {
            self.flush().await?;
        }
        Ok(())
    }

    pub(crate) async fn flush(&mut self) -> Result<(), StoreError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        let written = self.store.upsert_results(&batch).await?;

        self.batches_flushed += 1;
        self.rows_written += written;
        metrics::counter!("scoring_result_batches_total").increment(1);
        metrics::counter!("scoring_results_upserted_total").increment(written);
        tracing::debug!(batch_size = batch.len(), rows_written = written, "Flushed result batch");

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn batches_flushed(&self) -> u64 {
        self.batches_flushed
    }

    pub(crate) fn rows_written(&self) -> u64 {
        self.rows_written
    }
}
