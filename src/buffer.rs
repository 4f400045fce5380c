use crate::error::{AgentError, AgentResult};
use crate::store::{load_json, save_json, KeyValueStore};
use crate::types::PositionRecord;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const BUFFER_KEY: &str = "trace_buffer";

/// Buffer shared between the write lane and the upload lane
pub type SharedBuffer = Arc<Mutex<LocalBuffer>>;

/// Persisted FIFO of records awaiting upload.
///
/// Every mutation rewrites the stored copy. A failed write is logged and the
/// in-memory queue stays authoritative until the next successful write.
pub struct LocalBuffer {
    records: VecDeque<PositionRecord>,
    store: Arc<dyn KeyValueStore>,
    /// Bumped by every `clear`, so a chunk peeked before a clear is never
    /// pruned against records appended after it
    generation: u64,
}

impl LocalBuffer {
    /// Restore the buffer from `store`, empty if nothing usable is stored
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let records: VecDeque<PositionRecord> =
            load_json(store.as_ref(), BUFFER_KEY).unwrap_or_default();
        if !records.is_empty() {
            log::info!("Restored {} buffered records", records.len());
        }
        LocalBuffer {
            records,
            store,
            generation: 0,
        }
    }

    pub fn shared(self) -> SharedBuffer {
        Arc::new(Mutex::new(self))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Add to the tail and persist. Returns the new length so the caller
    /// can compare it against the flush threshold.
    pub fn append(&mut self, record: PositionRecord) -> usize {
        self.records.push_back(record);
        self.persist();
        self.records.len()
    }

    /// Copy of the first `n` records (fewer if the buffer is shorter)
    pub fn peek_chunk(&self, n: usize) -> Vec<PositionRecord> {
        self.records.iter().take(n).cloned().collect()
    }

    /// Drop exactly `n` records from the head. Asking for more than the
    /// buffer holds leaves it untouched.
    pub fn remove_first(&mut self, n: usize) -> AgentResult<()> {
        if n > self.records.len() {
            log::error!(
                "Refusing to remove {} records from a buffer of {}",
                n,
                self.records.len()
            );
            return Err(AgentError::InvalidParameters(format!(
                "remove_first({}) exceeds buffer length {}",
                n,
                self.records.len()
            )));
        }
        self.records.drain(..n);
        self.persist();
        Ok(())
    }

    /// Drop a chunk the server has confirmed, but only if it is still the
    /// head of the buffer taken in `generation`. Returns `Ok(false)` when the
    /// buffer was cleared or its head changed, leaving every record in place.
    pub fn remove_confirmed(
        &mut self,
        generation: u64,
        chunk: &[PositionRecord],
    ) -> AgentResult<bool> {
        if generation != self.generation {
            log::info!("Buffer was cleared during upload, keeping newer records");
            return Ok(false);
        }
        let head_matches =
            chunk.len() <= self.records.len() && self.iter().zip(chunk).all(|(a, b)| a == b);
        if !head_matches {
            log::error!("Buffer head no longer matches the uploaded chunk");
            return Ok(false);
        }
        self.remove_first(chunk.len())?;
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.generation += 1;
        if let Err(e) = self.store.remove(BUFFER_KEY) {
            log::error!("Failed to drop stored trace buffer: {}", e);
            self.persist();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionRecord> {
        self.records.iter()
    }

    fn persist(&self) {
        if let Err(e) = save_json(self.store.as_ref(), BUFFER_KEY, &self.records) {
            log::error!("Failed to persist trace buffer: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Fix;

    fn record(t: f64) -> PositionRecord {
        PositionRecord::from(&Fix::new(t, 48.0 + t * 0.001, 11.0, 5.0))
    }

    fn filled(store: Arc<dyn KeyValueStore>, n: usize) -> LocalBuffer {
        let mut buffer = LocalBuffer::load(store);
        for i in 0..n {
            buffer.append(record(i as f64));
        }
        buffer
    }

    #[test]
    fn test_remove_first_drops_oldest() {
        let mut buffer = filled(Arc::new(MemoryStore::new()), 5);

        buffer.remove_first(2).unwrap();
        let remaining: Vec<f64> = buffer.iter().map(|r| r.timestamp).collect();
        assert_eq!(remaining, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_remove_more_than_len_is_rejected() {
        let mut buffer = filled(Arc::new(MemoryStore::new()), 3);
        assert!(buffer.remove_first(4).is_err());
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let buffer = filled(Arc::new(MemoryStore::new()), 4);
        let chunk = buffer.peek_chunk(3);
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk[0].timestamp, 0.0);
        assert_eq!(buffer.len(), 4);

        assert_eq!(buffer.peek_chunk(10).len(), 4);
    }

    #[test]
    fn test_survives_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        {
            let mut buffer = filled(store.clone(), 3);
            buffer.remove_first(1).unwrap();
        }

        let buffer = LocalBuffer::load(store.clone());
        let restored: Vec<f64> = buffer.iter().map(|r| r.timestamp).collect();
        assert_eq!(restored, vec![1.0, 2.0]);

        let mut buffer = buffer;
        buffer.clear();
        assert!(LocalBuffer::load(store).is_empty());
    }

    #[test]
    fn test_remove_confirmed_checks_head_and_generation() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut buffer = filled(store.clone(), 4);

        let generation = buffer.generation();
        let chunk = buffer.peek_chunk(2);
        assert!(buffer.remove_confirmed(generation, &chunk).unwrap());
        assert_eq!(buffer.peek_chunk(1)[0].timestamp, 2.0);

        // same chunk again no longer matches the head
        assert!(!buffer.remove_confirmed(generation, &chunk).unwrap());
        assert_eq!(buffer.len(), 2);

        let chunk = buffer.peek_chunk(2);
        buffer.clear();
        assert_eq!(store.get(BUFFER_KEY).unwrap(), None);
        buffer.append(record(2.0));
        buffer.append(record(3.0));
        // identical records, but appended after the clear
        assert!(!buffer.remove_confirmed(generation, &chunk).unwrap());
        assert_eq!(buffer.len(), 2);
        assert_ne!(buffer.generation(), generation);
    }

    #[test]
    fn test_corrupt_store_loads_empty() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(BUFFER_KEY, b"\"nope\"").unwrap();
        assert!(LocalBuffer::load(store).is_empty());
    }
}
