//! One group-communication context and the tensor caches created against it.

use tracing::{debug, info};

use crate::cache::TensorCacheEntry;
use crate::engine::EngineComm;
use crate::error::Result;
use crate::request::ReduceRequest;
use crate::types::{DataType, Priority, Rank};

/// Wraps one engine communicator and owns the cached tensor entries created
/// on it. Entries are appended in creation order and never reordered or
/// removed, so entry indices stay stable for the life of the communicator.
pub struct Communicator {
    engine: Box<dyn EngineComm>,
    rank: Rank,
    size: u32,
    color: Option<i32>,
    entries: Vec<TensorCacheEntry>,
}

impl Communicator {
    pub(crate) fn new(engine: Box<dyn EngineComm>, color: Option<i32>) -> Self {
        let rank = engine.rank();
        let size = engine.size();
        info!(rank, size, ?color, "communicator created");
        Self {
            engine,
            rank,
            size,
            color,
            entries: Vec::new(),
        }
    }

    /// This process's rank within the group.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Number of ranks in the group.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Partition color, `None` for the world communicator.
    pub fn color(&self) -> Option<i32> {
        self.color
    }

    /// Number of cached tensor entries.
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Append a cached tensor entry and return its stable index.
    pub(crate) fn create_entry(&mut self, name: String, len: usize) -> usize {
        debug!(name = %name, len, "tensor cache entry created");
        self.entries.push(TensorCacheEntry::new(name, len));
        self.entries.len() - 1
    }

    /// Look up a cached tensor entry.
    ///
    /// # Panics
    /// Panics on an index this communicator never issued.
    pub fn entry(&self, idx: usize) -> &TensorCacheEntry {
        self.entries
            .get(idx)
            .unwrap_or_else(|| panic!("unknown tensor cache entry {idx}"))
    }

    pub(crate) fn entry_mut(&mut self, idx: usize) -> &mut TensorCacheEntry {
        self.entries
            .get_mut(idx)
            .unwrap_or_else(|| panic!("unknown tensor cache entry {idx}"))
    }

    /// Blocking, uncached, full-precision sum reduction of `src` into `dst`.
    ///
    /// For one-off reductions outside the steady-state training loop.
    pub fn allreduce_sync(&self, src: &[f32], dst: &mut [f32]) -> Result<()> {
        let mut req = self.submit_fresh(ReduceRequest::new_sync(src.len()), src, 0)?;
        req.wait()?;
        req.finalize(dst, 0);
        Ok(())
    }

    /// Uncached sum reduction returning a fresh in-flight request the caller
    /// must wait/finalize/release. Independent request per call, no reuse.
    pub fn allreduce_async(&self, name: String, src: &[f32]) -> Result<ReduceRequest> {
        self.submit_fresh(ReduceRequest::new_uncached(name, src.len()), src, 0)
    }

    /// Submit a reduction on a cached entry's persistent request.
    ///
    /// The entry stays busy until the returned request handle is released;
    /// a failed engine submission returns the entry to idle so the caller can
    /// retry.
    pub(crate) fn allreduce_cached(
        &mut self,
        entry_idx: usize,
        src: &[f32],
        priority: Priority,
        precision: DataType,
    ) -> Result<()> {
        let engine = self.engine.as_ref();
        let entry = self
            .entries
            .get_mut(entry_idx)
            .unwrap_or_else(|| panic!("unknown tensor cache entry {entry_idx}"));
        let req = entry.acquire();
        if let Err(e) = req.submit(engine, src, priority, precision) {
            req.reset();
            entry.release();
            return Err(e);
        }
        Ok(())
    }

    /// Shared submission path for the uncached entry points: the three public
    /// reduction flavors differ only in the request's attributes.
    fn submit_fresh(
        &self,
        mut req: ReduceRequest,
        src: &[f32],
        priority: Priority,
    ) -> Result<ReduceRequest> {
        req.submit(self.engine.as_ref(), src, priority, DataType::F32)?;
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CollectiveEngine, LoopbackEngine};

    fn world() -> Communicator {
        let engine = LoopbackEngine::new();
        Communicator::new(engine.create_communicator(None).unwrap(), None)
    }

    #[test]
    fn test_sync_reduction_is_identity_for_one_rank() {
        let comm = world();
        let src = vec![1.5f32, -2.5, 0.0, 42.0];
        let mut dst = vec![0.0f32; 4];
        comm.allreduce_sync(&src, &mut dst).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_async_reduction_lifecycle() {
        let comm = world();
        let mut req = comm
            .allreduce_async("loss".into(), &[7.0, 8.0])
            .unwrap();
        req.wait().unwrap();
        let mut out = vec![0.0f32; 2];
        req.finalize(&mut out, 0);
        assert_eq!(out, vec![7.0, 8.0]);
    }

    #[test]
    fn test_cached_reduction_and_reuse() {
        let mut comm = world();
        let idx = comm.create_entry("grad1".into(), 3);
        assert_eq!(idx, 0);

        comm.allreduce_cached(idx, &[1.0, 2.0, 3.0], 0, DataType::F32)
            .unwrap();
        assert!(comm.entry(idx).in_use());

        {
            let req = comm.entry_mut(idx).request_mut();
            req.wait().unwrap();
            let mut out = vec![0.0f32; 3];
            req.finalize(&mut out, 0);
            assert_eq!(out, vec![1.0, 2.0, 3.0]);
            req.reset();
        }
        comm.entry_mut(idx).release();

        // same entry, second round
        comm.allreduce_cached(idx, &[4.0, 5.0, 6.0], 1, DataType::F32)
            .unwrap();
        let req = comm.entry_mut(idx).request_mut();
        req.wait().unwrap();
        let mut out = vec![0.0f32; 3];
        req.finalize(&mut out, 0);
        assert_eq!(out, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_entry_indices_are_insertion_ordered() {
        let mut comm = world();
        assert_eq!(comm.create_entry("a".into(), 1), 0);
        assert_eq!(comm.create_entry("b".into(), 1), 1);
        assert_eq!(comm.create_entry("a".into(), 2), 2); // duplicate name, no dedup
        assert_eq!(comm.num_entries(), 3);
        assert_eq!(comm.entry(2).name(), "a");
        assert_eq!(comm.entry(2).len(), 2);
    }

    #[test]
    #[should_panic(expected = "acquired while a reduction is outstanding")]
    fn test_cached_double_submit_panics() {
        let mut comm = world();
        let idx = comm.create_entry("g".into(), 1);
        comm.allreduce_cached(idx, &[1.0], 0, DataType::F32).unwrap();
        let _ = comm.allreduce_cached(idx, &[1.0], 0, DataType::F32);
    }

    #[test]
    #[should_panic(expected = "unknown tensor cache entry")]
    fn test_unknown_entry_panics() {
        let comm = world();
        comm.entry(0);
    }
}
