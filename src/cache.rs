//! Named, fixed-length reduction slots holding one reusable request each.

use crate::request::ReduceRequest;

/// A cached tensor slot: one persistent [`ReduceRequest`] reused for every
/// reduction of the tensor named `name`.
///
/// The entry enforces single concurrent use: `acquire` hands out the request
/// and panics if the previous reduction has not been released yet. The
/// request's buffers are allocated once here and reused for the life of the
/// entry, which is the whole point — a tensor reduced every training step
/// pays its setup cost once.
pub struct TensorCacheEntry {
    name: String,
    len: usize,
    request: ReduceRequest,
    in_use: bool,
}

impl TensorCacheEntry {
    /// Duplicate names create independent entries; dedup is the caller's
    /// responsibility. `len` is validated at the adapter boundary.
    pub(crate) fn new(name: String, len: usize) -> Self {
        let request = ReduceRequest::new_cached(&name, len);
        Self {
            name,
            len,
            request,
            in_use: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether a reduction issued against this entry is still unreleased.
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// Mark the entry busy and hand out its persistent request.
    ///
    /// # Panics
    /// Panics if the previous reduction has not been released. Two concurrent
    /// reductions on one named tensor is a caller bug, not contention.
    pub(crate) fn acquire(&mut self) -> &mut ReduceRequest {
        assert!(
            !self.in_use,
            "cached tensor {:?} acquired while a reduction is outstanding",
            self.name
        );
        self.in_use = true;
        &mut self.request
    }

    /// Access the request of an outstanding reduction.
    ///
    /// # Panics
    /// Panics if the entry is idle: the handle was released (or never issued).
    pub(crate) fn request_mut(&mut self) -> &mut ReduceRequest {
        assert!(
            self.in_use,
            "cached reduce request for tensor {:?} used after release",
            self.name
        );
        &mut self.request
    }

    /// Return the slot to idle. The request's engine handle must already be
    /// cleared (`ReduceRequest::reset`).
    ///
    /// # Panics
    /// Panics on release of an idle entry (double release).
    pub(crate) fn release(&mut self) {
        assert!(
            self.in_use,
            "cached tensor {:?} released twice",
            self.name
        );
        self.in_use = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_support::DeferredComm;
    use crate::types::DataType;

    #[test]
    fn test_acquire_release_cycle() {
        let mut entry = TensorCacheEntry::new("grad1".into(), 4);
        assert!(!entry.in_use());

        let req = entry.acquire();
        assert_eq!(req.len(), 4);
        assert_eq!(req.name(), "grad1");
        assert!(entry.in_use());

        entry.release();
        assert!(!entry.in_use());
    }

    #[test]
    fn test_reacquire_returns_same_buffers() {
        let mut entry = TensorCacheEntry::new("grad2".into(), 8);
        let first = entry.acquire().read_buf_ptr();
        entry.release();
        let second = entry.acquire().read_buf_ptr();
        assert_eq!(first, second, "cached request must reuse, not reallocate");
    }

    #[test]
    fn test_sequential_reductions_reuse_request() {
        let comm = DeferredComm::new();
        let mut entry = TensorCacheEntry::new("w".into(), 2);

        for round in 0..2 {
            comm.done.store(false, std::sync::atomic::Ordering::SeqCst);
            let base = round as f32 * 10.0;
            let req = entry.acquire();
            req.submit(&comm, &[base + 1.0, base + 2.0], 0, DataType::F32)
                .unwrap();
            req.wait().unwrap();
            let mut out = vec![0.0f32; 2];
            req.finalize(&mut out, 0);
            assert_eq!(out, vec![base + 1.0, base + 2.0]);
            req.reset();
            entry.release();
        }
    }

    #[test]
    #[should_panic(expected = "acquired while a reduction is outstanding")]
    fn test_double_acquire_panics() {
        let mut entry = TensorCacheEntry::new("grad3".into(), 4);
        entry.acquire();
        entry.acquire();
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn test_double_release_panics() {
        let mut entry = TensorCacheEntry::new("grad4".into(), 4);
        entry.acquire();
        entry.release();
        entry.release();
    }

    #[test]
    #[should_panic(expected = "used after release")]
    fn test_request_access_after_release_panics() {
        let mut entry = TensorCacheEntry::new("grad5".into(), 4);
        entry.acquire();
        entry.release();
        entry.request_mut();
    }
}
