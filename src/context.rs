//! The boundary surface a host runtime drives: init/shutdown, group
//! management, and the cached/uncached/async reduction entry points.
//!
//! All cross-boundary references are plain index handles into tables owned by
//! the context; released slots are cleared, never compacted or reused, so a
//! stale handle always trips a contract check instead of aliasing live state.

use tracing::info;

use crate::cache::TensorCacheEntry;
use crate::comm::Communicator;
use crate::config::GradlinkConfig;
use crate::engine::{CollectiveEngine, ResizeAction};
use crate::error::{GradlinkError, Result};
use crate::registry::{CommHandle, CommRegistry};
use crate::request::ReduceRequest;
use crate::types::{DataType, Priority, Rank};

/// Opaque handle to a cached tensor entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle {
    comm: CommHandle,
    entry: usize,
}

/// Opaque handle to an in-flight or completed reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(RequestRef);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RequestRef {
    /// The persistent request of a cached tensor entry.
    Cached { comm: CommHandle, entry: usize },
    /// An independent request owned by the context's slot table.
    Owned { slot: usize },
}

/// Owns the engine, the communicator registry, and every non-cached request.
///
/// Single-threaded by design: the engine runs reductions asynchronously on
/// its own execution, and the host is expected to drive any one communicator
/// or cached entry from one thread. Distinct entries and communicators can be
/// driven concurrently from the engine's point of view; nothing here blocks
/// except [`GradlinkContext::wait`].
pub struct GradlinkContext {
    engine: Box<dyn CollectiveEngine>,
    registry: CommRegistry,
    world: CommHandle,
    rank: Rank,
    size: u32,
    /// Non-cached requests; slots cleared on release, never reused.
    requests: Vec<Option<ReduceRequest>>,
}

impl GradlinkContext {
    /// Establish process membership: publish the config to the environment,
    /// create the world communicator, and install the resize policy derived
    /// from the engine-reported world size.
    pub fn init(engine: Box<dyn CollectiveEngine>, config: GradlinkConfig) -> Result<Self> {
        info!(
            transport = %config.transport,
            pm_mode = %config.pm_mode,
            world_size = config.world_size,
            coordinator = config.coordinator_addr.as_deref().unwrap_or(""),
            "initializing gradlink"
        );
        config.apply_env();

        let world_comm = Communicator::new(engine.create_communicator(None)?, None);
        let rank = world_comm.rank();
        let size = world_comm.size();
        engine.set_resize_policy(Box::new(move |current| resize_decision(current, size)));

        let mut registry = CommRegistry::new();
        let world = registry.register(world_comm);
        info!(rank, size, "gradlink world established");

        Ok(Self {
            engine,
            registry,
            world,
            rank,
            size,
            requests: Vec::new(),
        })
    }

    /// Handle of the world communicator.
    pub fn world(&self) -> CommHandle {
        self.world
    }

    /// This process's rank in the world communicator.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// World size at init.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Release every registered communicator and drop the engine.
    pub fn shutdown(mut self) {
        info!("gradlink shutting down");
        self.registry.teardown();
    }

    /// Create a sub-group communicator: ranks supplying the same `color`
    /// form one group.
    pub fn create_group(&mut self, color: i32) -> Result<CommHandle> {
        let comm = Communicator::new(self.engine.create_communicator(Some(color))?, Some(color));
        info!(color, sub_size = comm.size(), "sub-communicator created");
        Ok(self.registry.register(comm))
    }

    /// Release a communicator. Handles to other communicators stay valid.
    ///
    /// # Panics
    /// Panics on an unknown or already-released handle.
    pub fn release_group(&mut self, handle: CommHandle) {
        self.registry.release(handle);
    }

    /// Borrow a registered communicator.
    pub fn group(&self, handle: CommHandle) -> &Communicator {
        self.registry.get(handle)
    }

    /// Create a named, fixed-length reduction slot on `comm`.
    ///
    /// Duplicate names create independent entries.
    pub fn create_cached_tensor(
        &mut self,
        comm: CommHandle,
        name: &str,
        len: usize,
    ) -> Result<EntryHandle> {
        if len == 0 {
            return Err(GradlinkError::InvalidLength {
                name: name.to_string(),
                len,
            });
        }
        let entry = self.registry.get_mut(comm).create_entry(name.to_string(), len);
        Ok(EntryHandle { comm, entry })
    }

    /// Borrow a cached tensor entry for inspection.
    pub fn cached_tensor(&self, handle: EntryHandle) -> &TensorCacheEntry {
        self.registry.get(handle.comm).entry(handle.entry)
    }

    /// Blocking, uncached, full-precision sum reduction.
    pub fn reduce_sync(
        &mut self,
        comm: CommHandle,
        src: &[f32],
        src_off: usize,
        dst: &mut [f32],
        dst_off: usize,
        len: usize,
    ) -> Result<()> {
        check_span(src.len(), src_off, len)?;
        check_span(dst.len(), dst_off, len)?;
        self.registry.get(comm).allreduce_sync(
            &src[src_off..src_off + len],
            &mut dst[dst_off..dst_off + len],
        )
    }

    /// Uncached sum reduction; returns immediately with a fresh request the
    /// caller must wait/finalize/release.
    pub fn reduce_async(
        &mut self,
        comm: CommHandle,
        name: &str,
        src: &[f32],
        src_off: usize,
        len: usize,
    ) -> Result<RequestHandle> {
        check_span(src.len(), src_off, len)?;
        let req = self
            .registry
            .get(comm)
            .allreduce_async(name.to_string(), &src[src_off..src_off + len])?;
        self.requests.push(Some(req));
        Ok(RequestHandle(RequestRef::Owned {
            slot: self.requests.len() - 1,
        }))
    }

    /// Sum reduction on a cached entry's persistent request, optionally in
    /// half precision to shrink wire volume.
    ///
    /// The entry stays busy until the returned handle is released; issuing a
    /// second reduction on it before that panics.
    pub fn reduce_cached(
        &mut self,
        comm: CommHandle,
        entry: EntryHandle,
        src: &[f32],
        src_off: usize,
        priority: Priority,
        half_precision: bool,
    ) -> Result<RequestHandle> {
        assert_eq!(
            entry.comm, comm,
            "cached tensor entry does not belong to this communicator"
        );
        let len = self.registry.get(comm).entry(entry.entry).len();
        check_span(src.len(), src_off, len)?;
        let precision = if half_precision {
            DataType::Half16
        } else {
            DataType::F32
        };
        self.registry.get_mut(comm).allreduce_cached(
            entry.entry,
            &src[src_off..src_off + len],
            priority,
            precision,
        )?;
        Ok(RequestHandle(RequestRef::Cached {
            comm,
            entry: entry.entry,
        }))
    }

    /// Block until the reduction completes.
    pub fn wait(&mut self, req: RequestHandle) -> Result<()> {
        self.request_mut(req).wait()
    }

    /// Non-blocking completion check; `true` is equivalent to [`Self::wait`]
    /// having returned.
    pub fn poll(&mut self, req: RequestHandle) -> Result<bool> {
        self.request_mut(req).poll()
    }

    /// Copy the completed result into `dst` at `dst_off`. Repeatable.
    pub fn finalize(&mut self, req: RequestHandle, dst: &mut [f32], dst_off: usize) -> Result<()> {
        let request = self.request_mut(req);
        check_span(dst.len(), dst_off, request.len())?;
        request.finalize(dst, dst_off);
        Ok(())
    }

    /// Release a reduction request. Cached requests return their entry to
    /// idle for reuse; non-cached requests are destroyed.
    ///
    /// # Panics
    /// Panics on double release or on a handle already released.
    pub fn release(&mut self, req: RequestHandle) {
        match req.0 {
            RequestRef::Cached { comm, entry } => {
                let entry = self.registry.get_mut(comm).entry_mut(entry);
                entry.request_mut().reset();
                entry.release();
            }
            RequestRef::Owned { slot } => {
                let taken = self.requests.get_mut(slot).and_then(|s| s.take());
                if taken.is_none() {
                    panic!("reduce request {slot} released twice or never issued");
                }
            }
        }
    }

    /// Finalize and release in one call.
    pub fn fetch(&mut self, req: RequestHandle, dst: &mut [f32], dst_off: usize) -> Result<()> {
        self.finalize(req, dst, dst_off)?;
        self.release(req);
        Ok(())
    }

    fn request_mut(&mut self, req: RequestHandle) -> &mut ReduceRequest {
        match req.0 {
            RequestRef::Cached { comm, entry } => {
                self.registry.get_mut(comm).entry_mut(entry).request_mut()
            }
            RequestRef::Owned { slot } => self
                .requests
                .get_mut(slot)
                .and_then(|s| s.as_mut())
                .unwrap_or_else(|| panic!("reduce request {slot} used after release")),
        }
    }
}

/// Membership decision against the world size observed at init: run once the
/// cluster is back to strength, finalize when it is gone, otherwise hold.
fn resize_decision(comm_size: u32, target: u32) -> ResizeAction {
    if comm_size >= target {
        ResizeAction::Run
    } else if comm_size == 0 {
        ResizeAction::Finalize
    } else {
        ResizeAction::Wait
    }
}

/// Reject spans that fall outside the caller's buffer before the engine is
/// involved.
fn check_span(buf_len: usize, off: usize, len: usize) -> Result<()> {
    let fits = off
        .checked_add(len)
        .map(|end| end <= buf_len)
        .unwrap_or(false);
    if !fits {
        return Err(GradlinkError::BufferSizeMismatch {
            needed: len,
            offset: off,
            actual: buf_len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_decision() {
        assert_eq!(resize_decision(4, 4), ResizeAction::Run);
        assert_eq!(resize_decision(5, 4), ResizeAction::Run);
        assert_eq!(resize_decision(3, 4), ResizeAction::Wait);
        assert_eq!(resize_decision(1, 4), ResizeAction::Wait);
        assert_eq!(resize_decision(0, 4), ResizeAction::Finalize);
    }

    #[test]
    fn test_check_span() {
        assert!(check_span(4, 0, 4).is_ok());
        assert!(check_span(4, 2, 2).is_ok());
        assert!(check_span(4, 0, 0).is_ok());
        assert!(check_span(4, 2, 3).is_err());
        assert!(check_span(4, 5, 0).is_err());
        assert!(check_span(4, usize::MAX, 2).is_err());
    }
}
