//! Boundary traits for the external collective-communication engine.
//!
//! gradlink never implements the reduction itself. Everything below the
//! submit/wait/test surface — transport, scheduling, the collective
//! algorithm — belongs to the engine. The traits here are the whole contract;
//! [`LoopbackEngine`] is the built-in single-process implementation used for
//! world-size-1 operation and tests.

use crate::error::Result;
use crate::types::{DataType, Rank, ReduceOp};

mod loopback;

pub use loopback::LoopbackEngine;

/// Decision returned by the resize policy when cluster membership changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAction {
    /// Enough ranks are present; keep running.
    Run,
    /// Below the target size; hold until more ranks join.
    Wait,
    /// Cluster is gone; shut down.
    Finalize,
}

/// Callback the engine invokes with the current cluster size whenever
/// membership changes.
pub type ResizePolicy = Box<dyn Fn(u32) -> ResizeAction + Send + Sync>;

/// Per-call attributes passed through to the engine with each reduction.
#[derive(Debug, Clone)]
pub struct CollAttr {
    /// Scheduling priority; 0 is the default.
    pub priority: i32,
    /// Block inside the engine call instead of returning an async handle.
    pub synchronous: bool,
    /// Ask the engine to keep its per-tensor association stable across calls
    /// carrying the same match key, skipping per-call setup.
    pub to_cache: bool,
    /// Dedup/match key; the cached tensor's name.
    pub match_id: Option<String>,
}

impl CollAttr {
    /// Attributes for a one-off synchronous reduction.
    pub fn synchronous() -> Self {
        Self {
            priority: 0,
            synchronous: true,
            to_cache: false,
            match_id: None,
        }
    }

    /// Attributes for an async reduction matched by `name`.
    ///
    /// `to_cache` tells the engine to keep its internal association with this
    /// name stable across repeated calls.
    pub fn matched(name: &str, to_cache: bool) -> Self {
        Self {
            priority: 0,
            synchronous: false,
            to_cache,
            match_id: Some(name.to_string()),
        }
    }
}

/// Factory for group-communication contexts; the engine's process-wide face.
pub trait CollectiveEngine {
    /// Create a group-communication context.
    ///
    /// `None` creates the world communicator spanning every rank. `Some(color)`
    /// creates a sub-group: ranks supplying the same color form one group.
    fn create_communicator(&self, color: Option<i32>) -> Result<Box<dyn EngineComm>>;

    /// Install the callback consulted on cluster membership changes.
    fn set_resize_policy(&self, policy: ResizePolicy);
}

/// One group-communication context inside the engine.
pub trait EngineComm {
    /// This process's rank within the group.
    fn rank(&self) -> Rank;

    /// Number of ranks in the group.
    fn size(&self) -> u32;

    /// Start an asynchronous sum-reduction of `count` elements of `dtype`
    /// from `send_ptr` into `recv_ptr`.
    ///
    /// # Safety
    /// Both pointers must be valid for `count * dtype.size_in_bytes()` bytes
    /// and must stay valid and unmodified by the caller until the returned
    /// request reports completion.
    unsafe fn allreduce(
        &self,
        send_ptr: u64,
        recv_ptr: u64,
        count: usize,
        dtype: DataType,
        op: ReduceOp,
        attr: &CollAttr,
    ) -> Result<Box<dyn EngineRequest>>;
}

/// Handle to one asynchronous engine operation.
pub trait EngineRequest {
    /// Block until the operation completes.
    fn wait(&mut self) -> Result<()>;

    /// Non-blocking completion check.
    fn test(&mut self) -> Result<bool>;
}
