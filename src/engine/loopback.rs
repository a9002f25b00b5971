//! Single-process engine: every communicator has exactly one rank, so a sum
//! reduction is a copy of the input. Used for world-size-1 deployments and as
//! the test engine.

use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{CollAttr, CollectiveEngine, EngineComm, EngineRequest, ResizeAction, ResizePolicy};
use crate::error::Result;
use crate::types::{DataType, Rank, ReduceOp};

/// In-process collective engine with a world of one rank.
#[derive(Clone, Default)]
pub struct LoopbackEngine {
    policy: Arc<Mutex<Option<ResizePolicy>>>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the installed resize policy against a hypothetical cluster size.
    /// Returns `None` if no policy has been installed yet.
    pub fn resize_action(&self, comm_size: u32) -> Option<ResizeAction> {
        let guard = self.policy.lock().expect("resize policy lock");
        guard.as_ref().map(|p| p(comm_size))
    }
}

impl CollectiveEngine for LoopbackEngine {
    fn create_communicator(&self, color: Option<i32>) -> Result<Box<dyn EngineComm>> {
        debug!(?color, "loopback communicator created");
        Ok(Box::new(LoopbackComm { color }))
    }

    fn set_resize_policy(&self, policy: ResizePolicy) {
        *self.policy.lock().expect("resize policy lock") = Some(policy);
    }
}

struct LoopbackComm {
    #[allow(dead_code)]
    color: Option<i32>,
}

impl EngineComm for LoopbackComm {
    fn rank(&self) -> Rank {
        0
    }

    fn size(&self) -> u32 {
        1
    }

    unsafe fn allreduce(
        &self,
        send_ptr: u64,
        recv_ptr: u64,
        count: usize,
        dtype: DataType,
        _op: ReduceOp,
        attr: &CollAttr,
    ) -> Result<Box<dyn EngineRequest>> {
        debug!(
            count,
            dtype = %dtype,
            priority = attr.priority,
            match_id = attr.match_id.as_deref().unwrap_or(""),
            "loopback allreduce"
        );
        // One rank: the sum is the input. Copy happens at submit, completion
        // is immediate.
        let bytes = count * dtype.size_in_bytes();
        unsafe {
            std::ptr::copy_nonoverlapping(send_ptr as *const u8, recv_ptr as *mut u8, bytes);
        }
        Ok(Box::new(LoopbackRequest))
    }
}

struct LoopbackRequest;

impl EngineRequest for LoopbackRequest {
    fn wait(&mut self) -> Result<()> {
        Ok(())
    }

    fn test(&mut self) -> Result<bool> {
        Ok(true)
    }
}
