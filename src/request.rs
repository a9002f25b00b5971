//! One reduction in flight or completed, with its stage-in/stage-out buffers.

use crate::codec;
use crate::engine::{CollAttr, EngineComm, EngineRequest};
use crate::error::Result;
use crate::types::{DataType, Priority, ReduceOp};

/// Lifecycle tag validated on every public operation.
///
/// Replaces ad-hoc use-after-free detection with an explicit state machine:
/// `Idle -> Submitted -> Complete -> (reset) Idle`. Released uncached requests
/// are destroyed outright; cached ones are reset and returned to their entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// No engine operation outstanding; ready for submission.
    Idle,
    /// Engine handle created, completion not yet observed.
    Submitted,
    /// Completion observed; result available in the stage-out buffer.
    Complete,
}

/// A reduction request owning a fixed pair of staging buffers.
///
/// The buffers are allocated once at the request's element count and never
/// reallocated, so their addresses stay stable for the engine across the
/// whole Submitted-to-Complete window — and across reuses of a cached
/// request.
pub struct ReduceRequest {
    name: String,
    len: usize,
    precision: DataType,
    /// Stage-in: written from the caller's buffer before submission. On the
    /// half path the floats are converted in place, packing half words into
    /// the front.
    read_buf: Vec<f32>,
    /// Stage-out: written by the engine on completion.
    write_buf: Vec<f32>,
    attr: CollAttr,
    op: Option<Box<dyn EngineRequest>>,
    state: RequestState,
}

impl ReduceRequest {
    /// Request bound to a cached tensor entry; the engine is told to keep its
    /// association with `name` stable across calls.
    pub(crate) fn new_cached(name: &str, len: usize) -> Self {
        Self::with_attr(name.to_string(), len, CollAttr::matched(name, true))
    }

    /// Independent request for a one-shot async reduction matched by `name`.
    pub(crate) fn new_uncached(name: String, len: usize) -> Self {
        let attr = CollAttr::matched(&name, false);
        Self::with_attr(name, len, attr)
    }

    /// Transient request for a blocking one-off reduction; no match key.
    pub(crate) fn new_sync(len: usize) -> Self {
        Self::with_attr(String::new(), len, CollAttr::synchronous())
    }

    fn with_attr(name: String, len: usize, attr: CollAttr) -> Self {
        Self {
            name,
            len,
            precision: DataType::F32,
            read_buf: vec![0.0; len],
            write_buf: vec![0.0; len],
            attr,
            op: None,
            state: RequestState::Idle,
        }
    }

    /// Tensor name this request reduces (empty for sync one-offs).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element count of the reduction.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Precision the last submission used.
    pub fn precision(&self) -> DataType {
        self.precision
    }

    /// Address of the stage-in buffer; stable across cached reuse.
    pub(crate) fn read_buf_ptr(&self) -> *const f32 {
        self.read_buf.as_ptr()
    }

    /// Stage `src` and start the asynchronous sum-reduction on `comm`.
    ///
    /// # Panics
    /// Panics if the request is not `Idle`.
    pub fn submit(
        &mut self,
        comm: &dyn EngineComm,
        src: &[f32],
        priority: Priority,
        precision: DataType,
    ) -> Result<()> {
        assert_eq!(
            self.state,
            RequestState::Idle,
            "reduce request {:?} submitted while a reduction is outstanding",
            self.name
        );
        assert_eq!(src.len(), self.len, "stage-in slice length");

        self.read_buf.copy_from_slice(src);
        self.precision = precision;
        if precision == DataType::Half16 {
            codec::encode_slice_in_place(&mut self.read_buf);
        }
        self.attr.priority = priority;

        // Both buffers are owned by this request and never reallocated, so
        // the pointers stay valid until completion is observed.
        let op = unsafe {
            comm.allreduce(
                self.read_buf.as_ptr() as u64,
                self.write_buf.as_mut_ptr() as u64,
                self.len,
                precision,
                ReduceOp::Sum,
                &self.attr,
            )?
        };
        self.op = Some(op);
        self.state = RequestState::Submitted;
        Ok(())
    }

    /// Block until the engine reports completion.
    ///
    /// # Panics
    /// Panics if the request is not `Submitted`.
    pub fn wait(&mut self) -> Result<()> {
        assert_eq!(
            self.state,
            RequestState::Submitted,
            "wait() on reduce request {:?} with no reduction in flight",
            self.name
        );
        self.op
            .as_mut()
            .expect("engine handle present while Submitted")
            .wait()?;
        self.state = RequestState::Complete;
        Ok(())
    }

    /// Non-blocking completion check. A `true` result is equivalent to
    /// `wait()` having returned.
    ///
    /// # Panics
    /// Panics if the request is `Idle`.
    pub fn poll(&mut self) -> Result<bool> {
        match self.state {
            RequestState::Complete => Ok(true),
            RequestState::Submitted => {
                let done = self
                    .op
                    .as_mut()
                    .expect("engine handle present while Submitted")
                    .test()?;
                if done {
                    self.state = RequestState::Complete;
                }
                Ok(done)
            }
            RequestState::Idle => {
                panic!("poll() on idle reduce request {:?}", self.name)
            }
        }
    }

    /// Copy the result into `dst` starting at `dst_off`, decoding half words
    /// back to f32 first when the half path was used. May be called more than
    /// once.
    ///
    /// # Panics
    /// Panics if the request is not `Complete`, or if the destination slice
    /// is too short (callers check sizes before the engine is involved).
    pub fn finalize(&self, dst: &mut [f32], dst_off: usize) {
        assert_eq!(
            self.state,
            RequestState::Complete,
            "finalize() on reduce request {:?} before completion",
            self.name
        );
        let out = &mut dst[dst_off..dst_off + self.len];
        match self.precision {
            DataType::Half16 => codec::decode_packed(&self.write_buf, out),
            DataType::F32 => out.copy_from_slice(&self.write_buf),
        }
    }

    /// Drop the engine handle and return to `Idle` for reuse.
    pub(crate) fn reset(&mut self) {
        self.op = None;
        self.state = RequestState::Idle;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Engine comm with hand-driven completion, for exercising the
    //! Submitted/Complete transitions that the loopback engine skips.

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::engine::{CollAttr, EngineComm, EngineRequest};
    use crate::error::Result;
    use crate::types::{DataType, Rank, ReduceOp};

    pub struct DeferredComm {
        pub done: Arc<AtomicBool>,
    }

    impl DeferredComm {
        pub fn new() -> Self {
            Self {
                done: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl EngineComm for DeferredComm {
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
            _attr: &CollAttr,
        ) -> Result<Box<dyn EngineRequest>> {
            let bytes = count * dtype.size_in_bytes();
            unsafe {
                std::ptr::copy_nonoverlapping(send_ptr as *const u8, recv_ptr as *mut u8, bytes);
            }
            Ok(Box::new(DeferredRequest {
                done: Arc::clone(&self.done),
            }))
        }
    }

    struct DeferredRequest {
        done: Arc<AtomicBool>,
    }

    impl EngineRequest for DeferredRequest {
        fn wait(&mut self) -> Result<()> {
            self.done.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn test(&mut self) -> Result<bool> {
            Ok(self.done.load(Ordering::SeqCst))
        }
    }
}
