//! gradlink: a handle and buffer lifecycle layer between a host numerical
//! runtime and an external collective-communication engine.
//!
//! The engine executes all-reduce operations asynchronously; gradlink manages
//! everything around it: reusable per-tensor request caches, stage-in/stage-out
//! buffers, a float/half conversion codec for bandwidth-sensitive reductions,
//! and a registry of sub-communicators that can be released while handles to
//! other groups stay valid.
//!
//! The engine is reached only through the traits in [`engine`]; a built-in
//! [`LoopbackEngine`] covers single-process operation and tests.

pub mod cache;
pub mod codec;
pub mod comm;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod registry;
pub mod request;
pub mod types;

pub use cache::TensorCacheEntry;
pub use comm::Communicator;
pub use config::GradlinkConfig;
pub use context::{EntryHandle, GradlinkContext, RequestHandle};
pub use engine::{
    CollAttr, CollectiveEngine, EngineComm, EngineRequest, LoopbackEngine, ResizeAction,
    ResizePolicy,
};
pub use error::{GradlinkError, Result};
pub use registry::{CommHandle, CommRegistry};
pub use request::{ReduceRequest, RequestState};
pub use types::{DataType, Priority, Rank, ReduceOp};
