/// Rank of a participant in a communicator group (0-indexed).
pub type Rank = u32;

/// Engine-level priority of a submitted reduction. Higher values may be
/// scheduled ahead of lower ones; 0 is the default.
pub type Priority = i32;

/// Element types gradlink stages for the engine.
///
/// `Half16` is not IEEE half precision: it is the high 16 bits of the f32
/// bit pattern (see [`crate::codec`]). The engine only ever sees it as an
/// opaque 2-byte element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    F32 = 0,
    Half16 = 1,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::Half16 => 2,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::Half16 => "half16",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Reduction operations passed through to the engine.
///
/// Gradient aggregation only needs element-wise sum; the enum exists so the
/// engine boundary states the operation explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    /// Element-wise sum across ranks.
    Sum,
}

impl std::fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReduceOp::Sum => f.write_str("sum"),
        }
    }
}
