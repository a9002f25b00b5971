pub type Result<T> = std::result::Result<T, GradlinkError>;

/// Recoverable failures surfaced to the caller.
///
/// Caller contract violations (acquiring a busy cache entry, releasing a
/// request twice, using a request after release, releasing an unregistered
/// communicator handle) are deliberately *not* represented here: they panic,
/// because a caller that breaks the lifecycle protocol would corrupt every
/// reduction issued afterwards.
#[derive(Debug, thiserror::Error)]
pub enum GradlinkError {
    #[error("engine {operation} failed: {status}")]
    EngineFailed {
        operation: &'static str,
        status: String,
    },

    #[error("buffer too short: need {needed} elements at offset {offset}, buffer holds {actual}")]
    BufferSizeMismatch {
        needed: usize,
        offset: usize,
        actual: usize,
    },

    #[error("cached tensor {name:?} must have a positive length, got {len}")]
    InvalidLength { name: String, len: usize },
}

impl GradlinkError {
    /// Create an `EngineFailed` error from an engine status string.
    pub fn engine(operation: &'static str, status: impl Into<String>) -> Self {
        Self::EngineFailed {
            operation,
            status: status.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_failed_display() {
        let e = GradlinkError::engine("allreduce", "out_of_resource");
        assert_eq!(e.to_string(), "engine allreduce failed: out_of_resource");
    }

    #[test]
    fn test_buffer_size_mismatch_display() {
        let e = GradlinkError::BufferSizeMismatch {
            needed: 8,
            offset: 2,
            actual: 4,
        };
        assert_eq!(
            e.to_string(),
            "buffer too short: need 8 elements at offset 2, buffer holds 4"
        );
    }

    #[test]
    fn test_all_variants_display() {
        let errors = vec![
            GradlinkError::engine("create_communicator", "runtime_error"),
            GradlinkError::BufferSizeMismatch {
                needed: 1,
                offset: 0,
                actual: 0,
            },
            GradlinkError::InvalidLength {
                name: "grad1".into(),
                len: 0,
            },
        ];
        for e in &errors {
            assert!(!e.to_string().is_empty(), "empty display for {e:?}");
        }
    }
}
