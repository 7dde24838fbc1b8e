//! Error types for the WShade IR.

/// Errors that can occur when constructing a layer.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// A jump target points past the end of the op stream.
    #[error("op {op_index}: jump target {target} out of range (op count: {len})")]
    JumpOutOfRange {
        op_index: usize,
        target: usize,
        len: usize,
    },

    /// Structured jump targets must point forward and be
    /// non-decreasing across slots.
    #[error("op {op_index}: jump targets must be forward and non-decreasing")]
    BackwardJump { op_index: usize },

    /// The main-code range is not within the op stream.
    #[error("main code range {begin}..{end} out of range (op count: {len})")]
    MainRangeOutOfRange {
        begin: usize,
        end: usize,
        len: usize,
    },

    /// A symbol's init-op range is not within the op stream.
    #[error("symbol '{name}': init range {begin}..{end} out of range (op count: {len})")]
    InitRangeOutOfRange {
        name: String,
        begin: usize,
        end: usize,
        len: usize,
    },
}
