//! WShade intermediate representation.
//!
//! A read-only, op/symbol-based IR for one layer of a shader group,
//! consumed by the batched (SIMD-wide) backend. Ops carry per-argument
//! read/write flags and structured jump targets; symbols carry the
//! storage class and connectivity flags the uniform/varying analysis
//! keys on.

pub mod arena;
mod display;
mod error;
mod layer;
mod op;
mod symbol;

pub use arena::{Arena, Handle};
pub use display::dump_layer;
pub use error::IrError;
pub use layer::{Layer, LayerBuilder};
pub use op::{MAX_JUMPS, Op, OpArg, OpKind};
pub use symbol::{ElemKind, Symbol, SymbolClass, SymbolId, TypeDesc, ValueSource};
