//! Uniform/varying analysis and mask planning for the WShade batched
//! (SIMD-wide) execution model.
//!
//! One batch executes a layer's ops over many lanes at once. Per layer
//! this crate classifies every symbol as **uniform** (one scalar value
//! shared by the batch) or **varying** (one value per lane), and flags
//! the ops whose writes must be predicated by an execution mask
//! because they happen inside a conditional region whose writes are
//! live after the region. The downstream code generator reads both
//! tables to pick the narrowest correct lowering.
//!
//! Entry point: [`analyze`] on a frozen [`wshade_ir::Layer`]; results
//! come back as a [`LayerAnalysis`].

pub mod globals;

mod discover;

pub use discover::{AnalysisError, AnalysisOptions, LayerAnalysis, MaskId, analyze};
