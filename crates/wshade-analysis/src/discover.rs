//! Uniform/varying discovery and mask planning for one layer.
//!
//! A single structured walk over the layer's ops mirrors the nesting
//! the code generator will use, building a feed-forward dependency
//! graph over symbols and recording which writes happen at which block
//! depth under which execution mask. Varying seeds (wide shader
//! globals, connected parameters, output parameters, attribute-query
//! results) are then pushed through the graph, and writes later
//! observed from a shallower scope under a different mask are
//! retroactively flagged as requiring a masked store.

use rustc_hash::FxHashSet;

use wshade_ir::{Layer, Op, OpKind, Symbol, SymbolClass, SymbolId, ValueSource};

use crate::globals::shader_global_is_uniform;

/// Identifies the execution mask of one conditional scope. Distinct
/// conditional scopes get fresh ids; the outermost scope is mask 0.
pub type MaskId = u32;

/// Errors raised on IR-precondition violations.
///
/// All of these are fatal: the IR producer guarantees structured
/// control flow, and a violation indicates a bug earlier in the
/// pipeline. No partial results are returned; the driver reports the
/// layer name alongside the op index carried here.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// An op carries jump targets but is not in the structured
    /// control-flow vocabulary.
    #[error("op {op_index} ('{name}') has jump targets but is not a structured control-flow op")]
    UnhandledBranchOp { op_index: usize, name: String },

    /// A conditional op must read exactly one symbol: its condition.
    #[error("conditional op {op_index} reads {reads} symbols, expected exactly 1")]
    ConditionArity { op_index: usize, reads: usize },

    /// A structured op is missing one of its required jump targets.
    #[error("op {op_index} is missing jump target {slot}")]
    MissingJumpTarget { op_index: usize, slot: usize },

    /// A `break` op appeared with no enclosing loop.
    #[error("break at op {op_index} outside of any loop")]
    BreakOutsideLoop { op_index: usize },
}

/// Host-driver toggles consulted by the walk.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnalysisOptions {
    /// Analyze the init ops of plain locals and temps (the driver
    /// zero-initializes them when hunting uninitialized reads).
    pub debug_uninit: bool,
    /// Skip unconnected interpolated parameters; the driver fetches
    /// their userdata lazily, outside the layer's code.
    pub lazy_userdata: bool,
}

/// Runs uniform/varying discovery and mask planning over one layer.
///
/// The layer is read-only for the duration of the analysis; the
/// returned tables are frozen and never mutated afterward.
pub fn analyze<'a>(
    layer: &'a Layer,
    options: &AnalysisOptions,
) -> Result<LayerAnalysis<'a>, AnalysisError> {
    Discovery::new(layer, *options).run()
}

/// Per-symbol write bookkeeping during the walk.
#[derive(Clone, Debug, Default)]
struct UsageInfo {
    last_write_depth: u32,
    last_write_mask: MaskId,
    /// Writes not yet determined to need masking: `(depth, op_index)`.
    pending_writes: Vec<(u32, usize)>,
}

struct Discovery<'a> {
    layer: &'a Layer,
    options: AnalysisOptions,
    /// `Some(true)` once seeded by the walk; flipped to `Some(false)`
    /// by varying propagation. `None` means never touched by an op.
    is_uniform: Vec<Option<bool>>,
    /// Feed-forward dependence: reader -> unique set of writers.
    feed_forward: Vec<FxHashSet<SymbolId>>,
    usage: Vec<UsageInfo>,
    /// Symbols whose pending writes named each op; consulted when
    /// deciding whether a mask requirement gates a wide store.
    write_targets: Vec<Vec<SymbolId>>,
    requires_masking: Vec<bool>,
    /// Condition symbols of all open conditional scopes.
    block_conditions: Vec<SymbolId>,
    /// Condition symbols of open loops only; consulted by `break`.
    loop_conditions: Vec<SymbolId>,
    getattr_writes: Vec<SymbolId>,
    next_mask: MaskId,
}

impl<'a> Discovery<'a> {
    fn new(layer: &'a Layer, options: AnalysisOptions) -> Self {
        let symbol_count = layer.symbol_count();
        let op_count = layer.op_count();
        Self {
            layer,
            options,
            is_uniform: vec![None; symbol_count],
            feed_forward: vec![FxHashSet::default(); symbol_count],
            usage: vec![UsageInfo::default(); symbol_count],
            write_targets: vec![Vec::new(); op_count],
            requires_masking: vec![false; op_count],
            block_conditions: Vec::new(),
            loop_conditions: Vec::new(),
            getattr_writes: Vec::new(),
            next_mask: 0,
        }
    }

    fn run(mut self) -> Result<LayerAnalysis<'a>, AnalysisError> {
        let layer = self.layer;
        let main_mask = self.fresh_mask();
        log::debug!("discovering varying and masking of layer '{}'", layer.name());

        // The order symbols are discovered must match the flow of the
        // code generator: init ops for plain symbols, then parameter
        // init ops (which may use locals and constants from the first
        // pass), then main code.
        for (_, sym) in layer.symbols() {
            if matches!(
                sym.class,
                SymbolClass::Const
                    | SymbolClass::Param
                    | SymbolClass::OutputParam
                    | SymbolClass::Global
            ) {
                continue;
            }
            let analyzed = sym.is_constant
                || sym.ty.is_closure_based()
                || sym.ty.is_string_based()
                || (matches!(sym.class, SymbolClass::Local | SymbolClass::Temp)
                    && self.options.debug_uninit);
            if !analyzed || sym.value_source != ValueSource::Default {
                continue;
            }
            if let Some(range) = sym.init_ops.clone() {
                self.discover_between(range.start, range.end, 0, 0, main_mask, main_mask)?;
            }
        }

        for (_, sym) in layer.params() {
            if self.skip_param(sym) || sym.value_source != ValueSource::Default {
                continue;
            }
            if let Some(range) = sym.init_ops.clone() {
                self.discover_between(range.start, range.end, 0, 0, main_mask, main_mask)?;
            }
        }

        self.discover_between(
            layer.main_code_begin(),
            layer.main_code_end(),
            0,
            0,
            main_mask,
            main_mask,
        )?;

        // No op may read an output parameter at the outermost scope,
        // yet its final value is observed by the caller; simulate that
        // read here so conditional writes to outputs get masked.
        for (id, sym) in layer.params() {
            if self.skip_param(sym) {
                continue;
            }
            if sym.class == SymbolClass::OutputParam {
                self.ensure_writes_at_lower_depth_are_masked(id, 0, main_mask);
            }
        }

        self.propagate_varying_seeds();
        self.retain_wide_masking();

        Ok(LayerAnalysis {
            layer,
            is_uniform: self.is_uniform,
            requires_masking: self.requires_masking,
            generated_loop_conditions: Vec::new(),
        })
    }

    fn fresh_mask(&mut self) -> MaskId {
        let mask = self.next_mask;
        self.next_mask += 1;
        mask
    }

    /// Parameters skipped by the code generator are skipped here too,
    /// keeping block depths aligned between the two walks.
    fn skip_param(&self, sym: &Symbol) -> bool {
        if !sym.everread && !sym.connected_down && !sym.connected && !sym.renderer_output {
            return true;
        }
        // Unconnected interpolated params are fetched lazily outside
        // the layer's code.
        if sym.class == SymbolClass::Param
            && !sym.lockgeom
            && !sym.ty.is_closure_based()
            && !sym.connected
            && !sym.connected_down
            && self.options.lazy_userdata
        {
            return true;
        }
        false
    }

    fn add_edge(&mut self, reader: SymbolId, writer: SymbolId) {
        if reader != writer {
            self.feed_forward[reader.index()].insert(writer);
        }
    }

    /// Reading `sym` at `(block_depth, mask)`: if its last write sits
    /// deeper under a mask that is no longer in scope, that write (and
    /// every other pending write deeper than here) can only be correct
    /// if it was masked. Flag them and keep the shallower ones pending.
    fn ensure_writes_at_lower_depth_are_masked(
        &mut self,
        sym: SymbolId,
        block_depth: u32,
        mask: MaskId,
    ) {
        let info = &self.usage[sym.index()];
        if info.last_write_depth <= block_depth || info.last_write_mask == mask {
            return;
        }
        log::debug!(
            "symbol '{}' needs its deeper writes masked (read at depth {block_depth})",
            self.layer.symbol(sym).name
        );
        let pending = std::mem::take(&mut self.usage[sym.index()].pending_writes);
        let mut remaining = Vec::with_capacity(pending.len());
        for (depth, op_index) in pending {
            if depth > block_depth {
                log::trace!("marking op {op_index} as masked");
                self.requires_masking[op_index] = true;
            } else {
                remaining.push((depth, op_index));
            }
        }
        let info = &mut self.usage[sym.index()];
        info.pending_writes = remaining;
        // The matter is handled up to this depth; avoid repeating the
        // work for the same site.
        info.last_write_depth = block_depth;
    }

    /// Walks `[begin, end)`, recursing into structured blocks.
    ///
    /// Reads are evaluated at `(block_depth, mask)` while writes are
    /// recorded at `(write_block_depth, write_mask)`. The pairs differ
    /// only for loop condition blocks: the first evaluation of a
    /// condition is ungated, but every later one runs under the
    /// previous iteration's body mask.
    fn discover_between(
        &mut self,
        begin: usize,
        end: usize,
        block_depth: u32,
        write_block_depth: u32,
        mask: MaskId,
        write_mask: MaskId,
    ) -> Result<(), AnalysisError> {
        log::trace!("discover ops [{begin}..{end}) depth={block_depth} mask={mask}");
        let layer = self.layer;
        let mut op_index = begin;
        while op_index < end {
            let op = layer.op(op_index);

            let mut reads: Vec<SymbolId> = Vec::with_capacity(op.nargs());
            let mut writes: Vec<SymbolId> = Vec::with_capacity(op.nargs());
            for arg in op.args() {
                if arg.write {
                    writes.push(arg.sym);
                }
                if arg.read {
                    reads.push(arg.sym);
                }
                // Start optimistic; varying cascades in from the seeds
                // after the walk.
                self.is_uniform[arg.sym.index()] = Some(true);
            }

            for &reader in &reads {
                for &writer in &writes {
                    self.add_edge(reader, writer);
                }
                self.ensure_writes_at_lower_depth_are_masked(reader, block_depth, mask);
            }

            for &writer in &writes {
                let info = &mut self.usage[writer.index()];
                info.last_write_depth = write_block_depth;
                info.last_write_mask = write_mask;
                info.pending_writes.push((write_block_depth, op_index));
                self.write_targets[op_index].push(writer);
            }

            // Writes inside an open conditional scope inherit data
            // dependence from every governing condition.
            for ci in 0..self.block_conditions.len() {
                let condition = self.block_conditions[ci];
                for wi in 0..writes.len() {
                    self.add_edge(condition, writes[wi]);
                }
            }

            if op.jump(0).is_some() {
                // Nested code; process it in the same order as the
                // code generator so block depths line up.
                match op.kind() {
                    OpKind::If => {
                        let else_begin = self.jump_target(op, op_index, 0)?;
                        let endif = self.jump_target(op, op_index, 1)?;
                        let condition = sole_condition(op_index, &reads)?;
                        self.block_conditions.push(condition);
                        let then_mask = self.fresh_mask();
                        self.discover_between(
                            op_index + 1,
                            else_begin,
                            block_depth + 1,
                            block_depth + 1,
                            then_mask,
                            then_mask,
                        )?;
                        let else_mask = self.fresh_mask();
                        self.discover_between(
                            else_begin,
                            endif,
                            block_depth + 1,
                            block_depth + 1,
                            else_mask,
                            else_mask,
                        )?;
                        self.block_conditions.pop();
                    }
                    kind if kind.is_loop() => {
                        let cond_begin = self.jump_target(op, op_index, 0)?;
                        let body_begin = self.jump_target(op, op_index, 1)?;
                        let step_begin = self.jump_target(op, op_index, 2)?;
                        let loop_end = self.jump_target(op, op_index, 3)?;

                        // Init runs unconditionally at the enclosing
                        // depth.
                        self.discover_between(
                            op_index + 1,
                            cond_begin,
                            block_depth,
                            block_depth,
                            mask,
                            mask,
                        )?;

                        let condition = sole_condition(op_index, &reads)?;
                        let body_depth = block_depth + 1;
                        let body_mask = self.fresh_mask();
                        self.block_conditions.push(condition);
                        self.loop_conditions.push(condition);

                        self.discover_between(
                            body_begin, step_begin, body_depth, body_depth, body_mask, body_mask,
                        )?;
                        // The step runs once per surviving iteration,
                        // under the body's mask.
                        self.discover_between(
                            step_begin, loop_end, body_depth, body_depth, body_mask, body_mask,
                        )?;
                        // The condition reads as the enclosing scope
                        // (its first evaluation is ungated) but writes
                        // as the body (every later evaluation runs
                        // under the previous iteration's mask).
                        // Walking it last lets loop-carried writes be
                        // marked before the iteration gate reads them.
                        self.discover_between(
                            cond_begin, body_begin, block_depth, body_depth, mask, body_mask,
                        )?;
                        // Loop exit is a horizontal all-false test over
                        // the condition; its writes must be masked.
                        self.ensure_writes_at_lower_depth_are_masked(condition, block_depth, mask);

                        self.loop_conditions.pop();
                        self.block_conditions.pop();
                    }
                    OpKind::FunctionCall => {
                        // An inlined call introduces no predication of
                        // its own.
                        let call_end = self.jump_target(op, op_index, 0)?;
                        self.discover_between(
                            op_index + 1,
                            call_end,
                            block_depth,
                            write_block_depth,
                            mask,
                            write_mask,
                        )?;
                    }
                    _ => {
                        return Err(AnalysisError::UnhandledBranchOp {
                            op_index,
                            name: op.name().to_string(),
                        });
                    }
                }
            }

            match op.kind() {
                OpKind::Break => {
                    // A varying condition governing the break must flow
                    // into the loop condition: lanes may leave the loop
                    // independently, so the iteration gate goes wide.
                    let &loop_condition = self
                        .loop_conditions
                        .last()
                        .ok_or(AnalysisError::BreakOutsideLoop { op_index })?;
                    let position = self
                        .block_conditions
                        .iter()
                        .position(|&c| c == loop_condition);
                    debug_assert!(
                        position.is_some(),
                        "loop condition missing from enclosing-condition stack"
                    );
                    if let Some(position) = position {
                        for ci in position + 1..self.block_conditions.len() {
                            let inner = self.block_conditions[ci];
                            self.add_edge(inner, loop_condition);
                        }
                    }
                    // The break writes the loop condition in the
                    // varying scenario; record it like any other write.
                    let info = &mut self.usage[loop_condition.index()];
                    if write_block_depth > info.last_write_depth {
                        info.last_write_depth = write_block_depth;
                        info.last_write_mask = write_mask;
                    }
                    info.pending_writes.push((write_block_depth, op_index));
                    self.write_targets[op_index].push(loop_condition);
                }
                OpKind::GetAttribute => {
                    // Results are sourced from the renderer per lane.
                    self.getattr_writes.extend_from_slice(&writes);
                }
                _ => {}
            }

            // Skip over the nested structured range we just recursed
            // into.
            op_index = match op.farthest_jump() {
                Some(next) => next,
                None => op_index + 1,
            };
        }
        Ok(())
    }

    fn jump_target(&self, op: &Op, op_index: usize, slot: usize) -> Result<usize, AnalysisError> {
        op.jump(slot)
            .ok_or(AnalysisError::MissingJumpTarget { op_index, slot })
    }

    /// Flips every symbol reachable from a varying seed to varying.
    fn propagate_varying_seeds(&mut self) {
        let layer = self.layer;
        for (id, sym) in layer.symbols() {
            if self.is_uniform[id.index()].is_none() {
                continue;
            }
            let is_seed = match sym.class {
                SymbolClass::Global => match shader_global_is_uniform(&sym.name) {
                    Some(is_uniform) => !is_uniform,
                    None => {
                        log::warn!(
                            "global '{}' is not a shader-globals field; treating as varying",
                            sym.name
                        );
                        true
                    }
                },
                SymbolClass::Param => sym.connected,
                _ => false,
            };
            if is_seed {
                self.mark_varying(id);
            }
        }

        // Output slots are wide storage even when only uniform values
        // are written; forcing them varying makes the lowerer promote
        // on store.
        for (id, sym) in layer.params() {
            if sym.class == SymbolClass::OutputParam {
                self.mark_varying(id);
            }
        }

        for id in std::mem::take(&mut self.getattr_writes) {
            self.mark_varying(id);
        }
    }

    fn mark_varying(&mut self, id: SymbolId) {
        let was_uniform = self.is_uniform[id.index()];
        self.is_uniform[id.index()] = Some(false);
        // The monotone flip memoizes the recursion; an already-varying
        // node's dependents are done.
        if was_uniform == Some(true) {
            let writers: Vec<SymbolId> = self.feed_forward[id.index()].iter().copied().collect();
            for writer in writers {
                self.mark_varying(writer);
            }
        }
    }

    /// A store to a uniform slot is a scalar store; masks only gate
    /// wide stores. Drop mask requirements whose targets all stayed
    /// uniform.
    fn retain_wide_masking(&mut self) {
        for op_index in 0..self.requires_masking.len() {
            if !self.requires_masking[op_index] {
                continue;
            }
            let any_wide = self.write_targets[op_index]
                .iter()
                .any(|w| self.is_uniform[w.index()] == Some(false));
            if !any_wide {
                log::trace!("op {op_index} writes only uniform symbols; dropping mask requirement");
                self.requires_masking[op_index] = false;
            }
        }
    }
}

fn sole_condition(op_index: usize, reads: &[SymbolId]) -> Result<SymbolId, AnalysisError> {
    match reads {
        [condition] => Ok(*condition),
        _ => Err(AnalysisError::ConditionArity {
            op_index,
            reads: reads.len(),
        }),
    }
}

/// The frozen per-layer analysis results, plus the loop-condition
/// stack the code emitter maintains while walking the same IR.
#[derive(Clone, Debug)]
pub struct LayerAnalysis<'a> {
    layer: &'a Layer,
    is_uniform: Vec<Option<bool>>,
    requires_masking: Vec<bool>,
    generated_loop_conditions: Vec<Option<SymbolId>>,
}

impl<'a> LayerAnalysis<'a> {
    /// The layer these tables describe.
    pub fn layer(&self) -> &'a Layer {
        self.layer
    }

    /// Whether the symbol holds one value for the whole batch.
    ///
    /// Symbols never touched by an op are uniform, except output
    /// parameters: those are wide-addressable by contract.
    pub fn is_uniform(&self, sym: SymbolId) -> bool {
        match self.is_uniform.get(sym.index()) {
            Some(Some(is_uniform)) => *is_uniform,
            _ => self.layer.symbol(sym).class != SymbolClass::OutputParam,
        }
    }

    /// Whether the op's writes must be predicated by the execution
    /// mask of their scope.
    ///
    /// # Panics
    ///
    /// Panics if `op_index` is out of range for the layer.
    pub fn requires_masking(&self, op_index: usize) -> bool {
        assert!(
            op_index < self.requires_masking.len(),
            "op index {op_index} out of range for layer '{}' ({} ops)",
            self.layer.name(),
            self.requires_masking.len()
        );
        self.requires_masking[op_index]
    }

    /// Indices of all ops that require masking, in op order.
    pub fn masked_op_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.requires_masking
            .iter()
            .enumerate()
            .filter(|(_, &masked)| masked)
            .map(|(index, _)| index)
    }

    /// Records that the emitter entered a loop; `None` means the
    /// loop's condition is uniform.
    pub fn push_varying_loop_condition(&mut self, condition: Option<SymbolId>) {
        self.generated_loop_conditions.push(condition);
    }

    /// The varying condition of the innermost loop the emitter is in,
    /// or `None` when that loop is uniform.
    ///
    /// # Panics
    ///
    /// Panics if the emitter is not inside any loop.
    pub fn varying_condition_of_innermost_loop(&self) -> Option<SymbolId> {
        *self
            .generated_loop_conditions
            .last()
            .expect("loop condition stack is empty")
    }

    /// Records that the emitter left a loop, returning its condition
    /// entry.
    ///
    /// # Panics
    ///
    /// Panics if the emitter is not inside any loop.
    pub fn pop_varying_loop_condition(&mut self) -> Option<SymbolId> {
        self.generated_loop_conditions
            .pop()
            .expect("loop condition stack is empty")
    }
}
