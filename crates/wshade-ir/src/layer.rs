//! The per-layer instruction stream and symbol table.

use crate::arena::Arena;
use crate::error::IrError;
use crate::op::{Op, OpArg};
use crate::symbol::{Symbol, SymbolId};

/// A read-only projection of one layer of a shader group: its symbol
/// table, op stream, and main-code range.
///
/// A `Layer` is immutable once built; the analysis and the lowerer both
/// walk the same frozen view. [`LayerBuilder`] is the only mutation
/// path.
#[derive(Clone, Debug)]
pub struct Layer {
    name: String,
    symbols: Arena<Symbol>,
    ops: Vec<Op>,
    main_begin: usize,
    main_end: usize,
}

impl Layer {
    /// The layer's name, used in driver diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The op at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn op(&self, index: usize) -> &Op {
        &self.ops[index]
    }

    /// The whole op stream.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Number of ops in the stream.
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// The symbol referenced by the op's `k`-th argument.
    ///
    /// # Panics
    ///
    /// Panics if `k` is out of range for the op.
    pub fn oparg_sym(&self, op: &Op, k: usize) -> SymbolId {
        op.args()[k].sym
    }

    /// First op of the main code range.
    pub fn main_code_begin(&self) -> usize {
        self.main_begin
    }

    /// One past the last op of the main code range.
    pub fn main_code_end(&self) -> usize {
        self.main_end
    }

    /// The symbol for the given id.
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    /// Number of symbols in the table.
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Iterates over all symbols.
    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.iter()
    }

    /// Iterates over parameter symbols (`Param` and `OutputParam`).
    pub fn params(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.iter().filter(|(_, s)| s.is_param())
    }

    /// Finds a symbol by name.
    pub fn find_symbol(&self, name: &str) -> Option<SymbolId> {
        self.symbols
            .iter()
            .find(|(_, s)| s.name == name)
            .map(|(id, _)| id)
    }
}

/// Builder for a [`Layer`].
///
/// Symbols must be declared before ops reference them; `finish`
/// validates jump targets and op ranges.
#[derive(Debug, Default)]
pub struct LayerBuilder {
    name: String,
    symbols: Arena<Symbol>,
    ops: Vec<Op>,
    main_begin: Option<usize>,
}

impl LayerBuilder {
    /// Creates a builder for a layer with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declares a symbol and returns its id.
    pub fn add_symbol(&mut self, symbol: Symbol) -> SymbolId {
        self.symbols.push(symbol)
    }

    /// Mutable access to an already-declared symbol (to set flags or
    /// an init range once its ops are emitted).
    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    /// Index the next op will get.
    pub fn next_op_index(&self) -> usize {
        self.ops.len()
    }

    /// Appends a straight-line op.
    pub fn push_op(&mut self, name: impl Into<String>, args: Vec<OpArg>) -> usize {
        let index = self.ops.len();
        self.ops.push(Op::new(name, args));
        index
    }

    /// Appends an op with structured jump targets.
    pub fn push_branch_op(
        &mut self,
        name: impl Into<String>,
        args: Vec<OpArg>,
        targets: &[usize],
    ) -> usize {
        let index = self.ops.len();
        self.ops.push(Op::with_jumps(name, args, targets));
        index
    }

    /// Marks the current op index as the start of main code. Ops
    /// appended earlier belong to symbol init ranges.
    pub fn begin_main_code(&mut self) {
        self.main_begin = Some(self.ops.len());
    }

    /// Validates and freezes the layer.
    pub fn finish(self) -> Result<Layer, IrError> {
        let len = self.ops.len();
        for (op_index, op) in self.ops.iter().enumerate() {
            let mut previous = op_index;
            for &target in op.raw_jumps() {
                if target < 0 {
                    continue;
                }
                let target = target as usize;
                if target > len {
                    return Err(IrError::JumpOutOfRange {
                        op_index,
                        target,
                        len,
                    });
                }
                if target <= op_index || target < previous {
                    return Err(IrError::BackwardJump { op_index });
                }
                previous = target;
            }
        }
        let main_begin = self.main_begin.unwrap_or(0);
        if main_begin > len {
            return Err(IrError::MainRangeOutOfRange {
                begin: main_begin,
                end: len,
                len,
            });
        }
        for (_, sym) in self.symbols.iter() {
            if let Some(range) = &sym.init_ops {
                if range.start > range.end || range.end > len {
                    return Err(IrError::InitRangeOutOfRange {
                        name: sym.name.clone(),
                        begin: range.start,
                        end: range.end,
                        len,
                    });
                }
            }
        }
        Ok(Layer {
            name: self.name,
            symbols: self.symbols,
            ops: self.ops,
            main_begin,
            main_end: len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{ElemKind, SymbolClass, TypeDesc};

    fn local(name: &str) -> Symbol {
        Symbol::new(name, SymbolClass::Local, TypeDesc::plain(ElemKind::Float))
    }

    #[test]
    fn build_empty_layer() {
        let layer = LayerBuilder::new("empty").finish().unwrap();
        assert_eq!(layer.op_count(), 0);
        assert_eq!(layer.main_code_begin(), 0);
        assert_eq!(layer.main_code_end(), 0);
    }

    #[test]
    fn build_straight_line_layer() {
        let mut b = LayerBuilder::new("straight");
        let a = b.add_symbol(local("a"));
        let c = b.add_symbol(local("c"));
        b.begin_main_code();
        b.push_op("assign", vec![OpArg::write(a), OpArg::read(c)]);
        let layer = b.finish().unwrap();
        assert_eq!(layer.op_count(), 1);
        assert_eq!(layer.main_code_begin(), 0);
        assert_eq!(layer.main_code_end(), 1);
        assert_eq!(layer.oparg_sym(layer.op(0), 0), a);
        assert_eq!(layer.find_symbol("c"), Some(c));
        assert_eq!(layer.find_symbol("missing"), None);
    }

    #[test]
    fn jump_past_end_is_rejected() {
        let mut b = LayerBuilder::new("bad");
        let c = b.add_symbol(local("c"));
        b.begin_main_code();
        b.push_branch_op("if", vec![OpArg::read(c)], &[1, 99]);
        let err = b.finish().unwrap_err();
        assert!(matches!(err, IrError::JumpOutOfRange { target: 99, .. }));
    }

    #[test]
    fn backward_jump_is_rejected() {
        let mut b = LayerBuilder::new("backward");
        let c = b.add_symbol(local("c"));
        b.begin_main_code();
        b.push_op("assign", vec![OpArg::write(c), OpArg::read(c)]);
        b.push_branch_op("if", vec![OpArg::read(c)], &[0, 2]);
        let err = b.finish().unwrap_err();
        assert!(matches!(err, IrError::BackwardJump { op_index: 1 }));
    }

    #[test]
    fn decreasing_jump_slots_are_rejected() {
        let mut b = LayerBuilder::new("decreasing");
        let c = b.add_symbol(local("c"));
        b.begin_main_code();
        b.push_branch_op("if", vec![OpArg::read(c)], &[2, 1]);
        b.push_op("assign", vec![OpArg::write(c), OpArg::read(c)]);
        let err = b.finish().unwrap_err();
        assert!(matches!(err, IrError::BackwardJump { op_index: 0 }));
    }

    #[test]
    fn jump_to_end_is_allowed() {
        let mut b = LayerBuilder::new("ok");
        let c = b.add_symbol(local("c"));
        b.begin_main_code();
        b.push_branch_op("if", vec![OpArg::read(c)], &[1, 1]);
        assert!(b.finish().is_ok());
    }

    #[test]
    fn init_range_validated() {
        let mut b = LayerBuilder::new("bad-init");
        let mut sym = local("x");
        sym.init_ops = Some(0..3);
        b.add_symbol(sym);
        let err = b.finish().unwrap_err();
        assert!(matches!(err, IrError::InitRangeOutOfRange { .. }));
    }
}
