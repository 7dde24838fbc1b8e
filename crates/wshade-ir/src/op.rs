//! Ops — the instruction stream of a layer.

use crate::symbol::SymbolId;

/// Maximum number of structured jump targets an op can carry.
pub const MAX_JUMPS: usize = 4;

/// Classification of an op name for control-flow dispatch.
///
/// The branching vocabulary is closed; every other opcode is `Generic`
/// and must be straight-line.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum OpKind {
    /// `if`: jump\[0\] = else-begin, jump\[1\] = endif.
    If,
    /// `for`: jump\[0..4\] = cond-begin, body-begin, step-begin, end.
    For,
    /// `while`: same jump layout as `for`.
    While,
    /// `dowhile`: same jump layout as `for`.
    DoWhile,
    /// `functioncall`: jump\[0\] = function-end.
    FunctionCall,
    /// `break`: leaves the innermost loop.
    Break,
    /// `continue`: next iteration of the innermost loop.
    Continue,
    /// `getattribute`: result is sourced from the renderer.
    GetAttribute,
    /// Any non-branching opcode (`assign`, `add`, `mul`, ...).
    Generic,
}

impl OpKind {
    /// Classifies an opcode name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "if" => Self::If,
            "for" => Self::For,
            "while" => Self::While,
            "dowhile" => Self::DoWhile,
            "functioncall" => Self::FunctionCall,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "getattribute" => Self::GetAttribute,
            _ => Self::Generic,
        }
    }

    /// Returns `true` for the three loop constructs.
    pub fn is_loop(self) -> bool {
        matches!(self, Self::For | Self::While | Self::DoWhile)
    }
}

/// One argument of an op: the symbol plus its access flags.
#[derive(Clone, Copy, Debug)]
pub struct OpArg {
    /// The symbol this argument refers to.
    pub sym: SymbolId,
    /// The op reads this argument.
    pub read: bool,
    /// The op writes this argument.
    pub write: bool,
}

impl OpArg {
    /// An argument the op only reads.
    pub fn read(sym: SymbolId) -> Self {
        Self {
            sym,
            read: true,
            write: false,
        }
    }

    /// An argument the op only writes.
    pub fn write(sym: SymbolId) -> Self {
        Self {
            sym,
            read: false,
            write: true,
        }
    }
}

/// A single instruction.
#[derive(Clone, Debug)]
pub struct Op {
    name: String,
    kind: OpKind,
    args: Vec<OpArg>,
    jumps: [i32; MAX_JUMPS],
}

impl Op {
    /// Creates a straight-line op.
    pub fn new(name: impl Into<String>, args: Vec<OpArg>) -> Self {
        let name = name.into();
        let kind = OpKind::from_name(&name);
        Self {
            name,
            kind,
            args,
            jumps: [-1; MAX_JUMPS],
        }
    }

    /// Creates an op with structured jump targets.
    ///
    /// Unused trailing slots stay -1. Targets past `i32::MAX` saturate
    /// and are rejected by layer validation.
    pub fn with_jumps(name: impl Into<String>, args: Vec<OpArg>, targets: &[usize]) -> Self {
        let mut op = Self::new(name, args);
        for (slot, &target) in targets.iter().take(MAX_JUMPS).enumerate() {
            op.jumps[slot] = i32::try_from(target).unwrap_or(i32::MAX);
        }
        op
    }

    /// The opcode name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The control-flow classification of this op.
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// The arguments.
    pub fn args(&self) -> &[OpArg] {
        &self.args
    }

    /// Number of arguments.
    pub fn nargs(&self) -> usize {
        self.args.len()
    }

    /// The jump target in the given slot, if set.
    pub fn jump(&self, slot: usize) -> Option<usize> {
        match self.jumps.get(slot) {
            Some(&t) if t >= 0 => Some(t as usize),
            _ => None,
        }
    }

    /// The largest valid jump target, bounding the op's structured
    /// extent. `None` for straight-line ops.
    pub fn farthest_jump(&self) -> Option<usize> {
        self.jumps.iter().filter(|&&t| t >= 0).max().map(|&t| t as usize)
    }

    pub(crate) fn raw_jumps(&self) -> &[i32; MAX_JUMPS] {
        &self.jumps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::symbol::{ElemKind, Symbol, SymbolClass, TypeDesc};

    fn sym(arena: &mut Arena<Symbol>, name: &str) -> SymbolId {
        arena.push(Symbol::new(
            name,
            SymbolClass::Local,
            TypeDesc::plain(ElemKind::Float),
        ))
    }

    #[test]
    fn kind_from_name() {
        assert_eq!(OpKind::from_name("if"), OpKind::If);
        assert_eq!(OpKind::from_name("dowhile"), OpKind::DoWhile);
        assert_eq!(OpKind::from_name("assign"), OpKind::Generic);
        assert!(OpKind::For.is_loop());
        assert!(!OpKind::If.is_loop());
    }

    #[test]
    fn straight_line_has_no_jumps() {
        let mut arena = Arena::new();
        let a = sym(&mut arena, "a");
        let b = sym(&mut arena, "b");
        let op = Op::new("assign", vec![OpArg::write(a), OpArg::read(b)]);
        assert_eq!(op.jump(0), None);
        assert_eq!(op.farthest_jump(), None);
        assert_eq!(op.nargs(), 2);
    }

    #[test]
    fn farthest_jump_is_max_target() {
        let mut arena = Arena::new();
        let c = sym(&mut arena, "c");
        let op = Op::with_jumps("for", vec![OpArg::read(c)], &[3, 5, 7, 9]);
        assert_eq!(op.jump(0), Some(3));
        assert_eq!(op.jump(3), Some(9));
        assert_eq!(op.farthest_jump(), Some(9));
    }

    #[test]
    fn if_uses_two_slots() {
        let mut arena = Arena::new();
        let c = sym(&mut arena, "c");
        let op = Op::with_jumps("if", vec![OpArg::read(c)], &[4, 6]);
        assert_eq!(op.jump(1), Some(6));
        assert_eq!(op.jump(2), None);
        assert_eq!(op.farthest_jump(), Some(6));
    }
}
