//! Display implementations and text dump for debugging.

use std::fmt;
use std::fmt::Write;

use crate::layer::Layer;
use crate::op::OpKind;
use crate::symbol::{ElemKind, SymbolClass, TypeDesc, ValueSource};

impl fmt::Display for ElemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::String => "string",
            Self::Vec3 => "vec3",
            Self::Matrix44 => "matrix44",
            Self::Closure => "closure",
            Self::Ptr => "ptr",
            Self::LongLong => "longlong",
        })
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.array_len {
            Some(len) => write!(f, "{}[{len}]", self.elem),
            None => write!(f, "{}", self.elem),
        }
    }
}

impl fmt::Display for SymbolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Global => "global",
            Self::Param => "param",
            Self::OutputParam => "oparam",
            Self::Local => "local",
            Self::Temp => "temp",
            Self::Const => "const",
        })
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Instance => "instance",
            Self::Geom => "geom",
            Self::Connected => "connected",
        })
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::If => "if",
            Self::For => "for",
            Self::While => "while",
            Self::DoWhile => "dowhile",
            Self::FunctionCall => "functioncall",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::GetAttribute => "getattribute",
            Self::Generic => "generic",
        })
    }
}

/// Dumps a layer as text for debugging.
pub fn dump_layer(layer: &Layer) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "layer {}", layer.name());

    let _ = writeln!(out, "Symbols:");
    for (id, sym) in layer.symbols() {
        let mut flags = String::new();
        if sym.connected {
            flags.push_str(" connected");
        }
        if sym.connected_down {
            flags.push_str(" connected_down");
        }
        if sym.everread {
            flags.push_str(" everread");
        }
        if sym.renderer_output {
            flags.push_str(" renderer_output");
        }
        if sym.has_derivs {
            flags.push_str(" derivs");
        }
        if let Some(range) = &sym.init_ops {
            let _ = write!(flags, " init {}..{}", range.start, range.end);
        }
        let _ = writeln!(
            out,
            "  {:?} {} {} {}{flags}",
            id, sym.class, sym.ty, sym.name
        );
    }

    let _ = writeln!(
        out,
        "Ops (main {}..{}):",
        layer.main_code_begin(),
        layer.main_code_end()
    );
    for (index, op) in layer.ops().iter().enumerate() {
        let _ = write!(out, "  {index:4}: {}", op.name());
        for arg in op.args() {
            let rw = match (arg.read, arg.write) {
                (true, true) => "rw",
                (true, false) => "r",
                (false, true) => "w",
                (false, false) => "-",
            };
            let _ = write!(out, " {}/{rw}", layer.symbol(arg.sym).name);
        }
        if let Some(farthest) = op.farthest_jump() {
            let targets: Vec<String> = (0..crate::op::MAX_JUMPS)
                .filter_map(|slot| op.jump(slot))
                .map(|t| t.to_string())
                .collect();
            let _ = write!(out, "  -> [{}] (extent {farthest})", targets.join(", "));
        }
        let _ = writeln!(out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerBuilder;
    use crate::op::OpArg;
    use crate::symbol::Symbol;

    #[test]
    fn display_type_desc() {
        assert_eq!(TypeDesc::plain(ElemKind::Vec3).to_string(), "vec3");
        assert_eq!(TypeDesc::array(ElemKind::Float, 4).to_string(), "float[4]");
    }

    #[test]
    fn dump_contains_symbols_and_ops() {
        let mut b = LayerBuilder::new("dumped");
        let x = b.add_symbol(Symbol::new(
            "x",
            SymbolClass::Local,
            TypeDesc::plain(ElemKind::Float),
        ));
        let p = b.add_symbol(Symbol::new(
            "P",
            SymbolClass::Global,
            TypeDesc::plain(ElemKind::Vec3),
        ));
        b.begin_main_code();
        b.push_op("assign", vec![OpArg::write(x), OpArg::read(p)]);
        let layer = b.finish().unwrap();

        let text = dump_layer(&layer);
        assert!(text.contains("layer dumped"));
        assert!(text.contains("local float x"));
        assert!(text.contains("assign x/w P/r"));
    }
}
