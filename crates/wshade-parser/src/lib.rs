//! Textual IR frontend for WShade.
//!
//! Parses the line-based `.wsir` format into a [`wshade_ir::Layer`].
//! The format mirrors the compiled-shader text the IR producer emits:
//! a header, symbol declarations, then `code` sections holding one op
//! per line. Init ops for a symbol live in a `code <symbol>` section;
//! `code main` opens the main range.
//!
//! ```text
//! shader checker
//! global  vec3   P
//! param   float  scale  everread
//! oparam  vec3   Cout
//! temp    float  $t0
//! const   float  $c0
//! code main
//!     mul  $t0 P scale
//!     assign  Cout $t0
//! end
//! ```
//!
//! Per-argument read/write flags come from the op description table:
//! by default the first argument is the result and the rest are read;
//! conditional ops read their sole condition; `break`/`continue` take
//! no arguments. Control ops carry their jump targets as trailing
//! integers (`if` two, loops four, `functioncall` one).

use rustc_hash::FxHashMap;

use wshade_ir::{
    ElemKind, IrError, Layer, LayerBuilder, OpArg, OpKind, Symbol, SymbolClass, SymbolId, TypeDesc,
    ValueSource,
};

/// Errors produced while parsing `.wsir` text.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The first meaningful line must be `shader <name>`.
    #[error("line {line}: expected 'shader <name>' header")]
    MissingHeader { line: usize },

    /// A declaration line was too short.
    #[error("line {line}: declaration needs '<class> <type> <name> [flags...]'")]
    MalformedDecl { line: usize },

    /// An unrecognized symbol class keyword.
    #[error("line {line}: unknown symbol class '{class}'")]
    UnknownClass { line: usize, class: String },

    /// An unrecognized type name.
    #[error("line {line}: unknown type '{ty}'")]
    UnknownType { line: usize, ty: String },

    /// An unrecognized declaration flag.
    #[error("line {line}: unknown flag '{flag}'")]
    UnknownFlag { line: usize, flag: String },

    /// The same symbol name was declared twice.
    #[error("line {line}: duplicate symbol '{name}'")]
    DuplicateSymbol { line: usize, name: String },

    /// An op referenced a symbol that was never declared.
    #[error("line {line}: unknown symbol '{name}'")]
    UnknownSymbol { line: usize, name: String },

    /// A control op did not end with the expected jump targets.
    #[error("line {line}: '{name}' expects {expected} trailing jump targets")]
    MalformedJumps {
        line: usize,
        name: String,
        expected: usize,
    },

    /// A `code` section named a symbol that was never declared.
    #[error("line {line}: code section for unknown symbol '{name}'")]
    UnknownSection { line: usize, name: String },

    /// The assembled layer failed IR validation.
    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Parses `.wsir` source into a layer.
pub fn parse(source: &str) -> Result<Layer, ParseError> {
    Parser::default().parse(source)
}

/// Number of trailing jump-target tokens a control op carries.
fn jump_count(kind: OpKind) -> usize {
    match kind {
        OpKind::If => 2,
        OpKind::For | OpKind::While | OpKind::DoWhile => 4,
        OpKind::FunctionCall => 1,
        _ => 0,
    }
}

/// Per-argument access flags from the op description table.
fn arg_access(kind: OpKind, index: usize) -> (bool, bool) {
    match kind {
        // Conditional and call ops read everything they name.
        OpKind::If | OpKind::For | OpKind::While | OpKind::DoWhile | OpKind::FunctionCall => {
            (true, false)
        }
        OpKind::Break | OpKind::Continue => (false, false),
        // Result first, operands after.
        OpKind::GetAttribute | OpKind::Generic => {
            if index == 0 {
                (false, true)
            } else {
                (true, false)
            }
        }
    }
}

/// Which code section the parser is currently filling.
enum Section {
    /// No `code` line seen yet; still in declarations.
    Decls,
    /// Init ops for a symbol, started at the given op index.
    SymbolInit { sym: SymbolId, begin: usize },
    /// The main range.
    Main,
}

#[derive(Default)]
struct Parser {
    by_name: FxHashMap<String, SymbolId>,
}

impl Parser {
    fn parse(mut self, source: &str) -> Result<Layer, ParseError> {
        let mut lines = source
            .lines()
            .enumerate()
            .map(|(i, raw)| (i + 1, raw.split('#').next().unwrap_or("").trim()))
            .filter(|(_, text)| !text.is_empty());

        let (line, header) = lines.next().ok_or(ParseError::MissingHeader { line: 1 })?;
        let mut header_tokens = header.split_whitespace();
        if header_tokens.next() != Some("shader") {
            return Err(ParseError::MissingHeader { line });
        }
        let name = header_tokens
            .next()
            .ok_or(ParseError::MissingHeader { line })?;

        let mut builder = LayerBuilder::new(name);
        let mut section = Section::Decls;

        for (line, text) in lines {
            let tokens: Vec<&str> = text.split_whitespace().collect();
            match tokens[0] {
                "end" => continue,
                "code" => {
                    self.close_section(&mut builder, &section);
                    let section_name = tokens.get(1).copied().unwrap_or("main");
                    section = if section_name == "main" {
                        builder.begin_main_code();
                        Section::Main
                    } else {
                        let sym = self.lookup(section_name, line).map_err(|_| {
                            ParseError::UnknownSection {
                                line,
                                name: section_name.to_string(),
                            }
                        })?;
                        Section::SymbolInit {
                            sym,
                            begin: builder.next_op_index(),
                        }
                    };
                }
                _ => match section {
                    Section::Decls => self.parse_decl(&mut builder, line, &tokens)?,
                    Section::SymbolInit { .. } | Section::Main => {
                        self.parse_op(&mut builder, line, &tokens)?;
                    }
                },
            }
        }
        self.close_section(&mut builder, &section);
        Ok(builder.finish()?)
    }

    fn close_section(&self, builder: &mut LayerBuilder, section: &Section) {
        if let Section::SymbolInit { sym, begin } = section {
            let end = builder.next_op_index();
            let symbol = builder.symbol_mut(*sym);
            symbol.init_ops = Some(*begin..end);
        }
    }

    fn lookup(&self, name: &str, line: usize) -> Result<SymbolId, ParseError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ParseError::UnknownSymbol {
                line,
                name: name.to_string(),
            })
    }

    fn parse_decl(
        &mut self,
        builder: &mut LayerBuilder,
        line: usize,
        tokens: &[&str],
    ) -> Result<(), ParseError> {
        let [class, ty, name, flags @ ..] = tokens else {
            return Err(ParseError::MalformedDecl { line });
        };
        let class = parse_class(class).ok_or_else(|| ParseError::UnknownClass {
            line,
            class: class.to_string(),
        })?;
        let ty = parse_type(ty).ok_or_else(|| ParseError::UnknownType {
            line,
            ty: ty.to_string(),
        })?;

        let mut symbol = Symbol::new(*name, class, ty);
        for flag in flags {
            match *flag {
                "connected" => {
                    symbol.connected = true;
                    symbol.value_source = ValueSource::Connected;
                }
                "connected_down" => symbol.connected_down = true,
                "everread" => symbol.everread = true,
                "renderer_output" => symbol.renderer_output = true,
                "derivs" => symbol.has_derivs = true,
                "unlockgeom" => symbol.lockgeom = false,
                "instance_value" => symbol.value_source = ValueSource::Instance,
                "geom_value" => symbol.value_source = ValueSource::Geom,
                _ => {
                    return Err(ParseError::UnknownFlag {
                        line,
                        flag: flag.to_string(),
                    });
                }
            }
        }

        if self.by_name.contains_key(*name) {
            return Err(ParseError::DuplicateSymbol {
                line,
                name: name.to_string(),
            });
        }
        let id = builder.add_symbol(symbol);
        self.by_name.insert(name.to_string(), id);
        Ok(())
    }

    fn parse_op(
        &mut self,
        builder: &mut LayerBuilder,
        line: usize,
        tokens: &[&str],
    ) -> Result<(), ParseError> {
        let Some((name, operands)) = tokens.split_first() else {
            // Blank lines are filtered out before dispatch.
            return Ok(());
        };
        let kind = OpKind::from_name(name);
        let jumps = jump_count(kind);
        if operands.len() < jumps {
            return Err(ParseError::MalformedJumps {
                line,
                name: name.to_string(),
                expected: jumps,
            });
        }
        let (sym_tokens, jump_tokens) = operands.split_at(operands.len() - jumps);

        let mut targets = Vec::with_capacity(jumps);
        for token in jump_tokens {
            let target: usize = token.parse().map_err(|_| ParseError::MalformedJumps {
                line,
                name: name.to_string(),
                expected: jumps,
            })?;
            targets.push(target);
        }

        let mut args = Vec::with_capacity(sym_tokens.len());
        for (index, token) in sym_tokens.iter().enumerate() {
            let sym = self.lookup(token, line)?;
            let (read, write) = arg_access(kind, index);
            args.push(OpArg { sym, read, write });
        }

        if targets.is_empty() {
            builder.push_op(*name, args);
        } else {
            builder.push_branch_op(*name, args, &targets);
        }
        Ok(())
    }
}

fn parse_class(token: &str) -> Option<SymbolClass> {
    Some(match token {
        "global" => SymbolClass::Global,
        "param" => SymbolClass::Param,
        "oparam" => SymbolClass::OutputParam,
        "local" => SymbolClass::Local,
        "temp" => SymbolClass::Temp,
        "const" => SymbolClass::Const,
        _ => return None,
    })
}

fn parse_type(token: &str) -> Option<TypeDesc> {
    let (elem, array_len) = match token.split_once('[') {
        Some((elem, rest)) => {
            let len: u32 = rest.strip_suffix(']')?.parse().ok()?;
            (elem, Some(len))
        }
        None => (token, None),
    };
    let elem = match elem {
        "float" => ElemKind::Float,
        "int" => ElemKind::Int,
        "string" => ElemKind::String,
        "vec3" => ElemKind::Vec3,
        "matrix44" => ElemKind::Matrix44,
        "closure" => ElemKind::Closure,
        "ptr" => ElemKind::Ptr,
        "longlong" => ElemKind::LongLong,
        _ => return None,
    };
    Some(TypeDesc { elem, array_len })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_shader() {
        let layer = parse(
            "shader tiny\n\
             global vec3 P\n\
             local float x\n\
             code main\n\
             assign x P\n\
             end\n",
        )
        .unwrap();
        assert_eq!(layer.name(), "tiny");
        assert_eq!(layer.op_count(), 1);
        assert_eq!(layer.main_code_begin(), 0);
        let op = layer.op(0);
        assert_eq!(op.name(), "assign");
        assert!(op.args()[0].write);
        assert!(op.args()[1].read);
        assert_eq!(layer.symbol(op.args()[1].sym).name, "P");
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let layer = parse(
            "# a checker shader\n\
             shader commented\n\
             \n\
             local float x   # the accumulator\n\
             const float $c0\n\
             code main\n\
             assign x $c0\n",
        )
        .unwrap();
        assert_eq!(layer.op_count(), 1);
    }

    #[test]
    fn decl_flags_are_applied() {
        let layer = parse(
            "shader flags\n\
             param float angle connected everread\n\
             param float scale unlockgeom\n\
             oparam vec3 Cout renderer_output\n\
             code main\n",
        )
        .unwrap();
        let angle = layer.symbol(layer.find_symbol("angle").unwrap());
        assert!(angle.connected);
        assert!(angle.everread);
        assert_eq!(angle.value_source, ValueSource::Connected);
        let scale = layer.symbol(layer.find_symbol("scale").unwrap());
        assert!(!scale.lockgeom);
        let cout = layer.symbol(layer.find_symbol("Cout").unwrap());
        assert!(cout.renderer_output);
        assert_eq!(cout.class, SymbolClass::OutputParam);
    }

    #[test]
    fn array_types() {
        let layer = parse(
            "shader arrays\n\
             local float[4] knots\n\
             code main\n",
        )
        .unwrap();
        let knots = layer.symbol(layer.find_symbol("knots").unwrap());
        assert_eq!(knots.ty.array_len, Some(4));
        assert_eq!(knots.ty.elem, ElemKind::Float);
    }

    #[test]
    fn control_ops_take_trailing_jump_targets() {
        let layer = parse(
            "shader branchy\n\
             global float u\n\
             temp float cond\n\
             const float $c0\n\
             local float x\n\
             code main\n\
             lt cond u $c0\n\
             if cond 3 4\n\
             assign x $c0\n\
             assign x u\n",
        )
        .unwrap();
        let if_op = layer.op(1);
        assert_eq!(if_op.kind(), OpKind::If);
        assert_eq!(if_op.jump(0), Some(3));
        assert_eq!(if_op.jump(1), Some(4));
        assert!(if_op.args()[0].read);
        assert!(!if_op.args()[0].write);
    }

    #[test]
    fn init_sections_set_init_ranges() {
        let layer = parse(
            "shader inits\n\
             global vec3 P\n\
             param float angle everread\n\
             local float x\n\
             code angle\n\
             assign angle P\n\
             code main\n\
             assign x angle\n",
        )
        .unwrap();
        let angle = layer.symbol(layer.find_symbol("angle").unwrap());
        assert_eq!(angle.init_ops, Some(0..1));
        assert_eq!(layer.main_code_begin(), 1);
        assert_eq!(layer.main_code_end(), 2);
    }

    #[test]
    fn missing_header_is_rejected() {
        assert!(matches!(
            parse("local float x\n"),
            Err(ParseError::MissingHeader { .. })
        ));
        assert!(matches!(parse(""), Err(ParseError::MissingHeader { .. })));
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let err = parse(
            "shader bad\n\
             code main\n\
             assign x y\n",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::UnknownSymbol { line: 3, .. }));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = parse(
            "shader bad\n\
             param float angle sparkly\n",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::UnknownFlag { line: 2, .. }));
    }

    #[test]
    fn duplicate_symbol_is_rejected() {
        let err = parse(
            "shader bad\n\
             local float x\n\
             local float x\n",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::DuplicateSymbol { .. }));
    }

    #[test]
    fn short_jump_list_is_rejected() {
        let err = parse(
            "shader bad\n\
             temp float cond\n\
             code main\n\
             for cond 2 3\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::MalformedJumps { expected: 4, .. }
        ));
    }

    #[test]
    fn out_of_range_jump_is_rejected() {
        let err = parse(
            "shader bad\n\
             temp float cond\n\
             code main\n\
             if cond 1 99\n",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Ir(IrError::JumpOutOfRange { .. })));
    }
}
