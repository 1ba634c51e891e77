// ABOUTME: Diagnostic types for every compilation stage, with positions and exit codes

use crate::ast::Position;
use std::fmt;
use thiserror::Error;

/// Exit code for diagnostics a user can act on
pub const EXIT_DIAGNOSTIC: i32 = 1;
/// Exit code for internal assertions (compiler bugs)
pub const EXIT_INTERNAL: i32 = 2;

/// Stable tag for each diagnostic class, usable by tooling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Parse,
    Macro,
    CyclicMacroImport,
    Resolve,
    Lower,
    CodeGen,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::Parse => "ParseError",
            DiagnosticKind::Macro => "MacroError",
            DiagnosticKind::CyclicMacroImport => "CyclicMacroImport",
            DiagnosticKind::Resolve => "ResolveError",
            DiagnosticKind::Lower => "LowerError",
            DiagnosticKind::CodeGen => "CodeGenError",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug, Clone)]
pub enum Diagnostic {
    /// Malformed source: unbalanced delimiter, bad literal, illegal escape
    #[error("ParseError: {message} at {pos}")]
    Parse { message: String, pos: Position },

    /// Macro expansion failure: bad arity, invalid splice, unknown macro
    #[error("MacroError: {message} at {pos}")]
    Macro { message: String, pos: Position },

    /// An import cycle that contains a macro; carries the whole cycle path
    #[error("CyclicMacroImport: macros cannot be imported across a cycle: {}", cycle.join(" -> "))]
    CyclicMacroImport { cycle: Vec<String> },

    /// Missing file, fetch failure, or unknown package
    #[error("ResolveError: cannot resolve \"{specifier}\": {cause}")]
    Resolve { specifier: String, cause: String },

    /// Structurally ill-formed binding or annotation found while lowering
    #[error("LowerError: {message} at {pos}")]
    Lower { message: String, pos: Position },

    /// The emitter met an IR shape it cannot encode. Always a compiler bug.
    #[error("CodeGenError: internal: {message} (variant {variant})")]
    CodeGen {
        variant: &'static str,
        message: String,
    },
}

impl Diagnostic {
    pub fn parse(message: impl Into<String>, pos: Position) -> Self {
        Diagnostic::Parse {
            message: message.into(),
            pos,
        }
    }

    pub fn macro_error(message: impl Into<String>, pos: Position) -> Self {
        Diagnostic::Macro {
            message: message.into(),
            pos,
        }
    }

    pub fn cyclic_macro_import(cycle: Vec<String>) -> Self {
        Diagnostic::CyclicMacroImport { cycle }
    }

    pub fn resolve(specifier: impl Into<String>, cause: impl Into<String>) -> Self {
        Diagnostic::Resolve {
            specifier: specifier.into(),
            cause: cause.into(),
        }
    }

    pub fn lower(message: impl Into<String>, pos: Position) -> Self {
        Diagnostic::Lower {
            message: message.into(),
            pos,
        }
    }

    pub fn codegen(variant: &'static str, message: impl Into<String>) -> Self {
        Diagnostic::CodeGen {
            variant,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Diagnostic::Parse { .. } => DiagnosticKind::Parse,
            Diagnostic::Macro { .. } => DiagnosticKind::Macro,
            Diagnostic::CyclicMacroImport { .. } => DiagnosticKind::CyclicMacroImport,
            Diagnostic::Resolve { .. } => DiagnosticKind::Resolve,
            Diagnostic::Lower { .. } => DiagnosticKind::Lower,
            Diagnostic::CodeGen { .. } => DiagnosticKind::CodeGen,
        }
    }

    /// Position the diagnostic points at, when it has one
    pub fn position(&self) -> Option<&Position> {
        match self {
            Diagnostic::Parse { pos, .. }
            | Diagnostic::Macro { pos, .. }
            | Diagnostic::Lower { pos, .. } => Some(pos),
            _ => None,
        }
    }

    /// Process exit code: CodeGen failures are internal assertions
    pub fn exit_code(&self) -> i32 {
        match self {
            Diagnostic::CodeGen { .. } => EXIT_INTERNAL,
            _ => EXIT_DIAGNOSTIC,
        }
    }

    /// One-line rendering plus a caret excerpt when the source is on hand
    pub fn render(&self, source: Option<&str>) -> String {
        let mut out = self.to_string();
        if let (Some(pos), Some(text)) = (self.position(), source) {
            if pos.line >= 1 {
                if let Some(line) = text.lines().nth(pos.line as usize - 1) {
                    out.push('\n');
                    out.push_str(line);
                    out.push('\n');
                    for _ in 1..pos.column {
                        out.push(' ');
                    }
                    out.push('^');
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pos(line: u32, column: u32) -> Position {
        Position::new(Arc::from("main.quill"), line, column)
    }

    #[test]
    fn test_parse_error_message_carries_position() {
        let d = Diagnostic::parse("unbalanced delimiter", pos(3, 7));
        assert_eq!(
            d.to_string(),
            "ParseError: unbalanced delimiter at main.quill:3:7"
        );
        assert_eq!(d.kind(), DiagnosticKind::Parse);
        assert_eq!(d.exit_code(), EXIT_DIAGNOSTIC);
    }

    #[test]
    fn test_cyclic_macro_import_names_all_modules() {
        let d = Diagnostic::cyclic_macro_import(vec![
            "a.quill".to_string(),
            "b.quill".to_string(),
            "a.quill".to_string(),
        ]);
        let msg = d.to_string();
        assert!(msg.contains("a.quill -> b.quill -> a.quill"));
        assert_eq!(d.kind(), DiagnosticKind::CyclicMacroImport);
    }

    #[test]
    fn test_codegen_error_is_internal() {
        let d = Diagnostic::codegen("Raw", "raw node reached emission");
        assert_eq!(d.exit_code(), EXIT_INTERNAL);
        assert!(d.to_string().contains("variant Raw"));
    }

    #[test]
    fn test_render_excerpt_points_at_column() {
        let src = "(let x 1)\n(let y\n";
        let d = Diagnostic::parse("unbalanced delimiter", pos(2, 1));
        let rendered = d.render(Some(src));
        assert!(rendered.ends_with("(let y\n^"));
    }
}
