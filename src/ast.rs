// ABOUTME: S-expression AST produced by the reader, with source positions on every node

use std::fmt;
use std::sync::Arc;

/// Source location attached to every AST and IR node.
///
/// Lines and columns are 1-based, matching what editors and source maps
/// expect at the diagnostic surface (the source-map encoder converts to
/// 0-based on the way out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(file: Arc<str>, line: u32, column: u32) -> Self {
        Position { file, line, column }
    }

    /// Position for synthesized nodes that have no source counterpart
    pub fn synthetic() -> Self {
        Position {
            file: Arc::from("<synthetic>"),
            line: 0,
            column: 0,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.line == 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Literal values the reader recognizes.
///
/// Big integers keep their digit text: the emitter prints them back out
/// with an `n` suffix and never needs their numeric value.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Number(f64),
    BigInt(String),
    Str(String),
    Bool(bool),
    Nil,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Symbol(SymbolNode),
    Literal(LiteralNode),
    List(ListNode),
    Vector(VectorNode),
}

/// A symbol, optionally tagged by gensym.
///
/// `gensym_id` is set only on symbols minted by the macro expander; the
/// emitter renders tagged symbols with a textually unique suffix so they
/// can never collide with user names.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolNode {
    pub name: String,
    pub pos: Position,
    pub gensym_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralNode {
    pub value: LiteralValue,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListNode {
    pub items: Vec<Ast>,
    pub pos: Position,
}

/// Vectors are semantically distinct from lists: binding forms, parameter
/// lists, and named-import groups are written with `[…]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorNode {
    pub items: Vec<Ast>,
    pub pos: Position,
}

impl Ast {
    pub fn symbol(name: impl Into<String>, pos: Position) -> Ast {
        Ast::Symbol(SymbolNode {
            name: name.into(),
            pos,
            gensym_id: None,
        })
    }

    pub fn literal(value: LiteralValue, pos: Position) -> Ast {
        Ast::Literal(LiteralNode { value, pos })
    }

    pub fn list(items: Vec<Ast>, pos: Position) -> Ast {
        Ast::List(ListNode { items, pos })
    }

    pub fn vector(items: Vec<Ast>, pos: Position) -> Ast {
        Ast::Vector(VectorNode { items, pos })
    }

    pub fn pos(&self) -> &Position {
        match self {
            Ast::Symbol(s) => &s.pos,
            Ast::Literal(l) => &l.pos,
            Ast::List(l) => &l.pos,
            Ast::Vector(v) => &v.pos,
        }
    }

    /// Symbol name if this node is an untagged or tagged symbol
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Ast::Symbol(s) => Some(&s.name),
            _ => None,
        }
    }

    /// True when this is a list whose head is the given symbol
    pub fn is_form(&self, head: &str) -> bool {
        match self {
            Ast::List(l) => l
                .items
                .first()
                .and_then(|h| h.as_symbol())
                .is_some_and(|name| name == head),
            _ => false,
        }
    }

    pub fn as_list(&self) -> Option<&[Ast]> {
        match self {
            Ast::List(l) => Some(&l.items),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Ast]> {
        match self {
            Ast::Vector(v) => Some(&v.items),
            _ => None,
        }
    }

    pub fn as_string_literal(&self) -> Option<&str> {
        match self {
            Ast::Literal(LiteralNode {
                value: LiteralValue::Str(s),
                ..
            }) => Some(s),
            _ => None,
        }
    }

    /// Type-ish name used in diagnostics ("symbol", "list", ...)
    pub fn kind_name(&self) -> &'static str {
        match self {
            Ast::Symbol(_) => "symbol",
            Ast::Literal(l) => match l.value {
                LiteralValue::Number(_) => "number",
                LiteralValue::BigInt(_) => "bigint",
                LiteralValue::Str(_) => "string",
                LiteralValue::Bool(_) => "boolean",
                LiteralValue::Nil => "nil",
            },
            Ast::List(_) => "list",
            Ast::Vector(_) => "vector",
        }
    }
}

// Display prints the canonical reader syntax, not the TypeScript rendition.
// Used by diagnostics and macro-expansion traces.
impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ast::Symbol(s) => match s.gensym_id {
                Some(id) => write!(f, "{}__g{}", s.name, id),
                None => write!(f, "{}", s.name),
            },
            Ast::Literal(l) => match &l.value {
                LiteralValue::Number(n) => {
                    if n.fract() == 0.0 && n.is_finite() {
                        write!(f, "{}", *n as i64)
                    } else {
                        write!(f, "{}", n)
                    }
                }
                LiteralValue::BigInt(digits) => write!(f, "{}n", digits),
                LiteralValue::Str(s) => write!(f, "{:?}", s),
                LiteralValue::Bool(b) => write!(f, "{}", b),
                LiteralValue::Nil => write!(f, "nil"),
            },
            Ast::List(l) => {
                write!(f, "(")?;
                for (i, item) in l.items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Ast::Vector(v) => {
                write!(f, "[")?;
                for (i, item) in v.items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::new(Arc::from("test.quill"), 1, 1)
    }

    #[test]
    fn test_number_display() {
        let whole = Ast::literal(LiteralValue::Number(42.0), pos());
        assert_eq!(format!("{}", whole), "42");

        let frac = Ast::literal(LiteralValue::Number(-2.5), pos());
        assert_eq!(format!("{}", frac), "-2.5");
    }

    #[test]
    fn test_list_display() {
        let inner = Ast::list(
            vec![
                Ast::symbol("+", pos()),
                Ast::literal(LiteralValue::Number(1.0), pos()),
                Ast::literal(LiteralValue::Number(2.0), pos()),
            ],
            pos(),
        );
        assert_eq!(format!("{}", inner), "(+ 1 2)");
    }

    #[test]
    fn test_vector_display_distinct_from_list() {
        let v = Ast::vector(
            vec![Ast::symbol("a", pos()), Ast::symbol("b", pos())],
            pos(),
        );
        assert_eq!(format!("{}", v), "[a b]");
    }

    #[test]
    fn test_gensym_symbol_display() {
        let mut s = SymbolNode {
            name: "tmp".to_string(),
            pos: pos(),
            gensym_id: None,
        };
        s.gensym_id = Some(7);
        assert_eq!(format!("{}", Ast::Symbol(s)), "tmp__g7");
    }

    #[test]
    fn test_is_form() {
        let form = Ast::list(
            vec![Ast::symbol("let", pos()), Ast::symbol("x", pos())],
            pos(),
        );
        assert!(form.is_form("let"));
        assert!(!form.is_form("fn"));
        assert!(!Ast::symbol("let", pos()).is_form("let"));
    }

    #[test]
    fn test_synthetic_position() {
        assert!(Position::synthetic().is_synthetic());
        assert!(!pos().is_synthetic());
    }
}
