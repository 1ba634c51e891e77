// ABOUTME: Intermediate representation produced by the lowerer and consumed by the emitter

use crate::ast::{LiteralValue, Position};

/// A single IR node: a kind plus the source position it originated from.
///
/// Nodes are built by the lowerer and never mutated afterward, except by
/// the optimizer which produces rewritten copies. The emitter walks them
/// read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct IrNode {
    pub kind: IrKind,
    pub pos: Position,
}

impl IrNode {
    pub fn new(kind: IrKind, pos: Position) -> Self {
        IrNode { kind, pos }
    }

    pub fn ident(name: impl Into<String>, pos: Position) -> Self {
        IrNode::new(
            IrKind::Identifier {
                name: name.into(),
                original: None,
                ty: None,
            },
            pos,
        )
    }

    /// Identifier that was renamed from `original` (hyphens to underscores
    /// and the like); the original spelling feeds source-map names.
    pub fn renamed_ident(name: impl Into<String>, original: impl Into<String>, pos: Position) -> Self {
        IrNode::new(
            IrKind::Identifier {
                name: name.into(),
                original: Some(original.into()),
                ty: None,
            },
            pos,
        )
    }

    pub fn string(value: impl Into<String>, pos: Position) -> Self {
        IrNode::new(IrKind::StringLit(value.into()), pos)
    }

    pub fn number(value: f64, pos: Position) -> Self {
        IrNode::new(IrKind::NumberLit(value), pos)
    }

    pub fn bool(value: bool, pos: Position) -> Self {
        IrNode::new(IrKind::BoolLit(value), pos)
    }

    pub fn null(pos: Position) -> Self {
        IrNode::new(IrKind::NullLit, pos)
    }

    pub fn block(stmts: Vec<IrNode>, pos: Position) -> Self {
        IrNode::new(IrKind::Block(stmts), pos)
    }

    pub fn call(callee: IrNode, args: Vec<IrNode>, pos: Position) -> Self {
        IrNode::new(
            IrKind::Call {
                callee: Box::new(callee),
                args,
            },
            pos,
        )
    }

    pub fn identifier_name(&self) -> Option<&str> {
        match &self.kind {
            IrKind::Identifier { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Stable tag used by CodeGen diagnostics
    pub fn variant_name(&self) -> &'static str {
        self.kind.variant_name()
    }

    pub fn is_declaration(&self) -> bool {
        matches!(
            self.kind,
            IrKind::VariableDecl { .. }
                | IrKind::FunctionDecl { .. }
                | IrKind::FnDecl { .. }
                | IrKind::ClassDecl { .. }
                | IrKind::EnumDecl { .. }
                | IrKind::TypeAlias { .. }
                | IrKind::InterfaceDecl { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Let,
    Const,
    Var,
}

impl VarKind {
    pub fn keyword(self) -> &'static str {
        match self {
            VarKind::Let => "let",
            VarKind::Const => "const",
            VarKind::Var => "var",
        }
    }
}

/// Ordinary function parameter (possibly a pattern)
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub pattern: IrNode,
    pub ty: Option<TypeExpr>,
    pub default: Option<IrNode>,
}

/// Object literal property key
#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    /// Named key; emits quoted when not a valid identifier
    Ident(String),
    /// `[expr]: value`
    Computed(IrNode),
}

/// Object literal property
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectProp {
    KeyValue { key: PropKey, value: IrNode },
    Shorthand(IrNode),
    Spread(IrNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPatternProp {
    pub key: String,
    /// Binding target; equals the key for shorthand patterns
    pub value: IrNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Getter,
    Setter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassField {
    pub name: String,
    pub value: Option<IrNode>,
    pub is_static: bool,
    pub ty: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMethod {
    pub name: String,
    pub kind: MethodKind,
    pub params: Vec<Param>,
    pub body: IrNode,
    pub is_static: bool,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassCtor {
    pub params: Vec<Param>,
    pub body: Box<IrNode>,
}

/// Enum case; `fields` present means the case carries associated values
/// and the whole enum lowers to a class with static factories.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariant {
    pub name: String,
    pub value: Option<IrNode>,
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// None is the `default` case
    pub test: Option<IrNode>,
    pub body: Vec<IrNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<Box<IrNode>>,
    pub body: Box<IrNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpecifier {
    pub imported: String,
    pub local: String,
}

/// The IR sum type. Grouped: literals, identifier, expressions,
/// statements, declarations, import/export, patterns, interop.
#[derive(Debug, Clone, PartialEq)]
pub enum IrKind {
    // ===== Literals =====
    StringLit(String),
    NumberLit(f64),
    BigIntLit(String),
    BoolLit(bool),
    NullLit,
    /// `quasis` has exactly one more element than `exprs`
    TemplateLit {
        quasis: Vec<String>,
        exprs: Vec<IrNode>,
    },

    // ===== Identifier =====
    Identifier {
        name: String,
        original: Option<String>,
        ty: Option<TypeExpr>,
    },

    // ===== Expressions =====
    Binary {
        op: &'static str,
        left: Box<IrNode>,
        right: Box<IrNode>,
    },
    Unary {
        op: &'static str,
        operand: Box<IrNode>,
    },
    Logical {
        op: &'static str,
        left: Box<IrNode>,
        right: Box<IrNode>,
    },
    Conditional {
        test: Box<IrNode>,
        consequent: Box<IrNode>,
        alternate: Box<IrNode>,
    },
    Call {
        callee: Box<IrNode>,
        args: Vec<IrNode>,
    },
    OptionalCall {
        callee: Box<IrNode>,
        args: Vec<IrNode>,
    },
    Member {
        object: Box<IrNode>,
        /// Property name for dot access; any expression when `computed`
        property: Box<IrNode>,
        computed: bool,
        optional: bool,
    },
    New {
        callee: Box<IrNode>,
        args: Vec<IrNode>,
    },
    ArrayLit(Vec<IrNode>),
    /// Comma operator
    Sequence(Vec<IrNode>),
    ObjectLit(Vec<ObjectProp>),
    Function {
        name: Option<String>,
        params: Vec<Param>,
        body: Box<IrNode>,
        /// Body syntactically contains `this`; such functions must not
        /// emit as arrows
        uses_this: bool,
        is_async: bool,
        is_generator: bool,
        return_type: Option<TypeExpr>,
    },
    Assignment {
        op: &'static str,
        target: Box<IrNode>,
        value: Box<IrNode>,
    },
    Await(Box<IrNode>),
    Yield {
        argument: Option<Box<IrNode>>,
        delegate: bool,
    },
    Spread(Box<IrNode>),

    // ===== Statements =====
    ExprStmt(Box<IrNode>),
    Block(Vec<IrNode>),
    Return(Option<Box<IrNode>>),
    If {
        test: Box<IrNode>,
        consequent: Box<IrNode>,
        alternate: Option<Box<IrNode>>,
    },
    While {
        test: Box<IrNode>,
        body: Box<IrNode>,
    },
    For {
        init: Option<Box<IrNode>>,
        test: Option<Box<IrNode>>,
        update: Option<Box<IrNode>>,
        body: Box<IrNode>,
    },
    ForOf {
        kind: VarKind,
        binding: Box<IrNode>,
        iterable: Box<IrNode>,
        body: Box<IrNode>,
    },
    Switch {
        discriminant: Box<IrNode>,
        cases: Vec<SwitchCase>,
    },
    Labeled {
        label: String,
        body: Box<IrNode>,
    },
    Throw(Box<IrNode>),
    Try {
        block: Box<IrNode>,
        handler: Option<CatchClause>,
        finalizer: Option<Box<IrNode>>,
    },
    Continue(Option<String>),
    Break(Option<String>),

    // ===== Declarations =====
    VariableDecl {
        kind: VarKind,
        name: Box<IrNode>,
        ty: Option<TypeExpr>,
        init: Option<Box<IrNode>>,
    },
    FunctionDecl {
        name: String,
        params: Vec<Param>,
        body: Box<IrNode>,
        is_async: bool,
        return_type: Option<TypeExpr>,
    },
    /// User `fn` with parameter defaults; `json_params` means callers pass
    /// a single keyword-style options object
    FnDecl {
        name: String,
        params: Vec<Param>,
        json_params: bool,
        body: Box<IrNode>,
        is_async: bool,
        return_type: Option<TypeExpr>,
    },
    ClassDecl {
        name: String,
        superclass: Option<Box<IrNode>>,
        fields: Vec<ClassField>,
        ctor: Option<ClassCtor>,
        methods: Vec<ClassMethod>,
    },
    EnumDecl {
        name: String,
        variants: Vec<EnumVariant>,
    },
    TypeAlias {
        name: String,
        type_params: Vec<String>,
        ty: TypeExpr,
    },
    InterfaceDecl {
        name: String,
        type_params: Vec<String>,
        extends: Vec<TypeExpr>,
        members: Vec<InterfaceMember>,
    },

    // ===== Import / Export =====
    Import {
        specifiers: Vec<ImportSpecifier>,
        namespace: Option<String>,
        source: String,
    },
    DynamicImport(Box<IrNode>),
    /// `export { a, b as c }`
    ExportNamed(Vec<(String, Option<String>)>),
    /// `export <decl>`
    ExportDecl(Box<IrNode>),
    /// `(export "name" expr)` — bind `value` and export it as `name`
    ExportBinding {
        name: String,
        value: Box<IrNode>,
    },

    // ===== Patterns =====
    ArrayPattern(Vec<IrNode>),
    ObjectPattern {
        props: Vec<ObjectPatternProp>,
        rest: Option<Box<IrNode>>,
    },
    RestElement(Box<IrNode>),
    AssignmentPattern {
        target: Box<IrNode>,
        default: Box<IrNode>,
    },

    // ===== Interop =====
    /// Property that may be a value or a zero-arg method; emits the
    /// two-path IIFE evaluating the receiver exactly once
    InteropGet {
        object: Box<IrNode>,
        property: String,
    },
    /// Method resolution through the dynamic-call helper
    InteropCall {
        object: Box<IrNode>,
        method: String,
        args: Vec<IrNode>,
    },

    /// Internal passthrough for staged rewrites; must never reach emission
    Raw(String),
}

impl IrKind {
    pub fn variant_name(&self) -> &'static str {
        match self {
            IrKind::StringLit(_) => "StringLit",
            IrKind::NumberLit(_) => "NumberLit",
            IrKind::BigIntLit(_) => "BigIntLit",
            IrKind::BoolLit(_) => "BoolLit",
            IrKind::NullLit => "NullLit",
            IrKind::TemplateLit { .. } => "TemplateLit",
            IrKind::Identifier { .. } => "Identifier",
            IrKind::Binary { .. } => "Binary",
            IrKind::Unary { .. } => "Unary",
            IrKind::Logical { .. } => "Logical",
            IrKind::Conditional { .. } => "Conditional",
            IrKind::Call { .. } => "Call",
            IrKind::OptionalCall { .. } => "OptionalCall",
            IrKind::Member { .. } => "Member",
            IrKind::New { .. } => "New",
            IrKind::ArrayLit(_) => "ArrayLit",
            IrKind::Sequence(_) => "Sequence",
            IrKind::ObjectLit(_) => "ObjectLit",
            IrKind::Function { .. } => "Function",
            IrKind::Assignment { .. } => "Assignment",
            IrKind::Await(_) => "Await",
            IrKind::Yield { .. } => "Yield",
            IrKind::Spread(_) => "Spread",
            IrKind::ExprStmt(_) => "ExprStmt",
            IrKind::Block(_) => "Block",
            IrKind::Return(_) => "Return",
            IrKind::If { .. } => "If",
            IrKind::While { .. } => "While",
            IrKind::For { .. } => "For",
            IrKind::ForOf { .. } => "ForOf",
            IrKind::Switch { .. } => "Switch",
            IrKind::Labeled { .. } => "Labeled",
            IrKind::Throw(_) => "Throw",
            IrKind::Try { .. } => "Try",
            IrKind::Continue(_) => "Continue",
            IrKind::Break(_) => "Break",
            IrKind::VariableDecl { .. } => "VariableDecl",
            IrKind::FunctionDecl { .. } => "FunctionDecl",
            IrKind::FnDecl { .. } => "FnDecl",
            IrKind::ClassDecl { .. } => "ClassDecl",
            IrKind::EnumDecl { .. } => "EnumDecl",
            IrKind::TypeAlias { .. } => "TypeAlias",
            IrKind::InterfaceDecl { .. } => "InterfaceDecl",
            IrKind::Import { .. } => "Import",
            IrKind::DynamicImport(_) => "DynamicImport",
            IrKind::ExportNamed(_) => "ExportNamed",
            IrKind::ExportDecl(_) => "ExportDecl",
            IrKind::ExportBinding { .. } => "ExportBinding",
            IrKind::ArrayPattern(_) => "ArrayPattern",
            IrKind::ObjectPattern { .. } => "ObjectPattern",
            IrKind::RestElement(_) => "RestElement",
            IrKind::AssignmentPattern { .. } => "AssignmentPattern",
            IrKind::InteropGet { .. } => "InteropGet",
            IrKind::InteropCall { .. } => "InteropCall",
            IrKind::Raw(_) => "Raw",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceMember {
    pub name: String,
    pub ty: TypeExpr,
    pub optional: bool,
}

/// Type expressions. Erased from runtime output; emitted only in
/// annotation positions.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Ref {
        name: String,
        args: Vec<TypeExpr>,
    },
    Union(Vec<TypeExpr>),
    Intersection(Vec<TypeExpr>),
    Keyof(Box<TypeExpr>),
    IndexedAccess {
        object: Box<TypeExpr>,
        index: Box<TypeExpr>,
    },
    Conditional {
        check: Box<TypeExpr>,
        extends: Box<TypeExpr>,
        then_ty: Box<TypeExpr>,
        else_ty: Box<TypeExpr>,
    },
    Mapped {
        key: String,
        constraint: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    Tuple(Vec<TypeExpr>),
    Array(Box<TypeExpr>),
    Function {
        params: Vec<(String, TypeExpr)>,
        ret: Box<TypeExpr>,
    },
    Infer(String),
    Readonly(Box<TypeExpr>),
    Typeof(String),
    Literal(LiteralValue),
    Rest(Box<TypeExpr>),
    Optional(Box<TypeExpr>),
}

impl TypeExpr {
    pub fn any() -> TypeExpr {
        TypeExpr::Ref {
            name: "any".to_string(),
            args: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pos() -> Position {
        Position::new(Arc::from("t.quill"), 1, 1)
    }

    #[test]
    fn test_variant_names_for_diagnostics() {
        let raw = IrNode::new(IrKind::Raw("x".into()), pos());
        assert_eq!(raw.variant_name(), "Raw");
        let id = IrNode::ident("x", pos());
        assert_eq!(id.variant_name(), "Identifier");
    }

    #[test]
    fn test_renamed_identifier_keeps_original() {
        let id = IrNode::renamed_ident("my_fn", "my-fn", pos());
        match id.kind {
            IrKind::Identifier { name, original, .. } => {
                assert_eq!(name, "my_fn");
                assert_eq!(original.as_deref(), Some("my-fn"));
            }
            _ => panic!("expected identifier"),
        }
    }

    #[test]
    fn test_is_declaration() {
        let decl = IrNode::new(
            IrKind::VariableDecl {
                kind: VarKind::Let,
                name: Box::new(IrNode::ident("x", pos())),
                ty: None,
                init: Some(Box::new(IrNode::number(1.0, pos()))),
            },
            pos(),
        );
        assert!(decl.is_declaration());
        assert!(!IrNode::number(1.0, pos()).is_declaration());
    }

    #[test]
    fn test_var_kind_keywords() {
        assert_eq!(VarKind::Let.keyword(), "let");
        assert_eq!(VarKind::Const.keyword(), "const");
        assert_eq!(VarKind::Var.keyword(), "var");
    }
}
