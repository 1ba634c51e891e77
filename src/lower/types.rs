// ABOUTME: Lowering of type aliases, interfaces, and compound type expressions

use crate::ast::{Ast, Position};
use crate::error::Diagnostic;
use crate::ir::{InterfaceMember, IrKind, IrNode, TypeExpr};
use super::{ts_name, Lowerer};

impl Lowerer {
    /// `(type Name T)` or generic `(type (Name A B) T)`
    pub(crate) fn lower_type_alias(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        if args.len() != 2 {
            return Err(Diagnostic::lower(
                "type: expected (type Name T)",
                pos.clone(),
            ));
        }
        let (name, type_params) = self.type_head(&args[0])?;
        let ty = self.lower_type_expr(&args[1])?;
        Ok(IrNode::new(
            IrKind::TypeAlias {
                name,
                type_params,
                ty,
            },
            pos.clone(),
        ))
    }

    /// `(interface Name (extends A B)? (member Type)…)`; a member name
    /// ending in `?` is optional
    pub(crate) fn lower_interface(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        if args.is_empty() {
            return Err(Diagnostic::lower("interface: expected a name", pos.clone()));
        }
        let (name, type_params) = self.type_head(&args[0])?;

        let mut rest = &args[1..];
        let mut extends = Vec::new();
        if rest.first().is_some_and(|a| a.is_form("extends")) {
            let clause = rest[0].as_list().expect("extends form is a list");
            for sup in &clause[1..] {
                extends.push(self.lower_type_expr(sup)?);
            }
            rest = &rest[1..];
        }

        let mut members = Vec::new();
        for member in rest {
            let items = member.as_list().ok_or_else(|| {
                Diagnostic::lower("interface member must be (name Type)", member.pos().clone())
            })?;
            if items.len() != 2 {
                return Err(Diagnostic::lower(
                    "interface member must be (name Type)",
                    member.pos().clone(),
                ));
            }
            let raw = items[0].as_symbol().ok_or_else(|| {
                Diagnostic::lower("interface member name must be a symbol", items[0].pos().clone())
            })?;
            let (member_name, optional) = match raw.strip_suffix('?') {
                Some(stripped) => (stripped, true),
                None => (raw, false),
            };
            let ty = self.lower_type_expr(&items[1])?;
            members.push(InterfaceMember {
                name: ts_name(member_name),
                ty,
                optional,
            });
        }

        Ok(IrNode::new(
            IrKind::InterfaceDecl {
                name,
                type_params,
                extends,
                members,
            },
            pos.clone(),
        ))
    }

    /// Declaration head: `Name` or `(Name A B)` with generic parameters
    fn type_head(&mut self, ast: &Ast) -> Result<(String, Vec<String>), Diagnostic> {
        match ast {
            Ast::Symbol(s) => Ok((ts_name(&s.name), Vec::new())),
            Ast::List(l) => {
                let name = l
                    .items
                    .first()
                    .and_then(|a| a.as_symbol())
                    .ok_or_else(|| Diagnostic::lower("expected a type name", l.pos.clone()))?;
                let params: Result<Vec<String>, Diagnostic> = l.items[1..]
                    .iter()
                    .map(|p| {
                        p.as_symbol().map(ts_name).ok_or_else(|| {
                            Diagnostic::lower("type parameter must be a symbol", p.pos().clone())
                        })
                    })
                    .collect();
                Ok((ts_name(name), params?))
            }
            other => Err(Diagnostic::lower(
                format!("expected a type name, got {}", other.kind_name()),
                other.pos().clone(),
            )),
        }
    }

    /// Compound type expression forms from the surface syntax
    pub(crate) fn lower_type_expr(&mut self, ast: &Ast) -> Result<TypeExpr, Diagnostic> {
        match ast {
            Ast::Symbol(s) => Ok(TypeExpr::Ref {
                name: ts_name(&s.name),
                args: Vec::new(),
            }),
            Ast::Literal(l) => Ok(TypeExpr::Literal(l.value.clone())),
            Ast::Vector(v) => {
                let items: Result<Vec<TypeExpr>, Diagnostic> =
                    v.items.iter().map(|t| self.lower_type_expr(t)).collect();
                Ok(TypeExpr::Tuple(items?))
            }
            Ast::List(l) => {
                let head = l.items.first().and_then(|h| h.as_symbol()).ok_or_else(|| {
                    Diagnostic::lower("malformed type expression", l.pos.clone())
                })?;
                let args = &l.items[1..];
                match head {
                    "|" => {
                        let members: Result<Vec<TypeExpr>, Diagnostic> =
                            args.iter().map(|t| self.lower_type_expr(t)).collect();
                        Ok(TypeExpr::Union(members?))
                    }
                    "&" => {
                        let members: Result<Vec<TypeExpr>, Diagnostic> =
                            args.iter().map(|t| self.lower_type_expr(t)).collect();
                        Ok(TypeExpr::Intersection(members?))
                    }
                    "keyof" => {
                        let inner = self.expect_one_type(args, "keyof", &l.pos)?;
                        Ok(TypeExpr::Keyof(Box::new(inner)))
                    }
                    "indexed" => {
                        if args.len() != 2 {
                            return Err(Diagnostic::lower(
                                "indexed: expected (indexed T K)",
                                l.pos.clone(),
                            ));
                        }
                        Ok(TypeExpr::IndexedAccess {
                            object: Box::new(self.lower_type_expr(&args[0])?),
                            index: Box::new(self.lower_type_expr(&args[1])?),
                        })
                    }
                    "if-extends" => {
                        if args.len() != 4 {
                            return Err(Diagnostic::lower(
                                "if-extends: expected (if-extends T U Then Else)",
                                l.pos.clone(),
                            ));
                        }
                        Ok(TypeExpr::Conditional {
                            check: Box::new(self.lower_type_expr(&args[0])?),
                            extends: Box::new(self.lower_type_expr(&args[1])?),
                            then_ty: Box::new(self.lower_type_expr(&args[2])?),
                            else_ty: Box::new(self.lower_type_expr(&args[3])?),
                        })
                    }
                    "mapped" => {
                        if args.len() != 3 {
                            return Err(Diagnostic::lower(
                                "mapped: expected (mapped K T V)",
                                l.pos.clone(),
                            ));
                        }
                        let key = args[0].as_symbol().map(ts_name).ok_or_else(|| {
                            Diagnostic::lower("mapped: key must be a symbol", args[0].pos().clone())
                        })?;
                        Ok(TypeExpr::Mapped {
                            key,
                            constraint: Box::new(self.lower_type_expr(&args[1])?),
                            value: Box::new(self.lower_type_expr(&args[2])?),
                        })
                    }
                    "tuple" => {
                        let members: Result<Vec<TypeExpr>, Diagnostic> =
                            args.iter().map(|t| self.lower_type_expr(t)).collect();
                        Ok(TypeExpr::Tuple(members?))
                    }
                    "array" => {
                        let inner = self.expect_one_type(args, "array", &l.pos)?;
                        Ok(TypeExpr::Array(Box::new(inner)))
                    }
                    "readonly" => {
                        let inner = self.expect_one_type(args, "readonly", &l.pos)?;
                        Ok(TypeExpr::Readonly(Box::new(inner)))
                    }
                    "typeof" => {
                        let name = args.first().and_then(|a| a.as_symbol()).ok_or_else(|| {
                            Diagnostic::lower("typeof: expected an identifier", l.pos.clone())
                        })?;
                        Ok(TypeExpr::Typeof(ts_name(name)))
                    }
                    "infer" => {
                        let name = args.first().and_then(|a| a.as_symbol()).ok_or_else(|| {
                            Diagnostic::lower("infer: expected a type variable", l.pos.clone())
                        })?;
                        Ok(TypeExpr::Infer(ts_name(name)))
                    }
                    "=>" => {
                        // `(=> [paramTypes…] Ret)`
                        if args.len() != 2 {
                            return Err(Diagnostic::lower(
                                "=>: expected (=> [params…] Ret)",
                                l.pos.clone(),
                            ));
                        }
                        let param_types = args[0].as_vector().ok_or_else(|| {
                            Diagnostic::lower("=>: parameters must be a vector", args[0].pos().clone())
                        })?;
                        let mut params = Vec::with_capacity(param_types.len());
                        for (i, p) in param_types.iter().enumerate() {
                            params.push((format!("arg{}", i), self.lower_type_expr(p)?));
                        }
                        Ok(TypeExpr::Function {
                            params,
                            ret: Box::new(self.lower_type_expr(&args[1])?),
                        })
                    }
                    "..." => {
                        let inner = self.expect_one_type(args, "...", &l.pos)?;
                        Ok(TypeExpr::Rest(Box::new(inner)))
                    }
                    "?" => {
                        let inner = self.expect_one_type(args, "?", &l.pos)?;
                        Ok(TypeExpr::Optional(Box::new(inner)))
                    }
                    // Generic application: `(Map string number)`
                    _ => {
                        let type_args: Result<Vec<TypeExpr>, Diagnostic> =
                            args.iter().map(|t| self.lower_type_expr(t)).collect();
                        Ok(TypeExpr::Ref {
                            name: ts_name(head),
                            args: type_args?,
                        })
                    }
                }
            }
        }
    }

    fn expect_one_type(
        &mut self,
        args: &[Ast],
        who: &str,
        pos: &Position,
    ) -> Result<TypeExpr, Diagnostic> {
        if args.len() != 1 {
            return Err(Diagnostic::lower(
                format!("{}: expected exactly one type", who),
                pos.clone(),
            ));
        }
        self.lower_type_expr(&args[0])
    }
}
