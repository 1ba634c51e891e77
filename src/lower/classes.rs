// ABOUTME: Lowering of class and enum declaration forms

use crate::ast::{Ast, Position};
use crate::error::Diagnostic;
use crate::ir::{
    ClassCtor, ClassField, ClassMethod, EnumVariant, IrKind, IrNode, MethodKind,
};
use super::{ts_name, Lowerer, Slot};

impl Lowerer {
    /// `(class Name extends Super? members…)` where members are
    /// `(field name value?)`, `(constructor [params] body…)`,
    /// `(method name [params] body…)`, `(get name [] …)`,
    /// `(set name [v] …)`, each optionally wrapped in `(static …)`.
    pub(crate) fn lower_class(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        let name = args
            .first()
            .and_then(|a| a.as_symbol())
            .ok_or_else(|| Diagnostic::lower("class: expected a name", pos.clone()))?;

        let mut rest = &args[1..];
        let mut superclass = None;
        if rest.first().and_then(|a| a.as_symbol()) == Some("extends") {
            let sup = rest
                .get(1)
                .ok_or_else(|| Diagnostic::lower("class: expected a superclass after extends", pos.clone()))?;
            superclass = Some(Box::new(self.lower(sup, Slot::Expr)?));
            rest = &rest[2..];
        }

        let mut fields = Vec::new();
        let mut ctor = None;
        let mut methods = Vec::new();

        for member in rest {
            self.lower_class_member(member, false, &mut fields, &mut ctor, &mut methods)?;
        }

        Ok(IrNode::new(
            IrKind::ClassDecl {
                name: ts_name(name),
                superclass,
                fields,
                ctor,
                methods,
            },
            pos.clone(),
        ))
    }

    fn lower_class_member(
        &mut self,
        member: &Ast,
        is_static: bool,
        fields: &mut Vec<ClassField>,
        ctor: &mut Option<ClassCtor>,
        methods: &mut Vec<ClassMethod>,
    ) -> Result<(), Diagnostic> {
        let items = member.as_list().ok_or_else(|| {
            Diagnostic::lower("class member must be a form", member.pos().clone())
        })?;
        let head = items
            .first()
            .and_then(|h| h.as_symbol())
            .ok_or_else(|| Diagnostic::lower("class member must start with a keyword", member.pos().clone()))?;

        match head {
            "static" => {
                let inner = items.get(1).ok_or_else(|| {
                    Diagnostic::lower("static: expected a wrapped member", member.pos().clone())
                })?;
                self.lower_class_member(inner, true, fields, ctor, methods)
            }
            "field" => {
                let raw = items.get(1).and_then(|a| a.as_symbol()).ok_or_else(|| {
                    Diagnostic::lower("field: expected a name", member.pos().clone())
                })?;
                let (name, ty, value_idx) = match raw.strip_suffix(':') {
                    Some(stripped) => {
                        let ty_form = items.get(2).ok_or_else(|| {
                            Diagnostic::lower("field: expected a type", member.pos().clone())
                        })?;
                        (stripped, Some(self.lower_type_expr(ty_form)?), 3)
                    }
                    None => (raw, None, 2),
                };
                let value = match items.get(value_idx) {
                    Some(v) => Some(self.lower(v, Slot::Expr)?),
                    None => None,
                };
                fields.push(ClassField {
                    name: ts_name(name),
                    value,
                    is_static,
                    ty,
                });
                Ok(())
            }
            "constructor" => {
                if is_static {
                    return Err(Diagnostic::lower(
                        "constructor cannot be static",
                        member.pos().clone(),
                    ));
                }
                let params_form = items.get(1).ok_or_else(|| {
                    Diagnostic::lower("constructor: expected parameters", member.pos().clone())
                })?;
                let (params, _) = self.lower_class_params(params_form)?;
                let body = self.stmt_body(&items[2..], member.pos())?;
                *ctor = Some(ClassCtor { params, body: Box::new(body) });
                Ok(())
            }
            "method" | "get" | "set" => {
                let kind = match head {
                    "get" => MethodKind::Getter,
                    "set" => MethodKind::Setter,
                    _ => MethodKind::Method,
                };
                let name = items.get(1).and_then(|a| a.as_symbol()).ok_or_else(|| {
                    Diagnostic::lower(format!("{}: expected a name", head), member.pos().clone())
                })?;
                let params_form = items.get(2).ok_or_else(|| {
                    Diagnostic::lower(format!("{}: expected parameters", head), member.pos().clone())
                })?;
                let (params, _) = self.lower_class_params(params_form)?;
                let body = match kind {
                    // Getters return their final value; setters do not
                    MethodKind::Setter => self.stmt_body(&items[3..], member.pos())?,
                    _ => self.body_block(&items[3..], member.pos())?,
                };
                methods.push(ClassMethod {
                    name: ts_name(name),
                    kind,
                    params,
                    body,
                    is_static,
                    is_async: false,
                });
                Ok(())
            }
            "async" => {
                // `(async (method …))`
                let inner = items.get(1).and_then(|a| a.as_list()).ok_or_else(|| {
                    Diagnostic::lower("async: expected a wrapped method", member.pos().clone())
                })?;
                let before = methods.len();
                self.lower_class_member(items.get(1).expect("checked above"), is_static, fields, ctor, methods)?;
                if methods.len() == before {
                    return Err(Diagnostic::lower(
                        "async: only methods can be async",
                        inner[0].pos().clone(),
                    ));
                }
                if let Some(last) = methods.last_mut() {
                    last.is_async = true;
                }
                Ok(())
            }
            other => Err(Diagnostic::lower(
                format!("unknown class member form: {}", other),
                member.pos().clone(),
            )),
        }
    }

    fn lower_class_params(
        &mut self,
        ast: &Ast,
    ) -> Result<(Vec<crate::ir::Param>, bool), Diagnostic> {
        self.lower_params(ast)
    }

    fn stmt_body(&mut self, forms: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        let stmts: Result<Vec<IrNode>, Diagnostic> =
            forms.iter().map(|a| self.lower(a, Slot::Stmt)).collect();
        Ok(IrNode::block(stmts?, pos.clone()))
    }

    /// `(enum Name Case…)` where a case is a bare symbol, `(Name value)`,
    /// or `(Name [field…])` for associated values
    pub(crate) fn lower_enum(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        let name = args
            .first()
            .and_then(|a| a.as_symbol())
            .ok_or_else(|| Diagnostic::lower("enum: expected a name", pos.clone()))?;

        let mut variants = Vec::new();
        for case in &args[1..] {
            match case {
                Ast::Symbol(s) => variants.push(EnumVariant {
                    name: ts_name(&s.name),
                    value: None,
                    fields: None,
                }),
                Ast::List(l) => {
                    let case_name = l
                        .items
                        .first()
                        .and_then(|a| a.as_symbol())
                        .ok_or_else(|| Diagnostic::lower("enum case: expected a name", l.pos.clone()))?;
                    match l.items.get(1) {
                        Some(Ast::Vector(fields_vec)) => {
                            let field_names: Result<Vec<String>, Diagnostic> = fields_vec
                                .items
                                .iter()
                                .map(|f| {
                                    f.as_symbol().map(ts_name).ok_or_else(|| {
                                        Diagnostic::lower(
                                            "enum case field must be a symbol",
                                            f.pos().clone(),
                                        )
                                    })
                                })
                                .collect();
                            variants.push(EnumVariant {
                                name: ts_name(case_name),
                                value: None,
                                fields: Some(field_names?),
                            });
                        }
                        Some(value) => {
                            let lowered = self.lower(value, Slot::Expr)?;
                            variants.push(EnumVariant {
                                name: ts_name(case_name),
                                value: Some(lowered),
                                fields: None,
                            });
                        }
                        None => variants.push(EnumVariant {
                            name: ts_name(case_name),
                            value: None,
                            fields: None,
                        }),
                    }
                }
                other => {
                    return Err(Diagnostic::lower(
                        format!("enum case must be a symbol or form, got {}", other.kind_name()),
                        other.pos().clone(),
                    ));
                }
            }
        }

        if variants.is_empty() {
            return Err(Diagnostic::lower("enum: expected at least one case", pos.clone()));
        }

        Ok(IrNode::new(
            IrKind::EnumDecl {
                name: ts_name(name),
                variants,
            },
            pos.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::lower_str;
    use crate::ir::{IrKind, MethodKind};

    #[test]
    fn test_class_with_members() {
        let m = lower_str(
            "(class Point
               (field x 0)
               (field y 0)
               (constructor [x y] (set! this.x x) (set! this.y y))
               (method dist [] (+ this.x this.y))
               (static (method origin [] (new Point 0 0))))",
        );
        match &m.body[0].kind {
            IrKind::ClassDecl { name, fields, ctor, methods, superclass } => {
                assert_eq!(name, "Point");
                assert_eq!(fields.len(), 2);
                assert!(ctor.is_some());
                assert_eq!(methods.len(), 2);
                assert!(methods[1].is_static);
                assert!(superclass.is_none());
            }
            other => panic!("expected class decl, got {:?}", other),
        }
    }

    #[test]
    fn test_class_extends() {
        let m = lower_str("(class Dog extends Animal (method bark [] \"woof\"))");
        match &m.body[0].kind {
            IrKind::ClassDecl { superclass, .. } => {
                assert_eq!(
                    superclass.as_ref().unwrap().identifier_name(),
                    Some("Animal")
                );
            }
            other => panic!("expected class decl, got {:?}", other),
        }
    }

    #[test]
    fn test_getter_and_setter() {
        let m = lower_str(
            "(class Box
               (field v 0)
               (get value [] this.v)
               (set value [x] (set! this.v x)))",
        );
        match &m.body[0].kind {
            IrKind::ClassDecl { methods, .. } => {
                assert_eq!(methods[0].kind, MethodKind::Getter);
                assert_eq!(methods[1].kind, MethodKind::Setter);
            }
            other => panic!("expected class decl, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_enum() {
        let m = lower_str("(enum Color Red Green Blue)");
        match &m.body[0].kind {
            IrKind::EnumDecl { name, variants } => {
                assert_eq!(name, "Color");
                assert_eq!(variants.len(), 3);
                assert!(variants.iter().all(|v| v.fields.is_none() && v.value.is_none()));
            }
            other => panic!("expected enum decl, got {:?}", other),
        }
    }

    #[test]
    fn test_enum_with_values() {
        let m = lower_str("(enum Status (Active 1) (Inactive 0))");
        match &m.body[0].kind {
            IrKind::EnumDecl { variants, .. } => {
                assert!(variants[0].value.is_some());
            }
            other => panic!("expected enum decl, got {:?}", other),
        }
    }

    #[test]
    fn test_enum_with_associated_values() {
        let m = lower_str("(enum Shape (Circle [radius]) (Rect [w h]))");
        match &m.body[0].kind {
            IrKind::EnumDecl { variants, .. } => {
                assert_eq!(variants[0].fields.as_ref().unwrap(), &vec!["radius".to_string()]);
                assert_eq!(variants[1].fields.as_ref().unwrap().len(), 2);
            }
            other => panic!("expected enum decl, got {:?}", other),
        }
    }
}
