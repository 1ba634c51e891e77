// ABOUTME: Rendering of type expressions into TypeScript annotation syntax

use crate::ast::LiteralValue;
use crate::ir::TypeExpr;

/// Render a type expression. Types never carry runtime semantics, so
/// this is plain text construction with no mapping records.
pub fn render_type(ty: &TypeExpr) -> String {
    render(ty, false)
}

/// `outer_operator` is true inside unions/intersections, where function
/// and conditional types need wrapping
fn render(ty: &TypeExpr, outer_operator: bool) -> String {
    match ty {
        TypeExpr::Ref { name, args } => {
            if args.is_empty() {
                name.clone()
            } else {
                let rendered: Vec<String> = args.iter().map(|a| render(a, false)).collect();
                format!("{}<{}>", name, rendered.join(", "))
            }
        }
        TypeExpr::Union(members) => {
            let rendered: Vec<String> = members.iter().map(|m| render(m, true)).collect();
            let joined = rendered.join(" | ");
            if outer_operator {
                format!("({})", joined)
            } else {
                joined
            }
        }
        TypeExpr::Intersection(members) => {
            let rendered: Vec<String> = members.iter().map(|m| render(m, true)).collect();
            let joined = rendered.join(" & ");
            if outer_operator {
                format!("({})", joined)
            } else {
                joined
            }
        }
        TypeExpr::Keyof(inner) => format!("keyof {}", render(inner, true)),
        TypeExpr::IndexedAccess { object, index } => {
            format!("{}[{}]", render(object, true), render(index, false))
        }
        TypeExpr::Conditional {
            check,
            extends,
            then_ty,
            else_ty,
        } => {
            let text = format!(
                "{} extends {} ? {} : {}",
                render(check, true),
                render(extends, true),
                render(then_ty, false),
                render(else_ty, false)
            );
            if outer_operator {
                format!("({})", text)
            } else {
                text
            }
        }
        TypeExpr::Mapped {
            key,
            constraint,
            value,
        } => format!(
            "{{ [{} in {}]: {} }}",
            key,
            render(constraint, false),
            render(value, false)
        ),
        TypeExpr::Tuple(members) => {
            let rendered: Vec<String> = members.iter().map(|m| render(m, false)).collect();
            format!("[{}]", rendered.join(", "))
        }
        TypeExpr::Array(inner) => {
            let text = render(inner, true);
            // Compound element types need wrapping before []
            if matches!(
                **inner,
                TypeExpr::Union(_)
                    | TypeExpr::Intersection(_)
                    | TypeExpr::Function { .. }
                    | TypeExpr::Conditional { .. }
                    | TypeExpr::Keyof(_)
            ) {
                format!("({})[]", render(inner, false))
            } else {
                format!("{}[]", text)
            }
        }
        TypeExpr::Function { params, ret } => {
            let rendered: Vec<String> = params
                .iter()
                .map(|(name, ty)| format!("{}: {}", name, render(ty, false)))
                .collect();
            let text = format!("({}) => {}", rendered.join(", "), render(ret, false));
            if outer_operator {
                format!("({})", text)
            } else {
                text
            }
        }
        TypeExpr::Infer(name) => format!("infer {}", name),
        TypeExpr::Readonly(inner) => format!("readonly {}", render(inner, true)),
        TypeExpr::Typeof(name) => format!("typeof {}", name),
        TypeExpr::Literal(value) => match value {
            LiteralValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            LiteralValue::BigInt(digits) => format!("{}n", digits),
            LiteralValue::Str(s) => serde_json::to_string(s).expect("string serializes"),
            LiteralValue::Bool(b) => b.to_string(),
            LiteralValue::Nil => "null".to_string(),
        },
        TypeExpr::Rest(inner) => format!("...{}", render(inner, true)),
        TypeExpr::Optional(inner) => format!("{} | undefined", render(inner, true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tref(name: &str) -> TypeExpr {
        TypeExpr::Ref {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    #[test]
    fn test_simple_and_generic_refs() {
        assert_eq!(render_type(&tref("number")), "number");
        assert_eq!(
            render_type(&TypeExpr::Ref {
                name: "Map".to_string(),
                args: vec![tref("string"), tref("number")],
            }),
            "Map<string, number>"
        );
    }

    #[test]
    fn test_union_inside_array_parenthesized() {
        let u = TypeExpr::Union(vec![tref("string"), tref("number")]);
        assert_eq!(render_type(&TypeExpr::Array(Box::new(u))), "(string | number)[]");
        assert_eq!(render_type(&TypeExpr::Array(Box::new(tref("number")))), "number[]");
    }

    #[test]
    fn test_conditional_with_infer() {
        let t = TypeExpr::Conditional {
            check: Box::new(tref("T")),
            extends: Box::new(TypeExpr::Array(Box::new(TypeExpr::Infer("U".to_string())))),
            then_ty: Box::new(tref("U")),
            else_ty: Box::new(tref("never")),
        };
        assert_eq!(render_type(&t), "T extends infer U[] ? U : never");
    }

    #[test]
    fn test_mapped_type() {
        let t = TypeExpr::Mapped {
            key: "K".to_string(),
            constraint: Box::new(TypeExpr::Keyof(Box::new(tref("T")))),
            value: Box::new(tref("boolean")),
        };
        assert_eq!(render_type(&t), "{ [K in keyof T]: boolean }");
    }

    #[test]
    fn test_function_type_in_union_wrapped() {
        let f = TypeExpr::Function {
            params: vec![("arg0".to_string(), tref("number"))],
            ret: Box::new(tref("boolean")),
        };
        let u = TypeExpr::Union(vec![f, tref("null")]);
        assert_eq!(render_type(&u), "((arg0: number) => boolean) | null");
    }

    #[test]
    fn test_literal_types() {
        assert_eq!(
            render_type(&TypeExpr::Literal(LiteralValue::Str("tag".into()))),
            "\"tag\""
        );
        assert_eq!(render_type(&TypeExpr::Literal(LiteralValue::Number(3.0))), "3");
    }

    #[test]
    fn test_tuple_and_indexed() {
        assert_eq!(
            render_type(&TypeExpr::Tuple(vec![tref("A"), tref("B")])),
            "[A, B]"
        );
        assert_eq!(
            render_type(&TypeExpr::IndexedAccess {
                object: Box::new(tref("O")),
                index: Box::new(tref("K")),
            }),
            "O[K]"
        );
    }
}
