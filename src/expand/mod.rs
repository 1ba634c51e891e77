// ABOUTME: Macro expansion driver: built-in sugar, user macros, hygiene, quasiquote

pub mod env;
pub mod interp;

use crate::ast::{Ast, LiteralValue, Position, SymbolNode};
use crate::config::MACRO_EXPANSION_LIMIT;
use crate::error::Diagnostic;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

pub use env::{MacroDef, MacroEnv};

/// Result of expanding one module: the fully expanded top-level forms and
/// the user macros the module defines (its macro exports).
#[derive(Debug)]
pub struct ModuleExpansion {
    pub forms: Vec<Ast>,
    pub macros: HashMap<String, MacroDef>,
}

/// The expander owns the session gensym counter, so fresh symbols stay
/// unique across every module compiled in one session.
pub struct Expander {
    root: Rc<MacroEnv>,
    counter: u64,
}

impl Default for Expander {
    fn default() -> Self {
        Self::new()
    }
}

impl Expander {
    pub fn new() -> Self {
        let root = MacroEnv::new();
        register_builtin_macros(&root);
        Expander { root, counter: 0 }
    }

    /// Current gensym counter; tests rely on stable ordering in a session
    pub fn gensym_counter(&self) -> u64 {
        self.counter
    }

    /// Mint a fresh tagged symbol that cannot collide with user names
    pub fn fresh(&mut self, prefix: &str, pos: &Position) -> Ast {
        self.counter += 1;
        Ast::Symbol(SymbolNode {
            name: prefix.to_string(),
            pos: pos.clone(),
            gensym_id: Some(self.counter),
        })
    }

    /// Expand a module's top-level forms.
    ///
    /// `imported` carries macro definitions from modules this one
    /// imports; they are visible for the whole expansion. `macro` forms
    /// are consumed here and never reach the lowerer.
    pub fn expand_module(
        &mut self,
        forms: &[Ast],
        imported: &HashMap<String, MacroDef>,
    ) -> Result<ModuleExpansion, Diagnostic> {
        let module_env = MacroEnv::with_parent(self.root.clone());
        for (name, def) in imported {
            module_env.define(name.clone(), def.clone());
        }

        let mut out = Vec::with_capacity(forms.len());
        for form in forms {
            if form.is_form("macro") {
                self.define_user_macro(form, &module_env)?;
                continue;
            }
            out.push(self.expand_form(form, &module_env, 0)?);
        }

        Ok(ModuleExpansion {
            forms: out,
            macros: module_env.local_user_macros(),
        })
    }

    /// Expand a single form to a fixed point
    pub fn expand_form(
        &mut self,
        form: &Ast,
        env: &Rc<MacroEnv>,
        rounds: usize,
    ) -> Result<Ast, Diagnostic> {
        if rounds > MACRO_EXPANSION_LIMIT {
            return Err(Diagnostic::macro_error(
                "macro expansion did not terminate",
                form.pos().clone(),
            ));
        }

        match form {
            Ast::Symbol(_) | Ast::Literal(_) => Ok(form.clone()),
            Ast::Vector(v) => {
                let items: Result<Vec<Ast>, Diagnostic> = v
                    .items
                    .iter()
                    .map(|item| self.expand_form(item, env, rounds))
                    .collect();
                Ok(Ast::vector(items?, v.pos.clone()))
            }
            Ast::List(l) => {
                if l.items.is_empty() {
                    return Ok(form.clone());
                }
                if let Some(head) = l.items[0].as_symbol() {
                    match head {
                        // Quoted data is never expanded
                        "quote" => return Ok(form.clone()),
                        "quasiquote" if l.items.len() == 2 => {
                            let body = self.expand_quasiquote(&l.items[1], 1, env, rounds)?;
                            return Ok(Ast::list(
                                vec![Ast::symbol("quasiquote", l.pos.clone()), body],
                                l.pos.clone(),
                            ));
                        }
                        // A nested macro definition scopes to this form's
                        // surroundings and expands to nothing
                        "macro" => {
                            self.define_user_macro(form, env)?;
                            return Ok(Ast::literal(LiteralValue::Nil, l.pos.clone()));
                        }
                        _ => {
                            if let Some(def) = env.get(head) {
                                let expanded = match def {
                                    MacroDef::Builtin(handler) => {
                                        handler(self, &l.items[1..], &l.pos)?
                                    }
                                    MacroDef::User { params, rest, body } => {
                                        debug!(name = head, "expanding user macro");
                                        self.apply_user_macro(
                                            head, &params, rest.as_deref(), &body, &l.items[1..],
                                            &l.pos,
                                        )?
                                    }
                                };
                                return self.expand_form(&expanded, env, rounds + 1);
                            }
                        }
                    }
                }
                let items: Result<Vec<Ast>, Diagnostic> = l
                    .items
                    .iter()
                    .map(|item| self.expand_form(item, env, rounds))
                    .collect();
                Ok(Ast::list(items?, l.pos.clone()))
            }
        }
    }

    /// Expand macro uses inside unquoted positions of a quasiquote
    fn expand_quasiquote(
        &mut self,
        template: &Ast,
        depth: usize,
        env: &Rc<MacroEnv>,
        rounds: usize,
    ) -> Result<Ast, Diagnostic> {
        match template {
            Ast::List(l) if !l.items.is_empty() => {
                if let Some(head) = l.items[0].as_symbol() {
                    if (head == "unquote" || head == "unquote-splicing") && l.items.len() == 2 {
                        let inner = if depth == 1 {
                            self.expand_form(&l.items[1], env, rounds)?
                        } else {
                            self.expand_quasiquote(&l.items[1], depth - 1, env, rounds)?
                        };
                        return Ok(Ast::list(
                            vec![Ast::symbol(head, l.pos.clone()), inner],
                            l.pos.clone(),
                        ));
                    }
                    if head == "quasiquote" && l.items.len() == 2 {
                        let inner =
                            self.expand_quasiquote(&l.items[1], depth + 1, env, rounds)?;
                        return Ok(Ast::list(
                            vec![Ast::symbol("quasiquote", l.pos.clone()), inner],
                            l.pos.clone(),
                        ));
                    }
                }
                let items: Result<Vec<Ast>, Diagnostic> = l
                    .items
                    .iter()
                    .map(|item| self.expand_quasiquote(item, depth, env, rounds))
                    .collect();
                Ok(Ast::list(items?, l.pos.clone()))
            }
            Ast::Vector(v) => {
                let items: Result<Vec<Ast>, Diagnostic> = v
                    .items
                    .iter()
                    .map(|item| self.expand_quasiquote(item, depth, env, rounds))
                    .collect();
                Ok(Ast::vector(items?, v.pos.clone()))
            }
            _ => Ok(template.clone()),
        }
    }

    /// Register `(macro name (params… [& rest]) body…)`
    fn define_user_macro(&mut self, form: &Ast, env: &Rc<MacroEnv>) -> Result<(), Diagnostic> {
        let items = form.as_list().unwrap_or(&[]);
        let pos = form.pos();
        if items.len() < 3 {
            return Err(Diagnostic::macro_error(
                "macro: expected (macro name (params) body…)",
                pos.clone(),
            ));
        }
        let name = items[1]
            .as_symbol()
            .ok_or_else(|| Diagnostic::macro_error("macro: name must be a symbol", items[1].pos().clone()))?;
        let params_list = match &items[2] {
            Ast::List(l) => &l.items[..],
            Ast::Vector(v) => &v.items[..],
            other => {
                return Err(Diagnostic::macro_error(
                    format!("macro: parameter list must be a list, got {}", other.kind_name()),
                    other.pos().clone(),
                ));
            }
        };

        let mut params = Vec::new();
        let mut rest = None;
        let mut iter = params_list.iter();
        while let Some(p) = iter.next() {
            let pname = p.as_symbol().ok_or_else(|| {
                Diagnostic::macro_error("macro: parameter must be a symbol", p.pos().clone())
            })?;
            if pname == "&" {
                let r = iter.next().and_then(|p| p.as_symbol()).ok_or_else(|| {
                    Diagnostic::macro_error("macro: expected rest parameter after &", pos.clone())
                })?;
                rest = Some(r.to_string());
                if iter.next().is_some() {
                    return Err(Diagnostic::macro_error(
                        "macro: rest parameter must be last",
                        pos.clone(),
                    ));
                }
                break;
            }
            params.push(pname.to_string());
        }

        debug!(name, params = params.len(), "defined user macro");
        env.define(
            name.to_string(),
            MacroDef::User {
                params,
                rest,
                body: items[3..].to_vec(),
            },
        );
        Ok(())
    }

    /// Evaluate a user macro's body with arguments bound unevaluated
    fn apply_user_macro(
        &mut self,
        name: &str,
        params: &[String],
        rest: Option<&str>,
        body: &[Ast],
        args: &[Ast],
        pos: &Position,
    ) -> Result<Ast, Diagnostic> {
        if args.len() < params.len() || (rest.is_none() && args.len() > params.len()) {
            return Err(Diagnostic::macro_error(
                format!(
                    "{}: expected {} argument{}, got {}",
                    name,
                    params.len(),
                    if params.len() == 1 { "" } else { "s" },
                    args.len()
                ),
                pos.clone(),
            ));
        }

        let scope = interp::CtEnv::new();
        for (pname, arg) in params.iter().zip(args.iter()) {
            scope.define(pname.clone(), interp::CtValue::Form(arg.clone()));
        }
        if let Some(rest_name) = rest {
            scope.define(
                rest_name.to_string(),
                interp::CtValue::Form(Ast::list(args[params.len()..].to_vec(), pos.clone())),
            );
        }

        let mut cx = interp::InterpCx {
            gensym_counter: &mut self.counter,
        };
        let mut result = interp::CtValue::Form(Ast::literal(LiteralValue::Nil, pos.clone()));
        for form in body {
            result = interp::eval(form, &scope, &mut cx)?;
        }
        interp::to_form(result, pos)
    }
}

// ============================================================================
// Built-in Sugar Macros
// ============================================================================

fn register_builtin_macros(env: &Rc<MacroEnv>) {
    env.define("cond".to_string(), MacroDef::Builtin(expand_cond));
    env.define("when".to_string(), MacroDef::Builtin(expand_when));
    env.define("unless".to_string(), MacroDef::Builtin(expand_unless));
    env.define("->".to_string(), MacroDef::Builtin(expand_thread_first));
    env.define("->>".to_string(), MacroDef::Builtin(expand_thread_last));
    env.define("if-let".to_string(), MacroDef::Builtin(expand_if_let));
    env.define("when-let".to_string(), MacroDef::Builtin(expand_when_let));
    env.define("or=".to_string(), MacroDef::Builtin(expand_or_default));
}

fn body_form(body: &[Ast], pos: &Position) -> Ast {
    match body.len() {
        0 => Ast::literal(LiteralValue::Nil, pos.clone()),
        1 => body[0].clone(),
        _ => {
            let mut items = vec![Ast::symbol("do", pos.clone())];
            items.extend(body.iter().cloned());
            Ast::list(items, pos.clone())
        }
    }
}

/// `(cond t1 e1 t2 e2 … [default])` into nested ifs; `else`/`:else`
/// tests match unconditionally
fn expand_cond(_: &mut Expander, args: &[Ast], pos: &Position) -> Result<Ast, Diagnostic> {
    cond_clauses(args, pos)
}

fn cond_clauses(args: &[Ast], pos: &Position) -> Result<Ast, Diagnostic> {
    if args.is_empty() {
        return Ok(Ast::literal(LiteralValue::Nil, pos.clone()));
    }
    if args.len() == 1 {
        return Ok(args[0].clone());
    }
    let test = &args[0];
    if matches!(test.as_symbol(), Some("else" | ":else")) {
        return Ok(args[1].clone());
    }
    let rest = cond_clauses(&args[2..], pos)?;
    Ok(Ast::list(
        vec![
            Ast::symbol("if", pos.clone()),
            test.clone(),
            args[1].clone(),
            rest,
        ],
        pos.clone(),
    ))
}

fn expand_when(_: &mut Expander, args: &[Ast], pos: &Position) -> Result<Ast, Diagnostic> {
    if args.is_empty() {
        return Err(Diagnostic::macro_error("when: expected a test", pos.clone()));
    }
    Ok(Ast::list(
        vec![
            Ast::symbol("if", pos.clone()),
            args[0].clone(),
            body_form(&args[1..], pos),
            Ast::literal(LiteralValue::Nil, pos.clone()),
        ],
        pos.clone(),
    ))
}

fn expand_unless(_: &mut Expander, args: &[Ast], pos: &Position) -> Result<Ast, Diagnostic> {
    if args.is_empty() {
        return Err(Diagnostic::macro_error("unless: expected a test", pos.clone()));
    }
    Ok(Ast::list(
        vec![
            Ast::symbol("if", pos.clone()),
            args[0].clone(),
            Ast::literal(LiteralValue::Nil, pos.clone()),
            body_form(&args[1..], pos),
        ],
        pos.clone(),
    ))
}

fn thread(args: &[Ast], pos: &Position, first: bool) -> Result<Ast, Diagnostic> {
    if args.is_empty() {
        return Err(Diagnostic::macro_error("->: expected a value", pos.clone()));
    }
    let mut acc = args[0].clone();
    for step in &args[1..] {
        acc = match step {
            Ast::List(l) if !l.items.is_empty() => {
                let mut items = Vec::with_capacity(l.items.len() + 1);
                if first {
                    items.push(l.items[0].clone());
                    items.push(acc);
                    items.extend(l.items[1..].iter().cloned());
                } else {
                    items.extend(l.items.iter().cloned());
                    items.push(acc);
                }
                Ast::list(items, l.pos.clone())
            }
            other => Ast::list(vec![other.clone(), acc], other.pos().clone()),
        };
    }
    Ok(acc)
}

fn expand_thread_first(_: &mut Expander, args: &[Ast], pos: &Position) -> Result<Ast, Diagnostic> {
    thread(args, pos, true)
}

fn expand_thread_last(_: &mut Expander, args: &[Ast], pos: &Position) -> Result<Ast, Diagnostic> {
    thread(args, pos, false)
}

fn binding_pair<'a>(args: &'a [Ast], who: &str, pos: &Position) -> Result<(&'a Ast, &'a Ast), Diagnostic> {
    let binding = args
        .first()
        .and_then(|b| b.as_vector())
        .ok_or_else(|| Diagnostic::macro_error(format!("{}: expected [name value]", who), pos.clone()))?;
    if binding.len() != 2 {
        return Err(Diagnostic::macro_error(
            format!("{}: expected exactly [name value]", who),
            pos.clone(),
        ));
    }
    Ok((&binding[0], &binding[1]))
}

/// `(if-let [x expr] then else?)` binds a throwaway first so `expr`
/// evaluates once; the binding shadows only inside the then-branch
fn expand_if_let(ex: &mut Expander, args: &[Ast], pos: &Position) -> Result<Ast, Diagnostic> {
    let (name, value) = binding_pair(args, "if-let", pos)?;
    let then_branch = args
        .get(1)
        .ok_or_else(|| Diagnostic::macro_error("if-let: expected a then branch", pos.clone()))?;
    let else_branch = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| Ast::literal(LiteralValue::Nil, pos.clone()));

    let tmp = ex.fresh("iflet", pos);
    Ok(Ast::list(
        vec![
            Ast::symbol("do", pos.clone()),
            Ast::list(
                vec![Ast::symbol("let", pos.clone()), tmp.clone(), value.clone()],
                pos.clone(),
            ),
            Ast::list(
                vec![
                    Ast::symbol("if", pos.clone()),
                    tmp.clone(),
                    Ast::list(
                        vec![
                            Ast::symbol("do", pos.clone()),
                            Ast::list(
                                vec![Ast::symbol("let", pos.clone()), name.clone(), tmp],
                                pos.clone(),
                            ),
                            then_branch.clone(),
                        ],
                        pos.clone(),
                    ),
                    else_branch,
                ],
                pos.clone(),
            ),
        ],
        pos.clone(),
    ))
}

fn expand_when_let(ex: &mut Expander, args: &[Ast], pos: &Position) -> Result<Ast, Diagnostic> {
    let (name, value) = binding_pair(args, "when-let", pos)?;
    let body = body_form(&args[1..], pos);
    let mut rewritten = vec![
        Ast::vector(vec![name.clone(), value.clone()], pos.clone()),
        body,
    ];
    rewritten.push(Ast::literal(LiteralValue::Nil, pos.clone()));
    expand_if_let(ex, &rewritten, pos)
}

/// `(or= x default…)` falls back when `x` is null or undefined
fn expand_or_default(_: &mut Expander, args: &[Ast], pos: &Position) -> Result<Ast, Diagnostic> {
    if args.len() < 2 {
        return Err(Diagnostic::macro_error(
            "or=: expected a value and a default",
            pos.clone(),
        ));
    }
    let mut items = vec![Ast::symbol("??", pos.clone())];
    items.extend(args.iter().cloned());
    Ok(Ast::list(items, pos.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_program;

    fn expand_one(text: &str) -> Ast {
        let forms = read_program(text, "t.quill").expect("parse");
        let mut ex = Expander::new();
        let result = ex
            .expand_module(&forms, &HashMap::new())
            .expect("expansion");
        result.forms.into_iter().last().expect("a form")
    }

    #[test]
    fn test_user_macro_expansion() {
        let out = expand_one("(macro twice (x) `(+ ,x ,x)) (twice 21)");
        assert_eq!(format!("{}", out), "(+ 21 21)");
    }

    #[test]
    fn test_rest_parameter_macro() {
        let out = expand_one("(macro sum-all (& nums) `(+ ~@nums)) (sum-all 1 2 3 4 5)");
        assert_eq!(format!("{}", out), "(+ 1 2 3 4 5)");
    }

    #[test]
    fn test_macro_arity_error() {
        let forms = read_program("(macro twice (x) `(+ ,x ,x)) (twice 1 2)", "t.quill").unwrap();
        let mut ex = Expander::new();
        let e = ex.expand_module(&forms, &HashMap::new()).unwrap_err();
        assert!(e.to_string().contains("twice: expected 1 argument, got 2"));
    }

    #[test]
    fn test_unknown_macro_left_as_call() {
        let out = expand_one("(frobnicate 1 2)");
        assert_eq!(format!("{}", out), "(frobnicate 1 2)");
    }

    #[test]
    fn test_cond_expands_to_nested_ifs() {
        let out = expand_one("(cond a 1 b 2 else 3)");
        assert_eq!(format!("{}", out), "(if a 1 (if b 2 3))");
    }

    #[test]
    fn test_when_unless() {
        assert_eq!(
            format!("{}", expand_one("(when t 1 2)")),
            "(if t (do 1 2) nil)"
        );
        assert_eq!(format!("{}", expand_one("(unless t 1)")), "(if t nil 1)");
    }

    #[test]
    fn test_threading_macros() {
        assert_eq!(
            format!("{}", expand_one("(-> x (f a) g)")),
            "(g (f x a))"
        );
        assert_eq!(
            format!("{}", expand_one("(->> x (f a) (g b))")),
            "(g b (f a x))"
        );
    }

    #[test]
    fn test_or_default_expands_to_nullish() {
        assert_eq!(format!("{}", expand_one("(or= x 5)")), "(?? x 5)");
        assert_eq!(format!("{}", expand_one("(or= a b c)")), "(?? a b c)");
    }

    #[test]
    fn test_or_default_requires_a_fallback() {
        let forms = read_program("(or= x)", "t.quill").unwrap();
        let mut ex = Expander::new();
        let e = ex.expand_module(&forms, &HashMap::new()).unwrap_err();
        assert!(e.to_string().contains("or=: expected a value and a default"));
    }

    #[test]
    fn test_if_let_uses_gensym() {
        let out = expand_one("(if-let [v (find it)] v 0)");
        let text = format!("{}", out);
        assert!(text.contains("iflet__g"), "expected gensym in {}", text);
    }

    #[test]
    fn test_macros_visible_to_later_forms_only_within_module() {
        let forms = read_program("(macro m (x) x)", "a.quill").unwrap();
        let mut ex = Expander::new();
        let result = ex.expand_module(&forms, &HashMap::new()).unwrap();
        assert!(result.macros.contains_key("m"));
        assert!(result.forms.is_empty());
    }

    #[test]
    fn test_imported_macros_are_visible() {
        let mut ex = Expander::new();
        let lib = read_program("(macro inc2 (x) `(+ ,x 2))", "lib.quill").unwrap();
        let lib_out = ex.expand_module(&lib, &HashMap::new()).unwrap();

        let main = read_program("(inc2 40)", "main.quill").unwrap();
        let main_out = ex.expand_module(&main, &lib_out.macros).unwrap();
        assert_eq!(format!("{}", main_out.forms[0]), "(+ 40 2)");
    }

    #[test]
    fn test_gensym_counter_monotonic_across_modules() {
        let mut ex = Expander::new();
        let a = read_program("(if-let [x 1] x 0)", "a.quill").unwrap();
        ex.expand_module(&a, &HashMap::new()).unwrap();
        let after_first = ex.gensym_counter();
        let b = read_program("(if-let [y 2] y 0)", "b.quill").unwrap();
        ex.expand_module(&b, &HashMap::new()).unwrap();
        assert!(ex.gensym_counter() > after_first);
    }

    #[test]
    fn test_quote_not_expanded() {
        let out = expand_one("(macro bad (x) 99) '(bad 1)");
        assert_eq!(format!("{}", out), "(quote (bad 1))");
    }

    #[test]
    fn test_nonterminating_macro_reports_error() {
        let forms = read_program("(macro loop-forever (x) `(loop-forever ,x)) (loop-forever 1)", "t.quill").unwrap();
        let mut ex = Expander::new();
        let e = ex.expand_module(&forms, &HashMap::new()).unwrap_err();
        assert!(e.to_string().contains("did not terminate"));
    }
}
