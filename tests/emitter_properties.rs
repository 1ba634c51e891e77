// ABOUTME: Emitter property tests: precedence, parenthesization, hoisting soundness

use quillc::config::CompilerOptions;
use quillc::transpile;

fn compile(source: &str) -> String {
    transpile(source, "props.quill", &CompilerOptions::default())
        .expect("compilation succeeds")
        .code
}

#[test]
fn test_parens_present_iff_inner_binds_looser() {
    // inner < outer: parens required
    assert!(compile("(* (+ a b) c)").contains("(a + b) * c"));
    assert!(compile("(- a (+ b c))").contains("a - (b + c)"));
    // inner > outer: no parens
    assert!(compile("(+ a (* b c))").contains("a + b * c"));
    // logical mixing
    assert!(compile("(and (or a b) c)").contains("(a || b) && c"));
    assert!(compile("(or (and a b) c)").contains("a && b || c"));
}

#[test]
fn test_equal_precedence_non_associative_side() {
    // Left-assoc: right operand at equal precedence needs parens
    assert!(compile("(- a (- b c))").contains("a - (b - c)"));
    assert!(compile("(- (- a b) c)").contains("a - b - c"));
    // Right-assoc exponent mirrors that
    assert!(compile("(** (** a b) c)").contains("(a ** b) ** c"));
    assert!(compile("(** a (** b c))").contains("a ** b ** c"));
}

#[test]
fn test_nullish_and_conditional_layers() {
    let code = compile("(let r (?? (if p 1 2) fallback))");
    assert!(code.contains("(p ? 1 : 2) ?? fallback"), "{}", code);
}

#[test]
fn test_arrow_function_operand_always_parenthesized() {
    let code = compile("(?? handler (fn [e] e))");
    assert!(code.contains("handler ?? ((e) => e)"), "{}", code);

    let code = compile("(or ready (fn [] true))");
    assert!(code.contains("ready || (() => true)"), "{}", code);

    let code = compile("(typeof (fn [] 1))");
    assert!(code.contains("typeof (() => 1)"), "{}", code);
}

#[test]
fn test_sequence_parenthesized_in_tighter_context() {
    let code = compile("(let r (+ 1 (do (set! a 2) a)))");
    assert!(code.contains("1 + (a = 2, a)"), "{}", code);
}

#[test]
fn test_hoisted_names_declared_in_scope() {
    // Block scopes own their bindings; nothing leaks upward
    let code = compile("(fn outer [] (let inner 1) inner)");
    let top = code.lines().next().unwrap_or_default();
    assert!(
        !top.contains("inner"),
        "inner must not hoist to module scope: {}",
        code
    );
    assert!(code.contains("let inner;"), "{}", code);
}

#[test]
fn test_hoisted_declaration_emits_assignment_expression() {
    let code = compile("(foo (let x 1))");
    assert!(code.contains("let x;"), "{}", code);
    assert!(code.contains("foo((x = 1))"), "{}", code);
}

#[test]
fn test_function_hoisted_in_expression_keeps_name() {
    let code = compile("(register (fn [e] e))");
    // Anonymous functions stay arrows; named declarations in expression
    // position keep their debugger name through the assignment form
    assert!(code.contains("register((e) => e)"), "{}", code);

    let code = compile("(register (do (fn handler [e] e) handler))");
    assert!(code.contains("(handler = function handler"), "{}", code);
}

#[test]
fn test_member_access_dot_vs_bracket() {
    let code = compile("(let a {:valid 1 \"has space\" 2})");
    assert!(code.contains("valid: 1"), "{}", code);
    assert!(code.contains("\"has space\": 2"), "{}", code);
}

#[test]
fn test_string_escaping() {
    let code = compile(r#"(let s "line\nquote\"backslash\\")"#);
    assert!(code.contains(r#""line\nquote\"backslash\\""#), "{}", code);
}

#[test]
fn test_bigint_and_numeric_literals() {
    let code = compile("(let big 9007199254740993n) (let hex 0xff) (let oct 0o17) (let bin 0b101)");
    assert!(code.contains("big = 9007199254740993n;"), "{}", code);
    assert!(code.contains("hex = 255;"), "{}", code);
    assert!(code.contains("oct = 15;"), "{}", code);
    assert!(code.contains("bin = 5;"), "{}", code);
}

#[test]
fn test_or_default_compiles_to_nullish_coalescing() {
    let code = compile("(let v (or= maybe 0))");
    assert!(code.contains("v = maybe ?? 0;"), "{}", code);

    let code = compile("(let v (or= a b c))");
    assert!(code.contains("v = a ?? b ?? c;"), "{}", code);
}

#[test]
fn test_operator_value_uses_get_op() {
    let code = compile("(let plus +)");
    assert!(code.contains("plus = getOp(\"+\");"), "{}", code);
    assert!(code.contains("import { getOp }"), "{}", code);
}

#[test]
fn test_quote_data_and_splice() {
    let code = compile("(let xs `(1 ~@more 2))");
    assert!(code.contains("xs = [1, ...more, 2];"), "{}", code);
}

#[test]
fn test_spread_in_calls_and_arrays() {
    let code = compile("(f a ...rest) (let v [1 ...xs])");
    assert!(code.contains("f(a, ...rest);"), "{}", code);
    assert!(code.contains("v = [1, ...xs];"), "{}", code);
}

#[test]
fn test_try_in_expression_position_wraps_iife() {
    let code = compile("(let safe (try (risky) (catch e nil)))");
    assert!(code.contains("safe = (() => {"), "{}", code);
    assert!(code.contains("try {"), "{}", code);
    assert!(code.contains("return risky();"), "{}", code);
    assert!(code.contains("catch (e)"), "{}", code);
}

#[test]
fn test_destructuring_bindings() {
    let code = compile("(let [first second & rest] items) (let {name :name} person)");
    assert!(code.contains("[first, second, ...rest] = items;"), "{}", code);
    assert!(code.contains("({ name } = person);"), "{}", code);
}
