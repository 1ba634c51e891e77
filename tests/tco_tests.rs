// ABOUTME: Tail-call optimization tests over emitted TypeScript

use quillc::config::CompilerOptions;
use quillc::transpile;

fn compile(source: &str) -> String {
    transpile(source, "tco.quill", &CompilerOptions::default())
        .expect("compilation succeeds")
        .code
}

#[test]
fn test_self_recursion_becomes_loop() {
    let code = compile("(fn count-down [n] (if (= n 0) \"done\" (count-down (- n 1))))");
    assert!(code.contains("while (true) {"), "{}", code);
    assert!(code.contains("n = n - 1;"), "{}", code);
    assert!(code.contains("continue;"), "{}", code);
    assert!(code.contains("return \"done\";"), "{}", code);
}

#[test]
fn test_accumulator_recursion_rebinds_all_params() {
    let code = compile("(fn sum-to [n acc] (if (= n 0) acc (sum-to (- n 1) (+ acc n))))");
    assert!(code.contains("[n, acc] = [n - 1, acc + n];"), "{}", code);
}

#[test]
fn test_non_tail_recursion_left_intact() {
    let code = compile("(fn fact [n] (if (= n 0) 1 (* n (fact (- n 1)))))");
    assert!(!code.contains("while (true)"), "{}", code);
    assert!(code.contains("n * fact(n - 1)"), "{}", code);
}

#[test]
fn test_nested_conditional_tail_positions() {
    let code = compile(
        "(fn classify [n steps]
           (if (= n 0)
             steps
             (if (even? n)
               (classify (/ n 2) (+ steps 1))
               (classify (+ (* 3 n) 1) (+ steps 1)))))",
    );
    assert!(code.contains("while (true) {"), "{}", code);
    // Both arms rebind and continue
    assert_eq!(code.matches("continue;").count(), 2, "{}", code);
}

#[test]
fn test_side_effecting_tail_do_still_loops() {
    let code = compile("(fn drain [n] (if (= n 0) 0 (do (step n) (drain (- n 1)))))");
    assert!(code.contains("while (true) {"), "{}", code);
    assert!(code.contains("step(n);"), "{}", code);
    assert!(code.contains("n = n - 1;"), "{}", code);
}

#[test]
fn test_recursion_behind_logical_operator_not_looped() {
    let code = compile("(fn find-it [n] (if (= n 0) nil (or (probe n) (find-it (- n 1)))))");
    assert!(!code.contains("while (true)"), "{}", code);
    assert!(code.contains("probe(n) || find_it(n - 1)"), "{}", code);
}

#[test]
fn test_mutual_recursion_thunks_and_trampoline() {
    let code = compile(
        "(fn is-even [n] (if (= n 0) true (is-odd (- n 1))))
         (fn is-odd [n] (if (= n 0) false (is-even (- n 1))))
         (is-even 10000)",
    );
    // Inside the group: tail calls to the other member become thunks
    assert!(code.contains("() => is_odd(n - 1)"), "{}", code);
    assert!(code.contains("() => is_even(n - 1)"), "{}", code);
    // Outside the group: the call site trampolines
    assert!(code.contains("trampoline(() => is_even(10000))"), "{}", code);
    // The helper import is present
    assert!(code.contains("import { trampoline }"), "{}", code);
}

#[test]
fn test_three_function_cycle() {
    let code = compile(
        "(fn ping [n] (if (= n 0) \"ping\" (pong (- n 1))))
         (fn pong [n] (if (= n 0) \"pong\" (peng (- n 1))))
         (fn peng [n] (if (= n 0) \"peng\" (ping (- n 1))))
         (ping 300000)",
    );
    assert!(code.contains("() => pong(n - 1)"), "{}", code);
    assert!(code.contains("() => peng(n - 1)"), "{}", code);
    assert!(code.contains("() => ping(n - 1)"), "{}", code);
    assert!(code.contains("trampoline(() => ping(300000))"), "{}", code);
}

#[test]
fn test_self_call_inside_group_still_loops() {
    // walk tail-calls itself and its partner; the self call loops, the
    // cross call thunks
    let code = compile(
        "(fn walk [n] (if (= n 0) (hop 10) (walk (- n 1))))
         (fn hop [n] (if (= n 0) 0 (walk (- n 1))))",
    );
    assert!(code.contains("while (true) {"), "{}", code);
    assert!(code.contains("() => hop(10)"), "{}", code);
}

#[test]
fn test_calls_between_unrelated_functions_untouched() {
    let code = compile(
        "(fn double [n] (* n 2))
         (fn quadruple [n] (double (double n)))",
    );
    assert!(!code.contains("trampoline"), "{}", code);
    assert!(!code.contains("while (true)"), "{}", code);
}
