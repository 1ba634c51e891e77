// ABOUTME: Module resolver tests: circular imports, macro cycles, caching, manifests

use quillc::config::CompilerOptions;
use quillc::driver::{build, compile_dir, resolve_exports, Session};
use quillc::error::DiagnosticKind;
use quillc::modules::ModuleStatus;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn options_for(dir: &TempDir) -> CompilerOptions {
    CompilerOptions {
        cache_dir: dir.path().join("cache"),
        ..CompilerOptions::default()
    }
}

fn write(dir: &TempDir, name: &str, source: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, source).expect("write fixture");
    path
}

#[test]
fn test_single_module_compiles_and_writes_artifact() {
    let dir = TempDir::new().unwrap();
    let entry = write(&dir, "main.quill", "(fn hello [] \"hi\") (export [hello])");
    let mut session = Session::new(options_for(&dir));
    let id = session.compile_entry(&entry).expect("compiles");

    let record = session.graph.get(id);
    assert_eq!(record.status, ModuleStatus::Compiled);
    assert_eq!(record.exports, vec!["hello"]);

    let artifact = record.artifact_path.clone().unwrap();
    assert!(artifact.ends_with("main.ts"));
    let emitted = fs::read_to_string(artifact).unwrap();
    assert!(emitted.contains("function hello"));
    assert!(emitted.contains("sourceMappingURL=data:application/json;base64,"));
}

#[test]
fn test_local_imports_compile_in_source_order() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.quill", "(fn a-val [] 1) (export [a-val])");
    write(&dir, "b.quill", "(fn b-val [] 2) (export [b-val])");
    let entry = write(
        &dir,
        "main.quill",
        "(import [a-val] from \"./a.quill\")\n(import [b-val] from \"./b.quill\")\n(+ (a-val) (b-val))",
    );

    let mut session = Session::new(options_for(&dir));
    let id = session.compile_entry(&entry).expect("compiles");
    let record = session.graph.get(id);
    assert_eq!(record.imports.len(), 2);
    let first = session.graph.get(record.imports[0]);
    assert!(first.path.ends_with("a.quill"));

    let emitted = fs::read_to_string(record.artifact_path.clone().unwrap()).unwrap();
    assert!(emitted.contains("import { a_val } from \"./a.ts\""), "{}", emitted);
}

#[test]
fn test_circular_data_imports_share_preregistered_exports() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "a.quill",
        "(import [inc] from \"./b.quill\")\n(let base 10)\n(fn a-func [] (inc base))\n(export [base a-func])",
    );
    write(
        &dir,
        "b.quill",
        "(import [base] from \"./a.quill\")\n(fn inc [v] (+ v base))\n(export [inc])",
    );
    let entry = write(
        &dir,
        "main.quill",
        "(import [a-func] from \"./a.quill\")\n(a-func)",
    );

    let mut session = Session::new(options_for(&dir));
    let id = session.compile_entry(&entry).expect("data cycles compile");

    // Both cycle members finished, and the exports declared by `a` were
    // visible to `b` before `a` finished compiling
    let a_id = session.graph.lookup(&dir.path().join("a.quill").to_string_lossy()).unwrap();
    let b_id = session.graph.lookup(&dir.path().join("b.quill").to_string_lossy()).unwrap();
    assert_eq!(session.graph.get(a_id).status, ModuleStatus::Compiled);
    assert_eq!(session.graph.get(b_id).status, ModuleStatus::Compiled);
    assert_eq!(session.graph.get(a_id).exports, vec!["base", "a_func"]);
    assert!(session.graph.get(a_id).dependents.contains(&b_id));

    let main = session.graph.get(id);
    let emitted = fs::read_to_string(main.artifact_path.clone().unwrap()).unwrap();
    assert!(emitted.contains("a_func()"));
}

#[test]
fn test_cyclic_macro_import_fails_with_cycle_path() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "ma.quill",
        "(import [helper] from \"./mb.quill\")\n(macro m-a (x) `(+ ,x 1))\n(export [helper])",
    );
    write(
        &dir,
        "mb.quill",
        "(import [m-a] from \"./ma.quill\")\n(fn helper [] (m-a 1))\n(export [helper])",
    );
    let entry = write(&dir, "main.quill", "(import [helper] from \"./ma.quill\")\n(helper)");

    let mut session = Session::new(options_for(&dir));
    let err = session.compile_entry(&entry).unwrap_err();
    assert_eq!(err.kind(), DiagnosticKind::CyclicMacroImport);
    let msg = err.to_string();
    assert!(msg.contains("ma.quill"), "{}", msg);
    assert!(msg.contains("mb.quill"), "{}", msg);
}

#[test]
fn test_imported_macros_expand_in_importer() {
    let dir = TempDir::new().unwrap();
    write(&dir, "lib.quill", "(macro inc2 (x) `(+ ,x 2))");
    let entry = write(
        &dir,
        "main.quill",
        "(import [inc2] from \"./lib.quill\")\n(let v (inc2 40))",
    );

    let mut session = Session::new(options_for(&dir));
    let id = session.compile_entry(&entry).expect("compiles");
    let emitted = fs::read_to_string(session.graph.get(id).artifact_path.clone().unwrap()).unwrap();
    assert!(emitted.contains("v = 40 + 2;"), "{}", emitted);
}

#[test]
fn test_artifact_cache_reused_across_sessions() {
    let dir = TempDir::new().unwrap();
    let options = options_for(&dir);
    let entry = write(&dir, "main.quill", "(fn stable [] 7) (export [stable])");

    let mut first = Session::new(options.clone());
    first.compile_entry(&entry).expect("first compile");

    // Second session, same cache dir: the lookup must hit
    let mut second = Session::new(options);
    let id = second.compile_entry(&entry).expect("second compile");
    assert_eq!(second.graph.get(id).exports, vec!["stable"]);
}

#[test]
fn test_no_cache_option_bypasses_store() {
    let dir = TempDir::new().unwrap();
    let mut options = options_for(&dir);
    options.no_cache = true;
    let entry = write(&dir, "main.quill", "(let x 1)");

    let mut session = Session::new(options);
    session.compile_entry(&entry).expect("compiles");
    assert!(!dir.path().join("cache").join("artifacts.db").exists());
}

#[test]
fn test_missing_file_is_resolve_error() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::new(options_for(&dir));
    let err = session
        .compile_entry(Path::new("/definitely/not/here.quill"))
        .unwrap_err();
    assert_eq!(err.kind(), DiagnosticKind::Resolve);
}

#[test]
fn test_missing_import_names_specifier() {
    let dir = TempDir::new().unwrap();
    let entry = write(&dir, "main.quill", "(import [x] from \"./ghost.quill\")\nx");
    let mut session = Session::new(options_for(&dir));
    let err = session.compile_entry(&entry).unwrap_err();
    assert_eq!(err.kind(), DiagnosticKind::Resolve);
    assert!(err.to_string().contains("ghost.quill"));
}

#[test]
fn test_package_imports_left_to_host() {
    let dir = TempDir::new().unwrap();
    let entry = write(
        &dir,
        "main.quill",
        "(import [join] from \"npm:path-tools\")\n(join \"a\" \"b\")",
    );
    let mut session = Session::new(options_for(&dir));
    let id = session.compile_entry(&entry).expect("package import passes through");
    let emitted = fs::read_to_string(session.graph.get(id).artifact_path.clone().unwrap()).unwrap();
    assert!(emitted.contains("from \"npm:path-tools\""), "{}", emitted);
}

#[test]
fn test_build_writes_manifest_with_dependency_graph() {
    let dir = TempDir::new().unwrap();
    write(&dir, "dep.quill", "(fn util [] 1) (export [util])");
    let entry = write(
        &dir,
        "main.quill",
        "(import [util] from \"./dep.quill\")\n(util)",
    );

    let out_dir = dir.path().join("build");
    let manifest_path = build(&entry, &out_dir, options_for(&dir)).expect("build succeeds");
    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(manifest_path).unwrap()).unwrap();
    let entries = manifest.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    let main_entry = entries
        .iter()
        .find(|e| e["path"].as_str().unwrap().ends_with("main.quill"))
        .unwrap();
    assert!(main_entry["imports"][0].as_str().unwrap().ends_with("dep.quill"));
    assert_eq!(main_entry["hash"].as_str().unwrap().len(), 64);
}

#[test]
fn test_compile_dir_collects_failures_and_continues() {
    let dir = TempDir::new().unwrap();
    write(&dir, "good.quill", "(let fine 1)");
    write(&dir, "bad.quill", "(let broken");
    fs::create_dir_all(dir.path().join("nested")).unwrap();
    write(&dir, "nested/also-good.quill", "(let nested-ok 2)");

    let failures = compile_dir(dir.path(), &options_for(&dir));
    assert_eq!(failures.len(), 1);
    assert!(failures[0].0.ends_with("bad.quill"));
    assert_eq!(failures[0].1.kind(), DiagnosticKind::Parse);

    // The good modules still produced artifacts
    assert!(dir.path().join("good.ts").exists());
    assert!(dir.path().join("nested/also-good.ts").exists());
}

#[test]
fn test_resolve_exports_without_compiling() {
    let dir = TempDir::new().unwrap();
    let entry = write(
        &dir,
        "api.quill",
        "(fn a [] 1) (fn b [] 2) (export [a, b as renamed]) (export \"c\" 3)",
    );
    let names = resolve_exports(&entry).expect("scan succeeds");
    assert_eq!(names, vec!["a", "renamed", "c"]);
}

#[test]
fn test_external_map_mode_writes_sibling_file() {
    let dir = TempDir::new().unwrap();
    let mut options = options_for(&dir);
    options.source_map = quillc::config::SourceMapMode::External;
    let entry = write(&dir, "main.quill", "(let x 1)");

    let mut session = Session::new(options);
    session.compile_entry(&entry).expect("compiles");
    assert!(dir.path().join("main.ts.map").exists());
    let emitted = fs::read_to_string(dir.path().join("main.ts")).unwrap();
    assert!(emitted.contains("sourceMappingURL=main.ts.map"), "{}", emitted);
}

#[test]
fn test_cancellation_aborts_compilation() {
    let dir = TempDir::new().unwrap();
    let entry = write(&dir, "main.quill", "(let x 1)");
    let mut session = Session::new(options_for(&dir));
    session.cancel_token().cancel();
    let err = session.compile_entry(&entry).unwrap_err();
    assert!(err.to_string().contains("cancelled"));
}
