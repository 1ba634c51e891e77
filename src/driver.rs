// ABOUTME: Compilation driver: orchestrates the pipeline, caching, and the public API

use crate::cache::{hash_source, ArtifactCache, CachedArtifact};
use crate::config::{CompilerOptions, SourceMapMode};
use crate::emit::{emit_module, sourcemap::Mapping};
use crate::error::Diagnostic;
use crate::expand::{Expander, MacroDef};
use crate::fetch::fetch_remote;
use crate::lower::lower_module;
use crate::modules::{
    classify_specifier, resolve_specifier, scan_declared_exports, scan_imports, ModuleGraph,
    ModuleId, ModuleStatus, SpecifierKind,
};
use crate::optimize::optimize_module;
use crate::reader::read_program;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

/// Cooperative cancellation flag, checked at stage boundaries and
/// between fetch retries
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of transpiling a single source unit
#[derive(Debug)]
pub struct TranspileOutput {
    pub code: String,
    pub map_json: String,
    pub mappings: Vec<Mapping>,
    pub used_helpers: Vec<String>,
}

/// Compile one source text through the full pipeline, no module I/O
pub fn transpile(
    source: &str,
    file: &str,
    options: &CompilerOptions,
) -> Result<TranspileOutput, Diagnostic> {
    let span = info_span!("transpile", file);
    let _guard = span.enter();

    let forms = read_program(source, file)?;
    let mut expander = Expander::new();
    let expansion = expander.expand_module(&forms, &HashMap::new())?;
    let module = lower_module(&expansion.forms)?;
    let module = optimize_module(module);
    let artifact = artifact_name(file);
    let out = emit_module(&module, file, &artifact, options)?;
    Ok(TranspileOutput {
        code: out.code,
        map_json: out.map_json,
        mappings: out.mappings,
        used_helpers: out.used_helpers,
    })
}

fn artifact_name(file: &str) -> String {
    match file.strip_suffix(".quill") {
        Some(stem) => format!("{}.ts", stem),
        None => format!("{}.ts", file),
    }
}

// ============================================================================
// Session
// ============================================================================

/// One compilation session: a module graph, a shared macro expander
/// (and so a shared gensym counter), and the artifact cache.
pub struct Session {
    options: CompilerOptions,
    pub graph: ModuleGraph,
    expander: Expander,
    cache: Option<ArtifactCache>,
    cancel: CancelToken,
    /// Import chain, for cycle diagnostics
    stack: Vec<String>,
    /// Pre-fetched remote sources keyed by URL
    fetched: HashMap<String, String>,
}

impl Session {
    pub fn new(options: CompilerOptions) -> Self {
        let cache = if options.no_cache {
            None
        } else {
            match ArtifactCache::open(&options.cache_dir) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(error = %e, "artifact cache unavailable, compiling without it");
                    None
                }
            }
        };
        Session {
            options,
            graph: ModuleGraph::new(),
            expander: Expander::new(),
            cache,
            cancel: CancelToken::new(),
            stack: Vec::new(),
            fetched: HashMap::new(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Compile a top-level entry file and its import closure
    pub fn compile_entry(&mut self, path: &Path) -> Result<ModuleId, Diagnostic> {
        let resolved = resolve_specifier(
            &path.to_string_lossy(),
            &std::env::current_dir()
                .map(|d| d.join("_").to_string_lossy().into_owned())
                .unwrap_or_else(|_| "_".to_string()),
        );
        self.compile_module(&resolved)
    }

    fn compile_module(&mut self, resolved: &str) -> Result<ModuleId, Diagnostic> {
        if self.cancel.is_cancelled() {
            return Err(Diagnostic::resolve(resolved, "compilation cancelled"));
        }

        if let Some(id) = self.graph.lookup(resolved) {
            let record = self.graph.get(id);
            match record.status {
                ModuleStatus::Compiled => return Ok(id),
                ModuleStatus::Errored => {
                    return Err(Diagnostic::resolve(resolved, "module previously failed"));
                }
                // Re-entry during compilation: a cycle. Data cycles get
                // the pre-registered record; macro-defining modules
                // cannot be imported from inside their own cycle.
                ModuleStatus::Compiling | ModuleStatus::Fetching => {
                    if record.defines_macros {
                        let mut cycle = self.stack.clone();
                        cycle.push(resolved.to_string());
                        return Err(Diagnostic::cyclic_macro_import(cycle));
                    }
                    return Ok(id);
                }
            }
        }

        let span = info_span!("compile", module = resolved);
        let _guard = span.enter();

        let id = self.graph.alloc(resolved);
        self.stack.push(resolved.to_string());
        let result = self.compile_module_inner(id, resolved);
        self.stack.pop();
        match result {
            Ok(()) => Ok(id),
            Err(e) => {
                self.graph.get_mut(id).status = ModuleStatus::Errored;
                Err(e)
            }
        }
    }

    fn compile_module_inner(&mut self, id: ModuleId, resolved: &str) -> Result<(), Diagnostic> {
        let source = self.load_source(resolved)?;
        let hash = hash_source(&source);

        let forms = read_program(&source, resolved)?;
        let imports = scan_imports(&forms);
        let declared = scan_declared_exports(&forms);
        let defines_macros = crate::modules::defines_macros(&forms);

        let artifact_path = self.artifact_path_for(resolved, &hash);
        {
            let record = self.graph.get_mut(id);
            record.source_hash = hash.clone();
            record.defines_macros = defines_macros;
            // Pre-registration: importers arriving during compilation
            // see the declared export names and the artifact path
            record.exports = declared;
            record.artifact_path = Some(artifact_path.clone());
            record.status = ModuleStatus::Compiling;
        }

        // Remote dependencies fetch in parallel before any of them
        // re-enters the (sequential) pipeline
        let remote_pending: Vec<String> = imports
            .iter()
            .map(|req| resolve_specifier(&req.source, resolved))
            .filter(|dep| {
                classify_specifier(dep) == SpecifierKind::Url
                    && !self.fetched.contains_key(dep)
                    && self.graph.lookup(dep).is_none()
            })
            .collect();
        if !remote_pending.is_empty() {
            let cancel = self.cancel.clone();
            let results: Vec<(String, Result<String, Diagnostic>)> = remote_pending
                .par_iter()
                .map(|url| (url.clone(), fetch_remote(url, &cancel)))
                .collect();
            for (url, result) in results {
                self.fetched.insert(url, result?);
            }
        }

        // Local imports compile sequentially in source order
        let mut imported_macros: HashMap<String, MacroDef> = HashMap::new();
        for req in &imports {
            let dep = resolve_specifier(&req.source, resolved);
            if classify_specifier(&dep) == SpecifierKind::Package || !dep.ends_with(".quill") {
                debug!(specifier = %dep, "leaving specifier to the host resolver");
                continue;
            }
            let dep_id = self.compile_module(&dep)?;
            self.graph.add_dependency(id, dep_id);
            let dep_record = self.graph.get(dep_id);
            for name in &req.names {
                if let Some(def) = dep_record.macros.get(name) {
                    imported_macros.insert(name.clone(), def.clone());
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(Diagnostic::resolve(resolved, "compilation cancelled"));
        }

        // Cached artifact short-circuits everything after dependencies.
        // Macro-defining modules always recompile: their definitions
        // must exist in memory for importers.
        if !defines_macros {
            if let Some(hit) = self.cache.as_ref().and_then(|c| c.lookup(&hash)) {
                debug!(module = resolved, "artifact cache hit");
                self.write_artifact(&artifact_path, &hit.code, &hit.map_json)?;
                let record = self.graph.get_mut(id);
                record.exports = hit.exports;
                record.status = ModuleStatus::Compiled;
                return Ok(());
            }
        }

        let expansion = self.expander.expand_module(&forms, &imported_macros)?;
        let module = lower_module(&expansion.forms)?;
        let module = optimize_module(module);
        let artifact = artifact_path.to_string_lossy().into_owned();
        let out = emit_module(&module, resolved, &artifact, &self.options)?;

        self.write_artifact(&artifact_path, &out.code, &out.map_json)?;
        if !defines_macros {
            if let Some(cache) = &self.cache {
                let stored = CachedArtifact {
                    code: out.code.clone(),
                    map_json: out.map_json.clone(),
                    exports: module.exports.clone(),
                };
                if let Err(e) = cache.store(&hash, &stored) {
                    warn!(error = %e, "failed to store artifact in cache");
                }
            }
        }

        let record = self.graph.get_mut(id);
        record.exports = module.exports;
        record.macros = expansion.macros;
        record.status = ModuleStatus::Compiled;
        info!(module = resolved, "compiled");
        Ok(())
    }

    fn load_source(&mut self, resolved: &str) -> Result<String, Diagnostic> {
        match classify_specifier(resolved) {
            SpecifierKind::Url => {
                if let Some(source) = self.fetched.get(resolved) {
                    return Ok(source.clone());
                }
                let source = fetch_remote(resolved, &self.cancel)?;
                self.fetched.insert(resolved.to_string(), source.clone());
                Ok(source)
            }
            _ => std::fs::read_to_string(resolved)
                .map_err(|e| Diagnostic::resolve(resolved, e.to_string())),
        }
    }

    /// Local artifacts sit beside their sources; remote artifacts land
    /// in the cache directory keyed by content hash
    fn artifact_path_for(&self, resolved: &str, hash: &str) -> PathBuf {
        match classify_specifier(resolved) {
            SpecifierKind::Url => self
                .options
                .cache_dir
                .join("remote")
                .join(format!("{}.ts", &hash[..16])),
            _ => PathBuf::from(artifact_name(resolved)),
        }
    }

    fn write_artifact(&self, path: &Path, code: &str, map_json: &str) -> Result<(), Diagnostic> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Diagnostic::resolve(path.display().to_string(), e.to_string()))?;
        }
        let mut output = code.to_string();
        match self.options.source_map {
            SourceMapMode::Inline => {
                output.push_str(&crate::emit::sourcemap::inline_comment(map_json));
                output.push('\n');
            }
            SourceMapMode::External => {
                let map_path = path.with_extension("ts.map");
                std::fs::write(&map_path, map_json).map_err(|e| {
                    Diagnostic::resolve(map_path.display().to_string(), e.to_string())
                })?;
                let name = map_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                output.push_str(&format!("//# sourceMappingURL={}\n", name));
            }
            SourceMapMode::None => {}
        }
        std::fs::write(path, output)
            .map_err(|e| Diagnostic::resolve(path.display().to_string(), e.to_string()))
    }
}

// ============================================================================
// Public Surface
// ============================================================================

/// Compile and execute through the configured host runtime
pub fn run(path: &Path, options: CompilerOptions) -> Result<i32, Diagnostic> {
    let runtime = options.js_runtime.clone();
    let mut session = Session::new(options);
    let id = session.compile_entry(path)?;
    let artifact = session
        .graph
        .get(id)
        .artifact_path
        .clone()
        .ok_or_else(|| Diagnostic::resolve(path.display().to_string(), "no artifact produced"))?;

    let (program, args) = runtime
        .split_first()
        .ok_or_else(|| Diagnostic::resolve(path.display().to_string(), "empty runtime command"))?;
    info!(runtime = program, artifact = %artifact.display(), "delegating execution");
    let status = std::process::Command::new(program)
        .args(args)
        .arg(&artifact)
        .status()
        .map_err(|e| Diagnostic::resolve(program, e.to_string()))?;
    Ok(status.code().unwrap_or(1))
}

#[derive(Debug, Serialize)]
pub struct ManifestEntry {
    pub path: String,
    pub hash: String,
    pub artifact: String,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
}

/// Compile a file and write `manifest.json` describing the module graph
pub fn build(path: &Path, out_dir: &Path, options: CompilerOptions) -> Result<PathBuf, Diagnostic> {
    let mut session = Session::new(options);
    session.compile_entry(path)?;

    let mut entries = Vec::new();
    for id in session.graph.ids() {
        let record = session.graph.get(id);
        entries.push(ManifestEntry {
            path: record.path.clone(),
            hash: record.source_hash.clone(),
            artifact: record
                .artifact_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            imports: record
                .imports
                .iter()
                .map(|dep| session.graph.get(*dep).path.clone())
                .collect(),
            exports: record.exports.clone(),
        });
    }

    std::fs::create_dir_all(out_dir)
        .map_err(|e| Diagnostic::resolve(out_dir.display().to_string(), e.to_string()))?;
    let manifest_path = out_dir.join("manifest.json");
    let json = serde_json::to_string_pretty(&entries).expect("manifest serializes");
    std::fs::write(&manifest_path, json)
        .map_err(|e| Diagnostic::resolve(manifest_path.display().to_string(), e.to_string()))?;
    Ok(manifest_path)
}

/// Recursively compile every Quill source under `dir`. Modules fail
/// independently; all diagnostics come back for batch reporting.
pub fn compile_dir(dir: &Path, options: &CompilerOptions) -> Vec<(PathBuf, Diagnostic)> {
    let mut sources = Vec::new();
    collect_sources(dir, &mut sources);
    sources.sort();
    info!(count = sources.len(), dir = %dir.display(), "compiling directory");

    sources
        .par_iter()
        .filter_map(|file| {
            let mut session = Session::new(options.clone());
            match session.compile_entry(file) {
                Ok(_) => None,
                Err(e) => Some((file.clone(), e)),
            }
        })
        .collect()
}

fn collect_sources(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_sources(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some(crate::config::SOURCE_EXTENSION)
        {
            out.push(path);
        }
    }
}

/// Export names of a module, without compiling it
pub fn resolve_exports(path: &Path) -> Result<Vec<String>, Diagnostic> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Diagnostic::resolve(path.display().to_string(), e.to_string()))?;
    let forms = read_program(&text, &path.to_string_lossy())?;
    Ok(scan_declared_exports(&forms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpile_simple_program() {
        let out = transpile("(fn add [a b] (+ a b))", "t.quill", &CompilerOptions::default())
            .expect("transpile");
        assert!(out.code.contains("function add"));
        assert!(!out.mappings.is_empty());
    }

    #[test]
    fn test_transpile_reports_parse_errors() {
        let err = transpile("(fn broken", "t.quill", &CompilerOptions::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::DiagnosticKind::Parse);
    }

    #[test]
    fn test_used_helpers_subset_of_roster() {
        let out = transpile(
            "(for [x (range 5)] (.push out x)) (deep-freeze out)",
            "t.quill",
            &CompilerOptions::default(),
        )
        .expect("transpile");
        for name in &out.used_helpers {
            assert!(
                crate::helpers::is_helper_identifier(name),
                "{} outside roster",
                name
            );
        }
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
