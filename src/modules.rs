// ABOUTME: Module graph arena, specifier resolution, and pre-compilation scans

use crate::ast::Ast;
use crate::expand::MacroDef;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Handle into the module arena. The graph is cyclic (modules import
/// each other), so records refer to one another by handle rather than
/// by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Fetching,
    Compiling,
    Compiled,
    Errored,
}

/// One module's record. `exports` is populated with the statically
/// declared names before the body compiles, and `artifact_path` is fixed
/// the moment compilation begins, so circular importers can observe both
/// without waiting.
#[derive(Debug)]
pub struct ModuleRecord {
    pub path: String,
    pub status: ModuleStatus,
    pub exports: Vec<String>,
    pub macros: HashMap<String, MacroDef>,
    pub defines_macros: bool,
    pub artifact_path: Option<PathBuf>,
    pub dependents: Vec<ModuleId>,
    pub imports: Vec<ModuleId>,
    pub source_hash: String,
}

impl ModuleRecord {
    fn new(path: String) -> Self {
        ModuleRecord {
            path,
            status: ModuleStatus::Fetching,
            exports: Vec::new(),
            macros: HashMap::new(),
            defines_macros: false,
            artifact_path: None,
            dependents: Vec::new(),
            imports: Vec::new(),
            source_hash: String::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    records: Vec<ModuleRecord>,
    by_path: HashMap<String, ModuleId>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, path: &str) -> Option<ModuleId> {
        self.by_path.get(path).copied()
    }

    /// Allocate a record for `path`; the same path always maps to the
    /// same handle
    pub fn alloc(&mut self, path: &str) -> ModuleId {
        if let Some(id) = self.lookup(path) {
            return id;
        }
        let id = ModuleId(self.records.len());
        self.records.push(ModuleRecord::new(path.to_string()));
        self.by_path.insert(path.to_string(), id);
        id
    }

    pub fn get(&self, id: ModuleId) -> &ModuleRecord {
        &self.records[id.0]
    }

    pub fn get_mut(&mut self, id: ModuleId) -> &mut ModuleRecord {
        &mut self.records[id.0]
    }

    pub fn add_dependency(&mut self, dependent: ModuleId, dependency: ModuleId) {
        if !self.records[dependent.0].imports.contains(&dependency) {
            self.records[dependent.0].imports.push(dependency);
        }
        if !self.records[dependency.0].dependents.contains(&dependent) {
            self.records[dependency.0].dependents.push(dependent);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ModuleId> {
        (0..self.records.len()).map(ModuleId)
    }
}

// ============================================================================
// Specifier Resolution
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    /// `./x` or `../x`, resolved against the importer's directory
    Relative,
    /// Absolute filesystem path, used as-is
    Absolute,
    /// `https://` or `http://`, fetched
    Url,
    /// Registry-style; resolution is delegated to the host runtime
    Package,
}

pub fn classify_specifier(spec: &str) -> SpecifierKind {
    if spec.starts_with("./") || spec.starts_with("../") {
        SpecifierKind::Relative
    } else if spec.starts_with('/') {
        SpecifierKind::Absolute
    } else if spec.starts_with("https://") || spec.starts_with("http://") {
        SpecifierKind::Url
    } else {
        SpecifierKind::Package
    }
}

/// Resolve a specifier against the importing module's location.
/// Package specifiers come back unchanged; the host resolves those.
pub fn resolve_specifier(spec: &str, importer: &str) -> String {
    match classify_specifier(spec) {
        SpecifierKind::Relative => {
            if let SpecifierKind::Url = classify_specifier(importer) {
                return resolve_url_relative(importer, spec);
            }
            let dir = Path::new(importer).parent().unwrap_or_else(|| Path::new("."));
            normalize_path(&dir.join(spec))
        }
        SpecifierKind::Absolute => normalize_path(Path::new(spec)),
        SpecifierKind::Url | SpecifierKind::Package => spec.to_string(),
    }
}

/// Lexical `.`/`..` normalization without touching the filesystem
fn normalize_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut prefix = String::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                if parts.pop().is_none() {
                    prefix.push_str("../");
                }
            }
            std::path::Component::CurDir => {}
            std::path::Component::RootDir => prefix = "/".to_string(),
            other => parts.push(other.as_os_str().to_string_lossy().into_owned()),
        }
    }
    format!("{}{}", prefix, parts.join("/"))
}

fn resolve_url_relative(base: &str, spec: &str) -> String {
    let (origin, path) = match base.find("://").map(|i| i + 3) {
        Some(scheme_end) => match base[scheme_end..].find('/') {
            Some(slash) => base.split_at(scheme_end + slash),
            None => (base, "/"),
        },
        None => return spec.to_string(),
    };
    let dir = match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    };
    let mut segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for seg in spec.split('/') {
        match seg {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("{}/{}", origin, segments.join("/"))
}

// ============================================================================
// Pre-compilation Scans (over the raw, unexpanded AST)
// ============================================================================

/// One `(import …)` request found in a module, in source order.
/// `names` keeps the source spelling so imported macros resolve by the
/// name macros are defined under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub source: String,
    pub names: Vec<String>,
}

/// Import requests of a module's top-level forms, in source order
pub fn scan_imports(forms: &[Ast]) -> Vec<ImportRequest> {
    let mut out = Vec::new();
    for form in forms {
        if !form.is_form("import") {
            continue;
        }
        let items = form.as_list().expect("import form is a list");
        let Some(source) = items.last().and_then(|s| s.as_string_literal()) else {
            continue;
        };
        let mut names = Vec::new();
        if let Some(Ast::Vector(v)) = items.get(1) {
            let mut i = 0;
            while i < v.items.len() {
                if let Some(name) = v.items[i].as_symbol() {
                    names.push(name.to_string());
                    if v.items.get(i + 1).and_then(|a| a.as_symbol()) == Some("as") {
                        i += 3;
                        continue;
                    }
                }
                i += 1;
            }
        }
        out.push(ImportRequest {
            source: source.to_string(),
            names,
        });
    }
    out
}

/// Export names a module statically declares, before any compilation.
/// These seed the pre-registered exports object for circular imports.
pub fn scan_declared_exports(forms: &[Ast]) -> Vec<String> {
    let mut out = Vec::new();
    for form in forms {
        if !form.is_form("export") {
            continue;
        }
        let items = form.as_list().expect("export form is a list");
        match items.get(1) {
            Some(Ast::Vector(v)) => {
                let mut i = 0;
                while i < v.items.len() {
                    if let Some(name) = v.items[i].as_symbol() {
                        if v.items.get(i + 1).and_then(|a| a.as_symbol()) == Some("as") {
                            if let Some(alias) = v.items.get(i + 2).and_then(|a| a.as_symbol()) {
                                out.push(crate::lower::ts_name(alias));
                            }
                            i += 3;
                            continue;
                        }
                        out.push(crate::lower::ts_name(name));
                    }
                    i += 1;
                }
            }
            Some(lit) if lit.as_string_literal().is_some() => {
                out.push(crate::lower::ts_name(
                    lit.as_string_literal().expect("checked above"),
                ));
            }
            _ => {}
        }
    }
    out
}

/// Whether the module defines any macros at top level. A module that
/// does cannot be imported from inside its own import cycle.
pub fn defines_macros(forms: &[Ast]) -> bool {
    forms.iter().any(|f| f.is_form("macro"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_program;

    #[test]
    fn test_classify_specifiers() {
        assert_eq!(classify_specifier("./a.quill"), SpecifierKind::Relative);
        assert_eq!(classify_specifier("../up.quill"), SpecifierKind::Relative);
        assert_eq!(classify_specifier("/abs/x.quill"), SpecifierKind::Absolute);
        assert_eq!(classify_specifier("https://x.dev/m.quill"), SpecifierKind::Url);
        assert_eq!(classify_specifier("left-pad"), SpecifierKind::Package);
        assert_eq!(classify_specifier("npm:chalk"), SpecifierKind::Package);
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_specifier("./b.quill", "/src/a.quill"),
            "/src/b.quill"
        );
        assert_eq!(
            resolve_specifier("../lib/c.quill", "/src/app/a.quill"),
            "/src/lib/c.quill"
        );
    }

    #[test]
    fn test_resolve_relative_to_url() {
        assert_eq!(
            resolve_specifier("./util.quill", "https://x.dev/lib/mod.quill"),
            "https://x.dev/lib/util.quill"
        );
        assert_eq!(
            resolve_specifier("../a.quill", "https://x.dev/lib/deep/mod.quill"),
            "https://x.dev/lib/a.quill"
        );
    }

    #[test]
    fn test_package_passes_through() {
        assert_eq!(resolve_specifier("npm:chalk", "/src/a.quill"), "npm:chalk");
    }

    #[test]
    fn test_graph_alloc_is_idempotent() {
        let mut g = ModuleGraph::new();
        let a = g.alloc("/a.quill");
        let same = g.alloc("/a.quill");
        assert_eq!(a, same);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_dependency_edges() {
        let mut g = ModuleGraph::new();
        let a = g.alloc("/a.quill");
        let b = g.alloc("/b.quill");
        g.add_dependency(a, b);
        g.add_dependency(a, b);
        assert_eq!(g.get(a).imports, vec![b]);
        assert_eq!(g.get(b).dependents, vec![a]);
    }

    #[test]
    fn test_scan_imports_in_source_order() {
        let forms = read_program(
            "(import [a, b as c] from \"./a.quill\")\n(import util from \"./util.quill\")\n(fn f [] 1)",
            "m.quill",
        )
        .unwrap();
        let imports = scan_imports(&forms);
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].source, "./a.quill");
        assert_eq!(imports[0].names, vec!["a", "b"]);
        assert_eq!(imports[1].source, "./util.quill");
        assert!(imports[1].names.is_empty());
    }

    #[test]
    fn test_scan_declared_exports() {
        let forms = read_program(
            "(fn f [] 1) (export [f, g as h]) (export \"answer\" 42)",
            "m.quill",
        )
        .unwrap();
        assert_eq!(scan_declared_exports(&forms), vec!["f", "h", "answer"]);
    }

    #[test]
    fn test_defines_macros() {
        let forms = read_program("(macro m (x) x)", "m.quill").unwrap();
        assert!(defines_macros(&forms));
        let forms = read_program("(fn f [] 1)", "m.quill").unwrap();
        assert!(!defines_macros(&forms));
    }
}
