// ABOUTME: Compiler configuration and constants
// This module holds the version, artifact options, cache locations, and
// the remote-import retry policy.

use std::path::PathBuf;
use std::time::Duration;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Recommended extension for Quill sources
pub const SOURCE_EXTENSION: &str = "quill";

/// Extension of emitted artifacts
pub const ARTIFACT_EXTENSION: &str = "ts";

// ============================================================================
// Remote Import Retry Policy
// ============================================================================

/// Maximum fetch attempts per remote import (first try + retries)
pub const FETCH_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff between fetch retries
pub const FETCH_BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Per-request timeout for remote imports
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound when forcing lazy sequences during compile-time evaluation
pub const LAZY_FORCE_LIMIT: usize = 10_000;

/// Macro expansion rounds before the expander assumes non-termination
pub const MACRO_EXPANSION_LIMIT: usize = 512;

// ============================================================================
// Source Map Output
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMapMode {
    /// Trailing `sourceMappingURL` comment with a base64 data URL
    #[default]
    Inline,
    /// Sibling `.map` file next to the artifact
    External,
    /// No map output
    None,
}

// ============================================================================
// Compiler Options
// ============================================================================

/// Options accepted by the driver's public surface
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Module path the generated import of runtime helpers points at
    pub runtime_module: String,
    pub source_map: SourceMapMode,
    /// Directory for the content-addressed artifact store
    pub cache_dir: PathBuf,
    /// Skip the on-disk cache entirely
    pub no_cache: bool,
    /// Host command used by `run` to execute the artifact
    pub js_runtime: Vec<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            runtime_module: "./runtime.ts".to_string(),
            source_map: SourceMapMode::default(),
            cache_dir: default_cache_dir(),
            no_cache: false,
            js_runtime: vec!["deno".to_string(), "run".to_string(), "-A".to_string()],
        }
    }
}

/// Cache lives under the platform cache root, falling back to a dotdir
/// in the working directory when no home is available.
pub fn default_cache_dir() -> PathBuf {
    std::env::var_os("QUILL_CACHE_DIR")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| {
                let mut p = PathBuf::from(home);
                p.push(".cache");
                p.push("quill");
                p
            })
        })
        .unwrap_or_else(|| PathBuf::from(".quill-cache"))
}
