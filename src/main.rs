// ABOUTME: quillc command-line interface

use clap::{Parser, Subcommand};
use quillc::config::{CompilerOptions, SourceMapMode};
use quillc::error::EXIT_DIAGNOSTIC;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Compiler for Quill, a Lisp dialect that emits TypeScript
#[derive(Parser, Debug)]
#[command(name = "quillc")]
#[command(version = quillc::config::VERSION)]
#[command(about = "Compile Quill sources to idiomatic TypeScript")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Emit the source map as a sibling .map file instead of inline
    #[arg(long = "external-map", global = true)]
    external_map: bool,

    /// Disable source maps entirely
    #[arg(long = "no-map", global = true)]
    no_map: bool,

    /// Bypass the on-disk artifact cache
    #[arg(long = "no-cache", global = true)]
    no_cache: bool,

    /// Module path generated imports of runtime helpers point at
    #[arg(long = "runtime", value_name = "PATH", global = true)]
    runtime: Option<String>,

    /// Host command used to execute artifacts (for `run`)
    #[arg(long = "js-runtime", value_name = "CMD", global = true)]
    js_runtime: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a single file and print the TypeScript to stdout
    Transpile {
        /// Source file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Compile a file and execute it with the host runtime
    Run {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Compile a file, its imports, and write a build manifest
    Build {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Output directory for the manifest
        #[arg(long = "out", value_name = "DIR", default_value = "build")]
        out: PathBuf,
    },
    /// Recursively compile every Quill source under a directory
    CompileDir {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Print the export names of a module, one per line
    Exports {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn options_from(cli: &Cli) -> CompilerOptions {
    let mut options = CompilerOptions::default();
    if cli.no_map {
        options.source_map = SourceMapMode::None;
    } else if cli.external_map {
        options.source_map = SourceMapMode::External;
    }
    options.no_cache = cli.no_cache;
    if let Some(runtime) = &cli.runtime {
        options.runtime_module = runtime.clone();
    }
    if let Some(cmd) = &cli.js_runtime {
        options.js_runtime = cmd.split_whitespace().map(str::to_string).collect();
    }
    options
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = options_from(&cli);

    let code = match &cli.command {
        Command::Transpile { file } => transpile_to_stdout(file, &options),
        Command::Run { file } => match quillc::run(file, options) {
            Ok(code) => code,
            Err(e) => report(&e, None),
        },
        Command::Build { file, out } => match quillc::build(file, out, options) {
            Ok(manifest) => {
                println!("{}", manifest.display());
                0
            }
            Err(e) => report(&e, None),
        },
        Command::CompileDir { dir } => {
            let failures = quillc::compile_dir(dir, &options);
            for (file, diagnostic) in &failures {
                let source = std::fs::read_to_string(file).ok();
                eprintln!("{}", diagnostic.render(source.as_deref()));
            }
            if failures.is_empty() {
                0
            } else {
                failures
                    .iter()
                    .map(|(_, d)| d.exit_code())
                    .max()
                    .unwrap_or(EXIT_DIAGNOSTIC)
            }
        }
        Command::Exports { file } => match quillc::resolve_exports(file) {
            Ok(names) => {
                for name in names {
                    println!("{}", name);
                }
                0
            }
            Err(e) => report(&e, None),
        },
    };

    std::process::exit(code);
}

fn transpile_to_stdout(file: &PathBuf, options: &CompilerOptions) -> i32 {
    let source = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ResolveError: cannot resolve \"{}\": {}", file.display(), e);
            return EXIT_DIAGNOSTIC;
        }
    };
    match quillc::transpile(&source, &file.to_string_lossy(), options) {
        Ok(out) => {
            print!("{}", out.code);
            if options.source_map == SourceMapMode::Inline {
                println!("{}", quillc::emit::sourcemap::inline_comment(&out.map_json));
            }
            0
        }
        Err(e) => report(&e, Some(&source)),
    }
}

fn report(diagnostic: &quillc::Diagnostic, source: Option<&str>) -> i32 {
    eprintln!("{}", diagnostic.render(source));
    diagnostic.exit_code()
}
