use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use tree_gen::diagnostic::{Diagnostic, Severity};
use tree_gen::span::Span;

#[derive(Parser)]
#[command(
    name = "tree-gen",
    version,
    about = "Generates object models for tree-shaped data types from .tree descriptions"
)]
struct Cli {
    /// Input .tree description file
    input: PathBuf,
    /// Output path for the generated C++ header
    header_out: PathBuf,
    /// Output path for the generated C++ source
    source_out: PathBuf,
    /// Optional output path for the generated Python module
    dynamic_out: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let filename = cli.input.display().to_string();
    let source = match std::fs::read_to_string(&cli.input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{}:1:1: cannot read input: {}", filename, err);
            return 1;
        }
    };

    let model = match tree_gen::build_model(&source) {
        Ok(model) => model,
        Err(diagnostics) => {
            return report(&diagnostics, &filename, &source);
        }
    };

    let header_filename = cli
        .header_out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tree.hpp".to_string());
    let output = tree_gen::generate(&model, &header_filename, cli.dynamic_out.is_some());

    if let Err(err) = write_output(&cli.header_out, &output.header) {
        eprintln!("{}", err);
        return 1;
    }
    if let Err(err) = write_output(&cli.source_out, &output.source) {
        eprintln!("{}", err);
        return 1;
    }
    if let (Some(path), Some(python)) = (&cli.dynamic_out, &output.python) {
        if let Err(err) = write_output(path, python) {
            eprintln!("{}", err);
            return 1;
        }
    }
    0
}

/// Renders the diagnostics and prints the machine-readable line for the
/// first error: `<file>:<line>:<col>: <message>`.
fn report(diagnostics: &[Diagnostic], filename: &str, source: &str) -> i32 {
    for diagnostic in diagnostics {
        diagnostic.render(filename, source);
    }
    let first_error = diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
        .cloned()
        .unwrap_or_else(|| Diagnostic::error("unknown error".to_string(), Span::dummy()));
    eprintln!("{}", first_error.one_line(filename, source));
    1
}

fn write_output(path: &Path, contents: &str) -> Result<(), String> {
    std::fs::write(path, contents)
        .map_err(|err| format!("cannot write '{}': {}", path.display(), err))
}
