pub mod annotation;
pub mod ast;
pub mod cbor;
pub mod diagnostic;
pub mod emit_cpp;
pub mod emit_py;
pub mod format;
pub mod lexeme;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod resolve;
pub mod span;

use diagnostic::{render_diagnostics, Diagnostic};
use lexer::Lexer;
use model::TreeModel;
use parser::Parser;

/// Parse `.tree` source into its raw parse tree, rendering diagnostics to
/// stderr on failure.
pub fn parse_source(source: &str, filename: &str) -> Result<ast::File, Vec<Diagnostic>> {
    match parse_source_silent(source) {
        Ok(file) => Ok(file),
        Err(errors) => {
            render_diagnostics(&errors, filename, source);
            Err(errors)
        }
    }
}

/// Parse `.tree` source without rendering diagnostics.
pub fn parse_source_silent(source: &str) -> Result<ast::File, Vec<Diagnostic>> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }
    Parser::new(tokens).parse_file()
}

/// Parse and resolve `.tree` source into a validated Tree Model.
pub fn build_model(source: &str) -> Result<TreeModel, Vec<Diagnostic>> {
    let file = parse_source_silent(source)?;
    resolve::build_model(&file)
}

/// All generated compilation units for one model.
pub struct GeneratedOutput {
    pub header: String,
    pub source: String,
    /// Only produced when the dynamic-language output was requested.
    pub python: Option<String>,
}

/// Run both emitters over a validated model. `header_filename` is the name
/// the generated source file uses to include the generated header.
pub fn generate(model: &TreeModel, header_filename: &str, with_python: bool) -> GeneratedOutput {
    let cpp = emit_cpp::emit(model, header_filename);
    GeneratedOutput {
        header: cpp.header,
        source: cpp.source,
        python: with_python.then(|| emit_py::emit(model)),
    }
}
