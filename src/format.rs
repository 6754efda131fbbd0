//! Prints a Tree Model back to canonical `.tree` source.
//!
//! The printed form re-parses to an equivalent model, which is what the
//! grammar round-trip tests rely on. Source formatting of the original
//! input is not preserved.

use crate::model::*;

const INDENT: &str = "    ";

/// Render the model as canonical `.tree` text.
pub fn format_model(model: &TreeModel) -> String {
    let mut out = String::new();

    emit_header(&mut out, model);
    for enumeration in &model.enums {
        emit_enum(&mut out, enumeration);
    }
    for node in &model.nodes {
        emit_node(&mut out, model, node);
    }

    while out.ends_with("\n\n") {
        out.pop();
    }
    out
}

fn emit_header(out: &mut String, model: &TreeModel) {
    let header = &model.header;
    if !header.namespace.is_empty() {
        out.push_str(&format!("namespace {};\n", header.namespace.join(".")));
    }
    if let Some(location) = &header.location {
        out.push_str(&format!("location {};\n", location));
    }
    let mut features = Vec::new();
    if header.features.serialization {
        features.push("serialization");
    }
    if header.features.source_location {
        features.push("source_location");
    }
    if !features.is_empty() {
        out.push_str(&format!("features {};\n", features.join(", ")));
    }
    for include in &header.includes {
        out.push_str(&format!("include \"{}\";\n", escape(include)));
    }
    for include in &header.src_includes {
        out.push_str(&format!("src_include \"{}\";\n", escape(include)));
    }
    for prim in &model.prims {
        emit_prim(out, prim);
    }
    if !out.is_empty() {
        out.push('\n');
    }
}

fn emit_prim(out: &mut String, prim: &Primitive) {
    emit_doc(out, &prim.doc, "");
    out.push_str(&format!("prim {} = \"{}\"", prim.name, escape(&prim.backing)));
    let mut attrs = Vec::new();
    if let Some(v) = &prim.default {
        attrs.push(format!("default = \"{}\"", escape(v)));
    }
    if let Some(v) = &prim.serialize {
        attrs.push(format!("serialize = \"{}\"", escape(v)));
    }
    if let Some(v) = &prim.deserialize {
        attrs.push(format!("deserialize = \"{}\"", escape(v)));
    }
    if let Some(v) = &prim.python {
        attrs.push(format!("python = \"{}\"", escape(v)));
    }
    if !attrs.is_empty() {
        out.push_str(&format!(" [{}]", attrs.join(", ")));
    }
    out.push_str(";\n");
}

fn emit_enum(out: &mut String, enumeration: &Enumeration) {
    emit_doc(out, &enumeration.doc, "");
    out.push_str(&format!(
        "enum {} = {};\n\n",
        enumeration.name,
        enumeration.constants.join(" | ")
    ));
}

fn emit_node(out: &mut String, model: &TreeModel, node: &NodeType) {
    emit_doc(out, &node.doc, "");
    if node.is_root {
        out.push_str("root ");
    }
    if node.is_error {
        out.push_str("error ");
    }
    out.push_str(&format!("node {}", node.name));
    if let Some(parent) = node.parent {
        out.push_str(&format!(" : {}", model.nodes[parent].name));
    }
    if node.fields.is_empty() {
        out.push_str(" { }\n\n");
        return;
    }
    out.push_str(" {\n");
    for field in &node.fields {
        emit_field(out, model, field);
    }
    out.push_str("}\n\n");
}

fn emit_field(out: &mut String, model: &TreeModel, field: &Field) {
    emit_doc(out, &field.doc, INDENT);
    let target = model.target_name(field.target);
    let ty = match field.kind {
        EdgeKind::Maybe => format!("Maybe<{}>", target),
        EdgeKind::One => format!("One<{}>", target),
        EdgeKind::Any => format!("Any<{}>", target),
        EdgeKind::Many => format!("Many<{}>", target),
        EdgeKind::Link => format!("Link<{}>", target),
        EdgeKind::Prim => target.to_string(),
    };
    out.push_str(&format!("{}{}: {}", INDENT, field.name, ty));
    if field.ext_op {
        out.push('!');
    }
    if let Some(default) = &field.default {
        out.push_str(&format!(" = \"{}\"", escape(default)));
    }
    out.push_str(";\n");
}

fn emit_doc(out: &mut String, doc: &Option<String>, indent: &str) {
    let Some(doc) = doc else { return };
    if doc.lines().count() <= 1 {
        out.push_str(&format!("{}/** {} */\n", indent, doc));
    } else {
        out.push_str(&format!("{}/**\n", indent));
        for line in doc.lines() {
            out.push_str(&format!("{} * {}\n", indent, line));
        }
        out.push_str(&format!("{} */\n", indent));
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::resolve::build_model;

    fn model(source: &str) -> TreeModel {
        let (tokens, diags) = Lexer::new(source).tokenize();
        assert!(diags.is_empty(), "lex errors: {:?}", diags);
        let file = Parser::new(tokens).parse_file().expect("parse errors");
        build_model(&file).unwrap_or_else(|e| panic!("resolution errors: {:?}", e))
    }

    /// Printing, re-parsing, and printing again must be a fixed point.
    fn assert_roundtrip(source: &str) {
        let first = format_model(&model(source));
        let second = format_model(&model(&first));
        assert_eq!(first, second, "canonical form must be stable");
    }

    #[test]
    fn test_roundtrip_expression_tree() {
        assert_roundtrip(
            "namespace demo.ast;\n\
             prim Int = \"std::int64_t\" [default = \"0\", python = \"int\"];\n\
             /** Any expression. */\n\
             node Expr { }\n\
             node Add : Expr { lhs: One<Expr>; rhs: One<Expr>; }\n\
             node Lit : Expr { value: Int! = \"0\"; }\n",
        );
    }

    #[test]
    fn test_roundtrip_all_edge_kinds() {
        assert_roundtrip(
            "prim Str = \"std::string\";\n\
             root node Program { stmts: Many<Stmt>; }\n\
             node Stmt { label: Maybe<Label>; notes: Any<Label>; target: Link<Label>; \
             name: Str; }\n\
             node Label : Stmt { }\n",
        );
    }

    #[test]
    fn test_roundtrip_header() {
        assert_roundtrip(
            "namespace a.b;\n\
             location a.SourceLocation;\n\
             features serialization, source_location;\n\
             include \"one.hpp\";\n\
             src_include \"two.hpp\";\n\
             prim Int = \"i64\";\n\
             enum Color = red | green | blue;\n\
             node X { c: Color; }\n",
        );
    }

    #[test]
    fn test_shorthands_normalize() {
        // `T?` and `T*` print as Maybe<T> / Any<T>
        let printed = format_model(&model("node T { }\nnode U { a: T?; b: T*; }"));
        assert!(printed.contains("a: Maybe<T>;"), "got:\n{}", printed);
        assert!(printed.contains("b: Any<T>;"), "got:\n{}", printed);
    }

    #[test]
    fn test_doc_comments_preserved() {
        let printed = format_model(&model(
            "/** Top node. */\nnode X {\n    /** A field. */\n    y: X?;\n}",
        ));
        assert!(printed.contains("/** Top node. */"), "got:\n{}", printed);
        assert!(printed.contains("    /** A field. */"), "got:\n{}", printed);
        assert_roundtrip("/** Top node. */\nnode X {\n    /** A field. */\n    y: X?;\n}");
    }

    #[test]
    fn test_multiline_doc() {
        assert_roundtrip("/**\n * Line one.\n * Line two.\n */\nnode X { }\n");
    }
}
