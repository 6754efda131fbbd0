use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

pub struct Parser {
    tokens: Vec<Spanned<Lexeme>>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned<Lexeme>>) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn parse_file(mut self) -> Result<File, Vec<Diagnostic>> {
        let mut header = Vec::new();
        let mut decls = Vec::new();
        let mut header_done = false;

        loop {
            let doc = self.take_doc();
            let start = self.current_span();
            match self.current() {
                Lexeme::Eof => break,
                Lexeme::Namespace
                | Lexeme::Include
                | Lexeme::SrcInclude
                | Lexeme::Location
                | Lexeme::Features
                | Lexeme::Prim => {
                    if header_done {
                        self.error_at_current(
                            "header directives must appear before the first declaration",
                        );
                    }
                    let item = self.parse_header_item(doc);
                    let span = start.merge(self.prev_span());
                    header.push(Spanned::new(item, span));
                }
                Lexeme::Enum => {
                    header_done = true;
                    let decl = self.parse_enum(doc);
                    let span = start.merge(self.prev_span());
                    decls.push(Spanned::new(Decl::Enum(decl), span));
                }
                Lexeme::Node | Lexeme::Root | Lexeme::Error => {
                    header_done = true;
                    let decl = self.parse_node(doc);
                    let span = start.merge(self.prev_span());
                    decls.push(Spanned::new(Decl::Node(decl), span));
                }
                _ => {
                    self.error_at_current(
                        "expected a header directive, 'enum', or 'node' declaration",
                    );
                    self.advance(); // skip to recover
                }
            }
        }

        if !self.diagnostics.is_empty() {
            return Err(self.diagnostics);
        }
        Ok(File { header, decls })
    }

    fn parse_header_item(&mut self, doc: Option<String>) -> HeaderItem {
        match self.current().clone() {
            Lexeme::Namespace => {
                self.advance();
                let path = self.parse_dotted_name();
                self.expect(&Lexeme::Semicolon);
                HeaderItem::Namespace(path)
            }
            Lexeme::Include => {
                self.advance();
                let path = self.expect_string();
                self.expect(&Lexeme::Semicolon);
                HeaderItem::Include(path)
            }
            Lexeme::SrcInclude => {
                self.advance();
                let path = self.expect_string();
                self.expect(&Lexeme::Semicolon);
                HeaderItem::SrcInclude(path)
            }
            Lexeme::Location => {
                self.advance();
                let path = self.parse_dotted_name();
                self.expect(&Lexeme::Semicolon);
                HeaderItem::Location(path)
            }
            Lexeme::Features => {
                self.advance();
                let mut flags = vec![self.expect_ident()];
                while self.eat(&Lexeme::Comma) {
                    flags.push(self.expect_ident());
                }
                self.expect(&Lexeme::Semicolon);
                HeaderItem::Features(flags)
            }
            Lexeme::Prim => HeaderItem::Prim(self.parse_prim(doc)),
            _ => unreachable!("caller dispatches on header keywords"),
        }
    }

    fn parse_prim(&mut self, doc: Option<String>) -> PrimDecl {
        self.expect(&Lexeme::Prim);
        let name = self.expect_ident();
        self.expect(&Lexeme::Eq);
        let backing = self.expect_string();

        let mut prim = PrimDecl {
            doc,
            name,
            backing,
            default: None,
            serialize: None,
            deserialize: None,
            python: None,
        };

        if self.eat(&Lexeme::LBracket) {
            loop {
                let attr = self.advance();
                let slot = match attr.node {
                    Lexeme::Default => &mut prim.default,
                    Lexeme::Serialize => &mut prim.serialize,
                    Lexeme::Deserialize => &mut prim.deserialize,
                    Lexeme::Python => &mut prim.python,
                    other => {
                        self.diagnostics.push(
                            Diagnostic::error(
                                format!(
                                    "expected prim attribute but found {}",
                                    other.description()
                                ),
                                attr.span,
                            )
                            .with_note(format!("offending token: '{}'", other.lexeme_text()))
                            .with_help(
                                "prim attributes are 'default', 'serialize', 'deserialize', \
                                 and 'python'"
                                    .to_string(),
                            ),
                        );
                        break;
                    }
                };
                self.expect(&Lexeme::Eq);
                let value = self.expect_string();
                if slot.is_some() {
                    self.diagnostics.push(Diagnostic::error(
                        "duplicate prim attribute".to_string(),
                        value.span,
                    ));
                }
                *slot = Some(value);
                if !self.eat(&Lexeme::Comma) {
                    break;
                }
            }
            self.expect(&Lexeme::RBracket);
        }

        self.expect(&Lexeme::Semicolon);
        prim
    }

    fn parse_enum(&mut self, doc: Option<String>) -> EnumDecl {
        self.expect(&Lexeme::Enum);
        let name = self.expect_ident();
        self.expect(&Lexeme::Eq);
        let mut constants = vec![self.expect_ident()];
        while self.eat(&Lexeme::Pipe) {
            constants.push(self.expect_ident());
        }
        self.expect(&Lexeme::Semicolon);
        EnumDecl {
            doc,
            name,
            constants,
        }
    }

    fn parse_node(&mut self, doc: Option<String>) -> NodeDecl {
        let mut is_root = false;
        let mut is_error = false;
        loop {
            if self.eat(&Lexeme::Root) {
                is_root = true;
            } else if self.eat(&Lexeme::Error) {
                is_error = true;
            } else {
                break;
            }
        }

        self.expect(&Lexeme::Node);
        let name = self.expect_ident();
        let parent = if self.eat(&Lexeme::Colon) {
            Some(self.expect_ident())
        } else {
            None
        };

        self.expect(&Lexeme::LBrace);
        let mut fields = Vec::new();
        while !self.at(&Lexeme::RBrace) && !self.at(&Lexeme::Eof) {
            fields.push(self.parse_field());
        }
        self.expect(&Lexeme::RBrace);

        NodeDecl {
            doc,
            is_root,
            is_error,
            name,
            parent,
            fields,
        }
    }

    fn parse_field(&mut self) -> FieldDecl {
        let doc = self.take_doc();
        let name = self.expect_ident();
        self.expect(&Lexeme::Colon);
        let ty = self.parse_type_expr();
        let ext_op = self.eat(&Lexeme::Bang);
        let default = if self.eat(&Lexeme::Eq) {
            Some(self.expect_string())
        } else {
            None
        };
        self.expect(&Lexeme::Semicolon);
        FieldDecl {
            doc,
            name,
            ty,
            ext_op,
            default,
        }
    }

    fn parse_type_expr(&mut self) -> Spanned<TypeExpr> {
        let start = self.current_span();
        let wrapper = match self.current() {
            Lexeme::Maybe | Lexeme::One | Lexeme::Any | Lexeme::Many | Lexeme::Link => {
                Some(self.advance().node)
            }
            _ => None,
        };

        if let Some(kw) = wrapper {
            self.expect(&Lexeme::Lt);
            let target = self.expect_ident();
            self.expect(&Lexeme::Gt);
            let expr = match kw {
                Lexeme::Maybe => TypeExpr::Maybe(target.node),
                Lexeme::One => TypeExpr::One(target.node),
                Lexeme::Any => TypeExpr::Any(target.node),
                Lexeme::Many => TypeExpr::Many(target.node),
                Lexeme::Link => TypeExpr::Link(target.node),
                _ => unreachable!(),
            };
            return Spanned::new(expr, start.merge(self.prev_span()));
        }

        let target = self.expect_ident();
        // `T?` and `T*` are shorthands for Maybe<T> and Any<T>
        let expr = if self.eat(&Lexeme::Question) {
            TypeExpr::Maybe(target.node)
        } else if self.eat(&Lexeme::Star) {
            TypeExpr::Any(target.node)
        } else {
            TypeExpr::Bare(target.node)
        };
        Spanned::new(expr, start.merge(self.prev_span()))
    }

    fn parse_dotted_name(&mut self) -> Vec<Spanned<String>> {
        let mut parts = vec![self.expect_ident()];
        while self.eat(&Lexeme::Dot) {
            parts.push(self.expect_ident());
        }
        parts
    }

    /// Consumes a pending doc comment, merging consecutive ones.
    fn take_doc(&mut self) -> Option<String> {
        let mut doc: Option<String> = None;
        while let Lexeme::DocComment(text) = self.current() {
            let text = text.clone();
            self.advance();
            match &mut doc {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(&text);
                }
                None => doc = Some(text),
            }
        }
        doc
    }

    // --- Token plumbing ---

    fn current(&self) -> &Lexeme {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].node
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            return self.current_span();
        }
        self.tokens[(self.pos - 1).min(self.tokens.len() - 1)].span
    }

    fn at(&self, lexeme: &Lexeme) -> bool {
        self.current() == lexeme
    }

    fn advance(&mut self) -> Spanned<Lexeme> {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, lexeme: &Lexeme) -> bool {
        if self.at(lexeme) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, lexeme: &Lexeme) -> Spanned<Lexeme> {
        if self.at(lexeme) {
            self.advance()
        } else {
            let found = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
            self.diagnostics.push(
                Diagnostic::error(
                    format!(
                        "expected {} but found {}",
                        lexeme.description(),
                        found.node.description()
                    ),
                    found.span,
                )
                .with_note(format!("offending token: '{}'", found.node.lexeme_text())),
            );
            found
        }
    }

    fn expect_ident(&mut self) -> Spanned<String> {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if let Lexeme::Ident(name) = tok.node {
            self.advance();
            Spanned::new(name, tok.span)
        } else {
            self.diagnostics.push(
                Diagnostic::error(
                    format!("expected identifier but found {}", tok.node.description()),
                    tok.span,
                )
                .with_note(format!("offending token: '{}'", tok.node.lexeme_text())),
            );
            // Error recovery: don't consume, let the caller's structure resync
            if !self.at(&Lexeme::Eof) {
                self.advance();
            }
            Spanned::new(String::new(), tok.span)
        }
    }

    fn expect_string(&mut self) -> Spanned<String> {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if let Lexeme::Str(value) = tok.node {
            self.advance();
            Spanned::new(value, tok.span)
        } else {
            self.diagnostics.push(
                Diagnostic::error(
                    format!(
                        "expected string literal but found {}",
                        tok.node.description()
                    ),
                    tok.span,
                )
                .with_note(format!("offending token: '{}'", tok.node.lexeme_text())),
            );
            if !self.at(&Lexeme::Eof) {
                self.advance();
            }
            Spanned::new(String::new(), tok.span)
        }
    }

    fn error_at_current(&mut self, message: &str) {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        self.diagnostics.push(
            Diagnostic::error(message.to_string(), tok.span)
                .with_note(format!("offending token: '{}'", tok.node.lexeme_text())),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> File {
        let (tokens, lex_diags) = Lexer::new(source).tokenize();
        assert!(lex_diags.is_empty(), "lex errors: {:?}", lex_diags);
        Parser::new(tokens)
            .parse_file()
            .unwrap_or_else(|e| panic!("parse errors: {:?}", e))
    }

    fn parse_err(source: &str) -> Vec<Diagnostic> {
        let (tokens, _) = Lexer::new(source).tokenize();
        Parser::new(tokens)
            .parse_file()
            .err()
            .expect("expected parse errors")
    }

    #[test]
    fn test_empty_file() {
        let file = parse("");
        assert!(file.header.is_empty());
        assert!(file.decls.is_empty());
    }

    #[test]
    fn test_header_directives() {
        let file = parse(
            "namespace demo.ast;\n\
             include \"tree-all.hpp\";\n\
             src_include \"detail.hpp\";\n\
             location demo.SourceLocation;\n\
             features serialization, source_location;\n",
        );
        assert_eq!(file.header.len(), 5);
        match &file.header[0].node {
            HeaderItem::Namespace(parts) => {
                let names: Vec<_> = parts.iter().map(|p| p.node.as_str()).collect();
                assert_eq!(names, vec!["demo", "ast"]);
            }
            other => panic!("expected namespace, got {:?}", other),
        }
        match &file.header[4].node {
            HeaderItem::Features(flags) => assert_eq!(flags.len(), 2),
            other => panic!("expected features, got {:?}", other),
        }
    }

    #[test]
    fn test_prim_declaration() {
        let file = parse(
            "prim Int = \"std::int64_t\" [default = \"0\", serialize = \"ser_int\", \
             deserialize = \"de_int\", python = \"int\"];",
        );
        match &file.header[0].node {
            HeaderItem::Prim(p) => {
                assert_eq!(p.name.node, "Int");
                assert_eq!(p.backing.node, "std::int64_t");
                assert_eq!(p.default.as_ref().unwrap().node, "0");
                assert_eq!(p.serialize.as_ref().unwrap().node, "ser_int");
                assert_eq!(p.deserialize.as_ref().unwrap().node, "de_int");
                assert_eq!(p.python.as_ref().unwrap().node, "int");
            }
            other => panic!("expected prim, got {:?}", other),
        }
    }

    #[test]
    fn test_enum_declaration() {
        let file = parse("enum Color = red | green | blue;");
        match &file.decls[0].node {
            Decl::Enum(e) => {
                assert_eq!(e.name.node, "Color");
                let consts: Vec<_> = e.constants.iter().map(|c| c.node.as_str()).collect();
                assert_eq!(consts, vec!["red", "green", "blue"]);
            }
            other => panic!("expected enum, got {:?}", other),
        }
    }

    #[test]
    fn test_node_with_fields() {
        let file = parse(
            "node Add : Expr {\n\
                 lhs: One<Expr>;\n\
                 rhs: One<Expr>;\n\
             }\n",
        );
        match &file.decls[0].node {
            Decl::Node(n) => {
                assert_eq!(n.name.node, "Add");
                assert_eq!(n.parent.as_ref().unwrap().node, "Expr");
                assert_eq!(n.fields.len(), 2);
                assert_eq!(n.fields[0].name.node, "lhs");
                assert_eq!(n.fields[0].ty.node, TypeExpr::One("Expr".into()));
            }
            other => panic!("expected node, got {:?}", other),
        }
    }

    #[test]
    fn test_root_and_error_markers() {
        let file = parse("root node Program { }\nerror node Broken : Program { }");
        match (&file.decls[0].node, &file.decls[1].node) {
            (Decl::Node(a), Decl::Node(b)) => {
                assert!(a.is_root && !a.is_error);
                assert!(b.is_error && !b.is_root);
            }
            _ => panic!("expected two nodes"),
        }
    }

    #[test]
    fn test_all_edge_kinds() {
        let file = parse(
            "node Kitchen {\n\
                 a: Maybe<X>; b: One<X>; c: Any<X>; d: Many<X>; e: Link<X>; f: Int;\n\
             }",
        );
        match &file.decls[0].node {
            Decl::Node(n) => {
                assert_eq!(n.fields[0].ty.node, TypeExpr::Maybe("X".into()));
                assert_eq!(n.fields[1].ty.node, TypeExpr::One("X".into()));
                assert_eq!(n.fields[2].ty.node, TypeExpr::Any("X".into()));
                assert_eq!(n.fields[3].ty.node, TypeExpr::Many("X".into()));
                assert_eq!(n.fields[4].ty.node, TypeExpr::Link("X".into()));
                assert_eq!(n.fields[5].ty.node, TypeExpr::Bare("Int".into()));
            }
            _ => panic!("expected node"),
        }
    }

    #[test]
    fn test_type_shorthands() {
        let file = parse("node N { a: X?; b: X*; }");
        match &file.decls[0].node {
            Decl::Node(n) => {
                assert_eq!(n.fields[0].ty.node, TypeExpr::Maybe("X".into()));
                assert_eq!(n.fields[1].ty.node, TypeExpr::Any("X".into()));
            }
            _ => panic!("expected node"),
        }
    }

    #[test]
    fn test_field_ext_op_and_default() {
        let file = parse("node Lit { value: Int! = \"0\"; }");
        match &file.decls[0].node {
            Decl::Node(n) => {
                assert!(n.fields[0].ext_op);
                assert_eq!(n.fields[0].default.as_ref().unwrap().node, "0");
            }
            _ => panic!("expected node"),
        }
    }

    #[test]
    fn test_doc_comments_attach() {
        let file = parse(
            "/** An expression. */\n\
             node Expr {\n\
                 /** The operand. */\n\
                 value: Int;\n\
             }",
        );
        match &file.decls[0].node {
            Decl::Node(n) => {
                assert_eq!(n.doc.as_deref(), Some("An expression."));
                assert_eq!(n.fields[0].doc.as_deref(), Some("The operand."));
            }
            _ => panic!("expected node"),
        }
    }

    // --- Error path tests ---

    #[test]
    fn test_error_missing_semicolon() {
        let diags = parse_err("namespace demo\nnode X { }");
        assert!(
            diags[0].message.contains("expected ';'"),
            "got: {}",
            diags[0].message
        );
        assert!(
            diags[0].notes.iter().any(|n| n.contains("offending token")),
            "error should carry the offending lexeme"
        );
    }

    #[test]
    fn test_error_header_after_decl() {
        let diags = parse_err("node X { }\nnamespace demo;");
        assert!(
            diags[0]
                .message
                .contains("header directives must appear before"),
            "got: {}",
            diags[0].message
        );
    }

    #[test]
    fn test_error_stray_token() {
        let diags = parse_err("= node X { }");
        assert!(
            diags[0].message.contains("expected a header directive"),
            "got: {}",
            diags[0].message
        );
    }

    #[test]
    fn test_error_bad_field() {
        let diags = parse_err("node X { 42: Int; }");
        assert!(
            diags[0].message.contains("expected identifier"),
            "got: {}",
            diags[0].message
        );
    }
}
