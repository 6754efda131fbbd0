use std::collections::HashMap;

use crate::ast;
use crate::diagnostic::Diagnostic;
use crate::model::*;
use crate::span::Span;

/// Build a validated Tree Model from a parsed file.
///
/// Resolution runs in three passes: declaration collection, reference
/// resolution, and validation. The first error wins; emitters are never
/// invoked on a partial model.
pub fn build_model(file: &ast::File) -> Result<TreeModel, Vec<Diagnostic>> {
    let mut resolver = Resolver::new();
    resolver.collect_header(file)?;
    resolver.collect_declarations(file)?;
    resolver.link_references(file)?;
    resolver.validate()?;
    Ok(resolver.finish())
}

struct Resolver {
    header: Header,
    nodes: Vec<NodeType>,
    prims: Vec<Primitive>,
    enums: Vec<Enumeration>,
    node_names: HashMap<String, usize>,
    prim_names: HashMap<String, usize>,
    enum_names: HashMap<String, usize>,
    diagnostics: Vec<Diagnostic>,
}

impl Resolver {
    fn new() -> Self {
        Self {
            header: Header::default(),
            nodes: Vec::new(),
            prims: Vec::new(),
            enums: Vec::new(),
            node_names: HashMap::new(),
            prim_names: HashMap::new(),
            enum_names: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn check(&mut self) -> Result<(), Vec<Diagnostic>> {
        if self.diagnostics.is_empty() {
            Ok(())
        } else {
            Err(std::mem::take(&mut self.diagnostics))
        }
    }

    fn finish(self) -> TreeModel {
        let root = self.nodes.iter().position(|n| n.is_root);
        let error_node = self.nodes.iter().position(|n| n.is_error);
        TreeModel {
            header: self.header,
            nodes: self.nodes,
            prims: self.prims,
            enums: self.enums,
            root,
            error_node,
        }
    }

    // --- Header ---

    fn collect_header(&mut self, file: &ast::File) -> Result<(), Vec<Diagnostic>> {
        for item in &file.header {
            match &item.node {
                ast::HeaderItem::Namespace(parts) => {
                    if !self.header.namespace.is_empty() {
                        self.diagnostics.push(Diagnostic::error(
                            "duplicate namespace directive".to_string(),
                            item.span,
                        ));
                    }
                    self.header.namespace = parts.iter().map(|p| p.node.clone()).collect();
                }
                ast::HeaderItem::Include(path) => {
                    self.header.includes.push(path.node.clone());
                }
                ast::HeaderItem::SrcInclude(path) => {
                    self.header.src_includes.push(path.node.clone());
                }
                ast::HeaderItem::Location(parts) => {
                    if self.header.location.is_some() {
                        self.diagnostics.push(Diagnostic::error(
                            "duplicate location directive".to_string(),
                            item.span,
                        ));
                    }
                    let path: Vec<String> = parts.iter().map(|p| p.node.clone()).collect();
                    self.header.location = Some(path.join("."));
                }
                ast::HeaderItem::Features(flags) => {
                    for flag in flags {
                        match flag.node.as_str() {
                            "serialization" => self.header.features.serialization = true,
                            "source_location" => self.header.features.source_location = true,
                            other => {
                                self.diagnostics.push(
                                    Diagnostic::error(
                                        format!("unknown feature flag '{}'", other),
                                        flag.span,
                                    )
                                    .with_help(
                                        "known features are 'serialization' and \
                                         'source_location'"
                                            .to_string(),
                                    ),
                                );
                            }
                        }
                    }
                }
                ast::HeaderItem::Prim(_) => {} // handled with the other declarations
            }
        }
        // source_location requires a tracker type to serialize
        if self.header.features.source_location && self.header.location.is_none() {
            let span = file.header.last().map(|i| i.span).unwrap_or(Span::dummy());
            self.diagnostics.push(
                Diagnostic::error(
                    "feature 'source_location' requires a location directive".to_string(),
                    span,
                )
                .with_help("add 'location your.Tracker;' to the header".to_string()),
            );
        }
        self.check()
    }

    // --- Pass 1: declaration collection ---

    fn collect_declarations(&mut self, file: &ast::File) -> Result<(), Vec<Diagnostic>> {
        for item in &file.header {
            if let ast::HeaderItem::Prim(p) = &item.node {
                if self.declare(&p.name.node, p.name.span) {
                    self.prim_names
                        .insert(p.name.node.clone(), self.prims.len());
                    self.prims.push(Primitive {
                        doc: p.doc.clone(),
                        name: p.name.node.clone(),
                        backing: p.backing.node.clone(),
                        default: p.default.as_ref().map(|s| s.node.clone()),
                        serialize: p.serialize.as_ref().map(|s| s.node.clone()),
                        deserialize: p.deserialize.as_ref().map(|s| s.node.clone()),
                        python: p.python.as_ref().map(|s| s.node.clone()),
                    });
                }
            }
        }

        for decl in &file.decls {
            match &decl.node {
                ast::Decl::Enum(e) => {
                    if self.declare(&e.name.node, e.name.span) {
                        self.enum_names
                            .insert(e.name.node.clone(), self.enums.len());
                        self.enums.push(Enumeration {
                            doc: e.doc.clone(),
                            name: e.name.node.clone(),
                            constants: e.constants.iter().map(|c| c.node.clone()).collect(),
                        });
                    }
                    // Constant uniqueness within the enumeration
                    let mut seen: HashMap<&str, Span> = HashMap::new();
                    for constant in &e.constants {
                        if seen.insert(constant.node.as_str(), constant.span).is_some() {
                            self.diagnostics.push(Diagnostic::error(
                                format!(
                                    "duplicate constant '{}' in enum '{}'",
                                    constant.node, e.name.node
                                ),
                                constant.span,
                            ));
                        }
                    }
                }
                ast::Decl::Node(n) => {
                    if self.declare(&n.name.node, n.name.span) {
                        self.node_names
                            .insert(n.name.node.clone(), self.nodes.len());
                        self.nodes.push(NodeType {
                            name: n.name.node.clone(),
                            doc: n.doc.clone(),
                            parent: None,
                            children: Vec::new(),
                            fields: Vec::new(),
                            is_root: n.is_root,
                            is_error: n.is_error,
                            type_id: 0,
                            span: n.name.span,
                        });
                    }
                }
            }
        }
        self.check()
    }

    /// Registers a declared name, rejecting collisions across node types,
    /// primitives, and enumerations. Returns false on a duplicate.
    fn declare(&mut self, name: &str, span: Span) -> bool {
        let taken = self.node_names.contains_key(name)
            || self.prim_names.contains_key(name)
            || self.enum_names.contains_key(name);
        if taken {
            self.diagnostics.push(
                Diagnostic::error(format!("duplicate declaration of '{}'", name), span)
                    .with_help("node type, prim, and enum names share one namespace".to_string()),
            );
            return false;
        }
        true
    }

    // --- Pass 2: reference resolution ---

    fn link_references(&mut self, file: &ast::File) -> Result<(), Vec<Diagnostic>> {
        for decl in &file.decls {
            let ast::Decl::Node(n) = &decl.node else {
                continue;
            };
            let Some(&idx) = self.node_names.get(&n.name.node) else {
                continue; // duplicate, already reported
            };

            if let Some(parent) = &n.parent {
                match self.node_names.get(&parent.node) {
                    Some(&pidx) => self.nodes[idx].parent = Some(pidx),
                    None => {
                        let message = if self.prim_names.contains_key(&parent.node)
                            || self.enum_names.contains_key(&parent.node)
                        {
                            format!("parent '{}' is not a node type", parent.node)
                        } else {
                            format!("unknown type '{}'", parent.node)
                        };
                        self.diagnostics.push(Diagnostic::error(message, parent.span));
                    }
                }
            }

            let fields: Vec<Field> = n
                .fields
                .iter()
                .filter_map(|f| self.link_field(f))
                .collect();
            self.nodes[idx].fields = fields;
        }
        self.check()?;

        // Populate each node's children set from its descendants' parent links
        for idx in 0..self.nodes.len() {
            if let Some(pidx) = self.nodes[idx].parent {
                self.nodes[pidx].children.push(idx);
            }
        }

        // Concrete node types get declaration-order discriminators from 1
        let mut next_id = 1;
        for node in &mut self.nodes {
            if node.children.is_empty() {
                node.type_id = next_id;
                next_id += 1;
            }
        }
        Ok(())
    }

    fn link_field(&mut self, f: &ast::FieldDecl) -> Option<Field> {
        let target_name = f.ty.node.target_name();
        let target = if let Some(&i) = self.node_names.get(target_name) {
            TypeRef::Node(i)
        } else if let Some(&i) = self.prim_names.get(target_name) {
            TypeRef::Prim(i)
        } else if let Some(&i) = self.enum_names.get(target_name) {
            TypeRef::Enum(i)
        } else {
            self.diagnostics.push(
                Diagnostic::error(format!("unknown type '{}'", target_name), f.ty.span)
                    .with_note(format!("referenced from field '{}'", f.name.node))
                    .with_help(
                        "declare a node type, prim, or enum with this name".to_string(),
                    ),
            );
            return None;
        };

        let kind = match (&f.ty.node, target) {
            (ast::TypeExpr::Maybe(_), TypeRef::Node(_)) => EdgeKind::Maybe,
            (ast::TypeExpr::One(_), TypeRef::Node(_)) => EdgeKind::One,
            (ast::TypeExpr::Any(_), TypeRef::Node(_)) => EdgeKind::Any,
            (ast::TypeExpr::Many(_), TypeRef::Node(_)) => EdgeKind::Many,
            (ast::TypeExpr::Link(_), TypeRef::Node(_)) => EdgeKind::Link,
            // A bare name resolves by what it names
            (ast::TypeExpr::Bare(_), TypeRef::Node(_)) => EdgeKind::One,
            (ast::TypeExpr::Bare(_), TypeRef::Prim(_) | TypeRef::Enum(_)) => EdgeKind::Prim,
            (_, TypeRef::Prim(_) | TypeRef::Enum(_)) => {
                self.diagnostics.push(
                    Diagnostic::error(
                        format!("edge type requires a node type, but '{}' is not one", target_name),
                        f.ty.span,
                    )
                    .with_help(
                        "Maybe/One/Any/Many/Link take node types; primitives are stored \
                         by value with a bare name"
                            .to_string(),
                    ),
                );
                return None;
            }
        };

        if f.default.is_some() && kind != EdgeKind::Prim {
            self.diagnostics.push(Diagnostic::error(
                format!("field '{}' has a default but is not a primitive", f.name.node),
                f.ty.span,
            ));
        }
        if f.ext_op && kind != EdgeKind::Prim {
            self.diagnostics.push(Diagnostic::error(
                format!(
                    "operator generation ('!') on field '{}' requires a primitive type",
                    f.name.node
                ),
                f.ty.span,
            ));
        }

        Some(Field {
            name: f.name.node.clone(),
            doc: f.doc.clone(),
            kind,
            target,
            ext_op: f.ext_op,
            default: f.default.as_ref().map(|s| s.node.clone()),
            span: f.name.span,
        })
    }

    // --- Pass 3: validation ---

    fn validate(&mut self) -> Result<(), Vec<Diagnostic>> {
        self.check_parent_cycles();
        // A cycle poisons ancestor walks; stop before the remaining checks
        self.check()?;
        self.check_field_shadowing();
        self.check_markers();
        self.check()
    }

    /// No cycles in the parent-of relation: a node cannot inherit from
    /// itself transitively.
    fn check_parent_cycles(&mut self) {
        for start in 0..self.nodes.len() {
            let mut current = self.nodes[start].parent;
            let mut steps = 0usize;
            while let Some(idx) = current {
                if idx == start {
                    self.diagnostics.push(
                        Diagnostic::error(
                            format!(
                                "cycle in parent chain involving node type '{}'",
                                self.nodes[start].name
                            ),
                            self.nodes[start].span,
                        )
                        .with_help("a node type cannot inherit from itself".to_string()),
                    );
                    break;
                }
                current = self.nodes[idx].parent;
                steps += 1;
                // A cycle that does not pass through `start` is reported
                // when its own members take the `start` role.
                if steps > self.nodes.len() {
                    break;
                }
            }
        }
    }

    /// Field names must be unique within the declaring node type and must
    /// not collide with any transitively inherited field.
    fn check_field_shadowing(&mut self) {
        let mut errors = Vec::new();
        for idx in 0..self.nodes.len() {
            let mut inherited: HashMap<&str, &str> = HashMap::new();
            let mut current = self.nodes[idx].parent;
            while let Some(i) = current {
                for field in &self.nodes[i].fields {
                    inherited
                        .entry(field.name.as_str())
                        .or_insert(self.nodes[i].name.as_str());
                }
                current = self.nodes[i].parent;
            }

            let mut own: HashMap<&str, Span> = HashMap::new();
            for field in &self.nodes[idx].fields {
                if own.insert(field.name.as_str(), field.span).is_some() {
                    errors.push(Diagnostic::error(
                        format!(
                            "duplicate field '{}' on node type '{}'",
                            field.name, self.nodes[idx].name
                        ),
                        field.span,
                    ));
                } else if let Some(owner) = inherited.get(field.name.as_str()) {
                    errors.push(
                        Diagnostic::error(
                            format!(
                                "field '{}' on '{}' collides with a field inherited from '{}'",
                                field.name, self.nodes[idx].name, owner
                            ),
                            field.span,
                        )
                        .with_help("rename one of the two fields".to_string()),
                    );
                }
            }
        }
        self.diagnostics.extend(errors);
    }

    /// `root` on at most one node, `error` on at most one concrete node.
    fn check_markers(&mut self) {
        let roots: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_root)
            .collect();
        if roots.len() > 1 {
            let node = &self.nodes[roots[1]];
            self.diagnostics.push(
                Diagnostic::error(
                    format!("'{}' is marked root, but a root was already declared", node.name),
                    node.span,
                )
                .with_note(format!(
                    "first root was '{}'",
                    self.nodes[roots[0]].name
                )),
            );
        }

        let errors: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_error)
            .collect();
        if errors.len() > 1 {
            let node = &self.nodes[errors[1]];
            self.diagnostics.push(Diagnostic::error(
                format!(
                    "'{}' is marked error, but an error node was already declared",
                    node.name
                ),
                node.span,
            ));
        }
        for &i in &errors {
            if !self.nodes[i].children.is_empty() {
                self.diagnostics.push(
                    Diagnostic::error(
                        format!(
                            "error node type '{}' must be concrete",
                            self.nodes[i].name
                        ),
                        self.nodes[i].span,
                    )
                    .with_note("it has derived node types and is therefore abstract".to_string())
                    .with_help("mark a leaf node type as the error node".to_string()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn model(source: &str) -> TreeModel {
        try_model(source).unwrap_or_else(|e| panic!("resolution errors: {:?}", e))
    }

    fn try_model(source: &str) -> Result<TreeModel, Vec<Diagnostic>> {
        let (tokens, diags) = Lexer::new(source).tokenize();
        assert!(diags.is_empty(), "lex errors: {:?}", diags);
        let file = Parser::new(tokens).parse_file().expect("parse errors");
        build_model(&file)
    }

    fn first_error(source: &str) -> Diagnostic {
        try_model(source)
            .err()
            .expect("expected resolution errors")
            .remove(0)
    }

    const EXPR_TREE: &str = "\
        prim Int = \"std::int64_t\" [default = \"0\", python = \"int\"];\n\
        node Expr { }\n\
        node Add : Expr { lhs: One<Expr>; rhs: One<Expr>; }\n\
        node Lit : Expr { value: Int; }\n";

    #[test]
    fn test_basic_model() {
        let m = model(EXPR_TREE);
        assert_eq!(m.nodes.len(), 3);
        assert_eq!(m.prims.len(), 1);
        let expr = m.node_by_name("Expr").unwrap();
        assert!(expr.is_derived(), "Expr has children and is abstract");
        assert_eq!(expr.children.len(), 2);
        let add = m.node_by_name("Add").unwrap();
        assert!(add.is_concrete());
        assert_eq!(add.fields[0].kind, EdgeKind::One);
    }

    #[test]
    fn test_discriminator_numbering() {
        let m = model(EXPR_TREE);
        // Concrete types numbered in declaration order from 1; abstract gets 0
        assert_eq!(m.node_by_name("Expr").unwrap().type_id, 0);
        assert_eq!(m.node_by_name("Add").unwrap().type_id, 1);
        assert_eq!(m.node_by_name("Lit").unwrap().type_id, 2);
    }

    #[test]
    fn test_bare_node_name_is_one() {
        let m = model("node X { }\nnode Y { child: X; }");
        let y = m.node_by_name("Y").unwrap();
        assert_eq!(y.fields[0].kind, EdgeKind::One);
    }

    #[test]
    fn test_bare_prim_name_is_value() {
        let m = model("prim Int = \"i\";\nnode Y { count: Int; }");
        let y = m.node_by_name("Y").unwrap();
        assert_eq!(y.fields[0].kind, EdgeKind::Prim);
    }

    #[test]
    fn test_enum_as_field() {
        let m = model("enum Color = red | green;\nnode Y { c: Color; }");
        let y = m.node_by_name("Y").unwrap();
        assert_eq!(y.fields[0].kind, EdgeKind::Prim);
        assert!(matches!(y.fields[0].target, TypeRef::Enum(0)));
    }

    #[test]
    fn test_all_fields_inherited_first() {
        let m = model(
            "prim Int = \"i\";\n\
             node A { a: Int; }\n\
             node B : A { b: Int; }\n\
             node C : B { c: Int; }\n",
        );
        let c = m.nodes.iter().position(|n| n.name == "C").unwrap();
        let names: Vec<&str> = m.all_fields(c).iter().map(|(_, f)| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_root_marker() {
        let m = model("root node Program { }\n");
        assert_eq!(m.root, Some(0));
        assert!(m.error_node.is_none());
    }

    #[test]
    fn test_features() {
        let m = model("location demo.Loc;\nfeatures serialization, source_location;\nnode X { }");
        assert!(m.header.features.serialization);
        assert!(m.header.features.source_location);
        assert_eq!(m.header.location.as_deref(), Some("demo.Loc"));
    }

    // --- Error path tests ---

    #[test]
    fn test_error_duplicate_node() {
        let e = first_error("node X { }\nnode X { }");
        assert!(e.message.contains("duplicate declaration of 'X'"), "got: {}", e.message);
    }

    #[test]
    fn test_error_duplicate_across_kinds() {
        let e = first_error("prim X = \"x\";\nnode X { }");
        assert!(e.message.contains("duplicate declaration"), "got: {}", e.message);
    }

    #[test]
    fn test_error_unknown_parent() {
        let e = first_error("node X : Missing { }");
        assert!(e.message.contains("unknown type 'Missing'"), "got: {}", e.message);
    }

    #[test]
    fn test_error_parent_not_node() {
        let e = first_error("prim Int = \"i\";\nnode X : Int { }");
        assert!(e.message.contains("not a node type"), "got: {}", e.message);
    }

    #[test]
    fn test_error_parent_cycle() {
        let e = first_error("node A : B { }\nnode B : A { }");
        assert!(e.message.contains("cycle"), "got: {}", e.message);
    }

    #[test]
    fn test_error_unknown_field_type() {
        let e = first_error("node Root { }\nnode X : Root { child: One<Missing>; }");
        assert!(e.message.contains("unknown type 'Missing'"), "got: {}", e.message);
    }

    #[test]
    fn test_error_edge_of_primitive() {
        let e = first_error("prim Int = \"i\";\nnode X { xs: Many<Int>; }");
        assert!(e.message.contains("requires a node type"), "got: {}", e.message);
    }

    #[test]
    fn test_error_field_shadows_inherited() {
        let e = first_error(
            "prim Int = \"i\";\n\
             node A { value: Int; }\n\
             node B : A { value: Int; }\n",
        );
        assert!(e.message.contains("collides"), "got: {}", e.message);
    }

    #[test]
    fn test_error_two_roots() {
        let e = first_error("root node A { }\nroot node B { }");
        assert!(e.message.contains("root was already declared"), "got: {}", e.message);
    }

    #[test]
    fn test_error_abstract_error_node() {
        let e = first_error("error node A { }\nnode B : A { }");
        assert!(e.message.contains("must be concrete"), "got: {}", e.message);
    }

    #[test]
    fn test_error_default_on_edge() {
        let e = first_error("node X { }\nnode Y { child: One<X> = \"zero\"; }");
        assert!(e.message.contains("default"), "got: {}", e.message);
    }

    #[test]
    fn test_error_ext_op_on_edge() {
        let e = first_error("node X { }\nnode Y { child: One<X>!; }");
        assert!(e.message.contains("requires a primitive"), "got: {}", e.message);
    }

    #[test]
    fn test_error_source_location_without_tracker() {
        let e = first_error("features source_location;\nnode X { }");
        assert!(e.message.contains("requires a location directive"), "got: {}", e.message);
    }
}
