//! Native-language emitter: turns a validated Tree Model into a C++ class
//! hierarchy (one header, one source file).
//!
//! The generated code links against the `tree-all.hpp` support library for
//! the edge wrappers (`Maybe`, `One`, `Any`, `Many`, `Link`), the annotation
//! base class, and the CBOR reader/writer. Everything model-specific lives
//! in the generated files.

use crate::model::*;

/// The two generated compilation units.
pub struct CppOutput {
    pub header: String,
    pub source: String,
}

/// Emit C++ for the model. `header_filename` is what the source file will
/// `#include`.
pub fn emit(model: &TreeModel, header_filename: &str) -> CppOutput {
    let mut emitter = CppEmitter {
        model,
        header: Vec::new(),
        source: Vec::new(),
    };
    emitter.run(header_filename);
    CppOutput {
        header: emitter.header.join("\n") + "\n",
        source: emitter.source.join("\n") + "\n",
    }
}

/// Converts a CamelCase type name to the snake_case used in method names.
pub fn snake_case(name: &str) -> String {
    let mut out = String::new();
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

struct CppEmitter<'m> {
    model: &'m TreeModel,
    header: Vec<String>,
    source: Vec<String>,
}

impl<'m> CppEmitter<'m> {
    fn h(&mut self, line: impl Into<String>) {
        self.header.push(line.into());
    }

    fn s(&mut self, line: impl Into<String>) {
        self.source.push(line.into());
    }

    /// The C++ storage type of a field.
    fn field_type(&self, field: &Field) -> String {
        let target = match field.target {
            TypeRef::Node(i) => self.model.nodes[i].name.clone(),
            TypeRef::Prim(i) => self.model.prims[i].backing.clone(),
            TypeRef::Enum(i) => self.model.enums[i].name.clone(),
        };
        match field.kind {
            EdgeKind::Maybe => format!("::tree::base::Maybe<{}>", target),
            EdgeKind::One => format!("::tree::base::One<{}>", target),
            EdgeKind::Any => format!("::tree::base::Any<{}>", target),
            EdgeKind::Many => format!("::tree::base::Many<{}>", target),
            EdgeKind::Link => format!("::tree::base::Link<{}>", target),
            EdgeKind::Prim => target,
        }
    }

    /// The node-type name an edge field points at.
    fn edge_target(&self, field: &Field) -> &str {
        match field.target {
            TypeRef::Node(i) => &self.model.nodes[i].name,
            _ => unreachable!("edge fields target node types"),
        }
    }

    fn all_fields(&self, idx: usize) -> Vec<Field> {
        self.model
            .all_fields(idx)
            .into_iter()
            .map(|(_, f)| f.clone())
            .collect()
    }

    fn doc_comment(lines: &mut Vec<String>, doc: &Option<String>, indent: &str) {
        let Some(doc) = doc else { return };
        if doc.lines().count() <= 1 {
            lines.push(format!("{}/** {} */", indent, doc));
        } else {
            lines.push(format!("{}/**", indent));
            for line in doc.lines() {
                lines.push(format!("{} * {}", indent, line));
            }
            lines.push(format!("{} */", indent));
        }
    }

    fn run(&mut self, header_filename: &str) {
        self.emit_header_preamble();
        self.emit_enums();
        self.emit_type_enum();
        self.emit_base_decl();
        for idx in 0..self.model.nodes.len() {
            self.emit_class_decl(idx);
        }
        self.emit_visitor_decl();
        self.emit_namespace_close(true);

        self.emit_source_preamble(header_filename);
        self.emit_base_impl();
        for idx in 0..self.model.nodes.len() {
            self.emit_class_impl(idx);
        }
        self.emit_visitor_impl();
        self.emit_namespace_close(false);
    }

    // --- Header ---

    fn emit_header_preamble(&mut self) {
        self.h("// Generated by tree-gen. Do not edit.");
        self.h("#pragma once");
        self.h("");
        self.h("#include <cstdint>");
        self.h("#include <memory>");
        self.h("#include <ostream>");
        self.h("#include <string>");
        self.h("#include \"tree-all.hpp\"");
        for include in &self.model.header.includes.clone() {
            self.h(format!("#include \"{}\"", include));
        }
        self.h("");
        for part in &self.model.header.namespace.clone() {
            self.h(format!("namespace {} {{", part));
        }
        self.h("");
        self.h("// Forward declarations.");
        self.h("class Node;");
        for node in self.model.nodes.clone() {
            self.h(format!("class {};", node.name));
        }
        self.h("class Visitor;");
        self.h("");
    }

    fn emit_enums(&mut self) {
        for enumeration in self.model.enums.clone() {
            let mut lines = Vec::new();
            Self::doc_comment(&mut lines, &enumeration.doc, "");
            lines.push(format!("enum class {} : std::uint32_t {{", enumeration.name));
            for constant in &enumeration.constants {
                lines.push(format!("    {},", constant));
            }
            lines.push("};".to_string());
            lines.push(String::new());
            for line in lines {
                self.h(line);
            }
        }
    }

    fn emit_type_enum(&mut self) {
        self.h("/**");
        self.h(" * Discriminator for concrete node types, numbered in declaration");
        self.h(" * order starting at 1. This value is embedded in serialized trees.");
        self.h(" */");
        self.h("enum class NodeTypeId : std::uint32_t {");
        let concrete: Vec<(String, u32)> = self
            .model
            .concrete_nodes()
            .map(|(_, n)| (n.name.clone(), n.type_id))
            .collect();
        for (name, id) in concrete {
            self.h(format!("    {} = {},", name, id));
        }
        self.h("};");
        self.h("");
    }

    fn emit_base_decl(&mut self) {
        self.h("/**");
        self.h(" * Common base of all generated node types. Carries the annotation");
        self.h(" * map and the virtual interface shared by the whole hierarchy.");
        self.h(" */");
        self.h("class Node : public ::tree::base::Base {");
        self.h("public:");
        self.h("    virtual ~Node() = default;");
        self.h("");
        self.h("    /** The concrete type discriminator of this node. */");
        self.h("    virtual NodeTypeId type() const = 0;");
        self.h("");
        for node in self.model.nodes.clone() {
            let snake = snake_case(&node.name);
            self.h(format!(
                "    virtual bool is_{}() const {{ return false; }}",
                snake
            ));
            self.h(format!(
                "    virtual {} *as_{}() {{ return nullptr; }}",
                node.name, snake
            ));
            self.h(format!(
                "    virtual const {} *as_{}() const {{ return nullptr; }}",
                node.name, snake
            ));
        }
        if self.model.error_node.is_some() {
            self.h("");
            self.h("    /** Whether this node is the error-recovery marker type. */");
            self.h("    virtual bool is_error_marker() const { return false; }");
        }
        self.h("");
        self.h("    /** Shallow clone: owning children are shared, not duplicated. */");
        self.h("    virtual std::shared_ptr<Node> copy() const = 0;");
        self.h("");
        self.h("    /**");
        self.h("     * Deep clone of the owning subtree. Links are remapped when their");
        self.h("     * target was cloned in the same operation, and otherwise keep");
        self.h("     * pointing at the original.");
        self.h("     */");
        self.h("    std::shared_ptr<Node> clone() const;");
        self.h("");
        self.h("    /** Structural equality; links compare by pointer identity. */");
        self.h("    virtual bool equals(const Node &other) const = 0;");
        self.h("");
        self.h("    /** Dispatches to the visitor method for the concrete type. */");
        self.h("    virtual void visit(Visitor &visitor) = 0;");
        self.h("");
        self.h("    /** Pretty-prints the subtree. */");
        self.h("    virtual void dump(std::ostream &os, int indent = 0) const = 0;");
        self.h("");
        self.h("    /**");
        self.h("     * Verifies that all One fields are filled, all Many fields are");
        self.h("     * non-empty, and all links resolve inside this tree. Throws");
        self.h("     * ::tree::base::NotWellFormed otherwise.");
        self.h("     */");
        self.h("    void check_complete() const;");
        if self.model.header.features.serialization {
            self.h("");
            self.h("    /** Serializes this tree into a CBOR map per the wire format. */");
            self.h("    void serialize(::tree::cbor::MapWriter &map) const;");
            self.h("");
            self.h("    /** Reconstructs a tree from its CBOR map representation. */");
            self.h("    static std::shared_ptr<Node> deserialize(const ::tree::cbor::MapReader &map);");
        }
        self.h("");
        self.h("protected:");
        self.h("    friend class ::tree::base::LinkResolver;");
        self.h("    virtual std::shared_ptr<Node> clone_into(::tree::base::ClonedMap &map) const = 0;");
        self.h("    virtual void restore_links(const ::tree::base::ClonedMap &map);");
        self.h("    virtual void collect_reachable(::tree::base::PointerSet &set) const;");
        self.h("    virtual void check_complete_with(const ::tree::base::PointerSet &reachable) const;");
        self.h("    virtual const Node *resolve_child(const std::string &name, std::size_t index) const;");
        self.h("    virtual bool find_path(const Node *target, ::tree::base::Path &path) const;");
        if self.model.header.features.serialization {
            self.h("    virtual void assign_link_ids(::tree::base::PointerMap &ids) const;");
            self.h("    virtual void serialize_fields(::tree::cbor::MapWriter &map, const ::tree::base::PointerMap &ids) const;");
            self.h("    virtual void serialize_node(::tree::cbor::MapWriter &map, const ::tree::base::PointerMap &ids) const = 0;");
            self.h("    static std::shared_ptr<Node> deserialize_any(const ::tree::cbor::MapReader &map, ::tree::base::LinkResolver &links);");
        }
        self.h("};");
        self.h("");
    }

    fn emit_class_decl(&mut self, idx: usize) {
        let node = self.model.nodes[idx].clone();
        let parent_name = match node.parent {
            Some(p) => self.model.nodes[p].name.clone(),
            None => "Node".to_string(),
        };
        let snake = snake_case(&node.name);
        let all_fields = self.all_fields(idx);
        let has_ext_op = all_fields.iter().any(|f| f.ext_op);

        let mut lines = Vec::new();
        Self::doc_comment(&mut lines, &node.doc, "");
        for line in lines {
            self.h(line);
        }
        self.h(format!("class {} : public {} {{", node.name, parent_name));
        self.h("public:");

        // Locally declared fields only; inherited storage lives upstream.
        for field in &node.fields {
            let mut lines = Vec::new();
            Self::doc_comment(&mut lines, &field.doc, "    ");
            for line in lines {
                self.h(line);
            }
            let ty = self.field_type(field);
            if field.kind == EdgeKind::Prim {
                match &field.default {
                    Some(expr) => self.h(format!("    {} {} = {};", ty, field.name, expr)),
                    None => self.h(format!("    {} {}{{}};", ty, field.name)),
                }
            } else {
                self.h(format!("    {} {};", ty, field.name));
            }
        }
        if !node.fields.is_empty() {
            self.h("");
        }

        self.h(format!("    {}() = default;", node.name));
        if !all_fields.is_empty() {
            let params: Vec<String> = all_fields
                .iter()
                .map(|f| format!("{} {}", self.field_type(f), f.name))
                .collect();
            self.h(format!("    {}({});", node.name, params.join(", ")));
        }
        self.h("");

        if node.is_concrete() {
            self.h("    NodeTypeId type() const override;");
        }
        self.h(format!("    bool is_{}() const override;", snake));
        self.h(format!("    {} *as_{}() override;", node.name, snake));
        self.h(format!(
            "    const {} *as_{}() const override;",
            node.name, snake
        ));
        if node.is_error && self.model.error_node == Some(idx) {
            self.h("    bool is_error_marker() const override;");
        }
        if node.is_concrete() {
            self.h("    std::shared_ptr<Node> copy() const override;");
            self.h("    bool equals(const Node &other) const override;");
            self.h("    void visit(Visitor &visitor) override;");
            self.h("    void dump(std::ostream &os, int indent = 0) const override;");
            if has_ext_op {
                self.h(format!(
                    "    bool operator==(const {} &other) const;",
                    node.name
                ));
                self.h(format!(
                    "    bool operator!=(const {} &other) const;",
                    node.name
                ));
            }
            if self.model.header.features.serialization {
                self.h(format!(
                    "    static std::shared_ptr<{}> deserialize_fields(const ::tree::cbor::MapReader &map, ::tree::base::LinkResolver &links);",
                    node.name
                ));
            }
        }

        let mut protected = Vec::new();
        if node.is_concrete() {
            protected.push("    std::shared_ptr<Node> clone_into(::tree::base::ClonedMap &map) const override;".to_string());
        }
        if !node.fields.is_empty() {
            protected.push("    void restore_links(const ::tree::base::ClonedMap &map) override;".to_string());
            protected.push("    void collect_reachable(::tree::base::PointerSet &set) const override;".to_string());
            protected.push("    void check_complete_with(const ::tree::base::PointerSet &reachable) const override;".to_string());
            protected.push("    const Node *resolve_child(const std::string &name, std::size_t index) const override;".to_string());
            protected.push("    bool find_path(const Node *target, ::tree::base::Path &path) const override;".to_string());
            if self.model.header.features.serialization {
                protected.push("    void assign_link_ids(::tree::base::PointerMap &ids) const override;".to_string());
                protected.push("    void serialize_fields(::tree::cbor::MapWriter &map, const ::tree::base::PointerMap &ids) const override;".to_string());
            }
        }
        if node.is_concrete() && self.model.header.features.serialization {
            protected.push("    void serialize_node(::tree::cbor::MapWriter &map, const ::tree::base::PointerMap &ids) const override;".to_string());
        }
        if !protected.is_empty() {
            self.h("");
            self.h("protected:");
            for line in protected {
                self.h(line);
            }
        }
        self.h("};");
        self.h("");
    }

    fn emit_visitor_decl(&mut self) {
        self.h("/**");
        self.h(" * Visitor over the node hierarchy. Each handler falls back to the");
        self.h(" * handler of the node's parent type; the chain ends in visit_node,");
        self.h(" * which raises.");
        self.h(" */");
        self.h("class Visitor {");
        self.h("public:");
        self.h("    virtual ~Visitor() = default;");
        self.h("    virtual void visit_node(Node &node);");
        for node in self.model.nodes.clone() {
            self.h(format!(
                "    virtual void visit_{}({} &node);",
                snake_case(&node.name),
                node.name
            ));
        }
        self.h("};");
        self.h("");
    }

    fn emit_namespace_close(&mut self, header: bool) {
        let parts = self.model.header.namespace.clone();
        for part in parts.iter().rev() {
            let line = format!("}} // namespace {}", part);
            if header {
                self.h(line);
            } else {
                self.s(line);
            }
        }
    }

    // --- Source ---

    fn emit_source_preamble(&mut self, header_filename: &str) {
        self.s("// Generated by tree-gen. Do not edit.");
        self.s(format!("#include \"{}\"", header_filename));
        for include in &self.model.header.src_includes.clone() {
            self.s(format!("#include \"{}\"", include));
        }
        self.s("#include <stdexcept>");
        self.s("");
        for part in &self.model.header.namespace.clone() {
            self.s(format!("namespace {} {{", part));
        }
        self.s("");
    }

    fn emit_base_impl(&mut self) {
        self.s("std::shared_ptr<Node> Node::clone() const {");
        self.s("    ::tree::base::ClonedMap map;");
        self.s("    auto node = clone_into(map);");
        self.s("    node->restore_links(map);");
        self.s("    return node;");
        self.s("}");
        self.s("");
        self.s("void Node::restore_links(const ::tree::base::ClonedMap &map) {");
        self.s("    (void)map;");
        self.s("}");
        self.s("");
        self.s("void Node::check_complete() const {");
        self.s("    ::tree::base::PointerSet reachable;");
        self.s("    collect_reachable(reachable);");
        self.s("    check_complete_with(reachable);");
        self.s("}");
        self.s("");
        self.s("void Node::collect_reachable(::tree::base::PointerSet &set) const {");
        self.s("    set.add(this);");
        self.s("}");
        self.s("");
        self.s("void Node::check_complete_with(const ::tree::base::PointerSet &reachable) const {");
        self.s("    (void)reachable;");
        self.s("}");
        self.s("");
        self.s("const Node *Node::resolve_child(const std::string &name, std::size_t index) const {");
        self.s("    (void)index;");
        self.s("    throw ::tree::base::NotWellFormed(\"no child field '\" + name + \"'\");");
        self.s("}");
        self.s("");
        self.s("bool Node::find_path(const Node *target, ::tree::base::Path &path) const {");
        self.s("    (void)path;");
        self.s("    return target == this;");
        self.s("}");
        self.s("");
        if self.model.header.features.serialization {
            self.s("void Node::assign_link_ids(::tree::base::PointerMap &ids) const {");
            self.s("    (void)ids;");
            self.s("}");
            self.s("");
            self.s("void Node::serialize_fields(::tree::cbor::MapWriter &map, const ::tree::base::PointerMap &ids) const {");
            self.s("    (void)map;");
            self.s("    (void)ids;");
            self.s("}");
            self.s("");
            self.s("void Node::serialize(::tree::cbor::MapWriter &map) const {");
            self.s("    ::tree::base::PointerMap ids;");
            self.s("    assign_link_ids(ids);");
            self.s("    serialize_node(map, ids);");
            self.s("    if (!ids.empty()) {");
            self.s("        // Side table: one path per link id, in id order. A null entry");
            self.s("        // marks a target outside this root (left undefined).");
            self.s("        auto links = map.append_array(\"links\");");
            self.s("        for (const Node *target : ids.in_order()) {");
            self.s("            ::tree::base::Path path;");
            self.s("            if (find_path(target, path)) {");
            self.s("                auto steps = links.append_array();");
            self.s("                path.serialize(steps);");
            self.s("                steps.close();");
            self.s("            } else {");
            self.s("                links.append_null();");
            self.s("            }");
            self.s("        }");
            self.s("        links.close();");
            self.s("    }");
            self.s("}");
            self.s("");
            self.s("std::shared_ptr<Node> Node::deserialize(const ::tree::cbor::MapReader &map) {");
            self.s("    ::tree::base::LinkResolver links;");
            self.s("    auto node = deserialize_any(map, links);");
            self.s("    links.resolve(*node, map);");
            self.s("    return node;");
            self.s("}");
            self.s("");
            self.s("std::shared_ptr<Node> Node::deserialize_any(const ::tree::cbor::MapReader &map, ::tree::base::LinkResolver &links) {");
            self.s("    auto type = map.at(\"type\").as_string();");
            let concrete: Vec<String> = self
                .model
                .concrete_nodes()
                .map(|(_, n)| n.name.clone())
                .collect();
            for name in concrete {
                self.s(format!("    if (type == \"{}\") {{", name));
                self.s(format!(
                    "        return {}::deserialize_fields(map, links);",
                    name
                ));
                self.s("    }");
            }
            self.s("    throw ::tree::base::NotWellFormed(\"unknown node type '\" + type + \"'\");");
            self.s("}");
            self.s("");
        }
    }

    fn emit_class_impl(&mut self, idx: usize) {
        let node = self.model.nodes[idx].clone();
        let name = node.name.clone();
        let snake = snake_case(&name);
        let parent_name = match node.parent {
            Some(p) => self.model.nodes[p].name.clone(),
            None => "Node".to_string(),
        };
        let all_fields = self.all_fields(idx);
        let parent_fields: Vec<Field> = match node.parent {
            Some(p) => self.all_fields(p),
            None => Vec::new(),
        };

        // All-fields constructor, inherited fields delegated to the parent.
        if !all_fields.is_empty() {
            let params: Vec<String> = all_fields
                .iter()
                .map(|f| format!("{} {}", self.field_type(f), f.name))
                .collect();
            let mut inits = Vec::new();
            if !parent_fields.is_empty() {
                let args: Vec<String> = parent_fields
                    .iter()
                    .map(|f| format!("std::move({})", f.name))
                    .collect();
                inits.push(format!("{}({})", parent_name, args.join(", ")));
            }
            for field in &node.fields {
                inits.push(format!("{0}(std::move({0}))", field.name));
            }
            self.s(format!("{}::{}({})", name, name, params.join(", ")));
            self.s(format!("    : {} {{", inits.join(", ")));
            self.s("}");
            self.s("");
        }

        if node.is_concrete() {
            self.s(format!("NodeTypeId {}::type() const {{", name));
            self.s(format!("    return NodeTypeId::{};", name));
            self.s("}");
            self.s("");
        }

        self.s(format!("bool {}::is_{}() const {{", name, snake));
        self.s("    return true;");
        self.s("}");
        self.s("");
        self.s(format!("{0} *{0}::as_{1}() {{", name, snake));
        self.s("    return this;");
        self.s("}");
        self.s("");
        self.s(format!("const {0} *{0}::as_{1}() const {{", name, snake));
        self.s("    return this;");
        self.s("}");
        self.s("");
        if node.is_error && self.model.error_node == Some(idx) {
            self.s(format!("bool {}::is_error_marker() const {{", name));
            self.s("    return true;");
            self.s("}");
            self.s("");
        }

        if node.is_concrete() {
            self.emit_copy(&node, &all_fields);
            self.emit_clone_into(&node, &all_fields);
            self.emit_equals(&node, &all_fields);
            self.emit_visit(&node);
            self.emit_dump(&node, &all_fields);
            if all_fields.iter().any(|f| f.ext_op) {
                self.s(format!(
                    "bool {0}::operator==(const {0} &other) const {{",
                    name
                ));
                self.s("    return equals(other);");
                self.s("}");
                self.s("");
                self.s(format!(
                    "bool {0}::operator!=(const {0} &other) const {{",
                    name
                ));
                self.s("    return !equals(other);");
                self.s("}");
                self.s("");
            }
        }

        if !node.fields.is_empty() {
            self.emit_restore_links(&node, &parent_name);
            self.emit_collect_reachable(&node, &parent_name);
            self.emit_check_complete_with(&node, &parent_name);
            self.emit_resolve_child(&node, &parent_name);
            self.emit_find_path(&node, &parent_name);
            if self.model.header.features.serialization {
                self.emit_assign_link_ids(&node, &parent_name);
                self.emit_serialize_fields(&node, &parent_name);
            }
        }
        if node.is_concrete() && self.model.header.features.serialization {
            self.emit_serialize_node(&node);
            self.emit_deserialize_fields(&node, &all_fields);
        }
    }

    fn emit_copy(&mut self, node: &NodeType, all_fields: &[Field]) {
        let name = &node.name;
        self.s(format!("std::shared_ptr<Node> {}::copy() const {{", name));
        if all_fields.is_empty() {
            self.s(format!("    auto node = std::make_shared<{}>();", name));
        } else {
            let args: Vec<String> = all_fields.iter().map(|f| f.name.clone()).collect();
            self.s(format!(
                "    auto node = std::make_shared<{}>({});",
                name,
                args.join(", ")
            ));
        }
        self.s("    node->copy_annotations(*this);");
        self.s("    return node;");
        self.s("}");
        self.s("");
    }

    fn emit_clone_into(&mut self, node: &NodeType, all_fields: &[Field]) {
        let name = node.name.clone();
        self.s(format!(
            "std::shared_ptr<Node> {}::clone_into(::tree::base::ClonedMap &map) const {{",
            name
        ));
        self.s(format!("    auto node = std::make_shared<{}>();", name));
        for field in all_fields {
            let f = &field.name;
            match field.kind {
                EdgeKind::Maybe | EdgeKind::One => {
                    let target = self.edge_target(field).to_string();
                    self.s(format!("    if ({}) {{", f));
                    self.s(format!(
                        "        node->{} = std::static_pointer_cast<{}>({}->clone_into(map));",
                        f, target, f
                    ));
                    self.s("    }");
                }
                EdgeKind::Any | EdgeKind::Many => {
                    let target = self.edge_target(field).to_string();
                    self.s(format!("    for (const auto &element : {}) {{", f));
                    self.s(format!(
                        "        node->{}.add(std::static_pointer_cast<{}>(element->clone_into(map)));",
                        f, target
                    ));
                    self.s("    }");
                }
                EdgeKind::Link | EdgeKind::Prim => {
                    // Links keep their original target here; the restore pass
                    // remaps them once the whole subtree is cloned.
                    self.s(format!("    node->{0} = {0};", f));
                }
            }
        }
        self.s("    node->copy_annotations(*this);");
        self.s("    map.record(this, node.get());");
        self.s("    return node;");
        self.s("}");
        self.s("");
    }

    fn emit_restore_links(&mut self, node: &NodeType, parent_name: &str) {
        let name = &node.name;
        self.s(format!(
            "void {}::restore_links(const ::tree::base::ClonedMap &map) {{",
            name
        ));
        self.s(format!("    {}::restore_links(map);", parent_name));
        for field in &node.fields {
            let f = &field.name;
            match field.kind {
                EdgeKind::Maybe | EdgeKind::One => {
                    self.s(format!("    if ({0}) {0}->restore_links(map);", f));
                }
                EdgeKind::Any | EdgeKind::Many => {
                    self.s(format!("    for (const auto &element : {}) {{", f));
                    self.s("        element->restore_links(map);");
                    self.s("    }");
                }
                EdgeKind::Link => {
                    self.s(format!("    {}.remap(map);", f));
                }
                EdgeKind::Prim => {}
            }
        }
        self.s("}");
        self.s("");
    }

    fn emit_equals(&mut self, node: &NodeType, all_fields: &[Field]) {
        let name = &node.name;
        let snake = snake_case(name);
        self.s(format!("bool {}::equals(const Node &other) const {{", name));
        self.s(format!("    if (other.type() != NodeTypeId::{}) {{", name));
        self.s("        return false;");
        self.s("    }");
        if !all_fields.is_empty() {
            self.s(format!("    const {} &o = *other.as_{}();", name, snake));
        }
        for field in all_fields {
            let f = &field.name;
            match field.kind {
                EdgeKind::Maybe | EdgeKind::One | EdgeKind::Any | EdgeKind::Many => {
                    // Wrapper equality is structural over the owning subtree
                    self.s(format!("    if (!{0}.equals(o.{0})) {{", f));
                    self.s("        return false;");
                    self.s("    }");
                }
                EdgeKind::Link => {
                    self.s(format!("    if ({0}.get() != o.{0}.get()) {{", f));
                    self.s("        return false;");
                    self.s("    }");
                }
                EdgeKind::Prim => {
                    self.s(format!("    if (!({0} == o.{0})) {{", f));
                    self.s("        return false;");
                    self.s("    }");
                }
            }
        }
        self.s("    return true;");
        self.s("}");
        self.s("");
    }

    fn emit_visit(&mut self, node: &NodeType) {
        let name = &node.name;
        self.s(format!("void {}::visit(Visitor &visitor) {{", name));
        self.s(format!("    visitor.visit_{}(*this);", snake_case(name)));
        self.s("}");
        self.s("");
    }

    fn emit_dump(&mut self, node: &NodeType, all_fields: &[Field]) {
        let name = &node.name;
        self.s(format!(
            "void {}::dump(std::ostream &os, int indent) const {{",
            name
        ));
        self.s("    std::string pad(indent, ' ');");
        self.s(format!("    os << pad << \"{} {{\" << std::endl;", name));
        for field in all_fields {
            let f = &field.name;
            match field.kind {
                EdgeKind::Maybe | EdgeKind::One => {
                    self.s(format!(
                        "    os << pad << \"  {}:\" << std::endl;",
                        f
                    ));
                    self.s(format!("    if ({}) {{", f));
                    self.s(format!("        {}->dump(os, indent + 4);", f));
                    self.s("    } else {");
                    self.s("        os << pad << \"    null\" << std::endl;");
                    self.s("    }");
                }
                EdgeKind::Any | EdgeKind::Many => {
                    self.s(format!(
                        "    os << pad << \"  {}: [\" << std::endl;",
                        f
                    ));
                    self.s(format!("    for (const auto &element : {}) {{", f));
                    self.s("        element->dump(os, indent + 4);");
                    self.s("    }");
                    self.s("    os << pad << \"  ]\" << std::endl;");
                }
                EdgeKind::Link => {
                    self.s(format!(
                        "    os << pad << \"  {}: \" << ({0} ? \"<link>\" : \"null\") << std::endl;",
                        f
                    ));
                }
                EdgeKind::Prim => {
                    let value = match field.target {
                        TypeRef::Enum(_) => format!("static_cast<std::uint32_t>({})", f),
                        _ => f.clone(),
                    };
                    self.s(format!(
                        "    os << pad << \"  {}: \" << {} << std::endl;",
                        f, value
                    ));
                }
            }
        }
        self.s("    os << pad << \"}\" << std::endl;");
        self.s("}");
        self.s("");
    }

    fn emit_collect_reachable(&mut self, node: &NodeType, parent_name: &str) {
        let name = &node.name;
        self.s(format!(
            "void {}::collect_reachable(::tree::base::PointerSet &set) const {{",
            name
        ));
        self.s(format!("    {}::collect_reachable(set);", parent_name));
        for field in &node.fields {
            let f = &field.name;
            match field.kind {
                EdgeKind::Maybe | EdgeKind::One => {
                    self.s(format!("    if ({0}) {0}->collect_reachable(set);", f));
                }
                EdgeKind::Any | EdgeKind::Many => {
                    self.s(format!("    for (const auto &element : {}) {{", f));
                    self.s("        element->collect_reachable(set);");
                    self.s("    }");
                }
                _ => {}
            }
        }
        self.s("}");
        self.s("");
    }

    fn emit_check_complete_with(&mut self, node: &NodeType, parent_name: &str) {
        let name = &node.name;
        self.s(format!(
            "void {}::check_complete_with(const ::tree::base::PointerSet &reachable) const {{",
            name
        ));
        self.s(format!("    {}::check_complete_with(reachable);", parent_name));
        for field in &node.fields {
            let f = &field.name;
            match field.kind {
                EdgeKind::One => {
                    self.s(format!("    if (!{}) {{", f));
                    self.s(format!(
                        "        throw ::tree::base::NotWellFormed(\"'One' field '{}' of '{}' is empty\");",
                        f, name
                    ));
                    self.s("    }");
                    self.s(format!("    {}->check_complete_with(reachable);", f));
                }
                EdgeKind::Maybe => {
                    self.s(format!("    if ({0}) {0}->check_complete_with(reachable);", f));
                }
                EdgeKind::Many => {
                    self.s(format!("    if ({}.empty()) {{", f));
                    self.s(format!(
                        "        throw ::tree::base::NotWellFormed(\"'Many' field '{}' of '{}' is empty\");",
                        f, name
                    ));
                    self.s("    }");
                    self.s(format!("    for (const auto &element : {}) {{", f));
                    self.s("        element->check_complete_with(reachable);");
                    self.s("    }");
                }
                EdgeKind::Any => {
                    self.s(format!("    for (const auto &element : {}) {{", f));
                    self.s("        element->check_complete_with(reachable);");
                    self.s("    }");
                }
                EdgeKind::Link => {
                    self.s(format!("    if ({0} && !reachable.contains({0}.get())) {{", f));
                    self.s(format!(
                        "        throw ::tree::base::NotWellFormed(\"link '{}' of '{}' does not resolve within this tree\");",
                        f, name
                    ));
                    self.s("    }");
                }
                EdgeKind::Prim => {}
            }
        }
        self.s("}");
        self.s("");
    }

    fn emit_resolve_child(&mut self, node: &NodeType, parent_name: &str) {
        let name = &node.name;
        self.s(format!(
            "const Node *{}::resolve_child(const std::string &name, std::size_t index) const {{",
            name
        ));
        for field in &node.fields {
            let f = &field.name;
            match field.kind {
                EdgeKind::Maybe | EdgeKind::One => {
                    self.s(format!("    if (name == \"{}\") {{", f));
                    self.s(format!("        return {}.get();", f));
                    self.s("    }");
                }
                EdgeKind::Any | EdgeKind::Many => {
                    self.s(format!("    if (name == \"{}\") {{", f));
                    self.s(format!("        return {}.at(index).get();", f));
                    self.s("    }");
                }
                _ => {}
            }
        }
        self.s(format!(
            "    return {}::resolve_child(name, index);",
            parent_name
        ));
        self.s("}");
        self.s("");
    }

    fn emit_find_path(&mut self, node: &NodeType, parent_name: &str) {
        let name = &node.name;
        self.s(format!(
            "bool {}::find_path(const Node *target, ::tree::base::Path &path) const {{",
            name
        ));
        self.s(format!(
            "    if ({}::find_path(target, path)) {{",
            parent_name
        ));
        self.s("        return true;");
        self.s("    }");
        for field in &node.fields {
            let f = &field.name;
            match field.kind {
                EdgeKind::Maybe | EdgeKind::One => {
                    self.s(format!("    if ({}) {{", f));
                    self.s(format!("        path.push_field(\"{}\");", f));
                    self.s(format!("        if ({}->find_path(target, path)) {{", f));
                    self.s("            return true;");
                    self.s("        }");
                    self.s("        path.pop();");
                    self.s("    }");
                }
                EdgeKind::Any | EdgeKind::Many => {
                    self.s(format!(
                        "    for (std::size_t i = 0; i < {}.size(); i++) {{",
                        f
                    ));
                    self.s(format!("        path.push_field(\"{}\");", f));
                    self.s("        path.push_index(i);");
                    self.s(format!(
                        "        if ({}.at(i)->find_path(target, path)) {{",
                        f
                    ));
                    self.s("            return true;");
                    self.s("        }");
                    self.s("        path.pop();");
                    self.s("        path.pop();");
                    self.s("    }");
                }
                _ => {}
            }
        }
        self.s("    return false;");
        self.s("}");
        self.s("");
    }

    fn emit_assign_link_ids(&mut self, node: &NodeType, parent_name: &str) {
        let name = &node.name;
        self.s(format!(
            "void {}::assign_link_ids(::tree::base::PointerMap &ids) const {{",
            name
        ));
        self.s(format!("    {}::assign_link_ids(ids);", parent_name));
        for field in &node.fields {
            let f = &field.name;
            match field.kind {
                EdgeKind::Maybe | EdgeKind::One => {
                    self.s(format!("    if ({0}) {0}->assign_link_ids(ids);", f));
                }
                EdgeKind::Any | EdgeKind::Many => {
                    self.s(format!("    for (const auto &element : {}) {{", f));
                    self.s("        element->assign_link_ids(ids);");
                    self.s("    }");
                }
                EdgeKind::Link => {
                    self.s(format!("    if ({0}) ids.add({0}.get());", f));
                }
                EdgeKind::Prim => {}
            }
        }
        self.s("}");
        self.s("");
    }

    fn emit_serialize_fields(&mut self, node: &NodeType, parent_name: &str) {
        let name = &node.name;
        self.s(format!(
            "void {}::serialize_fields(::tree::cbor::MapWriter &map, const ::tree::base::PointerMap &ids) const {{",
            name
        ));
        self.s(format!("    {}::serialize_fields(map, ids);", parent_name));
        for field in &node.fields {
            let f = &field.name;
            match field.kind {
                EdgeKind::Maybe | EdgeKind::One => {
                    self.s(format!("    if ({}) {{", f));
                    self.s(format!("        auto sub = map.append_map(\"{}\");", f));
                    self.s(format!("        {}->serialize_node(sub, ids);", f));
                    self.s("        sub.close();");
                    self.s("    } else {");
                    self.s(format!("        map.append_null(\"{}\");", f));
                    self.s("    }");
                }
                EdgeKind::Any | EdgeKind::Many => {
                    self.s(format!("    {{"));
                    self.s(format!("        auto array = map.append_array(\"{}\");", f));
                    self.s(format!("        for (const auto &element : {}) {{", f));
                    self.s("            auto sub = array.append_map();");
                    self.s("            element->serialize_node(sub, ids);");
                    self.s("            sub.close();");
                    self.s("        }");
                    self.s("        array.close();");
                    self.s("    }");
                }
                EdgeKind::Link => {
                    self.s(format!("    if ({}) {{", f));
                    self.s(format!(
                        "        map.append_int(\"{0}\", static_cast<std::int64_t>(ids.get({0}.get())));",
                        f
                    ));
                    self.s("    } else {");
                    self.s(format!("        map.append_null(\"{}\");", f));
                    self.s("    }");
                }
                EdgeKind::Prim => match field.target {
                    TypeRef::Enum(_) => {
                        self.s(format!(
                            "    map.append_int(\"{0}\", static_cast<std::int64_t>({0}));",
                            f
                        ));
                    }
                    TypeRef::Prim(i) => {
                        let serializer = self.model.prims[i]
                            .serialize
                            .clone()
                            .unwrap_or_else(|| "::tree::cbor::serialize".to_string());
                        self.s(format!("    {}({}, map, \"{}\");", serializer, f, f));
                    }
                    TypeRef::Node(_) => unreachable!("prim edge cannot target a node"),
                },
            }
        }
        self.s("}");
        self.s("");
    }

    fn emit_serialize_node(&mut self, node: &NodeType) {
        let name = &node.name;
        self.s(format!(
            "void {}::serialize_node(::tree::cbor::MapWriter &map, const ::tree::base::PointerMap &ids) const {{",
            name
        ));
        self.s(format!("    map.append_string(\"type\", \"{}\");", name));
        self.s("    serialize_fields(map, ids);");
        if self.model.header.features.source_location {
            let loc = self
                .model
                .header
                .location
                .clone()
                .unwrap_or_default()
                .replace('.', "::");
            self.s(format!(
                "    if (auto location = get_annotation<{}>()) {{",
                loc
            ));
            self.s("        auto sub = map.append_map(\"location\");");
            self.s(format!(
                "        ::tree::base::location_serdes<{}>::write(*location, sub);",
                loc
            ));
            self.s("        sub.close();");
            self.s("    }");
        }
        self.s("    serialize_annotations(map);");
        self.s("}");
        self.s("");
    }

    fn emit_deserialize_fields(&mut self, node: &NodeType, all_fields: &[Field]) {
        let name = node.name.clone();
        self.s(format!(
            "std::shared_ptr<{0}> {0}::deserialize_fields(const ::tree::cbor::MapReader &map, ::tree::base::LinkResolver &links) {{",
            name
        ));
        self.s(format!("    auto node = std::make_shared<{}>();", name));
        for field in all_fields {
            let f = field.name.clone();
            match field.kind {
                EdgeKind::Maybe | EdgeKind::One => {
                    let target = self.edge_target(field).to_string();
                    let target_snake = snake_case(&target);
                    self.s(format!("    if (const auto *value = map.find(\"{}\")) {{", f));
                    self.s("        if (!value->is_null()) {");
                    self.s("            auto child = Node::deserialize_any(value->as_map(), links);");
                    self.s(format!("            if (!child->is_{}()) {{", target_snake));
                    self.s(format!(
                        "                throw ::tree::base::NotWellFormed(\"field '{}' of '{}' must be a {}\");",
                        f, name, target
                    ));
                    self.s("            }");
                    self.s(format!(
                        "            node->{} = std::static_pointer_cast<{}>(child);",
                        f, target
                    ));
                    self.s("        }");
                    self.s("    }");
                }
                EdgeKind::Any | EdgeKind::Many => {
                    let target = self.edge_target(field).to_string();
                    let target_snake = snake_case(&target);
                    self.s(format!("    if (const auto *value = map.find(\"{}\")) {{", f));
                    self.s("        for (const auto &item : value->as_array()) {");
                    self.s("            auto child = Node::deserialize_any(item.as_map(), links);");
                    self.s(format!("            if (!child->is_{}()) {{", target_snake));
                    self.s(format!(
                        "                throw ::tree::base::NotWellFormed(\"field '{}' of '{}' must contain {} nodes\");",
                        f, name, target
                    ));
                    self.s("            }");
                    self.s(format!(
                        "            node->{}.add(std::static_pointer_cast<{}>(child));",
                        f, target
                    ));
                    self.s("        }");
                    self.s("    }");
                }
                EdgeKind::Link => {
                    let target = self.edge_target(field).to_string();
                    self.s(format!("    if (const auto *value = map.find(\"{}\")) {{", f));
                    self.s("        if (!value->is_null()) {");
                    self.s(format!(
                        "            links.defer(value->as_int(), [node](const std::shared_ptr<Node> &target) {{"
                    ));
                    self.s(format!(
                        "                node->{} = std::static_pointer_cast<{}>(target);",
                        f, target
                    ));
                    self.s("            });");
                    self.s("        }");
                    self.s("    }");
                }
                EdgeKind::Prim => match field.target {
                    TypeRef::Enum(i) => {
                        let enum_name = self.model.enums[i].name.clone();
                        self.s(format!("    if (const auto *value = map.find(\"{}\")) {{", f));
                        self.s(format!(
                            "        node->{} = static_cast<{}>(value->as_int());",
                            f, enum_name
                        ));
                        self.s("    }");
                    }
                    TypeRef::Prim(i) => {
                        let deserializer = self.model.prims[i]
                            .deserialize
                            .clone()
                            .unwrap_or_else(|| "::tree::cbor::deserialize".to_string());
                        self.s(format!("    if (const auto *value = map.find(\"{}\")) {{", f));
                        self.s(format!("        node->{} = {}(*value);", f, deserializer));
                        self.s("    }");
                    }
                    TypeRef::Node(_) => unreachable!("prim edge cannot target a node"),
                },
            }
        }
        if self.model.header.features.source_location {
            let loc = self
                .model
                .header
                .location
                .clone()
                .unwrap_or_default()
                .replace('.', "::");
            self.s("    if (const auto *value = map.find(\"location\")) {");
            self.s(format!(
                "        node->set_annotation(::tree::base::location_serdes<{}>::read(value->as_map()));",
                loc
            ));
            self.s("    }");
        }
        self.s("    node->deserialize_annotations(map);");
        self.s("    return node;");
        self.s("}");
        self.s("");
    }

    fn emit_visitor_impl(&mut self) {
        self.s("void Visitor::visit_node(Node &node) {");
        self.s("    (void)node;");
        self.s("    throw std::runtime_error(\"no visitor handler for node type\");");
        self.s("}");
        self.s("");
        for node in self.model.nodes.clone() {
            let snake = snake_case(&node.name);
            let fallback = match node.parent {
                Some(p) => format!("visit_{}", snake_case(&self.model.nodes[p].name)),
                None => "visit_node".to_string(),
            };
            self.s(format!(
                "void Visitor::visit_{}({} &node) {{",
                snake, node.name
            ));
            self.s(format!("    {}(node);", fallback));
            self.s("}");
            self.s("");
        }
    }
}
