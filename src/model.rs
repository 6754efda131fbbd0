use crate::span::Span;

/// The validated in-memory representation of a `.tree` file.
///
/// Built once per generator invocation by `resolve::build_model`, then
/// consumed read-only by the emitters. Node types, primitives, and
/// enumerations are stored in declaration order and referenced by index.
#[derive(Clone, Debug)]
pub struct TreeModel {
    pub header: Header,
    pub nodes: Vec<NodeType>,
    pub prims: Vec<Primitive>,
    pub enums: Vec<Enumeration>,
    /// Index of the node marked `root`, if any.
    pub root: Option<usize>,
    /// Index of the node marked `error`, if any.
    pub error_node: Option<usize>,
}

/// Global declarations from the file header.
#[derive(Clone, Debug, Default)]
pub struct Header {
    pub namespace: Vec<String>,
    pub includes: Vec<String>,
    pub src_includes: Vec<String>,
    /// Source location tracker type, as a dotted path.
    pub location: Option<String>,
    pub features: FeatureFlags,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FeatureFlags {
    pub serialization: bool,
    pub source_location: bool,
}

/// A by-value primitive declared in the header.
#[derive(Clone, Debug)]
pub struct Primitive {
    pub doc: Option<String>,
    pub name: String,
    /// Target-language type expression backing the primitive.
    pub backing: String,
    pub default: Option<String>,
    pub serialize: Option<String>,
    pub deserialize: Option<String>,
    /// Dynamic-language constructor expression.
    pub python: Option<String>,
}

/// A finite ordered set of named constants, used as a primitive.
/// Constants serialize as 0-based declaration-order ordinals.
#[derive(Clone, Debug)]
pub struct Enumeration {
    pub doc: Option<String>,
    pub name: String,
    pub constants: Vec<String>,
}

/// One declared kind of tree element.
#[derive(Clone, Debug)]
pub struct NodeType {
    pub name: String,
    pub doc: Option<String>,
    /// Explicit parent node type, resolved to its index.
    pub parent: Option<usize>,
    /// Direct children, populated during resolution.
    pub children: Vec<usize>,
    /// Fields declared on this node itself (inherited fields not repeated).
    pub fields: Vec<Field>,
    pub is_root: bool,
    pub is_error: bool,
    /// Concrete-type discriminator: declaration-order numbering of concrete
    /// node types starting at 1. Zero for abstract types.
    pub type_id: u32,
    pub span: Span,
}

impl NodeType {
    /// A node type is derived (and therefore abstract) iff it has children.
    pub fn is_derived(&self) -> bool {
        !self.children.is_empty()
    }

    /// A node type is final (instantiable) iff it has no children.
    pub fn is_concrete(&self) -> bool {
        self.children.is_empty()
    }
}

/// A typed slot on a node.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub doc: Option<String>,
    pub kind: EdgeKind,
    pub target: TypeRef,
    /// Generate operator overloads touching this field.
    pub ext_op: bool,
    /// Default-value expression; only present on primitive fields.
    pub default: Option<String>,
    pub span: Span,
}

/// How a field stores its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// Optional owning link (0 or 1).
    Maybe,
    /// Mandatory owning link (exactly 1 in well-formed trees).
    One,
    /// Owning ordered sequence (0+).
    Any,
    /// Owning ordered sequence (1+).
    Many,
    /// Non-owning cross-reference within the same tree.
    Link,
    /// By-value storage of a primitive or enumeration.
    Prim,
}

impl EdgeKind {
    pub fn is_owning(&self) -> bool {
        matches!(
            self,
            EdgeKind::Maybe | EdgeKind::One | EdgeKind::Any | EdgeKind::Many
        )
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, EdgeKind::Any | EdgeKind::Many)
    }
}

/// A resolved reference to a declared type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Node(usize),
    Prim(usize),
    Enum(usize),
}

impl TreeModel {
    pub fn node_by_name(&self, name: &str) -> Option<&NodeType> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Indices of the ancestor chain of `node`, nearest parent first.
    pub fn ancestors(&self, node: usize) -> Vec<usize> {
        let mut result = Vec::new();
        let mut current = self.nodes[node].parent;
        while let Some(idx) = current {
            result.push(idx);
            current = self.nodes[idx].parent;
        }
        result
    }

    /// Whether `ancestor` equals `node` or appears in its parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: usize, node: usize) -> bool {
        ancestor == node || self.ancestors(node).contains(&ancestor)
    }

    /// All fields visible on `node`: inherited first (root-most ancestor
    /// leading), then the node's own, in declaration order.
    pub fn all_fields(&self, node: usize) -> Vec<(usize, &Field)> {
        let mut chain = self.ancestors(node);
        chain.reverse();
        chain.push(node);
        let mut fields = Vec::new();
        for idx in chain {
            for field in &self.nodes[idx].fields {
                fields.push((idx, field));
            }
        }
        fields
    }

    /// Concrete node types in declaration order (discriminator order).
    pub fn concrete_nodes(&self) -> impl Iterator<Item = (usize, &NodeType)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_concrete())
    }

    /// The declared name a `TypeRef` points at.
    pub fn target_name(&self, target: TypeRef) -> &str {
        match target {
            TypeRef::Node(i) => &self.nodes[i].name,
            TypeRef::Prim(i) => &self.prims[i].name,
            TypeRef::Enum(i) => &self.enums[i].name,
        }
    }
}
