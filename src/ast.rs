use crate::span::Spanned;

/// A parsed `.tree` file: header directives followed by declarations.
#[derive(Clone, Debug)]
pub struct File {
    pub header: Vec<Spanned<HeaderItem>>,
    pub decls: Vec<Spanned<Decl>>,
}

/// Global header directives.
#[derive(Clone, Debug)]
pub enum HeaderItem {
    /// `namespace a.b.c;` sets the output namespace for the generated code.
    Namespace(Vec<Spanned<String>>),
    /// `include "path";` is spliced into the generated header file.
    Include(Spanned<String>),
    /// `src_include "path";` is spliced into the generated source file.
    SrcInclude(Spanned<String>),
    /// `location a.b.Type;` names the source location tracker type.
    Location(Vec<Spanned<String>>),
    /// `features serialization, source_location;`
    Features(Vec<Spanned<String>>),
    /// `prim Name = "backing" [default = "...", ...];`
    Prim(PrimDecl),
}

/// A primitive declaration: a by-value type handled outside the node system.
#[derive(Clone, Debug)]
pub struct PrimDecl {
    pub doc: Option<String>,
    pub name: Spanned<String>,
    /// The target-language type expression backing the primitive.
    pub backing: Spanned<String>,
    pub default: Option<Spanned<String>>,
    pub serialize: Option<Spanned<String>>,
    pub deserialize: Option<Spanned<String>>,
    pub python: Option<Spanned<String>>,
}

#[derive(Clone, Debug)]
pub enum Decl {
    Enum(EnumDecl),
    Node(NodeDecl),
}

/// `enum Name = a | b | c;`
#[derive(Clone, Debug)]
pub struct EnumDecl {
    pub doc: Option<String>,
    pub name: Spanned<String>,
    pub constants: Vec<Spanned<String>>,
}

/// `root node Name : Parent { fields }`
#[derive(Clone, Debug)]
pub struct NodeDecl {
    pub doc: Option<String>,
    pub is_root: bool,
    pub is_error: bool,
    pub name: Spanned<String>,
    pub parent: Option<Spanned<String>>,
    pub fields: Vec<FieldDecl>,
}

/// `name: TypeExpr! = "default";`
#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub doc: Option<String>,
    pub name: Spanned<String>,
    pub ty: Spanned<TypeExpr>,
    /// `!` marker: request operator overload generation for this field.
    pub ext_op: bool,
    pub default: Option<Spanned<String>>,
}

/// A field type as written in source. Bare names are resolved during the
/// semantic pass (node type → One, primitive/enum → by-value).
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Maybe(String),
    One(String),
    Any(String),
    Many(String),
    Link(String),
    Bare(String),
}

impl TypeExpr {
    pub fn target_name(&self) -> &str {
        match self {
            TypeExpr::Maybe(n)
            | TypeExpr::One(n)
            | TypeExpr::Any(n)
            | TypeExpr::Many(n)
            | TypeExpr::Link(n)
            | TypeExpr::Bare(n) => n,
        }
    }
}
