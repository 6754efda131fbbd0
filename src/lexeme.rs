/// All lexemes in the tree-description language.
#[derive(Clone, Debug, PartialEq)]
pub enum Lexeme {
    // Header keywords
    Namespace,
    Include,
    SrcInclude,
    Location,
    Features,
    Prim,

    // Declaration keywords
    Enum,
    Node,
    Root,
    Error,

    // Prim attribute keywords
    Default,
    Serialize,
    Deserialize,
    Python,

    // Edge keywords
    Maybe,
    One,
    Any,
    Many,
    Link,

    // Symbols
    LBrace,    // {
    RBrace,    // }
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    Lt,        // <
    Gt,        // >
    Comma,     // ,
    Semicolon, // ;
    Colon,     // :
    Dot,       // .
    Eq,        // =
    Star,      // *
    Question,  // ?
    Pipe,      // |
    Bang,      // !

    // Literals
    Integer(u64),
    Str(String),
    Ident(String),

    /// A `/** ... */` doc comment, with delimiters and leading `*`s stripped.
    DocComment(String),

    // End of file
    Eof,
}

impl Lexeme {
    /// Try to match an identifier string to a keyword lexeme.
    pub fn from_keyword(s: &str) -> Option<Lexeme> {
        match s {
            "namespace" => Some(Lexeme::Namespace),
            "include" => Some(Lexeme::Include),
            "src_include" => Some(Lexeme::SrcInclude),
            "location" => Some(Lexeme::Location),
            "features" => Some(Lexeme::Features),
            "prim" => Some(Lexeme::Prim),
            "enum" => Some(Lexeme::Enum),
            "node" => Some(Lexeme::Node),
            "root" => Some(Lexeme::Root),
            "error" => Some(Lexeme::Error),
            "default" => Some(Lexeme::Default),
            "serialize" => Some(Lexeme::Serialize),
            "deserialize" => Some(Lexeme::Deserialize),
            "python" => Some(Lexeme::Python),
            "Maybe" => Some(Lexeme::Maybe),
            "One" => Some(Lexeme::One),
            "Any" => Some(Lexeme::Any),
            "Many" => Some(Lexeme::Many),
            "Link" => Some(Lexeme::Link),
            _ => None,
        }
    }

    /// The lexeme text as it appears in source, for error messages.
    pub fn description(&self) -> &'static str {
        match self {
            Lexeme::Namespace => "'namespace'",
            Lexeme::Include => "'include'",
            Lexeme::SrcInclude => "'src_include'",
            Lexeme::Location => "'location'",
            Lexeme::Features => "'features'",
            Lexeme::Prim => "'prim'",
            Lexeme::Enum => "'enum'",
            Lexeme::Node => "'node'",
            Lexeme::Root => "'root'",
            Lexeme::Error => "'error'",
            Lexeme::Default => "'default'",
            Lexeme::Serialize => "'serialize'",
            Lexeme::Deserialize => "'deserialize'",
            Lexeme::Python => "'python'",
            Lexeme::Maybe => "'Maybe'",
            Lexeme::One => "'One'",
            Lexeme::Any => "'Any'",
            Lexeme::Many => "'Many'",
            Lexeme::Link => "'Link'",
            Lexeme::LBrace => "'{'",
            Lexeme::RBrace => "'}'",
            Lexeme::LParen => "'('",
            Lexeme::RParen => "')'",
            Lexeme::LBracket => "'['",
            Lexeme::RBracket => "']'",
            Lexeme::Lt => "'<'",
            Lexeme::Gt => "'>'",
            Lexeme::Comma => "','",
            Lexeme::Semicolon => "';'",
            Lexeme::Colon => "':'",
            Lexeme::Dot => "'.'",
            Lexeme::Eq => "'='",
            Lexeme::Star => "'*'",
            Lexeme::Question => "'?'",
            Lexeme::Pipe => "'|'",
            Lexeme::Bang => "'!'",
            Lexeme::Integer(_) => "integer literal",
            Lexeme::Str(_) => "string literal",
            Lexeme::Ident(_) => "identifier",
            Lexeme::DocComment(_) => "doc comment",
            Lexeme::Eof => "end of file",
        }
    }

    /// The offending lexeme text carried into parser errors.
    pub fn lexeme_text(&self) -> String {
        match self {
            Lexeme::Integer(n) => n.to_string(),
            Lexeme::Str(s) => format!("\"{}\"", s),
            Lexeme::Ident(s) => s.clone(),
            Lexeme::DocComment(_) => "/** ... */".to_string(),
            other => other.description().trim_matches('\'').to_string(),
        }
    }
}
