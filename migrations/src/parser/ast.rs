//! Syntax tree of a schema document
//!
//! Every node kind is a closed enum so the translation to the schema model is
//! an exhaustive match.

/// A parsed schema document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaDocument {
    pub declarations: Vec<Declaration>,
}

impl SchemaDocument {
    pub fn models(&self) -> impl Iterator<Item = &ModelBlock> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Model(m) => Some(m),
            _ => None,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumBlock> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Enum(e) => Some(e),
            _ => None,
        })
    }

    pub fn datasources(&self) -> impl Iterator<Item = &ConfigBlock> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Datasource(c) => Some(c),
            _ => None,
        })
    }
}

/// A top-level block
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Model(ModelBlock),
    Enum(EnumBlock),
    Datasource(ConfigBlock),
    Generator(ConfigBlock),
}

/// `model Name { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBlock {
    pub name: String,
    pub members: Vec<Member>,
    /// 1-based line of the `model` keyword
    pub line: usize,
}

/// A line inside a model
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Field(Field),
    /// `@@index(...)`, `@@map(...)`, ...
    BlockAttribute(Attribute),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    pub attributes: Vec<Attribute>,
    pub line: usize,
}

impl Field {
    /// The first attribute with the given path
    pub fn attribute(&self, path: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.path == path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    pub kind: TypeKind,
    pub modifier: TypeModifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// A scalar, enum, or model name
    Named(String),
    /// `Unsupported("...")`
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeModifier {
    Required,
    /// `Type?`
    Optional,
    /// `Type[]`
    List,
}

/// `@path(args)` or `@@path(args)`; `path` may be dotted (`db.VarChar`)
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub path: String,
    pub args: Vec<Argument>,
}

impl Attribute {
    /// The argument named `name`
    pub fn named(&self, name: &str) -> Option<&Expr> {
        self.args
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
            .map(|a| &a.value)
    }

    /// The `index`-th positional argument
    pub fn positional(&self, index: usize) -> Option<&Expr> {
        self.args
            .iter()
            .filter(|a| a.name.is_none())
            .nth(index)
            .map(|a| &a.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    String(String),
    /// Numeric literal as written
    Number(String),
    Boolean(bool),
    /// Identifier or dotted path
    Ident(String),
    Array(Vec<Expr>),
    Call { name: String, args: Vec<Argument> },
}

impl Expr {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::String(s) => Some(s),
            _ => None,
        }
    }
}

/// `enum Name { A B C }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumBlock {
    pub name: String,
    pub values: Vec<String>,
}

/// `datasource`/`generator` blocks: `key = value` entries
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigBlock {
    pub name: String,
    pub entries: Vec<(String, Expr)>,
}

impl ConfigBlock {
    pub fn get(&self, key: &str) -> Option<&Expr> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}
