//! Resolved declaration data.
//!
//! These are the records the name-resolution front end hands the checker:
//! namespaces with functions/consts/globals, and nominal OO types
//! (entities and concepts) with fields, methods, statics, member consts,
//! and invariants. Bodies are source AST; the checker compiles them.

use calyx_ast::{Expr, FunctionBody, Span, TypeSignature};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One template parameter declaration, e.g. `T: Keyed` or `unique K`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermDecl {
    pub name: String,
    pub bound: Option<TypeSignature>,
    /// Uniqueness marker: the bind must be a single keyed entity.
    pub is_unique: bool,
}

impl TermDecl {
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound: None,
            is_unique: false,
        }
    }

    pub fn bounded(name: impl Into<String>, bound: TypeSignature) -> Self {
        Self {
            name: name.into(),
            bound: Some(bound),
            is_unique: false,
        }
    }
}

/// One declared parameter of a function, method, or static.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub sig: TypeSignature,
    pub optional: bool,
    /// Default initializer; an optional parameter without one binds None.
    pub default: Option<Expr>,
}

impl ParamDecl {
    pub fn required(name: impl Into<String>, sig: TypeSignature) -> Self {
        Self {
            name: name.into(),
            sig,
            optional: false,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, sig: TypeSignature) -> Self {
        Self {
            name: name.into(),
            sig,
            optional: true,
            default: None,
        }
    }

    pub fn defaulted(name: impl Into<String>, sig: TypeSignature, default: Expr) -> Self {
        Self {
            name: name.into(),
            sig,
            optional: true,
            default: Some(default),
        }
    }
}

/// Rest parameter: collects trailing positional arguments into a
/// collection entity (e.g. `...rest: List<Int>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestParamDecl {
    pub name: String,
    pub sig: TypeSignature,
}

/// A function-like declaration: namespace function, static function, or
/// method (methods bind `this` in their environment, statics do not).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub terms: Vec<TermDecl>,
    pub params: Vec<ParamDecl>,
    pub rest: Option<RestParamDecl>,
    pub result: TypeSignature,
    pub preconds: Vec<Expr>,
    pub postconds: Vec<Expr>,
    /// Absent for abstract methods, which are only virtually dispatched.
    pub body: Option<FunctionBody>,
    pub attributes: Vec<String>,
    pub src_file: String,
    pub span: Span,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, params: Vec<ParamDecl>, result: TypeSignature) -> Self {
        Self {
            name: name.into(),
            terms: Vec::new(),
            params,
            rest: None,
            result,
            preconds: Vec::new(),
            postconds: Vec::new(),
            body: None,
            attributes: Vec::new(),
            src_file: "core.cx".to_string(),
            span: Span::synthetic(),
        }
    }

    pub fn with_body(mut self, body: FunctionBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }

    pub fn is_abstract(&self) -> bool {
        self.body.is_none()
    }
}

/// A named constant (namespace-level or member const).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDecl {
    pub name: String,
    pub sig: TypeSignature,
    pub value: Expr,
    pub src_file: String,
    pub span: Span,
}

/// A namespace-level global with an initializer compiled on first use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDecl {
    pub name: String,
    pub sig: TypeSignature,
    pub value: Expr,
    pub src_file: String,
    pub span: Span,
}

/// One declared field of an entity or concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub sig: TypeSignature,
    pub default: Option<Expr>,
    pub span: Span,
}

impl FieldDecl {
    pub fn required(name: impl Into<String>, sig: TypeSignature) -> Self {
        Self {
            name: name.into(),
            sig,
            default: None,
            span: Span::synthetic(),
        }
    }

    pub fn defaulted(name: impl Into<String>, sig: TypeSignature, default: Expr) -> Self {
        Self {
            name: name.into(),
            sig,
            default: Some(default),
            span: Span::synthetic(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OOKind {
    Entity,
    Concept,
}

/// A nominal OO type declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OOTypeDecl {
    pub kind: OOKind,
    pub name: String,
    pub terms: Vec<TermDecl>,
    pub provides: Vec<TypeSignature>,
    pub fields: Vec<FieldDecl>,
    pub methods: IndexMap<String, FunctionDecl>,
    pub statics: IndexMap<String, FunctionDecl>,
    pub consts: IndexMap<String, ConstDecl>,
    pub invariants: Vec<Expr>,
    pub attributes: Vec<String>,
    pub src_file: String,
    pub span: Span,
}

impl OOTypeDecl {
    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(OOKind::Entity, name)
    }

    pub fn concept(name: impl Into<String>) -> Self {
        Self::new(OOKind::Concept, name)
    }

    fn new(kind: OOKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            terms: Vec::new(),
            provides: Vec::new(),
            fields: Vec::new(),
            methods: IndexMap::new(),
            statics: IndexMap::new(),
            consts: IndexMap::new(),
            invariants: Vec::new(),
            attributes: Vec::new(),
            src_file: "core.cx".to_string(),
            span: Span::synthetic(),
        }
    }

    pub fn with_provides(mut self, provides: Vec<TypeSignature>) -> Self {
        self.provides = provides;
        self
    }

    pub fn with_terms(mut self, terms: Vec<TermDecl>) -> Self {
        self.terms = terms;
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldDecl>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    pub fn with_static(mut self, decl: FunctionDecl) -> Self {
        self.statics.insert(decl.name.clone(), decl);
        self
    }

    pub fn with_method(mut self, decl: FunctionDecl) -> Self {
        self.methods.insert(decl.name.clone(), decl);
        self
    }

    pub fn with_const(mut self, decl: ConstDecl) -> Self {
        self.consts.insert(decl.name.clone(), decl);
        self
    }

    pub fn is_entity(&self) -> bool {
        self.kind == OOKind::Entity
    }

    pub fn is_concept(&self) -> bool {
        self.kind == OOKind::Concept
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }

    /// Collection entity: single element term `T`.
    pub fn is_collection(&self) -> bool {
        self.has_attribute("collection")
    }

    /// Map entity: key/value terms `K`, `V`; element type is `[K, V]`.
    pub fn is_map(&self) -> bool {
        self.has_attribute("map")
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The factory static with the given name, if declared as a factory.
    pub fn factory(&self, name: &str) -> Option<&FunctionDecl> {
        self.statics
            .get(name)
            .filter(|f| f.has_attribute("factory"))
    }
}

/// A namespace with its declared members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceDecl {
    pub name: String,
    pub functions: IndexMap<String, FunctionDecl>,
    pub consts: IndexMap<String, ConstDecl>,
    pub globals: IndexMap<String, GlobalDecl>,
}

impl NamespaceDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
            consts: IndexMap::new(),
            globals: IndexMap::new(),
        }
    }
}
