use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Weak,
};

use dashmap::DashMap;

use crate::metadata::{
    method::{MethodRc, MethodRef},
    token::Token,
    typesystem::{CilField, CilTypeRc, CilTypeRef, FieldRc},
};

/// A reference counted pointer to a [`CilModule`]
pub type ModuleRc = Arc<CilModule>;

/// The stand-alone signature of an indirect call site (`calli`).
#[derive(Debug, Clone)]
pub struct CallSite {
    /// Number of parameters, without `this`
    pub param_count: usize,
    /// The callee takes an instance pointer
    pub has_this: bool,
    /// Return type, `None` for void
    pub return_type: Option<CilTypeRef>,
}

impl CallSite {
    /// True if the call pushes a return value
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.return_type
            .as_ref()
            .and_then(CilTypeRef::upgrade)
            .is_some_and(|t| t.full_name() != "System.Void")
    }
}

/// What a metadata token of a module refers to.
#[derive(Debug, Clone)]
pub enum TokenTarget {
    /// A type (`TypeDef`, `TypeRef`, `TypeSpec`)
    Type(CilTypeRef),
    /// A method (`MethodDef`, `MemberRef`, `MethodSpec`)
    Method(MethodRef),
    /// A field (`Field`, `MemberRef`)
    Field(Weak<CilField>),
    /// A user string
    String(String),
    /// A stand-alone call site signature
    Signature(CallSite),
}

/// A loaded module: its types and the targets of the tokens its method bodies use.
pub struct CilModule {
    /// Simple name of the module, e.g. `System.Private.CoreLib`
    pub name: String,
    /// Types defined in this module, in definition order
    pub types: boxcar::Vec<CilTypeRef>,
    tokens: DashMap<Token, TokenTarget>,
    rows: DashMap<u8, AtomicU32>,
}

impl CilModule {
    /// Create an empty module
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        CilModule {
            name: name.into(),
            types: boxcar::Vec::new(),
            tokens: DashMap::new(),
            rows: DashMap::new(),
        }
    }

    /// Allocate the next row of `table` without binding it.
    pub fn reserve_token(&self, table: u8) -> Token {
        let row = self
            .rows
            .entry(table)
            .or_insert_with(|| AtomicU32::new(0))
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        Token::from_parts(table, row)
    }

    /// Allocate the next row of `table` and bind the resulting token to `target`.
    pub fn add_token(&self, table: u8, target: TokenTarget) -> Token {
        let token = self.reserve_token(table);
        self.tokens.insert(token, target);
        token
    }

    /// Bind an explicit token to `target`, replacing a previous binding.
    pub fn bind_token(&self, token: Token, target: TokenTarget) {
        self.tokens.insert(token, target);
    }

    /// Bind `ty` to a new type token
    pub fn type_token(&self, ty: &CilTypeRc) -> Token {
        self.add_token(
            crate::metadata::token::TABLE_TYPE_SPEC,
            TokenTarget::Type(CilTypeRef::new(ty)),
        )
    }

    /// Bind `method` to a new member reference token
    pub fn method_token(&self, method: &MethodRc) -> Token {
        self.add_token(
            crate::metadata::token::TABLE_MEMBER_REF,
            TokenTarget::Method(MethodRef::new(method)),
        )
    }

    /// Bind `field` to a new field token
    pub fn field_token(&self, field: &FieldRc) -> Token {
        self.add_token(
            crate::metadata::token::TABLE_FIELD,
            TokenTarget::Field(Arc::downgrade(field)),
        )
    }

    /// Bind a user string to a new string token
    pub fn string_token(&self, value: impl Into<String>) -> Token {
        self.add_token(
            crate::metadata::token::TABLE_USER_STRING,
            TokenTarget::String(value.into()),
        )
    }

    /// Bind a call site signature to a new stand-alone signature token
    pub fn signature_token(&self, site: CallSite) -> Token {
        self.add_token(
            crate::metadata::token::TABLE_STANDALONE_SIG,
            TokenTarget::Signature(site),
        )
    }

    /// The raw target of `token`, without generic substitution
    #[must_use]
    pub fn lookup(&self, token: Token) -> Option<TokenTarget> {
        self.tokens.get(&token).map(|entry| entry.value().clone())
    }

    /// Types defined in this module
    #[must_use]
    pub fn type_list(&self) -> Vec<CilTypeRc> {
        self.types
            .iter()
            .filter_map(|(_, t)| t.upgrade())
            .collect()
    }
}

impl std::fmt::Debug for CilModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CilModule")
            .field("name", &self.name)
            .field("types", &self.types.count())
            .field("tokens", &self.tokens.len())
            .finish()
    }
}
