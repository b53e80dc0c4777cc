//! Shared fixtures for unit tests.
//!
//! Programs are built in memory with [`ProgramBuilder`]; the helpers here cover the
//! pieces most tests repeat: a registry with an application module, encoded IL
//! snippets and the array interface helper of the core library.

use std::sync::Arc;

use crate::metadata::{
    method::MethodRc,
    typesystem::{CilTypeRc, ProgramBuilder, TypeRegistry},
};

/// `ret`
pub const RET: u8 = 0x2A;

/// `opcode` followed by a little endian metadata token
pub fn with_token(opcode: u8, token: u32) -> Vec<u8> {
    let mut code = vec![opcode];
    code.extend_from_slice(&token.to_le_bytes());
    code
}

/// `call <token>`
pub fn call(token: u32) -> Vec<u8> {
    with_token(0x28, token)
}

/// A registry with an empty module `App` to build into.
pub struct Fixture {
    pub registry: Arc<TypeRegistry>,
    pub app: ProgramBuilder,
}

impl Fixture {
    pub fn new() -> Self {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        Fixture { registry, app }
    }

    /// A core library type by simple name
    pub fn primitive(&self, name: &str) -> CilTypeRc {
        self.app.primitive(name).unwrap()
    }

    /// A class `App.<name>` deriving from `System.Object`
    pub fn class(&self, name: &str) -> CilTypeRc {
        self.app.class("App", name).build().unwrap()
    }

    /// A public static void method with body `code`
    pub fn static_method(&self, owner: &CilTypeRc, name: &str, code: Vec<u8>) -> MethodRc {
        self.app
            .method(owner, name)
            .static_method()
            .il(code)
            .build()
            .unwrap()
    }

    /// `System.SZArrayHelper` with a private generic instance method `GetEnumerator<T>`
    /// and a public one that must never be instantiated for arrays.
    pub fn array_helper(&self) -> (CilTypeRc, MethodRc) {
        let corelib = ProgramBuilder::new(&self.registry, "System.Private.CoreLib");
        let helper = corelib.class("System", "SZArrayHelper").build().unwrap();
        let t = corelib.generic_parameter("T", 0, true);
        let get_enumerator = corelib
            .method(&helper, "GetEnumerator")
            .private()
            .generic_params(&[t.clone()])
            .il(vec![0x14, RET])
            .build()
            .unwrap();
        corelib
            .method(&helper, "Visible")
            .generic_params(&[t])
            .il(vec![RET])
            .build()
            .unwrap();
        (helper, get_enumerator)
    }
}
