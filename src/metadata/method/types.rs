//! Method attribute flags.
//!
//! # Key Types
//! - [`MethodModifiers`]: Attribute flags (static, virtual, p/invoke, ...)
//! - [`MethodAccessFlags`]: Member accessibility
//! - [`MethodImplOptions`]: Implementation flags (native, internal call, ...)

use bitflags::bitflags;

/// Bitmask for `ACCESS` state extraction
pub const METHOD_ACCESS_MASK: u32 = 0x0007;
/// Bitmask for `CODE_TYPE` extraction
pub const METHOD_IMPL_CODE_TYPE_MASK: u32 = 0x0003;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// Method accessibility, stored in the low 3 bits of the method flags
    pub struct MethodAccessFlags: u32 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this Assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessibly by anyone in the Assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessibly by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// Method attribute flags
    pub struct MethodModifiers: u32 {
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method may not be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// Runtime should check name encoding
        const RTSPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through `PInvoke`
        const PINVOKE_IMPL = 0x2000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// Method implementation flags
    pub struct MethodImplOptions: u32 {
        /// Method impl is native
        const NATIVE = 0x0001;
        /// Method impl is provided by the runtime
        const RUNTIME = 0x0003;
        /// Method impl is unmanaged, otherwise managed
        const UNMANAGED = 0x0004;
        /// Method may not be inlined
        const NO_INLINING = 0x0008;
        /// Method is single threaded through the body
        const SYNCHRONIZED = 0x0020;
        /// Method signature is exported exactly as declared
        const PRESERVE_SIG = 0x0080;
        /// Internal call, implemented by the runtime
        const INTERNAL_CALL = 0x1000;
    }
}

impl MethodModifiers {
    /// Requires a native implementation (p/invoke)
    #[must_use]
    pub fn is_pinvoke(&self) -> bool {
        self.contains(MethodModifiers::PINVOKE_IMPL)
    }
}

impl MethodImplOptions {
    /// The implementation is native code or provided by the runtime
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.bits() & METHOD_IMPL_CODE_TYPE_MASK == MethodImplOptions::NATIVE.bits()
            || self.contains(MethodImplOptions::INTERNAL_CALL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_detection() {
        assert!(MethodImplOptions::NATIVE.is_native());
        assert!(MethodImplOptions::INTERNAL_CALL.is_native());
        assert!(!MethodImplOptions::RUNTIME.is_native());
        assert!(!MethodImplOptions::NO_INLINING.is_native());
        assert!((MethodModifiers::STATIC | MethodModifiers::PINVOKE_IMPL).is_pinvoke());
    }
}
