use bitflags::bitflags;

use crate::metadata::typesystem::{CilTypeRc, CilTypeRef};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Kind of an exception handling clause
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause
        const FILTER = 0x0001;
        /// A finally clause
        const FINALLY = 0x0002;
        /// Fault clause (finally that is called on exception only)
        const FAULT = 0x0004;
    }
}

/// An exception region of a method body.
///
/// All offsets are relative to the first instruction of the body.
#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    /// Kind of the clause
    pub flags: ExceptionHandlerFlags,
    /// Start of the protected block
    pub try_offset: u32,
    /// Length of the protected block
    pub try_length: u32,
    /// Start of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Start of the filter block (filter clauses only)
    pub filter_offset: u32,
    /// Caught exception type (typed clauses only)
    pub handler: Option<CilTypeRef>,
}

impl ExceptionHandler {
    /// A typed catch clause
    #[must_use]
    pub fn catch(
        try_offset: u32,
        try_length: u32,
        handler_offset: u32,
        handler_length: u32,
        class: Option<&CilTypeRc>,
    ) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            filter_offset: 0,
            handler: class.map(CilTypeRef::new),
        }
    }

    /// A clause of the given kind without catch type
    #[must_use]
    pub fn new(
        flags: ExceptionHandlerFlags,
        try_offset: u32,
        try_length: u32,
        handler_offset: u32,
        handler_length: u32,
        filter_offset: u32,
    ) -> Self {
        ExceptionHandler {
            flags,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            filter_offset,
            handler: None,
        }
    }

    /// End of the protected block (exclusive)
    #[must_use]
    pub fn try_end(&self) -> u32 {
        self.try_offset.saturating_add(self.try_length)
    }

    /// End of the handler (exclusive)
    #[must_use]
    pub fn handler_end(&self) -> u32 {
        self.handler_offset.saturating_add(self.handler_length)
    }

    /// True for filter clauses
    #[must_use]
    pub fn is_filter(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FILTER)
    }

    /// True if `pos` lies inside the protected block
    #[must_use]
    pub fn try_contains(&self, pos: u32) -> bool {
        self.try_offset <= pos && pos < self.try_end()
    }

    /// True if `pos` lies inside the handler block
    #[must_use]
    pub fn handler_contains(&self, pos: u32) -> bool {
        self.handler_offset <= pos && pos < self.handler_end()
    }
}
