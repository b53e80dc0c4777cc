//! Scanner configuration.

use crate::metadata::{
    method::MethodRc,
    typesystem::{FieldRc, ModuleRc},
};

/// Full name of the type whose instance methods implement the generic collection
/// interfaces of single-dimensional arrays.
pub const DEFAULT_ARRAY_HELPER: &str = "System.SZArrayHelper";

/// Inputs of a scan that are not part of the program itself.
///
/// ```rust
/// use cilfront::scanner::ScannerConfig;
///
/// let config = ScannerConfig::default().with_array_helper("Runtime.ArrayHelper");
/// assert_eq!(config.array_helper, "Runtime.ArrayHelper");
/// assert!(config.plug_modules.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Modules searched for plug types
    pub plug_modules: Vec<ModuleRc>,
    /// Runtime methods the boot scan queues after the plugs are indexed
    pub explicit_entries: Vec<MethodRc>,
    /// Fields handed to the code generator before the boot scan drains its queue
    pub pre_emitted_fields: Vec<FieldRc>,
    /// Full name of the array interface helper type
    pub array_helper: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            plug_modules: Vec::new(),
            explicit_entries: Vec::new(),
            pre_emitted_fields: Vec::new(),
            array_helper: DEFAULT_ARRAY_HELPER.to_string(),
        }
    }
}

impl ScannerConfig {
    /// Search `modules` for plug types
    #[must_use]
    pub fn with_plug_modules(mut self, modules: Vec<ModuleRc>) -> Self {
        self.plug_modules = modules;
        self
    }

    /// Queue `entries` in the boot scan
    #[must_use]
    pub fn with_explicit_entries(mut self, entries: Vec<MethodRc>) -> Self {
        self.explicit_entries = entries;
        self
    }

    /// Emit `fields` before the boot scan drains its queue
    #[must_use]
    pub fn with_pre_emitted_fields(mut self, fields: Vec<FieldRc>) -> Self {
        self.pre_emitted_fields = fields;
        self
    }

    /// Use `full_name` as the array interface helper
    #[must_use]
    pub fn with_array_helper(mut self, full_name: impl Into<String>) -> Self {
        self.array_helper = full_name.into();
        self
    }
}
