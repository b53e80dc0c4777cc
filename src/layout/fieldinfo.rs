//! Entries of a computed field table and the debug records derived from them.

use std::fmt;

use crate::{
    metadata::typesystem::{CilTypeRc, FieldRc},
    Result,
};

/// One field of a computed layout.
#[derive(Clone)]
pub struct FieldInfo {
    /// Field id, the field's full name (`<field type> <declaring type>.<name>`)
    pub id: String,
    /// Size of the field's value in bytes
    pub size: u32,
    /// The type at whose level the field is declared
    pub declaring_type: CilTypeRc,
    /// Type of the field's value
    pub field_type: CilTypeRc,
    /// Offset from the start of the instance data
    pub offset: u32,
    /// True for static fields, which take no space in instances
    pub is_static: bool,
    /// True if the offset came from a `FieldOffset` annotation
    pub has_explicit_offset: bool,
    /// True if the field stores a pointer to externally held data
    pub is_external_value: bool,
    /// The field descriptor this entry was computed from
    pub field: Option<FieldRc>,
}

impl FieldInfo {
    pub(crate) fn new(
        id: impl Into<String>,
        size: u32,
        declaring_type: &CilTypeRc,
        field_type: &CilTypeRc,
    ) -> Self {
        FieldInfo {
            id: id.into(),
            size,
            declaring_type: declaring_type.clone(),
            field_type: field_type.clone(),
            offset: 0,
            is_static: false,
            has_explicit_offset: false,
            is_external_value: false,
            field: None,
        }
    }

    /// Offset of the first byte after this field
    #[must_use]
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }

    /// Name used in debug records: declaring type followed by the id's name part.
    #[must_use]
    pub fn debug_name(&self) -> String {
        match self.id.find(' ') {
            Some(loc) => format!("{}{}", self.declaring_type.full_name(), &self.id[loc..]),
            None => self.id.clone(),
        }
    }
}

impl fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("id", &self.id)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("is_static", &self.is_static)
            .finish()
    }
}

/// A `(type, offset, name)` record for one instance field of a reference type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfoRecord {
    /// Full name of the field's type
    pub type_name: String,
    /// Field offset
    pub offset: i32,
    /// Field name as rendered by [`FieldInfo::debug_name`]
    pub name: String,
}

/// The ordered field names of one reference type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapRecord {
    /// Full name of the laid out type
    pub type_name: String,
    /// Field names in layout order, statics included
    pub field_names: Vec<String>,
}

/// Receiver of debug-symbol records produced while laying out reference types.
///
/// A failing sink never aborts a run; the layout engine turns the error into a
/// warning.
pub trait DebugSink: Send + Sync {
    /// Receive the instance field records of one type
    ///
    /// # Errors
    /// Implementations report write failures.
    fn write_field_info(&self, records: &[FieldInfoRecord]) -> Result<()>;

    /// Receive the field map of one type
    ///
    /// # Errors
    /// Implementations report write failures.
    fn write_field_map(&self, record: &FieldMapRecord) -> Result<()>;
}
