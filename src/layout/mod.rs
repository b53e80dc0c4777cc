//! Field layout and type sizes for the code generation target.
//!
//! The [`LayoutEngine`] computes, for any type, the ordered table of its fields with
//! byte offsets and sizes, and the total storage size of the type. The rules mirror
//! the ABI the code generator emits against:
//!
//! - **Reference types** collect the declared fields of every level of the ancestor
//!   chain, ordered by name per level, reverse the whole list so the root ancestor comes
//!   first, and pack all instance fields without an explicit offset back to back from
//!   offset 0. No padding is inserted.
//! - **Value types** with auto or sequential layout place their instance fields in
//!   token order, each aligned to `min(min(pack, largest field), field size)`. With
//!   explicit layout every field sits at its `FieldOffset`.
//! - A value type is at least as large as its declared class size.
//!
//! Primitive sizes come from a fixed table; pointers and by-refs take the target
//! pointer width and references take the reference slot size, both from
//! [`TargetConfig`]. Field tables and value type sizes are memoized per engine.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use cilfront::layout::LayoutEngine;
//! use cilfront::metadata::typesystem::{ProgramBuilder, TypeLayout, TypeRegistry};
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let program = ProgramBuilder::new(&registry, "App");
//! let pair = program
//!     .value_type("App", "Pair")
//!     .layout(TypeLayout::Sequential)
//!     .packing(8)
//!     .build()?;
//! program.add_field(&pair, "Flag", &program.primitive("Byte")?, false);
//! program.add_field(&pair, "Value", &program.primitive("Int32")?, false);
//!
//! let engine = LayoutEngine::default();
//! let fields = engine.fields_info(&pair, false)?;
//! assert_eq!(fields[1].offset, 4);
//! assert_eq!(engine.size_of_type(&pair)?, 8);
//! # Ok::<(), cilfront::Error>(())
//! ```

mod fieldinfo;

use std::sync::Arc;

use dashmap::DashMap;

pub use fieldinfo::{DebugSink, FieldInfo, FieldInfoRecord, FieldMapRecord};

use crate::{
    metadata::{
        diagnostics::{DiagnosticCategory, Diagnostics},
        typesystem::{CilType, CilTypeRc, CilField, TypeLayout},
    },
    Error, Result,
};

/// Nesting of value types inside value types before layout gives up
const MAX_LAYOUT_DEPTH: usize = 256;

const PRIMITIVE_NAMES: &[&str] = &[
    "System.Boolean",
    "System.Char",
    "System.SByte",
    "System.Byte",
    "System.Int16",
    "System.UInt16",
    "System.Int32",
    "System.UInt32",
    "System.Int64",
    "System.UInt64",
    "System.IntPtr",
    "System.UIntPtr",
    "System.Single",
    "System.Double",
];

/// Properties of the machine the program is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetConfig {
    /// Width of pointers, by-refs and native integers
    pub pointer_size: u32,
    /// Size of a field or slot holding an object reference
    pub reference_size: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            pointer_size: 4,
            reference_size: 8,
        }
    }
}

impl TargetConfig {
    /// Set the pointer width
    #[must_use]
    pub fn with_pointer_size(mut self, pointer_size: u32) -> Self {
        self.pointer_size = pointer_size;
        self
    }

    /// Set the size of an object reference
    #[must_use]
    pub fn with_reference_size(mut self, reference_size: u32) -> Self {
        self.reference_size = reference_size;
        self
    }
}

/// Computes and caches field tables and type sizes.
pub struct LayoutEngine {
    config: TargetConfig,
    diagnostics: Arc<Diagnostics>,
    tables: DashMap<(String, bool), Arc<Vec<FieldInfo>>>,
    sizes: DashMap<String, u32>,
    sink: Option<Box<dyn DebugSink>>,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(TargetConfig::default())
    }
}

impl LayoutEngine {
    /// Create an engine for `config`
    #[must_use]
    pub fn new(config: TargetConfig) -> Self {
        LayoutEngine {
            config,
            diagnostics: Arc::new(Diagnostics::new()),
            tables: DashMap::new(),
            sizes: DashMap::new(),
            sink: None,
        }
    }

    /// Report sink failures into a shared diagnostics collection
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Deliver debug-symbol records of reference type layouts to `sink`
    #[must_use]
    pub fn with_debug_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The target this engine lays out for
    #[must_use]
    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Diagnostics this engine reports into
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// The field table of `ty`, in layout order.
    ///
    /// Static fields are only part of the table when `include_static` is set; they never
    /// influence instance offsets.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for an unknown value type layout kind and
    /// [`Error::RecursionLimit`] for value types that contain themselves.
    pub fn fields_info(&self, ty: &CilTypeRc, include_static: bool) -> Result<Arc<Vec<FieldInfo>>> {
        self.fields_info_at(ty, include_static, 0)
    }

    fn fields_info_at(
        &self,
        ty: &CilTypeRc,
        include_static: bool,
        depth: usize,
    ) -> Result<Arc<Vec<FieldInfo>>> {
        if depth > MAX_LAYOUT_DEPTH {
            return Err(Error::RecursionLimit(MAX_LAYOUT_DEPTH));
        }

        let key = (ty.key(), include_static);
        if let Some(table) = self.tables.get(&key) {
            return Ok(table.value().clone());
        }

        let table = if ty.is_value_type() {
            self.value_type_fields(ty, include_static, depth)?
        } else {
            let table = self.reference_type_fields(ty, include_static, depth)?;
            self.emit_debug_records(ty, &table);
            table
        };

        let table = Arc::new(table);
        self.tables.insert(key, table.clone());
        Ok(table)
    }

    fn reference_type_fields(
        &self,
        ty: &CilTypeRc,
        include_static: bool,
        depth: usize,
    ) -> Result<Vec<FieldInfo>> {
        let mut result = Vec::with_capacity(16);

        let mut level = Some(ty.clone());
        while let Some(current) = level {
            let mut declared: Vec<_> = current
                .field_list()
                .into_iter()
                .filter(|f| include_static || !f.is_static())
                .collect();
            declared.sort_by(|a, b| a.name.cmp(&b.name));

            for field in declared {
                let mut info = self.describe_field(&current, &field, depth)?;
                info.is_static = field.is_static();
                if let Some(offset) = field.explicit_offset() {
                    info.offset = offset;
                    info.has_explicit_offset = true;
                }
                result.push(info);
            }
            level = current.base();
        }

        result.reverse();

        let mut offset = 0;
        for info in &mut result {
            if !info.has_explicit_offset && !info.is_static {
                info.offset = offset;
                offset += info.size;
            }
        }

        Ok(result)
    }

    fn value_type_fields(
        &self,
        ty: &CilTypeRc,
        include_static: bool,
        depth: usize,
    ) -> Result<Vec<FieldInfo>> {
        let mut fields: Vec<_> = ty
            .field_list()
            .into_iter()
            .filter(|f| !f.is_static())
            .collect();
        let mut result = Vec::with_capacity(fields.len());

        match ty.layout()? {
            TypeLayout::Auto | TypeLayout::Sequential => {
                if !fields.is_empty() {
                    let pack = self.pack_of(ty);
                    let mut largest = 0;
                    for field in &fields {
                        largest = largest.max(self.field_size(field, depth)?);
                    }
                    let type_alignment = pack.min(largest);

                    fields.sort_by_key(|f| f.token);

                    let mut offset = 0;
                    for field in &fields {
                        let mut info = self.describe_field(ty, field, depth)?;
                        let field_alignment = type_alignment.min(info.size);
                        offset = align(offset, field_alignment);
                        info.offset = offset;
                        offset += info.size;
                        result.push(info);
                    }
                }
            }
            TypeLayout::Explicit => {
                for field in &fields {
                    let mut info = self.describe_field(ty, field, depth)?;
                    info.offset = field.explicit_offset().unwrap_or(0);
                    info.has_explicit_offset = true;
                    result.push(info);
                }
            }
        }

        if include_static {
            for field in ty.field_list().into_iter().filter(|f| f.is_static()) {
                let mut info = self.describe_field(ty, &field, depth)?;
                info.is_static = true;
                result.push(info);
            }
        }

        Ok(result)
    }

    fn describe_field(
        &self,
        declaring: &CilTypeRc,
        field: &Arc<CilField>,
        depth: usize,
    ) -> Result<FieldInfo> {
        let field_type = field
            .field_type()
            .ok_or_else(|| Error::TypeNotFound(format!("type of field {}", field.name)))?;
        let size = self.size_of_type_at(&field_type, depth + 1)?;
        let mut info = FieldInfo::new(field.full_name(), size, declaring, &field_type);
        info.field = Some(field.clone());
        Ok(info)
    }

    fn field_size(&self, field: &CilField, depth: usize) -> Result<u32> {
        let field_type = field
            .field_type()
            .ok_or_else(|| Error::TypeNotFound(format!("type of field {}", field.name)))?;
        self.size_of_type_at(&field_type, depth + 1)
    }

    fn pack_of(&self, ty: &CilType) -> u32 {
        match ty.packing_size.get() {
            Some(&pack) if pack != 0 => u32::from(pack),
            _ => self.config.pointer_size,
        }
    }

    fn emit_debug_records(&self, ty: &CilTypeRc, table: &[FieldInfo]) {
        let Some(sink) = &self.sink else {
            return;
        };

        let records: Vec<FieldInfoRecord> = table
            .iter()
            .filter(|info| !info.is_static)
            .map(|info| FieldInfoRecord {
                type_name: info.field_type.full_name().to_string(),
                offset: i32::try_from(info.offset).unwrap_or(i32::MAX),
                name: info.debug_name(),
            })
            .collect();
        if let Err(error) = sink.write_field_info(&records) {
            self.diagnostics.warning(
                DiagnosticCategory::DebugSymbols,
                format!("Writing field info of {} failed: {}", ty.full_name(), error),
            );
        }

        let map = FieldMapRecord {
            type_name: ty.full_name().to_string(),
            field_names: table.iter().map(FieldInfo::debug_name).collect(),
        };
        if let Err(error) = sink.write_field_map(&map) {
            self.diagnostics.warning(
                DiagnosticCategory::DebugSymbols,
                format!("Writing field map of {} failed: {}", ty.full_name(), error),
            );
        }
    }

    /// Size in bytes a value of `ty` occupies in a field, local or argument.
    ///
    /// # Errors
    /// Propagates value type layout failures.
    pub fn size_of_type(&self, ty: &CilTypeRc) -> Result<u32> {
        self.size_of_type_at(ty, 0)
    }

    fn size_of_type_at(&self, ty: &CilTypeRc, depth: usize) -> Result<u32> {
        if ty.is_pointer() || ty.is_by_ref() {
            return Ok(self.config.pointer_size);
        }
        let name = ty.full_name();
        if name == "System.Void" {
            return Ok(0);
        }
        if is_reference_type(ty) {
            return Ok(self.config.reference_size);
        }
        match name {
            "System.Byte" | "System.SByte" | "System.Boolean" => return Ok(1),
            "System.Char" | "System.UInt16" | "System.Int16" => return Ok(2),
            "System.UInt32" | "System.Int32" | "System.Single" => return Ok(4),
            "System.UInt64" | "System.Int64" | "System.Double" | "System.DateTime" => {
                return Ok(8)
            }
            "System.UIntPtr" | "System.IntPtr" => return Ok(self.config.pointer_size),
            "System.Decimal" | "System.Guid" => return Ok(16),
            _ => {}
        }
        if name.ends_with('*') {
            return Ok(self.config.pointer_size);
        }

        let key = ty.key();
        if let Some(size) = self.sizes.get(&key) {
            return Ok(*size);
        }

        if ty.is_enum() {
            return match ty.find_field("value__").and_then(|f| f.field_type()) {
                Some(underlying) => self.size_of_type_at(&underlying, depth + 1),
                None => Ok(4),
            };
        }
        if ty.is_value_type() {
            let size = self.value_type_storage_size(ty, depth)?;
            self.sizes.insert(key, size);
            return Ok(size);
        }
        Ok(4)
    }

    /// Bytes needed to store an instance of `ty`.
    ///
    /// For reference types this is the end of the instance field with the highest
    /// offset; object headers are not included.
    ///
    /// # Errors
    /// Propagates layout failures.
    pub fn storage_size(&self, ty: &CilTypeRc) -> Result<u32> {
        if ty.is_value_type() {
            return self.value_type_storage_size(ty, 0);
        }

        let table = self.fields_info(ty, false)?;
        Ok(table
            .iter()
            .filter(|info| !info.is_static)
            .max_by_key(|info| info.offset)
            .map_or(0, FieldInfo::end))
    }

    fn value_type_storage_size(&self, ty: &CilTypeRc, depth: usize) -> Result<u32> {
        let declared = ty.class_size.get().copied().unwrap_or(0);
        let table = self.fields_info_at(ty, false, depth)?;
        if table.is_empty() {
            return Ok(declared);
        }

        let largest = table.iter().map(|info| info.size).max().unwrap_or(0);
        let type_alignment = largest.min(self.pack_of(ty));
        let end = table.iter().map(FieldInfo::end).max().unwrap_or(0);
        Ok(declared.max(align(end, type_alignment)))
    }

    /// Number of 4-byte stack slots a local of type `ty` takes
    ///
    /// # Errors
    /// Propagates layout failures.
    pub fn stack_count_for_local(&self, ty: &CilTypeRc) -> Result<u32> {
        Ok(self.size_of_type(ty)?.div_ceil(4))
    }

    /// Find the entry with id `field_id` in the table of `ty`.
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] if there is no such entry.
    pub fn resolve_field(
        &self,
        ty: &CilTypeRc,
        field_id: &str,
        only_instance: bool,
    ) -> Result<FieldInfo> {
        let table = self.fields_info(ty, !only_instance)?;
        match table
            .iter()
            .find(|info| info.id == field_id && (!only_instance || !info.is_static))
        {
            Some(info) => Ok(info.clone()),
            None => {
                let known: Vec<&str> = table.iter().map(|info| info.id.as_str()).collect();
                tracing::debug!(
                    "Following fields have been found on '{}': {:?}",
                    ty.full_name(),
                    known
                );
                Err(Error::FieldNotFound(format!(
                    "Field '{}' not found on type '{}'",
                    field_id,
                    ty.full_name()
                )))
            }
        }
    }

    /// Find the table entry computed for `field`.
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] if `field` is not part of its type's layout.
    pub fn resolve_field_of(&self, field: &Arc<CilField>) -> Result<FieldInfo> {
        let declaring = field
            .declaring_type()
            .ok_or_else(|| Error::FieldNotFound(field.full_name().to_string()))?;
        let table = self.fields_info(&declaring, field.is_static())?;
        if let Some(info) = table
            .iter()
            .find(|info| info.field.as_ref().is_some_and(|f| Arc::ptr_eq(f, field)))
        {
            return Ok(info.clone());
        }
        self.resolve_field(&declaring, field.full_name(), !field.is_static())
    }
}

/// Round `size` up to a multiple of `alignment`; an alignment of 0 leaves it unchanged
#[must_use]
pub fn align(size: u32, alignment: u32) -> u32 {
    if alignment == 0 || size % alignment == 0 {
        size
    } else {
        size + alignment - (size % alignment)
    }
}

/// True for types whose values are object references
#[must_use]
pub fn is_reference_type(ty: &CilType) -> bool {
    !ty.is_value_type() && !ty.is_pointer() && !ty.is_by_ref()
}

/// True for the built-in primitive value types
#[must_use]
pub fn is_primitive(ty: &CilType) -> bool {
    PRIMITIVE_NAMES.contains(&ty.full_name())
}

/// True for user defined value types: not enums, primitives or `System.Decimal`
#[must_use]
pub fn is_struct(ty: &CilType) -> bool {
    ty.is_value_type()
        && ty.full_name() != "System.String"
        && ty.full_name() != "System.Decimal"
        && !ty.is_enum()
        && !is_primitive(ty)
}

/// True for the signed integer primitives
#[must_use]
pub fn is_signed(ty: &CilType) -> bool {
    matches!(
        ty.full_name(),
        "System.SByte" | "System.Int16" | "System.Int32" | "System.Int64"
    )
}

/// True for types the evaluation stack holds as a 32-bit integer
#[must_use]
pub fn is_integer_based(ty: &CilType) -> bool {
    ty.is_pointer()
        || matches!(
            ty.full_name(),
            "System.Byte"
                | "System.Boolean"
                | "System.SByte"
                | "System.UInt16"
                | "System.Int16"
                | "System.Int32"
                | "System.UInt32"
                | "System.Char"
                | "System.IntPtr"
                | "System.UIntPtr"
        )
}

/// True for the 64-bit integer primitives
#[must_use]
pub fn is_long_based(ty: &CilType) -> bool {
    matches!(ty.full_name(), "System.Int64" | "System.UInt64")
}

/// True for integers, native integers, pointers and by-refs
#[must_use]
pub fn is_integral_or_pointer(ty: &CilType) -> bool {
    is_integer_based(ty) || is_long_based(ty) || ty.is_pointer() || ty.is_by_ref()
}

/// True for pointers, by-refs and native integers
#[must_use]
pub fn is_pointer(ty: &CilType) -> bool {
    ty.is_pointer()
        || ty.is_by_ref()
        || matches!(ty.full_name(), "System.IntPtr" | "System.UIntPtr")
}

/// True for `System.Single` and `System.Double`
#[must_use]
pub fn is_float(ty: &CilType) -> bool {
    matches!(ty.full_name(), "System.Single" | "System.Double")
}

/// True if values of both types share one evaluation stack representation
#[must_use]
pub fn is_same_value_type(a: &CilType, b: &CilType) -> bool {
    (is_integer_based(a) && is_integer_based(b))
        || (is_long_based(a) && is_long_based(b))
        || (is_pointer(a) && is_pointer(b))
        || (a.is_same(b) && is_float(a))
}
