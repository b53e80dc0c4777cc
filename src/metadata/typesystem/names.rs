//! Full-name rendering and assembler label generation.
//!
//! Rendered names are the identity of program elements: plug resolution memoizes by
//! the method full name, the scanner deduplicates by module-qualified name, and the
//! code generator derives its labels from them. Rendering is a pure function of the
//! descriptor, so labels are reproducible across runs.
//!
//! # Formats
//!
//! | Element          | Rendering                                              |
//! |------------------|--------------------------------------------------------|
//! | type             | `Namespace.Name`, `Outer+Inner`                        |
//! | generic instance | ``Namespace.Name`1<System.Int32, System.String>``      |
//! | array            | `System.Int32[]`, `System.Int32[,]`                    |
//! | by-ref / pointer | `&System.Int32` / `System.Int32*`                      |
//! | method           | `System.Void  Ns.Type.Name(System.Int32, System.String)` |
//! | field            | `System.Int32 Ns.Type._value`                          |

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use md5::{Digest, Md5};

use crate::metadata::{
    method::Method,
    typesystem::{CilField, CilFlavor, CilType},
};

/// Labels longer than this are shortened with an MD5 suffix
pub const MAX_LABEL_LENGTH: usize = 200;

const ILLEGAL_IDENTIFIER_CHARS: &str = "&.,+$<>{}-`'/\\ ()[]*!=";
const ILLEGAL_LABEL_CHARS: &str = "&.,+$<>{}-`\\'/ ()*!=";

/// Render the full name of a type.
#[must_use]
pub fn type_full_name(ty: &CilType) -> String {
    match ty.flavor {
        CilFlavor::GenericParameter { .. } => return ty.name.clone(),
        CilFlavor::SzArray | CilFlavor::Array { .. } => {
            let rank = match ty.flavor {
                CilFlavor::Array { rank } => rank,
                _ => 1,
            };
            let mut name = element_name(ty);
            name.push('[');
            for _ in 1..rank {
                name.push(',');
            }
            name.push(']');
            return name;
        }
        CilFlavor::ByRef => return format!("&{}", element_name(ty)),
        CilFlavor::Pointer => return format!("{}*", element_name(ty)),
        _ => {}
    }

    let mut name = String::with_capacity(64);
    match ty.generic_definition() {
        Some(def) => {
            name.push_str(def.full_name());
            name.push('<');
            let args: Vec<String> = ty
                .generic_arguments()
                .iter()
                .map(|arg| arg.full_name().to_string())
                .collect();
            name.push_str(&args.join(", "));
            name.push('>');
        }
        None => name.push_str(&ty.qualified_name()),
    }

    if needs_module_prefix(&ty.name) {
        return format!("{}{}", ty.module.name.replace('.', ""), name);
    }

    name
}

fn element_name(ty: &CilType) -> String {
    ty.element()
        .map(|e| e.full_name().to_string())
        .unwrap_or_default()
}

// Internal helper types that exist in several modules under the same name
fn needs_module_prefix(name: &str) -> bool {
    name == "SR"
        || name == "PathInternal"
        || name.contains("PrivateImplementationDetails")
        || name == "Error"
        || name == "GetEndOfFile"
}

/// Render the full name of a method.
///
/// A leading parameter named `aThis` (the instance parameter of plugs) is skipped.
#[must_use]
pub fn method_full_name(method: &Method) -> String {
    let mut name = String::with_capacity(128);

    if method.is_constructor() {
        name.push_str("System.Void");
    } else {
        match method.return_type() {
            Some(ret) => name.push_str(ret.full_name()),
            None => name.push_str("System.Void"),
        }
    }

    name.push_str("  ");
    match method.declaring_type() {
        Some(decl) => name.push_str(decl.full_name()),
        None => name.push_str("dynamic_method"),
    }
    name.push('.');

    match method.generic_definition() {
        Some(def) => {
            name.push_str(&def.name);
            let args = method.generic_arguments();
            if !args.is_empty() {
                let args: Vec<&str> = args.iter().map(|a| a.full_name()).collect();
                name.push('<');
                name.push_str(&args.join(", "));
                name.push('>');
            }
        }
        None => name.push_str(&method.name),
    }

    name.push('(');
    let count = method.params.len();
    for (i, param) in method.params.iter().enumerate() {
        if i == 0 && param.name == "aThis" {
            continue;
        }
        if let Some(param_type) = param.param_type() {
            name.push_str(param_type.full_name());
        }
        if i + 1 < count {
            name.push_str(", ");
        }
    }
    name.push(')');

    name
}

/// Render the full name of a field, `<field type> <declaring type>.<name>`.
#[must_use]
pub fn field_full_name(field: &CilField) -> String {
    let field_type = field
        .field_type()
        .map(|t| t.full_name().to_string())
        .unwrap_or_default();
    let declaring = field
        .declaring_type()
        .map(|t| t.full_name().to_string())
        .unwrap_or_default();
    format!("{} {}.{}", field_type, declaring, field.name)
}

/// Replace every character that is not valid in an identifier with `_`.
#[must_use]
pub fn filter_string_for_incorrect_chars(name: &str) -> String {
    name.chars()
        .map(|c| {
            if ILLEGAL_IDENTIFIER_CHARS.contains(c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Turn a rendered name into an assembler label.
///
/// Array brackets, compiler-generated markers, pointers and `|` are spelled out, the
/// remaining illegal characters are dropped, and names longer than
/// [`MAX_LABEL_LENGTH`] are truncated and suffixed with the upper-case hex MD5 of the
/// full label.
#[must_use]
pub fn final_label(name: &str) -> String {
    let replaced = name
        .replace("[]", "array")
        .replace("<>", "compilergenerated")
        .replace("[,]", "array")
        .replace('*', "pointer")
        .replace('|', "sLine");

    let stripped: String = replaced
        .chars()
        .filter(|c| !ILLEGAL_LABEL_CHARS.contains(*c))
        .collect();

    if stripped.chars().count() <= MAX_LABEL_LENGTH {
        return stripped;
    }

    let digest = Md5::digest(stripped.as_bytes());
    let mut label: String = stripped
        .chars()
        .take(MAX_LABEL_LENGTH - digest.len() * 2)
        .collect();
    for byte in digest.iter() {
        label.push_str(&format!("{byte:02X}"));
    }
    label
}

/// Label of an instruction inside a method, `<method label>.IL_<offset as 4 hex digits>`.
#[must_use]
pub fn il_label(method_label: &str, il_offset: usize) -> String {
    format!("{method_label}.IL_{il_offset:04X}")
}

/// Data label of a static field.
#[must_use]
pub fn static_field_name(field: &CilField) -> String {
    let declaring = field
        .declaring_type()
        .map(|t| t.full_name().to_string())
        .unwrap_or_default();
    filter_string_for_incorrect_chars(&format!("static_field__{}.{}", declaring, field.name))
}

/// Per-run cache of method labels.
#[derive(Debug, Default)]
pub struct LabelCache {
    labels: DashMap<String, String>,
    generated: AtomicUsize,
}

impl LabelCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The label of `method`, generated on first request.
    pub fn method_label(&self, method: &Method) -> String {
        let key = method.key();
        if let Some(label) = self.labels.get(&key) {
            return label.clone();
        }

        let label = final_label(method.full_name());
        self.generated.fetch_add(1, Ordering::Relaxed);
        self.labels.insert(key, label.clone());
        label
    }

    /// Number of labels generated so far
    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::Relaxed)
    }
}
