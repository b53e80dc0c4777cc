//! Dense identities of methods and types.
//!
//! Every method of an override chain on a class hierarchy shares the identity of the
//! chain's root definition, so a virtual slot has one id regardless of which override
//! is asked for. Interface methods always get an identity of their own.

use std::collections::HashMap;

use crate::{
    metadata::{
        method::MethodRc,
        typesystem::{CilTypeRc, ProgramItem, TypeRegistry},
    },
    scanner::queue::WorkQueue,
    Error, Result,
};

/// UID lookups handed to the code generator while it writes method tables.
pub trait UidLookup {
    /// The UID of `method`
    fn method_uid(&mut self, method: &MethodRc) -> u32;

    /// The UID of `ty`.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotQueued`] if `ty` is not reachable.
    fn type_uid(&mut self, ty: &CilTypeRc) -> Result<u32>;
}

/// Memoized method and type identities, assigned on first request.
#[derive(Debug, Default)]
pub struct UidTable {
    methods: HashMap<String, u32>,
    types: HashMap<String, u32>,
    next_method: u32,
    next_type: u32,
}

impl UidTable {
    /// An empty table
    #[must_use]
    pub fn new() -> Self {
        UidTable::default()
    }

    fn fresh_method_uid(&mut self) -> u32 {
        let uid = self.next_method;
        self.next_method += 1;
        uid
    }

    /// The UID of `method`, shared with the root of its override chain unless it is
    /// declared on an interface.
    pub fn method_uid(&mut self, registry: &TypeRegistry, method: &MethodRc) -> u32 {
        let key = method.key();
        if let Some(&uid) = self.methods.get(&key) {
            return uid;
        }

        let on_interface = method
            .declaring_type()
            .is_some_and(|declaring| declaring.is_interface());
        if on_interface {
            let uid = self.fresh_method_uid();
            self.methods.insert(key, uid);
            return uid;
        }

        let root = registry.ultimate_base_method(method);
        let root_key = root.key();
        let uid = match self.methods.get(&root_key) {
            Some(&uid) => uid,
            None => {
                let uid = self.fresh_method_uid();
                self.methods.insert(root_key.clone(), uid);
                uid
            }
        };
        if root_key != key {
            self.methods.insert(key, uid);
        }
        uid
    }

    /// The UID of `ty`, which must be in `queue`.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotQueued`] for a type the scan never reached.
    pub fn type_uid(&mut self, queue: &WorkQueue, ty: &CilTypeRc) -> Result<u32> {
        if !queue.contains(&ProgramItem::Type(ty.clone())) {
            return Err(Error::TypeNotQueued(ty.full_name().to_string()));
        }

        let next = &mut self.next_type;
        let uid = *self.types.entry(ty.key()).or_insert_with(|| {
            let uid = *next;
            *next += 1;
            uid
        });
        Ok(uid)
    }

    /// Number of distinct method UIDs handed out
    #[must_use]
    pub fn method_count(&self) -> u32 {
        self.next_method
    }

    /// Number of type UIDs handed out
    #[must_use]
    pub fn type_count(&self) -> u32 {
        self.next_type
    }
}

/// [`UidLookup`] over a finished scan.
pub struct UidResolver<'a> {
    table: &'a mut UidTable,
    queue: &'a WorkQueue,
    registry: &'a TypeRegistry,
}

impl<'a> UidResolver<'a> {
    /// Look up UIDs in `table` for the items of `queue`
    pub fn new(table: &'a mut UidTable, queue: &'a WorkQueue, registry: &'a TypeRegistry) -> Self {
        UidResolver {
            table,
            queue,
            registry,
        }
    }
}

impl UidLookup for UidResolver<'_> {
    fn method_uid(&mut self, method: &MethodRc) -> u32 {
        self.table.method_uid(self.registry, method)
    }

    fn type_uid(&mut self, ty: &CilTypeRc) -> Result<u32> {
        self.table.type_uid(self.queue, ty)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        metadata::typesystem::ProgramBuilder,
        scanner::queue::{QueueReason, WorkQueue},
    };

    #[test]
    fn override_chains_share_one_uid() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let root = app.class("App", "Root").build().unwrap();
        let mid = app.class("App", "Mid").base(&root).build().unwrap();
        let leaf = app.class("App", "Leaf").base(&mid).build().unwrap();
        let root_m = app.method(&root, "M").virtual_method().new_slot().build().unwrap();
        let mid_m = app.method(&mid, "M").virtual_method().build().unwrap();
        let leaf_m = app.method(&leaf, "M").virtual_method().build().unwrap();

        let iface = app.interface("App", "IFace").build().unwrap();
        let iface_m = app.method(&iface, "M").virtual_method().abstract_method().build().unwrap();

        let mut table = UidTable::new();
        let uid = table.method_uid(&registry, &leaf_m);
        assert_eq!(table.method_uid(&registry, &mid_m), uid);
        assert_eq!(table.method_uid(&registry, &root_m), uid);
        assert_ne!(table.method_uid(&registry, &iface_m), uid);
        assert_eq!(table.method_count(), 2);
    }

    #[test]
    fn type_uids_need_reachable_types() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let reached = app.class("App", "Reached").build().unwrap();
        let missing = app.class("App", "Missing").build().unwrap();

        let mut queue = WorkQueue::new();
        queue.push(ProgramItem::Type(reached.clone()), QueueReason::EntryPoint, None);

        let mut table = UidTable::new();
        let mut lookup = UidResolver::new(&mut table, &queue, &registry);
        assert_eq!(lookup.type_uid(&reached).unwrap(), 0);
        assert_eq!(lookup.type_uid(&reached).unwrap(), 0);
        assert!(matches!(
            lookup.type_uid(&missing),
            Err(Error::TypeNotQueued(name)) if name == "App.Missing"
        ));
        assert_eq!(table.type_count(), 1);
    }
}
