//! The reachable item set and its worklist.

use std::collections::{HashMap, VecDeque};

use strum::{Display, EnumIter};
use tracing::trace;

use crate::metadata::{
    method::MethodRc,
    typesystem::{CilTypeRc, FieldRc, ProgramItem},
};

/// Why an item was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum QueueReason {
    /// The entry point of the program
    #[strum(serialize = "Entry Point")]
    EntryPoint,
    /// A method of the boot list
    #[strum(serialize = "Boot Entry")]
    BootEntry,
    /// The declaring type of a boot list method
    #[strum(serialize = "Boot Entry Declaring Type")]
    BootEntryDeclaringType,
    /// An item the caller insists on
    #[strum(serialize = "Force Include")]
    ForceInclude,
    /// A runtime method named in the configuration
    #[strum(serialize = "Explicit Entry")]
    ExplicitEntry,
    /// A parameter type of a scanned method
    #[strum(serialize = "Parameter")]
    Parameter,
    /// The declaring type of a scanned method
    #[strum(serialize = "Declaring Type")]
    DeclaringType,
    /// The return type of a scanned method
    #[strum(serialize = "Return Type")]
    ReturnType,
    /// The plug replacing a scanned method
    #[strum(serialize = "Plug method")]
    PlugMethod,
    /// The target of a call instruction
    #[strum(serialize = "Call")]
    Call,
    /// A type or field operand of an instruction
    #[strum(serialize = "OpCode Value")]
    OpCodeValue,
    /// The base type of a scanned type
    #[strum(serialize = "Base Type")]
    BaseType,
    /// A static constructor of a scanned type
    #[strum(serialize = "Static Constructor")]
    StaticConstructor,
    /// An array interface helper method instantiated for an element type
    #[strum(serialize = "Virtual SzArrayHelper")]
    VirtualSzArrayHelper,
    /// The type of an instance field of a scanned type
    #[strum(serialize = "Field Type")]
    FieldType,
    /// An interface implemented by a scanned type
    #[strum(serialize = "Implemented Interface")]
    ImplementedInterface,
}

/// A queued item with its provenance.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// The item
    pub item: ProgramItem,
    /// Why it was queued
    pub reason: QueueReason,
    /// Full name of the item that referenced it
    pub source: Option<String>,
}

/// Instrumentation of the worklist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounters {
    /// Items queued
    pub pushes: usize,
    /// Queue requests for items already in the set
    pub already_present: usize,
}

/// Insertion ordered set of reachable items plus the FIFO of items not yet scanned.
///
/// An item enters the set before it is queued and never leaves it, so each item is
/// queued at most once.
#[derive(Debug, Default)]
pub struct WorkQueue {
    index: HashMap<String, usize>,
    items: Vec<ProgramItem>,
    pending: VecDeque<QueueItem>,
    counters: QueueCounters,
}

impl WorkQueue {
    /// An empty queue
    #[must_use]
    pub fn new() -> Self {
        WorkQueue::default()
    }

    /// Add `item` to the set and queue it, unless it is already present.
    ///
    /// Returns `true` if the item was new.
    pub fn push(&mut self, item: ProgramItem, reason: QueueReason, source: Option<String>) -> bool {
        let key = item.key();
        if self.index.contains_key(&key) {
            self.counters.already_present += 1;
            return false;
        }

        trace!("Queueing {} ({})", item.full_name(), reason);
        self.index.insert(key, self.items.len());
        self.items.push(item.clone());
        self.pending.push_back(QueueItem {
            item,
            reason,
            source,
        });
        self.counters.pushes += 1;
        true
    }

    /// The next item to scan
    pub fn pop(&mut self) -> Option<QueueItem> {
        self.pending.pop_front()
    }

    /// Number of items waiting to be scanned
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// True if `item` was ever queued
    #[must_use]
    pub fn contains(&self, item: &ProgramItem) -> bool {
        self.index.contains_key(&item.key())
    }

    /// Position of `item` in discovery order
    #[must_use]
    pub fn index_of(&self, item: &ProgramItem) -> Option<usize> {
        self.index.get(&item.key()).copied()
    }

    /// The method stored in the set under the identity of `method`.
    ///
    /// Two handles for the same logical member map to the one that was queued first.
    #[must_use]
    pub fn canonical_method(&self, method: &MethodRc) -> Option<MethodRc> {
        self.index
            .get(&method.key())
            .and_then(|&index| self.items.get(index))
            .and_then(ProgramItem::as_method)
            .cloned()
    }

    /// All items in discovery order
    #[must_use]
    pub fn items(&self) -> &[ProgramItem] {
        &self.items
    }

    /// Number of items in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing was queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Reachable methods in discovery order
    #[must_use]
    pub fn methods(&self) -> Vec<MethodRc> {
        self.items
            .iter()
            .filter_map(ProgramItem::as_method)
            .cloned()
            .collect()
    }

    /// Reachable types in discovery order
    #[must_use]
    pub fn types(&self) -> Vec<CilTypeRc> {
        self.items
            .iter()
            .filter_map(ProgramItem::as_type)
            .cloned()
            .collect()
    }

    /// Reachable fields in discovery order
    #[must_use]
    pub fn fields(&self) -> Vec<FieldRc> {
        self.items
            .iter()
            .filter_map(ProgramItem::as_field)
            .cloned()
            .collect()
    }

    /// Push and short circuit counts
    #[must_use]
    pub fn counters(&self) -> QueueCounters {
        self.counters
    }
}
