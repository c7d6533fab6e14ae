//! Dependants
//!
//! This module defines the capability every render-tree node must provide
//! to take part in the dependency graph.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::keypath::Keypath;

/// Unique identifier for a dependant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependantId(u64);

impl DependantId {
    /// Generate a new unique dependant ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for DependantId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of node behind a dependant. Used for logging only; dispatch
/// goes through the [`Dependant`] trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependantKind {
    /// A `{{value}}` text interpolation.
    Interpolator,

    /// A block that renders zero or more child fragments.
    Section,

    /// A swappable sub-template.
    Partial,

    /// A computed property.
    Computation,

    /// A user observer callback.
    Observer,

    /// Anything else, typically a test double.
    Other,
}

/// Partition of the registry. Notification visits groups in declaration
/// order, so computed values settle before the nodes that read them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {
    Computed,
    #[default]
    Default,
    Observers,
}

impl Group {
    /// All groups in notification order.
    pub const ALL: [Group; 3] = [Group::Computed, Group::Default, Group::Observers];
}

/// Summary of a list mutation, handed to splice-aware dependants so they
/// can shift their children instead of rebuilding them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceSummary {
    /// First affected index.
    pub start: usize,
    /// Number of items removed at `start`.
    pub removed: usize,
    /// Number of items inserted at `start`.
    pub added: usize,
    pub old_len: usize,
    pub new_len: usize,
}

impl SpliceSummary {
    /// Where the item previously at `old_index` lives now, or `None` if it
    /// was removed.
    pub fn new_index(&self, old_index: usize) -> Option<usize> {
        if old_index < self.start {
            Some(old_index)
        } else if old_index < self.start + self.removed {
            None
        } else {
            Some(old_index - self.removed + self.added)
        }
    }

    /// Whether the splice moved anything after the affected range.
    pub fn shifts(&self) -> bool {
        self.removed != self.added
    }
}

/// Anything that can be registered against a keypath and invalidated.
///
/// Implemented by interpolators, sections, partials, computations and
/// observers. The viewmodel only ever holds these as `Rc<dyn Dependant>`.
pub trait Dependant {
    /// Identity used for runloop deduplication and registry removal.
    fn id(&self) -> DependantId;

    fn kind(&self) -> DependantKind {
        DependantKind::Other
    }

    /// Static dependants (bound to literal values) are never registered and
    /// never observe writes.
    fn is_static(&self) -> bool {
        false
    }

    /// Structural nesting depth. The runloop updates shallower dependants
    /// first because they may tear down deeper ones.
    fn depth(&self) -> usize {
        0
    }

    /// `false` once the dependant has been unbound. Dirty dependants that
    /// were unbound earlier in the same flush are skipped.
    fn is_bound(&self) -> bool {
        true
    }

    /// Apply a pending invalidation, reading the current value from the
    /// viewmodel.
    fn update(&self) -> Result<()>;

    /// Handle a splice of the list registered at this dependant's keypath.
    /// Returns `true` if the dependant handled it structurally and needs no
    /// further update for that keypath.
    fn splice(&self, _summary: &SpliceSummary) -> Result<bool> {
        Ok(false)
    }

    /// Re-point the dependant after an ancestor list shifted.
    fn rebind(
        &self,
        index_ref: Option<&str>,
        new_index: Option<usize>,
        old_keypath: &Keypath,
        new_keypath: &Keypath,
    ) -> Result<()>;

    /// Release every registration held by this dependant.
    fn unbind(&self) -> Result<()>;
}

impl fmt::Debug for dyn Dependant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependant")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}
