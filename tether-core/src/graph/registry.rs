//! Dependant Registry
//!
//! The registry indexes dependants by keypath, per group, and keeps a
//! second table that makes "is anything registered below here?" a single
//! lookup.
//!
//! # Tables
//!
//! - `deps[group][keypath]`: dependants registered exactly at `keypath`, in
//!   registration order. A dependant appears at most once per list.
//!
//! - `deps_map[group][parent][child]`: for every link `parent -> child` on
//!   the chain from a registered keypath up to the root, the number of live
//!   registrations at `child` or below. `items.0.name` contributes to
//!   `items.0 -> items.0.name`, `items -> items.0` and `"" -> items`.
//!
//! A count that drops to zero is removed outright, so callers can treat
//! "absent" as the only empty state.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use super::dependant::{Dependant, DependantId, Group};
use crate::error::{Error, Result};
use crate::keypath::Keypath;

type DependantList = Vec<Rc<dyn Dependant>>;

/// Per-viewmodel registration tables.
#[derive(Default)]
pub struct Registry {
    deps: HashMap<Group, IndexMap<Keypath, DependantList>>,
    deps_map: HashMap<Group, HashMap<Keypath, IndexMap<Keypath, usize>>>,
}

impl Registry {
    /// Create empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `dependant` to `deps[group][keypath]` and bump the counts on
    /// every link up to the root.
    ///
    /// Returns `false` (and changes nothing) if the dependant is already
    /// registered there.
    pub fn register(&mut self, keypath: &Keypath, dependant: Rc<dyn Dependant>, group: Group) -> bool {
        let list = self
            .deps
            .entry(group)
            .or_default()
            .entry(keypath.clone())
            .or_default();

        let id = dependant.id();
        if list.iter().any(|d| d.id() == id) {
            tracing::warn!(%keypath, ?group, ?id, "dependant already registered");
            return false;
        }
        list.push(dependant);

        if keypath.is_root() {
            // no ancestors to count against
            return true;
        }

        let map = self.deps_map.entry(group).or_default();
        let mut child = keypath.clone();
        while let Some(parent) = child.parent() {
            *map.entry(parent.clone())
                .or_default()
                .entry(child)
                .or_insert(0) += 1;
            child = parent;
        }

        true
    }

    /// Remove `id` from `deps[group][keypath]` and release its counts.
    ///
    /// Fails with [`Error::NotRegistered`] if it was not there.
    pub fn unregister(&mut self, keypath: &Keypath, id: DependantId, group: Group) -> Result<()> {
        let not_registered = || Error::NotRegistered {
            keypath: keypath.clone(),
            group,
        };

        let by_keypath = self.deps.get_mut(&group).ok_or_else(not_registered)?;
        let list = by_keypath.get_mut(keypath).ok_or_else(not_registered)?;
        let index = list
            .iter()
            .position(|d| d.id() == id)
            .ok_or_else(not_registered)?;

        list.remove(index);
        if list.is_empty() {
            by_keypath.shift_remove(keypath);
        }

        if keypath.is_root() {
            return Ok(());
        }

        let Some(map) = self.deps_map.get_mut(&group) else {
            debug_assert!(false, "deps_map missing group {group:?}");
            return Ok(());
        };

        let mut child = keypath.clone();
        while let Some(parent) = child.parent() {
            if let Some(children) = map.get_mut(&parent) {
                if let Some(count) = children.get_mut(&child) {
                    *count -= 1;
                    if *count == 0 {
                        children.shift_remove(&child);
                    }
                }
                if children.is_empty() {
                    map.remove(&parent);
                }
            }
            child = parent;
        }

        Ok(())
    }

    /// Dependants registered exactly at `keypath`, in registration order.
    pub fn dependants_at(&self, group: Group, keypath: &Keypath) -> Vec<Rc<dyn Dependant>> {
        self.deps
            .get(&group)
            .and_then(|by_keypath| by_keypath.get(keypath))
            .cloned()
            .unwrap_or_default()
    }

    /// Direct children of `keypath` that have live registrations at or
    /// below them.
    pub fn children_of(&self, group: Group, keypath: &Keypath) -> Vec<Keypath> {
        self.deps_map
            .get(&group)
            .and_then(|map| map.get(keypath))
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Live registration count for the `parent -> child` link.
    pub fn count_below(&self, group: Group, parent: &Keypath, child: &Keypath) -> usize {
        self.deps_map
            .get(&group)
            .and_then(|map| map.get(parent))
            .and_then(|children| children.get(child))
            .copied()
            .unwrap_or(0)
    }

    /// Whether any dependant in `group` is registered strictly below
    /// `keypath`.
    pub fn has_dependants_below(&self, group: Group, keypath: &Keypath) -> bool {
        self.deps_map
            .get(&group)
            .is_some_and(|map| map.contains_key(keypath))
    }

    /// Whether `id` is registered at `keypath` in `group`.
    pub fn contains(&self, group: Group, keypath: &Keypath, id: DependantId) -> bool {
        self.deps
            .get(&group)
            .and_then(|by_keypath| by_keypath.get(keypath))
            .is_some_and(|list| list.iter().any(|d| d.id() == id))
    }

    /// Total number of registrations across all groups.
    pub fn len(&self) -> usize {
        self.deps
            .values()
            .flat_map(|by_keypath| by_keypath.values())
            .map(Vec::len)
            .sum()
    }

    /// True when nothing is registered and no counts remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.deps_map.values().all(HashMap::is_empty)
    }
}
