//! Mappings
//!
//! A mapping makes a child instance's top-level key an alias for a keypath
//! in another (origin) viewmodel. It is a relation, not a copy: reads,
//! writes and splices resolve through the origin every time, and
//! registrations land in the origin's tables, so a write made on either
//! side reaches dependants on both.
//!
//! The mapping remembers every registration it forwarded. Tearing the
//! mapping down unregisters whatever is left so the origin never keeps
//! references to a destroyed instance's render nodes.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use super::Viewmodel;
use crate::error::Result;
use crate::graph::{Dependant, Group};
use crate::keypath::Keypath;
use crate::runloop;

struct Forwarded {
    local: Keypath,
    dependant: Rc<dyn Dependant>,
    group: Group,
}

/// Alias from `local_key` in a child viewmodel to `keypath` in `origin`.
pub struct Mapping {
    local_key: String,
    origin: Rc<Viewmodel>,
    keypath: RefCell<Keypath>,
    forwarded: RefCell<Vec<Forwarded>>,
}

impl Mapping {
    pub(super) fn new(local_key: &str, origin: Rc<Viewmodel>, keypath: Keypath) -> Self {
        Self {
            local_key: local_key.to_string(),
            origin,
            keypath: RefCell::new(keypath),
            forwarded: RefCell::new(Vec::new()),
        }
    }

    pub fn local_key(&self) -> &str {
        &self.local_key
    }

    pub fn origin(&self) -> &Rc<Viewmodel> {
        &self.origin
    }

    /// The keypath in the origin this mapping currently points at.
    pub fn keypath(&self) -> Keypath {
        self.keypath.borrow().clone()
    }

    /// Number of registrations currently forwarded to the origin.
    pub fn forwarded_count(&self) -> usize {
        self.forwarded.borrow().len()
    }

    /// Translate a local keypath (`foo.x` with `foo` mapped to `a.b`) into
    /// the origin keypath (`a.b.x`).
    pub fn translate(&self, local: &Keypath) -> Keypath {
        self.keypath.borrow().join_path(&local.tail())
    }

    pub fn get(&self, local: &Keypath) -> Option<Value> {
        self.origin.get(&self.translate(local))
    }

    pub fn set(&self, local: &Keypath, value: Value) -> Result<()> {
        self.origin.set(&self.translate(local), value)
    }

    pub fn splice(&self, local: &Keypath, start: usize, remove: usize, items: Vec<Value>) -> Result<Vec<Value>> {
        self.origin.splice(&self.translate(local), start, remove, items)
    }

    /// Forward a registration to the origin. Only registrations the origin
    /// actually recorded are remembered, so teardown releases each once.
    pub fn register(&self, local: &Keypath, dependant: Rc<dyn Dependant>, group: Group) -> bool {
        let translated = self.translate(local);
        tracing::trace!(%local, %translated, "mapping: forwarding registration");
        if !self.origin.register(&translated, dependant.clone(), group) {
            return false;
        }
        self.forwarded.borrow_mut().push(Forwarded {
            local: local.clone(),
            dependant,
            group,
        });
        true
    }

    pub fn unregister(&self, local: &Keypath, dependant: &dyn Dependant, group: Group) -> Result<()> {
        self.origin.unregister(&self.translate(local), dependant, group)?;

        let id = dependant.id();
        let mut forwarded = self.forwarded.borrow_mut();
        if let Some(index) = forwarded
            .iter()
            .position(|f| f.dependant.id() == id && f.group == group && &f.local == local)
        {
            forwarded.remove(index);
        }
        Ok(())
    }

    /// Re-point the mapping after an ancestor list in the origin shifted.
    /// Forwarded registrations move to the new origin keypath and their
    /// dependants are queued so they read from it.
    pub fn rebind(&self, old_keypath: &Keypath, new_keypath: &Keypath) -> Result<()> {
        let current = self.keypath();
        let Some(moved) = current.replace_prefix(old_keypath, new_keypath) else {
            return Ok(());
        };
        if moved == current {
            return Ok(());
        }

        tracing::debug!(local_key = %self.local_key, from = %current, to = %moved, "mapping: rebind");

        let records: Vec<(Keypath, Rc<dyn Dependant>, Group)> = self
            .forwarded
            .borrow()
            .iter()
            .map(|f| (f.local.clone(), f.dependant.clone(), f.group))
            .collect();

        for (local, dependant, group) in &records {
            self.origin.unregister(&self.translate(local), &**dependant, *group)?;
        }

        *self.keypath.borrow_mut() = moved;

        for (local, dependant, group) in records {
            self.origin.register(&self.translate(&local), dependant.clone(), group);
            runloop::add_dependant(dependant);
        }
        Ok(())
    }

    /// Unregister everything still forwarded through this mapping.
    pub fn teardown(&self) -> Result<()> {
        let records = std::mem::take(&mut *self.forwarded.borrow_mut());
        tracing::debug!(
            local_key = %self.local_key,
            remaining = records.len(),
            "mapping: teardown"
        );
        for record in records {
            self.origin
                .unregister(&self.translate(&record.local), &*record.dependant, record.group)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("local_key", &self.local_key)
            .field("keypath", &self.keypath())
            .field("forwarded", &self.forwarded_count())
            .finish()
    }
}
