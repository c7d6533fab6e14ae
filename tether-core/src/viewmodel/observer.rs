//! Observers
//!
//! An observer runs a user callback whenever the value at its keypath
//! changes. It is the data-side counterpart of a render node: registered in
//! [`Group::Observers`], so it fires after computed values and render
//! dependants for the same write have been invalidated.
//!
//! # Differences from Render Dependants
//!
//! - The callback receives both the new and the previous value.
//! - Invalidations that leave the value unchanged (a write to an unrelated
//!   ancestor, say) do not fire it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::Viewmodel;
use crate::error::Result;
use crate::graph::{Dependant, DependantId, DependantKind, Group};
use crate::keypath::Keypath;

/// Callback invoked with `(new, old, keypath)`.
pub type ObserverCallback = Box<dyn Fn(Option<&Value>, Option<&Value>, &Keypath)>;

/// A keypath observer.
pub struct Observer {
    id: DependantId,
    keypath: Keypath,
    viewmodel: Weak<Viewmodel>,
    callback: ObserverCallback,
    last: RefCell<Option<Value>>,
    bound: Cell<bool>,
}

impl Observer {
    pub(super) fn new(viewmodel: &Rc<Viewmodel>, keypath: Keypath, callback: ObserverCallback, init: bool) -> Rc<Self> {
        let current = viewmodel.get(&keypath);
        let observer = Rc::new(Self {
            id: DependantId::new(),
            keypath,
            viewmodel: Rc::downgrade(viewmodel),
            callback,
            last: RefCell::new(current.clone()),
            bound: Cell::new(true),
        });

        viewmodel.register(&observer.keypath, observer.clone(), Group::Observers);

        if init {
            (observer.callback)(current.as_ref(), None, &observer.keypath);
        }
        observer
    }

    pub fn keypath(&self) -> &Keypath {
        &self.keypath
    }

    /// Stop observing.
    pub fn cancel(&self) -> Result<()> {
        self.unbind()
    }
}

impl Dependant for Observer {
    fn id(&self) -> DependantId {
        self.id
    }

    fn kind(&self) -> DependantKind {
        DependantKind::Observer
    }

    fn is_bound(&self) -> bool {
        self.bound.get()
    }

    fn update(&self) -> Result<()> {
        let Some(viewmodel) = self.viewmodel.upgrade() else {
            return Ok(());
        };

        let current = viewmodel.get(&self.keypath);
        let previous = self.last.replace(current.clone());
        if previous == current {
            return Ok(());
        }

        (self.callback)(current.as_ref(), previous.as_ref(), &self.keypath);
        Ok(())
    }

    fn rebind(&self, _: Option<&str>, _: Option<usize>, _: &Keypath, _: &Keypath) -> Result<()> {
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        if !self.bound.replace(false) {
            return Ok(());
        }
        match self.viewmodel.upgrade() {
            Some(viewmodel) => viewmodel.unregister(&self.keypath, self, Group::Observers),
            None => Ok(()),
        }
    }
}
