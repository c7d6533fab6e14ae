//! Computed Values
//!
//! A computation writes a derived value to its own key whenever one of its
//! declared dependencies changes.
//!
//! # How Computations Work
//!
//! 1. On install, the value is computed and written once.
//!
//! 2. The computation registers in [`Group::Computed`] at each dependency,
//!    so it is invalidated before ordinary dependants of the same write.
//!
//! 3. On update it recomputes and writes through [`Viewmodel::set`]. That
//!    write happens mid-flush; the runloop folds the dependants it
//!    invalidates into the same flush. An unchanged result writes nothing.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::Viewmodel;
use crate::error::Result;
use crate::graph::{Dependant, DependantId, DependantKind, Group};
use crate::keypath::Keypath;

type ComputeFn = Box<dyn Fn(&Viewmodel) -> Value>;

/// A computed property.
pub struct Computation {
    id: DependantId,
    key: Keypath,
    dependencies: Vec<Keypath>,
    compute: ComputeFn,
    viewmodel: Weak<Viewmodel>,
    registered: RefCell<Vec<Keypath>>,
    bound: Cell<bool>,
    evaluations: Cell<usize>,
}

impl Computation {
    pub(super) fn new(
        viewmodel: &Rc<Viewmodel>,
        key: Keypath,
        dependencies: Vec<Keypath>,
        compute: ComputeFn,
    ) -> Rc<Self> {
        Rc::new(Self {
            id: DependantId::new(),
            key,
            dependencies,
            compute,
            viewmodel: Rc::downgrade(viewmodel),
            registered: RefCell::new(Vec::new()),
            bound: Cell::new(false),
            evaluations: Cell::new(0),
        })
    }

    pub(super) fn init(self: &Rc<Self>) -> Result<()> {
        let Some(viewmodel) = self.viewmodel.upgrade() else {
            return Ok(());
        };
        // a dependency listed twice, or two mapped keys resolving to the same
        // origin keypath, registers once and is released once
        let registered: Vec<Keypath> = self
            .dependencies
            .iter()
            .filter(|dependency| viewmodel.register(dependency, self.clone(), Group::Computed))
            .cloned()
            .collect();
        *self.registered.borrow_mut() = registered;
        self.bound.set(true);
        self.evaluate(&viewmodel)
    }

    /// The key this computation writes to.
    pub fn key(&self) -> &Keypath {
        &self.key
    }

    /// How many times the value has been computed.
    pub fn evaluations(&self) -> usize {
        self.evaluations.get()
    }

    fn evaluate(&self, viewmodel: &Viewmodel) -> Result<()> {
        let value = (self.compute)(viewmodel);
        self.evaluations.set(self.evaluations.get() + 1);
        viewmodel.set(&self.key, value)
    }
}

impl Dependant for Computation {
    fn id(&self) -> DependantId {
        self.id
    }

    fn kind(&self) -> DependantKind {
        DependantKind::Computation
    }

    fn is_bound(&self) -> bool {
        self.bound.get()
    }

    fn update(&self) -> Result<()> {
        match self.viewmodel.upgrade() {
            Some(viewmodel) => self.evaluate(&viewmodel),
            None => Ok(()),
        }
    }

    fn rebind(&self, _: Option<&str>, _: Option<usize>, _: &Keypath, _: &Keypath) -> Result<()> {
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        if !self.bound.replace(false) {
            return Ok(());
        }
        let Some(viewmodel) = self.viewmodel.upgrade() else {
            return Ok(());
        };
        let registered = std::mem::take(&mut *self.registered.borrow_mut());
        for dependency in &registered {
            viewmodel.unregister(dependency, self, Group::Computed)?;
        }
        Ok(())
    }
}
