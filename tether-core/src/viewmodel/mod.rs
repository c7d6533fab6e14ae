//! Viewmodel
//!
//! The viewmodel owns one instance's data tree and the registry of
//! dependants reading from it. It is the only sanctioned way for render
//! nodes to read or write data.
//!
//! # Notification
//!
//! A write to `P` invalidates:
//!
//! - every dependant registered exactly at `P`;
//! - every dependant registered at an ancestor of `P`, since a derived
//!   value may depend on the whole subtree;
//! - dependants registered below `P`, but only along links the registry
//!   reports as live. A write to `foo` never reaches into `bar`, and a
//!   subtree with nothing registered in it is never walked.
//!
//! Invalidated dependants are handed to the runloop; nothing updates until
//! the outermost batch closes.
//!
//! # Mappings
//!
//! A top-level key can be mapped onto a keypath of another viewmodel. Any
//! read, write, splice or registration whose keypath starts with that key
//! is translated and delegated, so the other viewmodel's storage and tables
//! are the single source of truth.

mod computation;
mod data;
mod mapping;
mod observer;

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

pub use computation::Computation;
pub use data::{is_truthy, to_text};
pub use mapping::Mapping;
pub use observer::{Observer, ObserverCallback};

use crate::error::{Error, Result};
use crate::graph::{Dependant, DependantId, Group, Registry, SpliceSummary};
use crate::keypath::{Keypath, Segment};
use crate::runloop;

/// One instance's data plus its dependency tables.
pub struct Viewmodel {
    data: RefCell<Value>,
    registry: RefCell<Registry>,
    mappings: RefCell<IndexMap<String, Rc<Mapping>>>,
    computations: RefCell<Vec<Rc<Computation>>>,
}

impl Viewmodel {
    /// Create a viewmodel owning `data`.
    pub fn new(data: Value) -> Rc<Self> {
        Rc::new(Self {
            data: RefCell::new(data),
            registry: RefCell::new(Registry::new()),
            mappings: RefCell::new(IndexMap::new()),
            computations: RefCell::new(Vec::new()),
        })
    }

    // ------------------------------------------------------------------
    // Reads and writes
    // ------------------------------------------------------------------

    /// Current value at `keypath`, resolved through mappings. `None` if any
    /// segment is missing.
    pub fn get(&self, keypath: &Keypath) -> Option<Value> {
        if let Some(mapping) = self.mapping_for(keypath) {
            return mapping.get(keypath);
        }
        data::lookup(&self.data.borrow(), keypath)
    }

    /// Write `value` at `keypath` and invalidate affected dependants.
    ///
    /// Writing an equal value is a no-op.
    pub fn set(&self, keypath: &Keypath, value: Value) -> Result<()> {
        if let Some(mapping) = self.mapping_for(keypath) {
            return mapping.set(keypath, value);
        }

        if let Some(list) = self.length_of_array(keypath) {
            return self.set_length(&list, keypath, value);
        }

        let changed = data::assign(&mut self.data.borrow_mut(), keypath, value)?;
        if !changed {
            tracing::trace!(%keypath, "set: value unchanged");
            return Ok(());
        }

        runloop::batch(|| {
            self.mark(keypath);
            Ok(())
        })
    }

    /// Array splice at `keypath`. Returns the removed items.
    ///
    /// `start` and `remove` are clamped to the array bounds. A missing value
    /// is treated as an empty array.
    pub fn splice(&self, keypath: &Keypath, start: usize, remove: usize, items: Vec<Value>) -> Result<Vec<Value>> {
        if let Some(mapping) = self.mapping_for(keypath) {
            return mapping.splice(keypath, start, remove, items);
        }

        let (removed, summary) = {
            let mut data = self.data.borrow_mut();
            let array = data::array_mut(&mut data, keypath).ok_or_else(|| Error::NotAnArray {
                keypath: keypath.clone(),
            })?;

            let old_len = array.len();
            let start = start.min(old_len);
            let remove = remove.min(old_len - start);
            let added = items.len();
            let removed: Vec<Value> = array.splice(start..start + remove, items).collect();

            let summary = SpliceSummary {
                start,
                removed: remove,
                added,
                old_len,
                new_len: array.len(),
            };
            (removed, summary)
        };

        if summary.removed == 0 && summary.added == 0 {
            return Ok(removed);
        }

        tracing::trace!(%keypath, ?summary, "splice");
        runloop::batch(|| self.smart_update(keypath, &summary))?;
        Ok(removed)
    }

    /// Append items, returning the new length.
    pub fn push(&self, keypath: &Keypath, items: Vec<Value>) -> Result<usize> {
        let len = self.len_of(keypath);
        let added = items.len();
        self.splice(keypath, len, 0, items)?;
        Ok(len + added)
    }

    /// Remove and return the last item.
    pub fn pop(&self, keypath: &Keypath) -> Result<Option<Value>> {
        let len = self.len_of(keypath);
        if len == 0 {
            return Ok(None);
        }
        Ok(self.splice(keypath, len - 1, 1, Vec::new())?.pop())
    }

    /// Remove and return the first item.
    pub fn shift(&self, keypath: &Keypath) -> Result<Option<Value>> {
        Ok(self.splice(keypath, 0, 1, Vec::new())?.into_iter().next())
    }

    /// Prepend items, returning the new length.
    pub fn unshift(&self, keypath: &Keypath, items: Vec<Value>) -> Result<usize> {
        self.splice(keypath, 0, 0, items)?;
        Ok(self.len_of(keypath))
    }

    /// The list keypath when `keypath` names an array's `length`.
    fn length_of_array(&self, keypath: &Keypath) -> Option<Keypath> {
        match keypath.last()? {
            Segment::Key(key) if key == "length" => {
                let list = keypath.parent()?;
                data::is_array(&self.data.borrow(), &list).then_some(list)
            }
            _ => None,
        }
    }

    /// Writing `length` truncates the list or pads it with nulls, as a
    /// splice so shifted dependants get the smart update.
    fn set_length(&self, list: &Keypath, keypath: &Keypath, value: Value) -> Result<()> {
        let len = value
            .as_u64()
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| Error::NotAnObject {
                keypath: keypath.clone(),
            })?;

        let current = self.len_of(list);
        if len < current {
            self.splice(list, len, current - len, Vec::new())?;
        } else if len > current {
            self.splice(list, current, 0, vec![Value::Null; len - current])?;
        }
        Ok(())
    }

    fn len_of(&self, keypath: &Keypath) -> usize {
        match self.get(keypath) {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register `dependant` at `keypath`. Static dependants are ignored;
    /// mapped keypaths are forwarded to the mapping.
    ///
    /// Returns `true` only if a new registration was recorded. A dependant
    /// already registered at `keypath` is left as is, and the caller owes
    /// exactly one `unregister` for it.
    pub fn register(&self, keypath: &Keypath, dependant: Rc<dyn Dependant>, group: Group) -> bool {
        if dependant.is_static() {
            return false;
        }

        if let Some(mapping) = self.mapping_for(keypath) {
            return mapping.register(keypath, dependant, group);
        }

        tracing::trace!(%keypath, ?group, id = ?dependant.id(), "register");
        self.registry.borrow_mut().register(keypath, dependant, group)
    }

    /// Remove `dependant` from `keypath`.
    ///
    /// Fails with [`Error::NotRegistered`] if it was never there. That is a
    /// bookkeeping bug and must be surfaced, not ignored.
    pub fn unregister(&self, keypath: &Keypath, dependant: &dyn Dependant, group: Group) -> Result<()> {
        if dependant.is_static() {
            return Ok(());
        }

        if let Some(mapping) = self.mapping_for(keypath) {
            return mapping.unregister(keypath, dependant, group);
        }

        tracing::trace!(%keypath, ?group, id = ?dependant.id(), "unregister");
        self.registry
            .borrow_mut()
            .unregister(keypath, dependant.id(), group)
            .inspect_err(|err| tracing::error!(%err, "dependency graph corrupted"))
    }

    /// Inspect the registry. Intended for diagnostics and tests.
    pub fn with_registry<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
        f(&self.registry.borrow())
    }

    // ------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------

    /// Invalidate everything affected by a write at `keypath`.
    pub fn mark(&self, keypath: &Keypath) {
        self.mark_with(keypath, &[], true);
    }

    fn mark_with(&self, keypath: &Keypath, skip: &[DependantId], descend: bool) {
        let mut queued = Vec::new();
        {
            let registry = self.registry.borrow();
            for group in Group::ALL {
                queued.extend(registry.dependants_at(group, keypath));
                for ancestor in keypath.ancestors() {
                    queued.extend(registry.dependants_at(group, &ancestor));
                }
                if descend {
                    collect_descendants(&registry, group, keypath, &mut queued);
                }
            }
        }

        tracing::trace!(%keypath, count = queued.len(), "mark");
        for dependant in queued {
            if !skip.contains(&dependant.id()) {
                runloop::add_dependant(dependant);
            }
        }
    }

    /// Notification after a splice: splice-aware dependants shift their
    /// children, then only the indices at or after the splice are touched.
    fn smart_update(&self, keypath: &Keypath, summary: &SpliceSummary) -> Result<()> {
        let listeners = self
            .registry
            .borrow()
            .dependants_at(Group::Default, keypath);

        let mut handled = Vec::new();
        for dependant in listeners {
            if dependant.splice(summary)? {
                handled.push(dependant.id());
            }
        }

        self.mark_with(keypath, &handled, false);
        self.mark_with(&keypath.join("length"), &handled, true);

        let end = summary.old_len.max(summary.new_len);
        for index in summary.start..end {
            self.mark_with(&keypath.join(Segment::Index(index)), &handled, true);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mappings
    // ------------------------------------------------------------------

    /// Alias the top-level `local_key` to `keypath` in `origin`.
    pub fn map(&self, local_key: &str, origin: Rc<Viewmodel>, keypath: Keypath) -> Result<Rc<Mapping>> {
        let existing = self.mappings.borrow_mut().shift_remove(local_key);
        if let Some(existing) = existing {
            tracing::warn!(local_key, "replacing existing mapping");
            existing.teardown()?;
        }

        tracing::debug!(local_key, %keypath, "mapping created");
        let mapping = Rc::new(Mapping::new(local_key, origin, keypath));
        self.mappings
            .borrow_mut()
            .insert(local_key.to_string(), mapping.clone());
        Ok(mapping)
    }

    /// The mapping responsible for `keypath`, if its top segment is mapped.
    pub fn mapping_for(&self, keypath: &Keypath) -> Option<Rc<Mapping>> {
        let top = keypath.top()?.as_key();
        self.mappings.borrow().get(&top).cloned()
    }

    pub fn is_mapped(&self, key: &str) -> bool {
        self.mappings.borrow().contains_key(key)
    }

    /// All mappings, in creation order.
    pub fn mappings(&self) -> Vec<Rc<Mapping>> {
        self.mappings.borrow().values().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Computed values and observers
    // ------------------------------------------------------------------

    /// Install a computed value at `key`, recomputed whenever one of
    /// `dependencies` changes.
    pub fn compute<F>(self: &Rc<Self>, key: Keypath, dependencies: Vec<Keypath>, compute: F) -> Result<Rc<Computation>>
    where
        F: Fn(&Viewmodel) -> Value + 'static,
    {
        let computation = Computation::new(self, key, dependencies, Box::new(compute));
        computation.init()?;
        self.computations.borrow_mut().push(computation.clone());
        Ok(computation)
    }

    /// Call `callback` whenever the value at `keypath` changes. With `init`
    /// the callback also fires once immediately.
    pub fn observe(self: &Rc<Self>, keypath: Keypath, callback: ObserverCallback, init: bool) -> Rc<Observer> {
        Observer::new(self, keypath, callback, init)
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Release computations and sever every mapping, unregistering whatever
    /// they still forward.
    ///
    /// Every computation and mapping is released even if one of them fails;
    /// the first error is returned.
    pub fn teardown(&self) -> Result<()> {
        let mut first_error = None;

        let computations = std::mem::take(&mut *self.computations.borrow_mut());
        for computation in computations {
            if let Err(err) = computation.unbind() {
                first_error.get_or_insert(err);
            }
        }

        let mappings: Vec<_> = self.mappings.borrow_mut().drain(..).map(|(_, m)| m).collect();
        for mapping in mappings {
            if let Err(err) = mapping.teardown() {
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

fn collect_descendants(registry: &Registry, group: Group, keypath: &Keypath, out: &mut Vec<Rc<dyn Dependant>>) {
    for child in registry.children_of(group, keypath) {
        out.extend(registry.dependants_at(group, &child));
        collect_descendants(registry, group, &child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use serde_json::json;

    use crate::graph::DependantKind;

    /// Records every update together with the value visible at that moment.
    struct Recorder {
        id: DependantId,
        keypath: Keypath,
        viewmodel: Rc<Viewmodel>,
        seen: RefCell<Vec<Option<Value>>>,
        is_static: bool,
        handles_splice: Cell<bool>,
        splices: Cell<usize>,
    }

    impl Recorder {
        fn new(viewmodel: &Rc<Viewmodel>, keypath: &str) -> Rc<Self> {
            Rc::new(Self {
                id: DependantId::new(),
                keypath: Keypath::from(keypath),
                viewmodel: viewmodel.clone(),
                seen: RefCell::new(Vec::new()),
                is_static: false,
                handles_splice: Cell::new(false),
                splices: Cell::new(0),
            })
        }

        fn registered(viewmodel: &Rc<Viewmodel>, keypath: &str) -> Rc<Self> {
            let recorder = Self::new(viewmodel, keypath);
            viewmodel.register(&recorder.keypath, recorder.clone(), Group::Default);
            recorder
        }

        fn updates(&self) -> usize {
            self.seen.borrow().len()
        }
    }

    impl Dependant for Recorder {
        fn id(&self) -> DependantId {
            self.id
        }

        fn kind(&self) -> DependantKind {
            DependantKind::Other
        }

        fn is_static(&self) -> bool {
            self.is_static
        }

        fn update(&self) -> Result<()> {
            let value = self.viewmodel.get(&self.keypath);
            self.seen.borrow_mut().push(value);
            Ok(())
        }

        fn splice(&self, _summary: &SpliceSummary) -> Result<bool> {
            self.splices.set(self.splices.get() + 1);
            Ok(self.handles_splice.get())
        }

        fn rebind(&self, _: Option<&str>, _: Option<usize>, _: &Keypath, _: &Keypath) -> Result<()> {
            Ok(())
        }

        fn unbind(&self) -> Result<()> {
            self.viewmodel.unregister(&self.keypath, self, Group::Default)
        }
    }

    fn kp(s: &str) -> Keypath {
        Keypath::from(s)
    }

    #[test]
    fn get_through_missing_intermediate_is_none() {
        let vm = Viewmodel::new(json!({ "foo": { "bar": 1 } }));
        assert_eq!(vm.get(&kp("foo.bar")), Some(json!(1)));
        assert_eq!(vm.get(&kp("foo.missing.deeper")), None);
        assert_eq!(vm.get(&kp("nothing")), None);
    }

    #[test]
    fn set_notifies_exact_and_ancestors_not_siblings() {
        let vm = Viewmodel::new(json!({ "foo": { "bar": 1, "baz": 2 } }));
        let exact = Recorder::registered(&vm, "foo.bar");
        let ancestor = Recorder::registered(&vm, "foo");
        let root = Recorder::registered(&vm, "");
        let sibling = Recorder::registered(&vm, "foo.baz");
        let unrelated = Recorder::registered(&vm, "other");

        vm.set(&kp("foo.bar"), json!(10)).unwrap();

        assert_eq!(exact.updates(), 1);
        assert_eq!(ancestor.updates(), 1);
        assert_eq!(root.updates(), 1);
        assert_eq!(sibling.updates(), 0);
        assert_eq!(unrelated.updates(), 0);
        assert_eq!(exact.seen.borrow()[0], Some(json!(10)));
    }

    #[test]
    fn set_reaches_live_descendants_only() {
        let vm = Viewmodel::new(json!({ "a": { "x": 1, "y": { "z": 2 } }, "b": { "x": 3 } }));
        let deep = Recorder::registered(&vm, "a.y.z");
        let other_tree = Recorder::registered(&vm, "b.x");

        vm.set(&kp("a"), json!({ "x": 5, "y": { "z": 6 } })).unwrap();

        assert_eq!(deep.updates(), 1);
        assert_eq!(deep.seen.borrow()[0], Some(json!(6)));
        assert_eq!(other_tree.updates(), 0);
    }

    #[test]
    fn unchanged_write_notifies_nobody() {
        let vm = Viewmodel::new(json!({ "a": 1 }));
        let recorder = Recorder::registered(&vm, "a");
        vm.set(&kp("a"), json!(1)).unwrap();
        assert_eq!(recorder.updates(), 0);
    }

    #[test]
    fn writes_in_one_batch_update_once_with_final_value() {
        let vm = Viewmodel::new(json!({ "count": 0 }));
        let recorder = Recorder::registered(&vm, "count");

        runloop::batch(|| {
            vm.set(&kp("count"), json!(1))?;
            vm.set(&kp("count"), json!(2))?;
            vm.set(&kp("count"), json!(3))
        })
        .unwrap();

        assert_eq!(*recorder.seen.borrow(), vec![Some(json!(3))]);
    }

    #[test]
    fn static_dependants_are_never_registered() {
        let vm = Viewmodel::new(json!({ "a": 1 }));
        let mut recorder = Recorder::new(&vm, "a");
        Rc::get_mut(&mut recorder).unwrap().is_static = true;

        vm.register(&kp("a"), recorder.clone(), Group::Default);
        assert!(vm.with_registry(Registry::is_empty));

        vm.set(&kp("a"), json!(2)).unwrap();
        assert_eq!(recorder.updates(), 0);
        vm.unregister(&kp("a"), &*recorder, Group::Default).unwrap();
    }

    #[test]
    fn paired_register_unregister_leaves_registry_empty() {
        let vm = Viewmodel::new(json!({}));
        let recorders: Vec<_> = ["a.b.c", "a.b", "a.d", "", "e"]
            .into_iter()
            .map(|k| Recorder::registered(&vm, k))
            .collect();

        for recorder in &recorders {
            recorder.unbind().unwrap();
        }

        assert!(vm.with_registry(Registry::is_empty));
    }

    #[test]
    fn unregister_without_registration_is_fatal() {
        let vm = Viewmodel::new(json!({}));
        let recorder = Recorder::new(&vm, "a");
        let err = vm.unregister(&kp("a"), &*recorder, Group::Default).unwrap_err();
        assert!(matches!(err, Error::NotRegistered { .. }));

        let registered = Recorder::registered(&vm, "a");
        registered.unbind().unwrap();
        assert!(registered.unbind().unwrap_err().is_fatal());
    }

    #[test]
    fn splice_touches_only_shifted_indices() {
        let vm = Viewmodel::new(json!({ "items": ["a", "b", "c", "d"] }));
        let first = Recorder::registered(&vm, "items.0");
        let third = Recorder::registered(&vm, "items.2");
        let length = Recorder::registered(&vm, "items.length");

        let removed = vm.splice(&kp("items"), 1, 1, Vec::new()).unwrap();

        assert_eq!(removed, vec![json!("b")]);
        assert_eq!(vm.get(&kp("items")), Some(json!(["a", "c", "d"])));
        assert_eq!(first.updates(), 0);
        assert_eq!(*third.seen.borrow(), vec![Some(json!("d"))]);
        assert_eq!(*length.seen.borrow(), vec![Some(json!(3))]);
    }

    #[test]
    fn splice_aware_dependants_are_not_marked_again() {
        let vm = Viewmodel::new(json!({ "items": [1, 2] }));
        let section = Recorder::registered(&vm, "items");
        section.handles_splice.set(true);
        let plain = Recorder::registered(&vm, "items");

        vm.push(&kp("items"), vec![json!(3)]).unwrap();

        assert_eq!(section.splices.get(), 1);
        assert_eq!(section.updates(), 0);
        assert_eq!(plain.splices.get(), 1);
        assert_eq!(plain.updates(), 1);
    }

    #[test]
    fn splice_on_scalar_fails() {
        let vm = Viewmodel::new(json!({ "n": 1 }));
        let err = vm.splice(&kp("n"), 0, 0, vec![json!(1)]).unwrap_err();
        assert!(matches!(err, Error::NotAnArray { .. }));
    }

    #[test]
    fn writing_length_truncates_as_a_splice() {
        let vm = Viewmodel::new(json!({ "items": ["a", "b", "c"] }));
        let length = Recorder::registered(&vm, "items.length");
        let last = Recorder::registered(&vm, "items.2");
        let first = Recorder::registered(&vm, "items.0");

        vm.set(&kp("items.length"), json!(1)).unwrap();
        assert_eq!(vm.get(&kp("items")), Some(json!(["a"])));
        assert_eq!(*length.seen.borrow(), vec![Some(json!(1))]);
        assert_eq!(*last.seen.borrow(), vec![None]);
        assert_eq!(first.updates(), 0);

        vm.set(&kp("items.length"), json!(2)).unwrap();
        assert_eq!(vm.get(&kp("items")), Some(json!(["a", null])));

        let err = vm.set(&kp("items.length"), json!("many")).unwrap_err();
        assert!(matches!(err, Error::NotAnObject { .. }));
    }

    #[test]
    fn named_key_on_a_list_keeps_the_list() {
        let vm = Viewmodel::new(json!({ "items": [1, 2] }));
        let err = vm.set(&kp("items.foo"), json!(1)).unwrap_err();
        assert!(matches!(err, Error::NotAnObject { .. }));
        assert_eq!(vm.get(&kp("items")), Some(json!([1, 2])));

        // no list here yet, so `length` is an ordinary key
        vm.set(&kp("box.length"), json!(3)).unwrap();
        assert_eq!(vm.get(&kp("box")), Some(json!({ "length": 3 })));
    }

    #[test]
    fn list_helpers() {
        let vm = Viewmodel::new(json!({}));
        assert_eq!(vm.push(&kp("list"), vec![json!(1), json!(2)]).unwrap(), 2);
        assert_eq!(vm.unshift(&kp("list"), vec![json!(0)]).unwrap(), 3);
        assert_eq!(vm.pop(&kp("list")).unwrap(), Some(json!(2)));
        assert_eq!(vm.shift(&kp("list")).unwrap(), Some(json!(0)));
        assert_eq!(vm.get(&kp("list")), Some(json!([1])));
        assert_eq!(vm.pop(&kp("empty")).unwrap(), None);
    }

    #[test]
    fn mapping_reads_and_writes_both_ways() {
        let parent = Viewmodel::new(json!({ "user": { "name": "ann" } }));
        let child = Viewmodel::new(json!({}));
        child.map("person", parent.clone(), kp("user")).unwrap();

        assert_eq!(child.get(&kp("person.name")), Some(json!("ann")));

        parent.set(&kp("user.x"), json!(1)).unwrap();
        assert_eq!(child.get(&kp("person.x")), Some(json!(1)));

        child.set(&kp("person.x"), json!(2)).unwrap();
        assert_eq!(parent.get(&kp("user.x")), Some(json!(2)));
        assert_eq!(child.with_registry(Registry::len), 0);
    }

    #[test]
    fn child_side_registration_sees_parent_writes() {
        let parent = Viewmodel::new(json!({ "user": { "name": "ann" } }));
        let child = Viewmodel::new(json!({}));
        child.map("person", parent.clone(), kp("user")).unwrap();

        let recorder = Recorder::registered(&child, "person.name");
        assert!(parent.with_registry(|r| r.contains(Group::Default, &kp("user.name"), recorder.id)));

        parent.set(&kp("user.name"), json!("bob")).unwrap();
        assert_eq!(*recorder.seen.borrow(), vec![Some(json!("bob"))]);
    }

    #[test]
    fn sibling_mappings_share_one_slot() {
        let parent = Viewmodel::new(json!({ "foo": {} }));
        let one = Viewmodel::new(json!({}));
        let two = Viewmodel::new(json!({}));
        one.map("foo", parent.clone(), kp("foo")).unwrap();
        two.map("foo", parent.clone(), kp("foo")).unwrap();

        let in_one = Recorder::registered(&one, "foo.bar");
        let in_two = Recorder::registered(&two, "foo.bar");

        one.set(&kp("foo.bar"), json!("baz")).unwrap();
        assert_eq!(two.get(&kp("foo.bar")), Some(json!("baz")));
        assert_eq!(in_two.updates(), 1);

        runloop::batch(|| {
            one.set(&kp("foo.bar"), json!("first"))?;
            two.set(&kp("foo.bar"), json!("last"))
        })
        .unwrap();
        assert_eq!(in_one.seen.borrow().last().cloned(), Some(Some(json!("last"))));
        assert_eq!(in_two.seen.borrow().last().cloned(), Some(Some(json!("last"))));
    }

    #[test]
    fn mapping_teardown_unregisters_forwarded() {
        let parent = Viewmodel::new(json!({ "items": [] }));
        let child = Viewmodel::new(json!({}));
        child.map("list", parent.clone(), kp("items")).unwrap();

        let recorder = Recorder::registered(&child, "list.length");
        let _other = Recorder::registered(&child, "list");
        assert_eq!(parent.with_registry(Registry::len), 2);

        recorder.unbind().unwrap();
        assert_eq!(child.mappings()[0].forwarded_count(), 1);

        child.teardown().unwrap();
        assert!(parent.with_registry(Registry::is_empty));
        assert!(!child.is_mapped("list"));
    }

    #[test]
    fn splice_through_mapping() {
        let parent = Viewmodel::new(json!({ "items": ["a"] }));
        let child = Viewmodel::new(json!({}));
        child.map("list", parent.clone(), kp("items")).unwrap();
        let recorder = Recorder::registered(&parent, "items.length");

        child.push(&kp("list"), vec![json!("b")]).unwrap();

        assert_eq!(parent.get(&kp("items")), Some(json!(["a", "b"])));
        assert_eq!(*recorder.seen.borrow(), vec![Some(json!(2))]);
    }

    #[test]
    fn mapping_rebind_moves_registrations() {
        let parent = Viewmodel::new(json!({ "items": ["a", "b", "c"] }));
        let child = Viewmodel::new(json!({}));
        let mapping = child.map("letter", parent.clone(), kp("items.2")).unwrap();
        let recorder = Recorder::registered(&child, "letter");

        runloop::batch(|| mapping.rebind(&kp("items.2"), &kp("items.1"))).unwrap();

        assert_eq!(mapping.keypath(), kp("items.1"));
        assert!(parent.with_registry(|r| r.contains(Group::Default, &kp("items.1"), recorder.id)));
        assert!(!parent.with_registry(|r| r.contains(Group::Default, &kp("items.2"), recorder.id)));
        assert_eq!(*recorder.seen.borrow(), vec![Some(json!("b"))]);
    }

    #[test]
    fn computation_settles_within_the_same_flush() {
        let vm = Viewmodel::new(json!({ "a": 1, "b": 2 }));
        let sum = vm
            .compute(kp("sum"), vec![kp("a"), kp("b")], |vm| {
                let a = vm.get(&"a".into()).and_then(|v| v.as_i64()).unwrap_or(0);
                let b = vm.get(&"b".into()).and_then(|v| v.as_i64()).unwrap_or(0);
                json!(a + b)
            })
            .unwrap();
        assert_eq!(vm.get(&kp("sum")), Some(json!(3)));

        let recorder = Recorder::registered(&vm, "sum");
        runloop::batch(|| {
            vm.set(&kp("a"), json!(10))?;
            vm.set(&kp("b"), json!(20))
        })
        .unwrap();

        assert_eq!(*recorder.seen.borrow(), vec![Some(json!(30))]);
        assert_eq!(sum.evaluations(), 2);

        vm.teardown().unwrap();
        assert_eq!(vm.with_registry(Registry::len), 1);
    }

    #[test]
    fn repeated_dependency_registers_and_releases_once() {
        let vm = Viewmodel::new(json!({ "a": 2 }));
        let double = vm
            .compute(kp("double"), vec![kp("a"), kp("a")], |vm| {
                json!(vm.get(&"a".into()).and_then(|v| v.as_i64()).unwrap_or(0) * 2)
            })
            .unwrap();
        assert_eq!(vm.with_registry(Registry::len), 1);

        vm.set(&kp("a"), json!(5)).unwrap();
        assert_eq!(vm.get(&kp("double")), Some(json!(10)));
        assert_eq!(double.evaluations(), 2);

        vm.teardown().unwrap();
        assert!(vm.with_registry(Registry::is_empty));
    }

    #[test]
    fn dependencies_aliasing_one_origin_keypath_release_once() {
        let parent = Viewmodel::new(json!({ "shared": 1 }));
        let child = Viewmodel::new(json!({}));
        child.map("x", parent.clone(), kp("shared")).unwrap();
        child.map("y", parent.clone(), kp("shared")).unwrap();

        child
            .compute(kp("total"), vec![kp("x"), kp("y")], |vm| {
                let x = vm.get(&"x".into()).and_then(|v| v.as_i64()).unwrap_or(0);
                let y = vm.get(&"y".into()).and_then(|v| v.as_i64()).unwrap_or(0);
                json!(x + y)
            })
            .unwrap();
        assert_eq!(parent.with_registry(Registry::len), 1);

        child.teardown().unwrap();
        assert!(parent.with_registry(Registry::is_empty));
    }

    #[test]
    fn duplicate_forwarded_registration_is_not_recorded() {
        let parent = Viewmodel::new(json!({ "user": {} }));
        let child = Viewmodel::new(json!({}));
        let mapping = child.map("person", parent.clone(), kp("user")).unwrap();

        let recorder = Recorder::new(&child, "person");
        assert!(child.register(&kp("person"), recorder.clone(), Group::Default));
        assert!(!child.register(&kp("person"), recorder.clone(), Group::Default));
        assert_eq!(mapping.forwarded_count(), 1);

        child.teardown().unwrap();
        assert!(parent.with_registry(Registry::is_empty));
    }

    #[test]
    fn observer_fires_on_change_only() {
        let vm = Viewmodel::new(json!({ "data": { "foo": 1, "bar": 2 } }));
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let observer = vm.observe(
            kp("data.bar"),
            Box::new(move |new, old, keypath| {
                sink.borrow_mut().push((new.cloned(), old.cloned(), keypath.to_string()));
            }),
            false,
        );

        vm.set(&kp("data.foo"), json!(5)).unwrap();
        assert!(calls.borrow().is_empty());

        vm.set(&kp("data"), json!({ "foo": 5, "bar": 3 })).unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![(Some(json!(3)), Some(json!(2)), "data.bar".to_string())]
        );

        observer.cancel().unwrap();
        vm.set(&kp("data.bar"), json!(4)).unwrap();
        assert_eq!(calls.borrow().len(), 1);
    }
}
