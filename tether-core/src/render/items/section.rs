//! Sections
//!
//! `{{#reference}}...{{/reference}}` renders its body zero or more times
//! depending on the value:
//!
//! | value           | renders                                        |
//! |-----------------|------------------------------------------------|
//! | array           | once per element, context `reference.i`        |
//! | object          | once, context `reference`                      |
//! | other truthy    | once, in the enclosing context                 |
//! | falsy / missing | nothing                                        |
//!
//! An inverted section (`{{^reference}}`) renders once when the value is
//! falsy or an empty array.
//!
//! List sections take part in smart updates. When the array they are bound
//! to is spliced they drop the removed fragments, rebind the shifted ones
//! to their new indices and create fragments only for inserted elements;
//! the surviving fragments keep their document nodes.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::{move_registration, parent_node, next_node, Binding, Component, ItemOptions};
use crate::error::Result;
use crate::graph::{Dependant, DependantId, DependantKind, Group, SpliceSummary};
use crate::instance::Root;
use crate::keypath::Keypath;
use crate::render::dom::Node;
use crate::render::fragment::{Fragment, FragmentOptions, Owner};
use crate::render::scope::Scope;
use crate::render::template::Template;
use crate::runloop::{self, View};
use crate::viewmodel::is_truthy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Empty,
    List,
    Context,
    Conditional,
}

pub struct Section {
    id: DependantId,
    root: Rc<Root>,
    parent: Weak<Fragment>,
    index: usize,
    depth: usize,
    index_ref: Option<String>,
    inverted: bool,
    template: Template,
    binding: RefCell<Binding>,
    scope: RefCell<Scope>,
    mode: Cell<Mode>,
    fragments: RefCell<Vec<Rc<Fragment>>>,
    to_unrender: RefCell<Vec<Rc<Fragment>>>,
    rendered: Cell<bool>,
    bound: Cell<bool>,
    this: Weak<Section>,
}

impl Section {
    pub(super) fn new(
        options: &ItemOptions<'_>,
        reference: &str,
        index_ref: Option<String>,
        inverted: bool,
        template: &Template,
    ) -> Result<Rc<Self>> {
        let binding = Binding::resolve(options.root, options.scope, reference);

        let section = Rc::new_cyclic(|this| Self {
            id: DependantId::new(),
            root: options.root.clone(),
            parent: options.parent.clone(),
            index: options.index,
            depth: options.depth,
            index_ref,
            inverted,
            template: template.clone(),
            binding: RefCell::new(binding),
            scope: RefCell::new(options.scope.clone()),
            mode: Cell::new(Mode::Empty),
            fragments: RefCell::new(Vec::new()),
            to_unrender: RefCell::new(Vec::new()),
            rendered: Cell::new(false),
            bound: Cell::new(true),
            this: this.clone(),
        });

        if let Some(keypath) = section.binding.borrow().keypath() {
            options
                .root
                .viewmodel()
                .register(keypath, section.clone(), Group::Default);
        }

        if let Err(err) = section.reconcile() {
            if let Err(unbind_err) = section.unbind() {
                tracing::warn!(%unbind_err, "failed to release section after bind error");
            }
            return Err(err);
        }
        Ok(section)
    }

    pub fn keypath(&self) -> Option<Keypath> {
        self.binding.borrow().keypath().cloned()
    }

    /// Child fragments, in order.
    pub fn fragments(&self) -> Vec<Rc<Fragment>> {
        self.fragments.borrow().clone()
    }

    fn desired(&self, value: Option<&Value>) -> (Mode, usize) {
        if self.inverted {
            let empty = matches!(value, Some(Value::Array(items)) if items.is_empty());
            return if empty || !is_truthy(value) {
                (Mode::Conditional, 1)
            } else {
                (Mode::Empty, 0)
            };
        }

        match value {
            Some(Value::Array(items)) => (Mode::List, items.len()),
            Some(Value::Object(_)) => (Mode::Context, 1),
            value if is_truthy(value) => (Mode::Conditional, 1),
            _ => (Mode::Empty, 0),
        }
    }

    /// Bring the fragment list in line with the current value.
    fn reconcile(&self) -> Result<()> {
        let value = self.binding.borrow().value(self.root.viewmodel());
        let (mode, count) = self.desired(value.as_ref());
        let current = self.mode.get();

        if mode == current {
            if mode != Mode::List {
                return Ok(());
            }
            let len = self.fragments.borrow().len();
            if count < len {
                let removed: Vec<_> = self.fragments.borrow_mut().drain(count..).collect();
                self.retire(removed)?;
            }
            for index in len..count {
                let fragment = self.create_fragment(index)?;
                self.fragments.borrow_mut().push(fragment);
            }
            return Ok(());
        }

        tracing::trace!(id = ?self.id, ?current, ?mode, "section mode change");
        let removed = std::mem::take(&mut *self.fragments.borrow_mut());
        self.retire(removed)?;
        self.mode.set(mode);
        for index in 0..count {
            let fragment = self.create_fragment(index)?;
            self.fragments.borrow_mut().push(fragment);
        }
        Ok(())
    }

    fn create_fragment(&self, index: usize) -> Result<Rc<Fragment>> {
        let keypath = self.keypath().unwrap_or_default();
        let scope = self.scope.borrow().clone();
        let scope = match self.mode.get() {
            Mode::List => {
                let scope = scope.push_context(keypath.join(index));
                match &self.index_ref {
                    Some(name) => scope.with_index_ref(name, index),
                    None => scope,
                }
            }
            Mode::Context => scope.push_context(keypath),
            Mode::Conditional | Mode::Empty => scope,
        };

        Fragment::new(FragmentOptions {
            root: self.root.clone(),
            owner: Owner::Section(self.this.clone()),
            scope,
            depth: self.depth + 1,
            template: &self.template,
        })
    }

    /// Unbind fragments leaving the section; rendered ones are detached in
    /// the view phase.
    fn retire(&self, fragments: Vec<Rc<Fragment>>) -> Result<()> {
        for fragment in fragments {
            fragment.unbind()?;
            if fragment.is_rendered() {
                self.to_unrender.borrow_mut().push(fragment);
            }
        }
        Ok(())
    }

    fn queue_view(&self) {
        if !self.rendered.get() {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            runloop::add_view(this);
        }
    }

    pub(super) fn render(&self) -> Result<Node> {
        let nodes = Node::fragment();
        for fragment in self.fragments() {
            nodes.append_child(&fragment.render()?);
        }
        self.to_unrender.borrow_mut().clear();
        self.rendered.set(true);
        Ok(nodes)
    }

    pub(super) fn unrender(&self) {
        if !self.rendered.replace(false) {
            return;
        }
        for fragment in self.fragments() {
            fragment.unrender();
        }
        for fragment in self.to_unrender.borrow_mut().drain(..) {
            fragment.unrender();
        }
    }

    pub(super) fn first_node(&self) -> Option<Node> {
        self.fragments().iter().find_map(|f| f.first_node())
    }

    pub(crate) fn parent_node(&self) -> Option<Node> {
        parent_node(&self.parent)
    }

    pub(crate) fn find_next_node(&self) -> Option<Node> {
        next_node(&self.parent, self.index)
    }

    /// Node following `fragment`, which must be one of ours.
    pub(crate) fn find_next_node_after(&self, fragment: &Fragment) -> Option<Node> {
        let fragments = self.fragments();
        let position = fragments
            .iter()
            .position(|f| std::ptr::eq(Rc::as_ptr(f), fragment));

        if let Some(position) = position {
            if let Some(node) = fragments[position + 1..].iter().find_map(|f| f.first_node()) {
                return Some(node);
            }
        }
        self.find_next_node()
    }

    pub(super) fn find_component(&self, name: &str) -> Option<Rc<Component>> {
        self.fragments()
            .iter()
            .find_map(|fragment| fragment.find_component(name))
    }

    pub(super) fn to_html(&self) -> String {
        self.fragments().iter().map(|f| f.to_html()).collect()
    }
}

impl Dependant for Section {
    fn id(&self) -> DependantId {
        self.id
    }

    fn kind(&self) -> DependantKind {
        DependantKind::Section
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn is_bound(&self) -> bool {
        self.bound.get()
    }

    fn update(&self) -> Result<()> {
        self.reconcile()?;
        self.queue_view();
        Ok(())
    }

    fn splice(&self, summary: &SpliceSummary) -> Result<bool> {
        if !self.bound.get()
            || self.inverted
            || self.mode.get() != Mode::List
            || self.fragments.borrow().len() != summary.old_len
        {
            return Ok(false);
        }
        let Some(keypath) = self.keypath() else {
            return Ok(false);
        };

        let end = summary.start + summary.removed;
        let removed: Vec<_> = self
            .fragments
            .borrow_mut()
            .drain(summary.start..end)
            .collect();
        self.retire(removed)?;

        if summary.shifts() {
            let shifted = self.fragments.borrow()[summary.start..].to_vec();
            for (old_index, fragment) in (end..).zip(&shifted) {
                let Some(new_index) = summary.new_index(old_index) else {
                    continue;
                };
                fragment.rebind(
                    self.index_ref.as_deref(),
                    Some(new_index),
                    &keypath.join(old_index),
                    &keypath.join(new_index),
                )?;
            }
        }

        for index in summary.start..summary.start + summary.added {
            let fragment = self.create_fragment(index)?;
            self.fragments.borrow_mut().insert(index, fragment);
        }

        tracing::trace!(id = ?self.id, ?summary, "section spliced");
        self.queue_view();
        Ok(true)
    }

    fn rebind(&self, index_ref: Option<&str>, new_index: Option<usize>, old: &Keypath, new: &Keypath) -> Result<()> {
        let previous = self
            .binding
            .borrow_mut()
            .rebind(index_ref, new_index, old, new);
        self.scope
            .borrow_mut()
            .rebind(index_ref, new_index, old, new);

        if let (Some(previous), Some(this)) = (previous, self.this.upgrade()) {
            let current = self.keypath().unwrap_or_default();
            move_registration(self.root.viewmodel(), this.clone(), &previous, &current)?;
            runloop::add_dependant(this);
        }

        for fragment in self.fragments() {
            fragment.rebind(index_ref, new_index, old, new)?;
        }
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        if !self.bound.replace(false) {
            return Ok(());
        }
        if let Some(keypath) = self.keypath() {
            self.root
                .viewmodel()
                .unregister(&keypath, self, Group::Default)?;
        }
        for fragment in self.fragments() {
            fragment.unbind()?;
        }
        Ok(())
    }
}

impl View for Section {
    fn apply(&self) -> Result<()> {
        let retired = std::mem::take(&mut *self.to_unrender.borrow_mut());
        for fragment in retired {
            fragment.unrender();
        }

        if !self.rendered.get() {
            return Ok(());
        }
        let Some(container) = self.parent_node() else {
            return Ok(());
        };

        let mut anchor = self.find_next_node();
        for fragment in self.fragments().iter().rev() {
            if !fragment.is_rendered() {
                let nodes = fragment.render()?;
                container.insert_before(&nodes, anchor.as_ref());
            }
            if let Some(first) = fragment.first_node() {
                anchor = Some(first);
            }
        }
        Ok(())
    }
}
