use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::{move_registration, Binding, ItemOptions};
use crate::error::Result;
use crate::graph::{Dependant, DependantId, DependantKind, Group};
use crate::instance::Root;
use crate::keypath::Keypath;
use crate::render::dom::Node;
use crate::runloop::{self, View};
use crate::viewmodel::to_text;

/// `{{reference}}`: a text node mirroring one value.
pub struct Interpolator {
    id: DependantId,
    root: Rc<Root>,
    depth: usize,
    binding: RefCell<Binding>,
    value: RefCell<Option<Value>>,
    node: Node,
    rendered: Cell<bool>,
    bound: Cell<bool>,
    this: Weak<Interpolator>,
}

impl Interpolator {
    pub(super) fn new(options: &ItemOptions<'_>, reference: &str) -> Rc<Self> {
        let binding = Binding::resolve(options.root, options.scope, reference);
        let value = binding.value(options.root.viewmodel());
        let node = Node::text(&to_text(value.as_ref()));

        let interpolator = Rc::new_cyclic(|this| Self {
            id: DependantId::new(),
            root: options.root.clone(),
            depth: options.depth,
            binding: RefCell::new(binding),
            value: RefCell::new(value),
            node,
            rendered: Cell::new(false),
            bound: Cell::new(true),
            this: this.clone(),
        });

        if let Some(keypath) = interpolator.binding.borrow().keypath() {
            options
                .root
                .viewmodel()
                .register(keypath, interpolator.clone(), Group::Default);
        }
        interpolator
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn value(&self) -> Option<Value> {
        self.value.borrow().clone()
    }

    pub(super) fn render(&self) -> Node {
        self.node.set_text(&to_text(self.value.borrow().as_ref()));
        self.rendered.set(true);
        self.node.clone()
    }

    pub(super) fn unrender(&self) {
        self.node.detach();
        self.rendered.set(false);
    }
}

impl Dependant for Interpolator {
    fn id(&self) -> DependantId {
        self.id
    }

    fn kind(&self) -> DependantKind {
        DependantKind::Interpolator
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn is_bound(&self) -> bool {
        self.bound.get()
    }

    fn update(&self) -> Result<()> {
        let value = self.binding.borrow().value(self.root.viewmodel());
        if *self.value.borrow() == value {
            return Ok(());
        }
        *self.value.borrow_mut() = value;

        if self.rendered.get() {
            if let Some(this) = self.this.upgrade() {
                runloop::add_view(this);
            }
        }
        Ok(())
    }

    fn rebind(&self, index_ref: Option<&str>, new_index: Option<usize>, old: &Keypath, new: &Keypath) -> Result<()> {
        let previous = self
            .binding
            .borrow_mut()
            .rebind(index_ref, new_index, old, new);

        if let (Some(previous), Some(this)) = (previous, self.this.upgrade()) {
            let current = self.binding.borrow().keypath().cloned().unwrap_or_default();
            move_registration(self.root.viewmodel(), this, &previous, &current)?;
        }
        self.update()
    }

    fn unbind(&self) -> Result<()> {
        if !self.bound.replace(false) {
            return Ok(());
        }
        match self.binding.borrow().keypath() {
            Some(keypath) => self
                .root
                .viewmodel()
                .unregister(keypath, self, Group::Default),
            None => Ok(()),
        }
    }
}

impl View for Interpolator {
    fn apply(&self) -> Result<()> {
        self.node.set_text(&to_text(self.value.borrow().as_ref()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::instance::{Instance, InstanceOptions};
    use crate::render::dom::Node;
    use crate::render::template::{each, interpolator, text};

    #[test]
    fn text_follows_value_and_keeps_node() {
        let instance = Instance::new(
            InstanceOptions::default()
                .with_data(json!({ "count": 1 }))
                .with_template(vec![text("n="), interpolator("count")]),
        )
        .unwrap();
        let target = Node::element("p");
        instance.render(&target).unwrap();
        let node = target.children()[1].clone();

        instance.set("count", json!(2)).unwrap();
        assert_eq!(target.inner_html(), "n=2");
        assert!(target.children()[1].ptr_eq(&node));

        instance.set("count", json!(null)).unwrap();
        assert_eq!(target.inner_html(), "n=");
    }

    #[test]
    fn unresolved_reference_binds_at_root() {
        let instance = Instance::new(InstanceOptions::default().with_template(vec![interpolator("later")])).unwrap();
        let target = Node::element("p");
        instance.render(&target).unwrap();
        assert_eq!(target.inner_html(), "");

        instance.set("later", json!("here")).unwrap();
        assert_eq!(target.inner_html(), "here");
    }

    #[test]
    fn index_refs_follow_splices() {
        let instance = Instance::new(
            InstanceOptions::default()
                .with_data(json!({ "items": ["a", "b", "c"] }))
                .with_template(vec![each("items", "i", vec![interpolator("i"), interpolator(".")])]),
        )
        .unwrap();
        let target = Node::element("p");
        instance.render(&target).unwrap();
        assert_eq!(target.inner_html(), "0a1b2c");

        instance.splice("items", 0, 1, vec![]).unwrap();
        assert_eq!(target.inner_html(), "0b1c");
    }
}
