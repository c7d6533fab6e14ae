//! Partials
//!
//! `{{>name}}` inserts another template. Two flavours exist and a partial
//! settles on one of them:
//!
//! - **named**: `name` is the template's own name. Fixed for the lifetime
//!   of the node; it never registers a dependency.
//! - **dynamic**: `name` is a reference whose current value names the
//!   template. The partial registers at that keypath and swaps its content
//!   whenever the value changes.
//!
//! A reference that resolves in the data makes the partial dynamic. One
//! that does not, while a template by that literal name exists, makes it
//! named. A dynamic partial whose value names no template but whose
//! literal name does falls back to named as well.
//!
//! # Swapping Content
//!
//! [`Partial::set_value`] builds the new fragment immediately but touches
//! the document only in the view phase: the old fragment is unrendered and
//! the new one rendered and inserted in the same [`View::apply`] call, so
//! the document never shows both or neither.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::{next_node, parent_node, ItemOptions};
use crate::error::{Error, Result};
use crate::graph::{Dependant, DependantId, DependantKind, Group};
use crate::instance::Root;
use crate::keypath::Keypath;
use crate::render::dom::Node;
use crate::render::fragment::{Fragment, FragmentOptions, Owner};
use crate::render::scope::{self, Reference, Scope};
use crate::render::template::Template;
use crate::runloop::{self, View};
use crate::viewmodel::to_text;

/// Look up a partial template by name on `root` and then its ancestors.
pub fn get_partial_template(root: &Root, name: &str) -> Option<Template> {
    if let Some(template) = root.partial(name) {
        return Some(template);
    }
    get_partial_template(root.parent()?.root(), name)
}

pub struct Partial {
    id: DependantId,
    root: Rc<Root>,
    parent: Weak<Fragment>,
    index: usize,
    depth: usize,
    name: String,
    scope: RefCell<Scope>,
    keypath: RefCell<Option<Keypath>>,
    is_named: Cell<bool>,
    bound: Cell<bool>,
    value: RefCell<Option<Value>>,
    fragment: RefCell<Option<Rc<Fragment>>>,
    fragment_to_render: RefCell<Option<Rc<Fragment>>>,
    fragment_to_unrender: RefCell<Option<Rc<Fragment>>>,
    doc_frag: RefCell<Option<Node>>,
    rendered: Cell<bool>,
    this: Weak<Partial>,
}

impl Partial {
    pub(super) fn new(options: &ItemOptions<'_>, name: &str) -> Result<Rc<Self>> {
        let partial = Rc::new_cyclic(|this| Self {
            id: DependantId::new(),
            root: options.root.clone(),
            parent: options.parent.clone(),
            index: options.index,
            depth: options.depth,
            name: name.to_string(),
            scope: RefCell::new(options.scope.clone()),
            keypath: RefCell::new(None),
            is_named: Cell::new(false),
            bound: Cell::new(true),
            value: RefCell::new(None),
            fragment: RefCell::new(None),
            fragment_to_render: RefCell::new(None),
            fragment_to_unrender: RefCell::new(None),
            doc_frag: RefCell::new(None),
            rendered: Cell::new(false),
            this: this.clone(),
        });

        let resolved = match scope::resolve(options.root, options.scope, name) {
            Some(Reference::Keypath(keypath)) => Some(keypath),
            _ => None,
        };

        match resolved {
            Some(keypath) => partial.bind_to(keypath)?,
            None => match get_partial_template(options.root, name) {
                Some(template) => {
                    partial.bound.set(false);
                    partial.is_named.set(true);
                    partial.set_template(&template)?;
                }
                // nothing yet; a value may show up at the root later
                None => partial.bind_to(Keypath::from(name))?,
            },
        }

        Ok(partial)
    }

    fn bind_to(self: &Rc<Self>, keypath: Keypath) -> Result<()> {
        self.root
            .viewmodel()
            .register(&keypath, self.clone(), Group::Default);
        let value = self.root.viewmodel().get(&keypath);
        *self.keypath.borrow_mut() = Some(keypath);
        self.set_value(value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_named(&self) -> bool {
        self.is_named.get()
    }

    /// The selector value the current content was chosen by.
    pub fn value(&self) -> Option<Value> {
        self.value.borrow().clone()
    }

    /// The current content.
    pub fn fragment(&self) -> Option<Rc<Fragment>> {
        self.fragment.borrow().clone()
    }

    /// Select content by `value`. A value equal to the current one does
    /// nothing.
    pub fn set_value(&self, value: Option<Value>) -> Result<()> {
        if value.is_some() && *self.value.borrow() == value {
            return Ok(());
        }

        let mut template = value
            .as_ref()
            .and_then(|v| get_partial_template(&self.root, &to_text(Some(v))));

        if template.is_none() {
            if let Some(named) = get_partial_template(&self.root, &self.name) {
                self.release_binding()?;
                self.is_named.set(true);
                template = Some(named);
            }
        }

        let template = match template {
            Some(template) => template,
            None => {
                let err = Error::MissingTemplate {
                    name: self.name.clone(),
                };
                if self.root.debug() {
                    tracing::error!(%err, ?value, "partial renders nothing");
                } else {
                    tracing::warn!(%err, ?value, "partial renders nothing");
                }
                Template::new()
            }
        };

        self.set_template(&template)?;
        *self.value.borrow_mut() = value;

        if self.rendered.get() {
            if let Some(this) = self.this.upgrade() {
                runloop::add_view(this);
            }
        }
        Ok(())
    }

    fn set_template(&self, template: &Template) -> Result<()> {
        let old = self.fragment.borrow_mut().take();
        if let Some(old) = old {
            old.unbind()?;
            // an old fragment that never reached the document is simply dropped
            if old.is_rendered() {
                *self.fragment_to_unrender.borrow_mut() = Some(old);
            }
        }

        let fragment = Fragment::new(FragmentOptions {
            root: self.root.clone(),
            owner: Owner::Partial(self.this.clone()),
            scope: self.scope.borrow().clone(),
            depth: self.depth + 1,
            template,
        })?;

        *self.fragment.borrow_mut() = Some(fragment.clone());
        *self.fragment_to_render.borrow_mut() = Some(fragment);
        Ok(())
    }

    /// Drop the keypath registration of a dynamic partial.
    fn release_binding(&self) -> Result<()> {
        if !self.bound.replace(false) {
            return Ok(());
        }
        match self.keypath.borrow().as_ref() {
            Some(keypath) => self
                .root
                .viewmodel()
                .unregister(keypath, self, Group::Default),
            None => Ok(()),
        }
    }

    pub(super) fn render(&self) -> Result<Node> {
        let doc_frag = Node::fragment();
        *self.doc_frag.borrow_mut() = Some(doc_frag.clone());
        if self.fragment_to_render.borrow().is_none() {
            *self.fragment_to_render.borrow_mut() = self.fragment();
        }
        self.apply()?;
        self.rendered.set(true);
        Ok(doc_frag)
    }

    pub(super) fn unrender(&self) {
        if !self.rendered.replace(false) {
            return;
        }
        if let Some(fragment) = self.fragment.borrow().as_ref() {
            fragment.unrender();
        }
        if let Some(old) = self.fragment_to_unrender.borrow_mut().take() {
            old.unrender();
        }
    }

    pub(super) fn first_node(&self) -> Option<Node> {
        self.fragment.borrow().as_ref()?.first_node()
    }

    pub(crate) fn parent_node(&self) -> Option<Node> {
        parent_node(&self.parent)
    }

    pub(crate) fn find_next_node(&self) -> Option<Node> {
        next_node(&self.parent, self.index)
    }
}

impl Dependant for Partial {
    fn id(&self) -> DependantId {
        self.id
    }

    fn kind(&self) -> DependantKind {
        DependantKind::Partial
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn is_bound(&self) -> bool {
        self.bound.get()
    }

    fn update(&self) -> Result<()> {
        if self.is_named.get() {
            return Ok(());
        }
        let value = match self.keypath.borrow().as_ref() {
            Some(keypath) => self.root.viewmodel().get(keypath),
            None => None,
        };
        self.set_value(value)
    }

    fn rebind(&self, index_ref: Option<&str>, new_index: Option<usize>, old: &Keypath, new: &Keypath) -> Result<()> {
        self.scope
            .borrow_mut()
            .rebind(index_ref, new_index, old, new);

        if !self.is_named.get() {
            let current = self.keypath.borrow().clone();
            let moved = current
                .as_ref()
                .and_then(|keypath| keypath.replace_prefix(old, new))
                .filter(|moved| Some(moved) != current.as_ref());

            if let (Some(previous), Some(moved), Some(this)) = (current, moved, self.this.upgrade()) {
                super::move_registration(self.root.viewmodel(), this, &previous, &moved)?;
                let value = self.root.viewmodel().get(&moved);
                *self.keypath.borrow_mut() = Some(moved);
                self.set_value(value)?;
            }
        }

        if let Some(fragment) = self.fragment() {
            fragment.rebind(index_ref, new_index, old, new)?;
        }
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        if !self.is_named.get() {
            self.release_binding()?;
        }
        if let Some(fragment) = self.fragment() {
            fragment.unbind()?;
        }
        Ok(())
    }
}

impl View for Partial {
    fn apply(&self) -> Result<()> {
        if let Some(old) = self.fragment_to_unrender.borrow_mut().take() {
            old.unrender();
        }

        let doc_frag = self.doc_frag.borrow().clone();
        let Some(doc_frag) = doc_frag else {
            return Ok(());
        };

        if let Some(fragment) = self.fragment_to_render.borrow_mut().take() {
            doc_frag.append_child(&fragment.render()?);
        }

        if self.rendered.get() {
            if let Some(container) = self.parent_node() {
                container.insert_before(&doc_frag, self.find_next_node().as_ref());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::instance::{Instance, InstanceOptions};
    use crate::render::items::Item;
    use crate::render::template::{interpolator, partial, text};

    fn partial_of(instance: &Instance) -> Rc<Partial> {
        instance
            .fragment()
            .items()
            .into_iter()
            .find_map(|item| match item {
                Item::Partial(partial) => Some(partial),
                _ => None,
            })
            .unwrap()
    }

    fn options() -> InstanceOptions {
        InstanceOptions::default()
            .with_partial("A", vec![text("a-tpl")])
            .with_partial("B", vec![text("b-tpl")])
    }

    #[test]
    fn named_partial_never_registers() {
        let instance = Instance::new(options().with_template(vec![partial("A")])).unwrap();
        let target = Node::element("div");
        instance.render(&target).unwrap();

        assert_eq!(target.inner_html(), "a-tpl");
        let p = partial_of(&instance);
        assert!(p.is_named());
        assert!(instance.viewmodel().with_registry(|r| r.is_empty()));
    }

    #[test]
    fn dynamic_partial_swaps_on_value() {
        let instance = Instance::new(
            options()
                .with_data(json!({ "sel": "A" }))
                .with_template(vec![text("<"), partial("sel"), text(">")]),
        )
        .unwrap();
        let target = Node::element("div");
        instance.render(&target).unwrap();
        assert_eq!(target.inner_html(), "<a-tpl>");

        instance.set("sel", json!("B")).unwrap();
        assert_eq!(target.inner_html(), "<b-tpl>");

        instance.set("sel", json!("A")).unwrap();
        assert_eq!(target.inner_html(), "<a-tpl>");
    }

    #[test]
    fn same_value_does_no_work() {
        let instance = Instance::new(
            options()
                .with_data(json!({ "sel": "A" }))
                .with_template(vec![partial("sel")]),
        )
        .unwrap();
        let target = Node::element("div");
        instance.render(&target).unwrap();

        let p = partial_of(&instance);
        let fragment = p.fragment().unwrap();
        let node = target.first_child().unwrap();

        runloop::batch(|| p.set_value(Some(json!("A")))).unwrap();

        assert!(Rc::ptr_eq(&fragment, &p.fragment().unwrap()));
        assert!(target.first_child().unwrap().ptr_eq(&node));
    }

    #[test]
    fn old_and_new_content_swap_in_one_view_pass() {
        let instance = Instance::new(
            options()
                .with_data(json!({ "sel": "A" }))
                .with_template(vec![partial("sel")]),
        )
        .unwrap();
        let target = Node::element("div");
        instance.render(&target).unwrap();
        let p = partial_of(&instance);

        runloop::begin();
        p.set_value(Some(json!("B"))).unwrap();
        // nothing touches the document before the flush
        assert_eq!(target.inner_html(), "a-tpl");
        runloop::end().unwrap();

        assert_eq!(target.inner_html(), "b-tpl");
    }

    #[test]
    fn missing_template_renders_nothing() {
        let instance = Instance::new(
            options()
                .with_data(json!({ "sel": "nope" }))
                .with_template(vec![text("["), partial("sel"), text("]")]),
        )
        .unwrap();
        let target = Node::element("div");
        instance.render(&target).unwrap();
        assert_eq!(target.inner_html(), "[]");

        instance.set("sel", json!("B")).unwrap();
        assert_eq!(target.inner_html(), "[b-tpl]");
    }

    #[test]
    fn value_naming_no_template_falls_back_to_named() {
        let instance = Instance::new(
            options()
                .with_partial("sel", vec![text("by-name")])
                .with_data(json!({ "sel": "nothing" }))
                .with_template(vec![partial("sel")]),
        )
        .unwrap();
        let target = Node::element("div");
        instance.render(&target).unwrap();

        let p = partial_of(&instance);
        assert!(p.is_named());
        assert_eq!(target.inner_html(), "by-name");
        assert!(instance.viewmodel().with_registry(|r| r.is_empty()));

        instance.set("sel", json!("A")).unwrap();
        assert_eq!(target.inner_html(), "by-name");
    }

    #[test]
    fn partial_content_binds_in_scope() {
        let instance = Instance::new(
            InstanceOptions::default()
                .with_partial("greeting", vec![text("hi "), interpolator("name")])
                .with_data(json!({ "name": "ada" }))
                .with_template(vec![partial("greeting")]),
        )
        .unwrap();
        let target = Node::element("div");
        instance.render(&target).unwrap();
        assert_eq!(target.inner_html(), "hi ada");

        instance.set("name", json!("bob")).unwrap();
        assert_eq!(target.inner_html(), "hi bob");

        instance.teardown().unwrap();
        assert!(instance.viewmodel().with_registry(|r| r.is_empty()));
    }
}
