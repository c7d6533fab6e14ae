//! Fragments
//!
//! A fragment is the bound form of a template: an ordered list of items
//! sharing one scope. Sections own one fragment per list element, partials
//! and components own one each, and an instance owns the top-level one.
//!
//! Fragments answer the two positional questions items ask when they need
//! to put nodes into a live document: which node to insert into
//! ([`Fragment::get_node`]) and which node to insert before
//! ([`Fragment::find_next_node`]). Both walk outward through owners until
//! something rendered answers.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::instance::Root;
use crate::keypath::Keypath;
use crate::render::dom::Node;
use crate::render::items::{Component, Item, ItemOptions, Partial, Section};
use crate::render::scope::Scope;
use crate::render::template::TemplateItem;

/// What a fragment belongs to.
pub enum Owner {
    Instance,
    Section(Weak<Section>),
    Partial(Weak<Partial>),
    /// Element children render straight into the element node.
    Element(Node),
    Component(Weak<Component>),
}

pub struct FragmentOptions<'a> {
    pub root: Rc<Root>,
    pub owner: Owner,
    pub scope: Scope,
    pub depth: usize,
    pub template: &'a [TemplateItem],
}

pub struct Fragment {
    root: Rc<Root>,
    owner: Owner,
    scope: RefCell<Scope>,
    depth: usize,
    items: RefCell<Vec<Item>>,
    rendered: Cell<bool>,
}

impl Fragment {
    /// Bind `template`. If any item fails to bind, the items already bound
    /// are released again and the error is returned.
    pub fn new(options: FragmentOptions<'_>) -> Result<Rc<Self>> {
        let fragment = Rc::new(Self {
            root: options.root,
            owner: options.owner,
            scope: RefCell::new(options.scope),
            depth: options.depth,
            items: RefCell::new(Vec::with_capacity(options.template.len())),
            rendered: Cell::new(false),
        });

        let scope = fragment.scope();
        let mut items = Vec::with_capacity(options.template.len());
        for (index, template) in options.template.iter().enumerate() {
            let created = Item::create(
                ItemOptions {
                    root: &fragment.root,
                    parent: Rc::downgrade(&fragment),
                    index,
                    scope: &scope,
                    depth: fragment.depth,
                },
                template,
            );

            match created {
                Ok(item) => items.push(item),
                Err(err) => {
                    for item in &items {
                        if let Err(unbind_err) = item.unbind() {
                            tracing::warn!(%unbind_err, "failed to release partially built fragment");
                        }
                    }
                    return Err(err);
                }
            }
        }

        *fragment.items.borrow_mut() = items;
        Ok(fragment)
    }

    pub fn root(&self) -> &Rc<Root> {
        &self.root
    }

    pub fn scope(&self) -> Scope {
        self.scope.borrow().clone()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Handles to the items, in template order.
    pub fn items(&self) -> Vec<Item> {
        self.items.borrow().clone()
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered.get()
    }

    /// Render every item into a detached document fragment.
    pub fn render(&self) -> Result<Node> {
        let nodes = Node::fragment();
        for item in self.items() {
            nodes.append_child(&item.render()?);
        }
        self.rendered.set(true);
        Ok(nodes)
    }

    pub fn unrender(&self) {
        if !self.rendered.replace(false) {
            return;
        }
        for item in self.items() {
            item.unrender();
        }
    }

    pub fn unbind(&self) -> Result<()> {
        for item in self.items() {
            item.unbind()?;
        }
        Ok(())
    }

    /// Re-point the scope and every item after a list shift.
    pub fn rebind(&self, index_ref: Option<&str>, new_index: Option<usize>, old: &Keypath, new: &Keypath) -> Result<()> {
        self.scope
            .borrow_mut()
            .rebind(index_ref, new_index, old, new);
        for item in self.items() {
            item.rebind(index_ref, new_index, old, new)?;
        }
        Ok(())
    }

    /// First document node this fragment has in the live tree.
    pub fn first_node(&self) -> Option<Node> {
        if !self.rendered.get() {
            return None;
        }
        self.items().iter().find_map(Item::first_node)
    }

    /// Node to insert before when (re)rendering the item at `after`.
    pub fn find_next_node(&self, after: usize) -> Option<Node> {
        let following = self.items().into_iter().skip(after + 1);
        for item in following {
            if let Some(node) = item.first_node() {
                return Some(node);
            }
        }

        match &self.owner {
            Owner::Instance | Owner::Element(_) => None,
            Owner::Section(section) => section.upgrade()?.find_next_node_after(self),
            Owner::Partial(partial) => partial.upgrade()?.find_next_node(),
            Owner::Component(component) => component.upgrade()?.find_next_node(),
        }
    }

    /// Node this fragment's content lives in.
    pub fn get_node(&self) -> Option<Node> {
        match &self.owner {
            Owner::Instance => self.root.target(),
            Owner::Element(node) => Some(node.clone()),
            Owner::Section(section) => section.upgrade()?.parent_node(),
            Owner::Partial(partial) => partial.upgrade()?.parent_node(),
            Owner::Component(component) => component.upgrade()?.parent_node(),
        }
    }

    pub fn find_component(&self, name: &str) -> Option<Rc<Component>> {
        self.items()
            .iter()
            .find_map(|item| item.find_component(name))
    }

    /// Serialized content, whether or not it is attached.
    pub fn to_html(&self) -> String {
        self.items().iter().map(Item::to_html).collect()
    }
}
