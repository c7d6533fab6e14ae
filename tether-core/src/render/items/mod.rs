//! Template items.
//!
//! The closed set of things a fragment can hold. Interpolators, sections
//! and partials are [`Dependant`](crate::graph::Dependant)s registered in
//! the viewmodel; text and elements are static; components host a child
//! instance.

mod component;
mod element;
mod interpolator;
mod partial;
mod section;

use std::rc::{Rc, Weak};

use serde_json::Value;

pub use component::Component;
pub use element::Element;
pub use interpolator::Interpolator;
pub use partial::{get_partial_template, Partial};
pub use section::Section;

use crate::error::Result;
use crate::graph::{Dependant, Group};
use crate::instance::Root;
use crate::keypath::Keypath;
use crate::render::dom::Node;
use crate::render::fragment::Fragment;
use crate::render::scope::{self, Reference, Scope};
use crate::render::template::TemplateItem;
use crate::viewmodel::Viewmodel;

/// Context handed to an item on creation.
pub struct ItemOptions<'a> {
    pub root: &'a Rc<Root>,
    pub parent: Weak<Fragment>,
    /// Position in the parent fragment.
    pub index: usize,
    pub scope: &'a Scope,
    pub depth: usize,
}

#[derive(Clone)]
pub enum Item {
    Text(Node),
    Interpolator(Rc<Interpolator>),
    Section(Rc<Section>),
    Partial(Rc<Partial>),
    Element(Rc<Element>),
    Component(Rc<Component>),
}

impl Item {
    pub fn create(options: ItemOptions<'_>, template: &TemplateItem) -> Result<Item> {
        Ok(match template {
            TemplateItem::Text { text } => Item::Text(Node::text(text)),
            TemplateItem::Interpolator { r } => Item::Interpolator(Interpolator::new(&options, r)),
            TemplateItem::Section {
                r,
                index_ref,
                inverted,
                f,
            } => Item::Section(Section::new(&options, r, index_ref.clone(), *inverted, f)?),
            TemplateItem::Partial { r } => Item::Partial(Partial::new(&options, r)?),
            TemplateItem::Element { tag, f } => Item::Element(Element::new(&options, tag, f)?),
            TemplateItem::Component { name, attributes } => {
                Item::Component(Component::new(&options, name, attributes)?)
            }
        })
    }

    /// Produce this item's nodes, ready to be appended.
    pub fn render(&self) -> Result<Node> {
        match self {
            Item::Text(node) => Ok(node.clone()),
            Item::Interpolator(item) => Ok(item.render()),
            Item::Section(item) => item.render(),
            Item::Partial(item) => item.render(),
            Item::Element(item) => item.render(),
            Item::Component(item) => item.render(),
        }
    }

    pub fn unrender(&self) {
        match self {
            Item::Text(node) => node.detach(),
            Item::Interpolator(item) => item.unrender(),
            Item::Section(item) => item.unrender(),
            Item::Partial(item) => item.unrender(),
            Item::Element(item) => item.unrender(),
            Item::Component(item) => item.unrender(),
        }
    }

    pub fn unbind(&self) -> Result<()> {
        match self {
            Item::Text(_) => Ok(()),
            Item::Interpolator(item) => item.unbind(),
            Item::Section(item) => item.unbind(),
            Item::Partial(item) => item.unbind(),
            Item::Element(item) => item.unbind(),
            Item::Component(item) => item.unbind(),
        }
    }

    pub fn rebind(&self, index_ref: Option<&str>, new_index: Option<usize>, old: &Keypath, new: &Keypath) -> Result<()> {
        match self {
            Item::Text(_) => Ok(()),
            Item::Interpolator(item) => item.rebind(index_ref, new_index, old, new),
            Item::Section(item) => item.rebind(index_ref, new_index, old, new),
            Item::Partial(item) => item.rebind(index_ref, new_index, old, new),
            Item::Element(item) => item.rebind(index_ref, new_index, old, new),
            Item::Component(item) => item.rebind(index_ref, new_index, old, new),
        }
    }

    pub fn first_node(&self) -> Option<Node> {
        match self {
            Item::Text(node) => Some(node.clone()),
            Item::Interpolator(item) => Some(item.node().clone()),
            Item::Section(item) => item.first_node(),
            Item::Partial(item) => item.first_node(),
            Item::Element(item) => Some(item.node().clone()),
            Item::Component(item) => item.first_node(),
        }
    }

    pub fn find_component(&self, name: &str) -> Option<Rc<Component>> {
        match self {
            Item::Text(_) | Item::Interpolator(_) => None,
            Item::Section(item) => item.find_component(name),
            Item::Partial(item) => item.fragment()?.find_component(name),
            Item::Element(item) => item.fragment().find_component(name),
            Item::Component(item) if item.name() == name => Some(item.clone()),
            Item::Component(item) => item.fragment()?.find_component(name),
        }
    }

    pub fn to_html(&self) -> String {
        match self {
            Item::Text(node) => node.to_html(),
            Item::Interpolator(item) => item.node().to_html(),
            Item::Section(item) => item.to_html(),
            Item::Partial(item) => item.fragment().map(|f| f.to_html()).unwrap_or_default(),
            Item::Element(item) => item.node().to_html(),
            Item::Component(item) => item.fragment().map(|f| f.to_html()).unwrap_or_default(),
        }
    }
}

/// What a mustache reads: a viewmodel keypath or an index reference.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Binding {
    Keypath(Keypath),
    Index { name: String, index: usize },
}

impl Binding {
    /// Resolve `reference`, falling back to a root-level keypath so a value
    /// set later is still picked up.
    pub(crate) fn resolve(root: &Root, scope: &Scope, reference: &str) -> Self {
        match scope::resolve(root, scope, reference) {
            Some(Reference::Keypath(keypath)) => Binding::Keypath(keypath),
            Some(Reference::IndexRef { name, index }) => Binding::Index { name, index },
            None => Binding::Keypath(Keypath::from(reference)),
        }
    }

    pub(crate) fn keypath(&self) -> Option<&Keypath> {
        match self {
            Binding::Keypath(keypath) => Some(keypath),
            Binding::Index { .. } => None,
        }
    }

    pub(crate) fn value(&self, viewmodel: &Viewmodel) -> Option<Value> {
        match self {
            Binding::Keypath(keypath) => viewmodel.get(keypath),
            Binding::Index { index, .. } => Some(Value::from(*index)),
        }
    }

    /// Apply a list shift. Returns the previous keypath if the binding
    /// moved to a new one.
    pub(crate) fn rebind(
        &mut self,
        index_ref: Option<&str>,
        new_index: Option<usize>,
        old: &Keypath,
        new: &Keypath,
    ) -> Option<Keypath> {
        match self {
            Binding::Keypath(keypath) => {
                let moved = keypath.replace_prefix(old, new)?;
                if moved == *keypath {
                    return None;
                }
                Some(std::mem::replace(keypath, moved))
            }
            Binding::Index { name, index } => {
                if let (Some(target), Some(new_index)) = (index_ref, new_index) {
                    if target == name {
                        *index = new_index;
                    }
                }
                None
            }
        }
    }
}

/// Move a dependant's registration from `old` to `new`.
pub(crate) fn move_registration(
    viewmodel: &Viewmodel,
    dependant: Rc<dyn Dependant>,
    old: &Keypath,
    new: &Keypath,
) -> Result<()> {
    viewmodel.unregister(old, &*dependant, Group::Default)?;
    viewmodel.register(new, dependant, Group::Default);
    Ok(())
}

/// Container node of the fragment an item sits in.
pub(crate) fn parent_node(parent: &Weak<Fragment>) -> Option<Node> {
    parent.upgrade()?.get_node()
}

/// Node following the item at `index` in its fragment.
pub(crate) fn next_node(parent: &Weak<Fragment>, index: usize) -> Option<Node> {
    parent.upgrade()?.find_next_node(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_rebind_moves_keypath() {
        let mut binding = Binding::Keypath(Keypath::from("items.2.name"));
        let previous = binding.rebind(Some("i"), Some(1), &Keypath::from("items.2"), &Keypath::from("items.1"));
        assert_eq!(previous, Some(Keypath::from("items.2.name")));
        assert_eq!(binding.keypath(), Some(&Keypath::from("items.1.name")));

        let untouched = binding.rebind(None, None, &Keypath::from("other"), &Keypath::from("else"));
        assert_eq!(untouched, None);
    }

    #[test]
    fn binding_rebind_updates_matching_index_ref() {
        let mut binding = Binding::Index {
            name: "i".into(),
            index: 3,
        };
        binding.rebind(Some("j"), Some(0), &Keypath::from("a.3"), &Keypath::from("a.0"));
        assert_eq!(binding, Binding::Index { name: "i".into(), index: 3 });

        binding.rebind(Some("i"), Some(2), &Keypath::from("a.3"), &Keypath::from("a.2"));
        assert_eq!(binding, Binding::Index { name: "i".into(), index: 2 });
    }
}
