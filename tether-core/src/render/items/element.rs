use std::rc::Rc;

use super::ItemOptions;
use crate::error::Result;
use crate::keypath::Keypath;
use crate::render::dom::Node;
use crate::render::fragment::{Fragment, FragmentOptions, Owner};
use crate::render::template::Template;

/// A static element; its children form a fragment rendered into it.
pub struct Element {
    node: Node,
    fragment: Rc<Fragment>,
}

impl Element {
    pub(super) fn new(options: &ItemOptions<'_>, tag: &str, template: &Template) -> Result<Rc<Self>> {
        let node = Node::element(tag);
        let fragment = Fragment::new(FragmentOptions {
            root: options.root.clone(),
            owner: Owner::Element(node.clone()),
            scope: options.scope.clone(),
            depth: options.depth + 1,
            template,
        })?;
        Ok(Rc::new(Self { node, fragment }))
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn fragment(&self) -> &Rc<Fragment> {
        &self.fragment
    }

    pub(super) fn render(&self) -> Result<Node> {
        self.node.append_child(&self.fragment.render()?);
        Ok(self.node.clone())
    }

    pub(super) fn unrender(&self) {
        self.fragment.unrender();
        self.node.detach();
    }

    pub(super) fn unbind(&self) -> Result<()> {
        self.fragment.unbind()
    }

    pub(super) fn rebind(&self, index_ref: Option<&str>, new_index: Option<usize>, old: &Keypath, new: &Keypath) -> Result<()> {
        self.fragment.rebind(index_ref, new_index, old, new)
    }
}
