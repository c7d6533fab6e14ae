//! Template Tree
//!
//! The intermediate format a template parser produces. The parser itself
//! lives outside this crate; templates arrive either as JSON or built with
//! the helper constructors below.
//!
//! ```json
//! [
//!   { "t": "element", "tag": "ul", "f": [
//!     { "t": "section", "r": "items", "index_ref": "i", "f": [
//!       { "t": "interpolator", "r": "name" }
//!     ]}
//!   ]}
//! ]
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A whole template: an ordered list of items.
pub type Template = Vec<TemplateItem>;

/// One node of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum TemplateItem {
    /// Literal text.
    Text { text: String },

    /// `{{r}}`
    Interpolator { r: String },

    /// `{{#r:index_ref}}f{{/r}}`, or `{{^r}}f{{/r}}` when inverted.
    Section {
        r: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index_ref: Option<String>,
        #[serde(default)]
        inverted: bool,
        #[serde(default)]
        f: Template,
    },

    /// `{{>r}}`
    Partial { r: String },

    /// `<tag>f</tag>`
    Element {
        tag: String,
        #[serde(default)]
        f: Template,
    },

    /// `<name key="..."/>`
    Component {
        name: String,
        #[serde(default)]
        attributes: IndexMap<String, Attribute>,
    },
}

/// A component attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Attribute {
    /// `key="{{r}}"`: a live binding to the parent's data.
    Bound { r: String },

    /// `key="literal"`: copied once into the child's data.
    Static { value: Value },
}

pub fn text(text: &str) -> TemplateItem {
    TemplateItem::Text { text: text.to_string() }
}

pub fn interpolator(r: &str) -> TemplateItem {
    TemplateItem::Interpolator { r: r.to_string() }
}

pub fn section(r: &str, f: Template) -> TemplateItem {
    TemplateItem::Section {
        r: r.to_string(),
        index_ref: None,
        inverted: false,
        f,
    }
}

/// A list section with an index reference.
pub fn each(r: &str, index_ref: &str, f: Template) -> TemplateItem {
    TemplateItem::Section {
        r: r.to_string(),
        index_ref: Some(index_ref.to_string()),
        inverted: false,
        f,
    }
}

pub fn inverted(r: &str, f: Template) -> TemplateItem {
    TemplateItem::Section {
        r: r.to_string(),
        index_ref: None,
        inverted: true,
        f,
    }
}

pub fn partial(r: &str) -> TemplateItem {
    TemplateItem::Partial { r: r.to_string() }
}

pub fn element(tag: &str, f: Template) -> TemplateItem {
    TemplateItem::Element {
        tag: tag.to_string(),
        f,
    }
}

pub fn component<I, K>(name: &str, attributes: I) -> TemplateItem
where
    I: IntoIterator<Item = (K, Attribute)>,
    K: Into<String>,
{
    TemplateItem::Component {
        name: name.to_string(),
        attributes: attributes.into_iter().map(|(k, a)| (k.into(), a)).collect(),
    }
}

pub fn bound(r: &str) -> Attribute {
    Attribute::Bound { r: r.to_string() }
}

pub fn literal(value: Value) -> Attribute {
    Attribute::Static { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_parser_output() {
        let raw = json!([
            { "t": "element", "tag": "ul", "f": [
                { "t": "section", "r": "items", "index_ref": "i", "f": [
                    { "t": "interpolator", "r": "name" }
                ]}
            ]},
            { "t": "component", "name": "widget", "attributes": {
                "letter": { "t": "bound", "r": "." },
                "size": { "t": "static", "value": 3 }
            }}
        ]);

        let template: Template = serde_json::from_value(raw).unwrap();
        assert_eq!(
            template,
            vec![
                element("ul", vec![each("items", "i", vec![interpolator("name")])]),
                component("widget", [("letter", bound(".")), ("size", literal(json!(3)))]),
            ]
        );
    }
}
