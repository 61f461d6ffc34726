//! Property application: initial application at materialization time and
//! delta replay during patching, including hook/unhook dispatch.

use crate::dom::LiveNode;
use crate::types::{PropEdit, PropertyValue, PropsDelta, VProperties};
use phf::phf_set;
use serde_json::Value;

/// Property names that reflect DOM attributes: removing one drops the entry
/// outright. Everything else behaves like an IDL property and is reset to a
/// falsy scalar instead (empty string for previous strings, null otherwise).
static REFLECTED_ATTRIBUTES: phf::Set<&'static str> = phf_set! {
    "accept",
    "alt",
    "class",
    "dir",
    "for",
    "href",
    "id",
    "lang",
    "name",
    "placeholder",
    "rel",
    "role",
    "src",
    "tabindex",
    "target",
    "title",
    "type",
};

/// Apply a full property map to a freshly constructed node.
pub fn apply_properties(node: &LiveNode, properties: &VProperties) {
    for (name, value) in properties {
        set_property(node, name, value);
    }
}

/// Replay a property delta. `previous` is the property map the delta was
/// diffed against; any hook it held on a touched key is unhooked first.
pub fn patch_properties(node: &LiveNode, delta: &PropsDelta, previous: &VProperties) {
    for (name, edit) in delta {
        if let Some(PropertyValue::Hook(hook)) = previous.get(name) {
            hook.unhook(node, name);
        }
        match edit {
            PropEdit::Remove => remove_property(node, name, previous.get(name)),
            PropEdit::Set(value) => set_property(node, name, value),
            PropEdit::Style(style) => node.patch_style(name, style),
        }
    }
}

fn set_property(node: &LiveNode, name: &str, value: &PropertyValue) {
    node.set_property(name, value.clone());
    if let PropertyValue::Hook(hook) = value {
        hook.hook(node, name);
    }
}

fn remove_property(node: &LiveNode, name: &str, previous: Option<&PropertyValue>) {
    if REFLECTED_ATTRIBUTES.contains(name) {
        node.remove_property(name);
        return;
    }
    match previous {
        Some(PropertyValue::Scalar(Value::String(_))) => {
            node.set_property(name, PropertyValue::Scalar(Value::String(String::new())));
        }
        Some(PropertyValue::Scalar(_)) => {
            node.set_property(name, PropertyValue::Scalar(Value::Null));
        }
        _ => {
            node.remove_property(name);
        }
    }
}
