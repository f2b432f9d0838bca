//! Renders a variant by applying its modifications to a base form.
//!
//! The base document is borrowed and never written to; every call returns a
//! fresh document, so concurrent renders of the same base cannot observe each
//! other's patches.

use serde_json::{Map, Value};

use super::config::Variant;
use super::modification::{Change, ContentOp, ContentSlot, FieldOp, LayoutOp, Modification, StyleOp};
use crate::types::{modern_dark_theme, FormDocument};

pub fn apply_variant(base: &FormDocument, variant: &Variant) -> FormDocument {
    apply_modifications(base, &variant.modifications)
}

/// Applies `modifications` in order. Later entries win over earlier ones
/// targeting the same thing. Unresolvable targets are skipped.
pub fn apply_modifications(base: &FormDocument, modifications: &[Modification]) -> FormDocument {
    let mut doc = base.clone();
    for modification in modifications {
        apply_one(&mut doc, modification);
    }
    doc
}

fn apply_one(doc: &mut FormDocument, modification: &Modification) {
    match &modification.change {
        Change::Field { target, op } => apply_field(doc, target, op),
        Change::Style { path, op } => apply_style(doc, path, op),
        Change::Content { slot, op } => apply_content(doc, *slot, op),
        Change::Layout(op) => apply_columns(doc, op),
        Change::Unrecognized(raw) => {
            tracing::debug!(
                kind = ?raw.kind,
                target = %raw.target,
                "skipping modification with unknown target"
            );
        }
    }
}

fn apply_field(doc: &mut FormDocument, target: &str, op: &FieldOp) {
    let position = doc.fields.iter().position(|f| f.id == target);
    match (op, position) {
        (FieldOp::Add(field), _) => doc.fields.push(field.clone()),
        (FieldOp::Update(patch), Some(i)) => doc.fields[i].merge(patch),
        (FieldOp::Remove, Some(i)) => {
            doc.fields.remove(i);
        }
        (FieldOp::Replace(field), Some(i)) => doc.fields[i] = field.clone(),
        (_, None) => {
            tracing::debug!(field = %target, "field not found, modification skipped");
        }
    }
}

fn apply_style(doc: &mut FormDocument, path: &[String], op: &StyleOp) {
    let Some((leaf, parents)) = path.split_last() else {
        return;
    };
    let styling = doc.styling.get_or_insert_with(modern_dark_theme);
    if !styling.is_object() {
        *styling = modern_dark_theme();
    }

    match op {
        StyleOp::Add(value) | StyleOp::Update(value) | StyleOp::Replace(value) => {
            let mut node = styling;
            for segment in parents {
                node = child_object(node, segment);
            }
            if let Some(map) = node.as_object_mut() {
                map.insert(leaf.clone(), value.clone());
            }
        }
        StyleOp::Remove => {
            let mut node = Some(styling);
            for segment in parents {
                node = node.and_then(|n| n.get_mut(segment.as_str()));
            }
            if let Some(map) = node.and_then(Value::as_object_mut) {
                map.remove(leaf.as_str());
            }
        }
    }
}

/// Returns the object stored under `key`, creating it (or replacing a
/// non-object) as needed.
fn child_object<'a>(node: &'a mut Value, key: &str) -> &'a mut Value {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let child = &mut node[key];
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    child
}

fn apply_content(doc: &mut FormDocument, slot: ContentSlot, op: &ContentOp) {
    let text = match op {
        ContentOp::Add(s) | ContentOp::Update(s) | ContentOp::Replace(s) => Some(s.clone()),
        ContentOp::Remove => None,
    };
    match slot {
        ContentSlot::Name => doc.name = text.unwrap_or_default(),
        ContentSlot::Description => doc.description = text,
        ContentSlot::SubmitButtonText => doc.settings.submit_button_text = text,
        ContentSlot::SuccessMessage => doc.settings.success_message = text,
    }
}

fn apply_columns(doc: &mut FormDocument, op: &LayoutOp) {
    match op {
        LayoutOp::Add(widths) | LayoutOp::Update(widths) | LayoutOp::Replace(widths) => {
            for (field, width) in doc.fields.iter_mut().zip(widths) {
                if let Some(width) = width {
                    field.width = Some(width.clone());
                }
            }
        }
        LayoutOp::Remove => {
            for field in doc.fields.iter_mut() {
                field.width = None;
            }
        }
    }
}
