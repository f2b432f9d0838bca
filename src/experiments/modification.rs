//! Patch operations a variant applies on top of the base form.
//!
//! On the wire a modification is the flat record
//! `{type, target, operation, value, originalValue}`. In memory it is a sum
//! type whose payload is checked once at the boundary, so the applier never
//! inspects JSON shapes at render time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExperimentError;
use crate::types::{FieldId, FieldWidth, FormField};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModificationKind {
    Field,
    Style,
    Content,
    Layout,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Update,
    Remove,
    Replace,
}

/// A single patch plus the value it displaced, if the author captured one.
/// `original_value` is carried for future rollback support and is not read
/// by the applier.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "RawModification", into = "RawModification")]
pub struct Modification {
    pub change: Change,
    pub original_value: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    Field { target: FieldId, op: FieldOp },
    /// `path` is the dotted style target split into segments.
    Style { path: Vec<String>, op: StyleOp },
    Content { slot: ContentSlot, op: ContentOp },
    Layout(LayoutOp),
    /// Content or layout target the applier has no slot for. Kept so the
    /// definition round-trips; ignored at render time.
    Unrecognized(RawModification),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldOp {
    Add(FormField),
    Update(Map<String, Value>),
    Remove,
    Replace(FormField),
}

#[derive(Clone, Debug, PartialEq)]
pub enum StyleOp {
    Add(Value),
    Update(Value),
    Replace(Value),
    Remove,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentSlot {
    Name,
    Description,
    SubmitButtonText,
    SuccessMessage,
}

impl ContentSlot {
    pub fn parse(target: &str) -> Option<Self> {
        match target {
            "name" => Some(ContentSlot::Name),
            "description" => Some(ContentSlot::Description),
            "submitButtonText" => Some(ContentSlot::SubmitButtonText),
            "successMessage" => Some(ContentSlot::SuccessMessage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentSlot::Name => "name",
            ContentSlot::Description => "description",
            ContentSlot::SubmitButtonText => "submitButtonText",
            ContentSlot::SuccessMessage => "successMessage",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ContentOp {
    Add(String),
    Update(String),
    Replace(String),
    Remove,
}

/// Positional column widths. `None` entries keep the field's prior width.
#[derive(Clone, Debug, PartialEq)]
pub enum LayoutOp {
    Add(Vec<Option<FieldWidth>>),
    Update(Vec<Option<FieldWidth>>),
    Replace(Vec<Option<FieldWidth>>),
    Remove,
}

pub const LAYOUT_COLUMNS: &str = "columns";

/// Flat wire form of a [`Modification`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawModification {
    #[serde(rename = "type")]
    pub kind: ModificationKind,
    pub target: String,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_value: Option<Value>,
}

impl Modification {
    pub fn new(change: Change) -> Self {
        Self {
            change,
            original_value: None,
        }
    }

    pub fn with_original_value(mut self, value: Value) -> Self {
        self.original_value = Some(value);
        self
    }

    pub fn field(target: &str, op: FieldOp) -> Self {
        Self::new(Change::Field {
            target: target.to_string(),
            op,
        })
    }

    pub fn style(path: &str, op: StyleOp) -> Self {
        Self::new(Change::Style {
            path: split_style_path(path),
            op,
        })
    }

    pub fn content(slot: ContentSlot, op: ContentOp) -> Self {
        Self::new(Change::Content { slot, op })
    }

    pub fn columns(op: LayoutOp) -> Self {
        Self::new(Change::Layout(op))
    }

    pub fn kind(&self) -> ModificationKind {
        match &self.change {
            Change::Field { .. } => ModificationKind::Field,
            Change::Style { .. } => ModificationKind::Style,
            Change::Content { .. } => ModificationKind::Content,
            Change::Layout(_) => ModificationKind::Layout,
            Change::Unrecognized(raw) => raw.kind,
        }
    }

    /// The wire-level target string.
    pub fn target(&self) -> String {
        match &self.change {
            Change::Field { target, .. } => target.clone(),
            Change::Style { path, .. } => path.join("."),
            Change::Content { slot, .. } => slot.as_str().to_string(),
            Change::Layout(_) => LAYOUT_COLUMNS.to_string(),
            Change::Unrecognized(raw) => raw.target.clone(),
        }
    }
}

fn split_style_path(target: &str) -> Vec<String> {
    target
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(raw: &RawModification, reason: &str) -> ExperimentError {
    ExperimentError::InvalidModification {
        target: raw.target.clone(),
        reason: reason.to_string(),
    }
}

fn required_value(raw: &RawModification) -> Result<Value, ExperimentError> {
    raw.value
        .clone()
        .ok_or_else(|| invalid(raw, "value is required for this operation"))
}

fn parse_field_op(raw: &RawModification) -> Result<FieldOp, ExperimentError> {
    let parse_field = |raw: &RawModification| -> Result<FormField, ExperimentError> {
        serde_json::from_value(required_value(raw)?)
            .map_err(|e| invalid(raw, &format!("value is not a field: {e}")))
    };
    Ok(match raw.operation {
        Operation::Add => FieldOp::Add(parse_field(raw)?),
        Operation::Replace => FieldOp::Replace(parse_field(raw)?),
        Operation::Update => match required_value(raw)? {
            Value::Object(map) => FieldOp::Update(map),
            _ => return Err(invalid(raw, "field update value must be an object")),
        },
        Operation::Remove => FieldOp::Remove,
    })
}

fn parse_style_op(raw: &RawModification) -> Result<StyleOp, ExperimentError> {
    Ok(match raw.operation {
        Operation::Add => StyleOp::Add(required_value(raw)?),
        Operation::Update => StyleOp::Update(required_value(raw)?),
        Operation::Replace => StyleOp::Replace(required_value(raw)?),
        Operation::Remove => StyleOp::Remove,
    })
}

fn parse_content_op(raw: &RawModification) -> Result<ContentOp, ExperimentError> {
    let text = |raw: &RawModification| -> Result<String, ExperimentError> {
        match required_value(raw)? {
            Value::String(s) => Ok(s),
            _ => Err(invalid(raw, "content value must be a string")),
        }
    };
    Ok(match raw.operation {
        Operation::Add => ContentOp::Add(text(raw)?),
        Operation::Update => ContentOp::Update(text(raw)?),
        Operation::Replace => ContentOp::Replace(text(raw)?),
        Operation::Remove => ContentOp::Remove,
    })
}

fn parse_layout_op(raw: &RawModification) -> Result<LayoutOp, ExperimentError> {
    let widths = |raw: &RawModification| -> Result<Vec<Option<FieldWidth>>, ExperimentError> {
        serde_json::from_value(required_value(raw)?)
            .map_err(|e| invalid(raw, &format!("columns value must be a width array: {e}")))
    };
    Ok(match raw.operation {
        Operation::Add => LayoutOp::Add(widths(raw)?),
        Operation::Update => LayoutOp::Update(widths(raw)?),
        Operation::Replace => LayoutOp::Replace(widths(raw)?),
        Operation::Remove => LayoutOp::Remove,
    })
}

impl TryFrom<RawModification> for Modification {
    type Error = ExperimentError;

    fn try_from(raw: RawModification) -> Result<Self, Self::Error> {
        let change = match raw.kind {
            ModificationKind::Field => {
                if raw.target.is_empty() && raw.operation != Operation::Add {
                    return Err(invalid(&raw, "field target must be a field id"));
                }
                Change::Field {
                    target: raw.target.clone(),
                    op: parse_field_op(&raw)?,
                }
            }
            ModificationKind::Style => {
                let path = split_style_path(&raw.target);
                if path.is_empty() {
                    return Err(invalid(&raw, "style target must be a dotted path"));
                }
                Change::Style {
                    path,
                    op: parse_style_op(&raw)?,
                }
            }
            ModificationKind::Content => match ContentSlot::parse(&raw.target) {
                Some(slot) => Change::Content {
                    slot,
                    op: parse_content_op(&raw)?,
                },
                None => Change::Unrecognized(raw.clone()),
            },
            ModificationKind::Layout => {
                if raw.target == LAYOUT_COLUMNS {
                    Change::Layout(parse_layout_op(&raw)?)
                } else {
                    Change::Unrecognized(raw.clone())
                }
            }
        };
        Ok(Modification {
            change,
            original_value: raw.original_value,
        })
    }
}

fn widths_to_value(widths: Vec<Option<FieldWidth>>) -> Value {
    // Vec<Option<FieldWidth>> always serializes.
    serde_json::to_value(widths).unwrap_or(Value::Null)
}

impl From<Modification> for RawModification {
    fn from(m: Modification) -> Self {
        let kind = m.kind();
        let target = m.target();
        let (operation, value) = match m.change {
            Change::Field { op, .. } => match op {
                FieldOp::Add(f) => (Operation::Add, serde_json::to_value(f).ok()),
                FieldOp::Update(map) => (Operation::Update, Some(Value::Object(map))),
                FieldOp::Remove => (Operation::Remove, None),
                FieldOp::Replace(f) => (Operation::Replace, serde_json::to_value(f).ok()),
            },
            Change::Style { op, .. } => match op {
                StyleOp::Add(v) => (Operation::Add, Some(v)),
                StyleOp::Update(v) => (Operation::Update, Some(v)),
                StyleOp::Replace(v) => (Operation::Replace, Some(v)),
                StyleOp::Remove => (Operation::Remove, None),
            },
            Change::Content { op, .. } => match op {
                ContentOp::Add(s) => (Operation::Add, Some(Value::String(s))),
                ContentOp::Update(s) => (Operation::Update, Some(Value::String(s))),
                ContentOp::Replace(s) => (Operation::Replace, Some(Value::String(s))),
                ContentOp::Remove => (Operation::Remove, None),
            },
            Change::Layout(op) => match op {
                LayoutOp::Add(w) => (Operation::Add, Some(widths_to_value(w))),
                LayoutOp::Update(w) => (Operation::Update, Some(widths_to_value(w))),
                LayoutOp::Replace(w) => (Operation::Replace, Some(widths_to_value(w))),
                LayoutOp::Remove => (Operation::Remove, None),
            },
            Change::Unrecognized(raw) => (raw.operation, raw.value),
        };
        RawModification {
            kind,
            target,
            operation,
            value,
            original_value: m.original_value,
        }
    }
}
