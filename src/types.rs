use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Form identifier, referenced by [`crate::experiments::config::Variant::form_id`].
pub type FormId = String;
/// Field identifier, unique within one form.
pub type FieldId = String;

/// The form document an experiment mutates.
///
/// Only the parts the modification applier touches are typed: the field
/// list, the styling tree and the named content slots. Everything else the
/// host stores on a form rides along untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDocument {
    pub id: FormId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FormField>,
    /// Free-form styling tree addressed by dotted paths (`colors.primary`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styling: Option<Value>,
    #[serde(default)]
    pub settings: FormSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FormDocument {
    pub fn new(id: impl Into<FormId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            fields: Vec::new(),
            styling: None,
            settings: FormSettings::default(),
            extra: Map::new(),
        }
    }

    pub fn field(&self, id: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Parse a document from JSON.
    pub fn from_json(json: &Value) -> crate::error::Result<Self> {
        Ok(serde_json::from_value(json.clone())?)
    }

    pub fn to_json(&self) -> crate::error::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One input on a form. `id` and `width` are typed because modifications
/// address them; label, type, validation and the rest stay opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: FieldId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<FieldWidth>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl FormField {
    pub fn new(id: impl Into<FieldId>) -> Self {
        Self {
            id: id.into(),
            width: None,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    /// Shallow merge: each top-level key of `patch` overwrites the field's.
    /// `id` and `width` are routed to their typed slots; a `width` that does
    /// not parse is ignored.
    pub fn merge(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            match key.as_str() {
                "id" => {
                    if let Some(id) = value.as_str() {
                        self.id = id.to_string();
                    }
                }
                "width" => {
                    if value.is_null() {
                        self.width = None;
                    } else if let Ok(width) = serde_json::from_value(value.clone()) {
                        self.width = Some(width);
                    } else {
                        tracing::debug!(
                            field = %self.id,
                            "ignoring unparsable width in field update"
                        );
                    }
                }
                _ => {
                    self.attributes.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Column width of a field: either a numeric share (`6`, `0.5`) or a named
/// size (`"half"`, `"full"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldWidth {
    Units(f64),
    Named(String),
}

/// Styling tree applied to documents that have none before a style patch.
pub fn modern_dark_theme() -> Value {
    json!({
        "theme": "modern-dark",
        "colors": {
            "primary": "#6366f1",
            "secondary": "#8b5cf6",
            "background": "#0f172a",
            "surface": "#1e293b",
            "text": "#f8fafc",
            "border": "#334155",
            "error": "#ef4444",
            "success": "#22c55e"
        },
        "typography": {
            "fontFamily": "Inter, system-ui, sans-serif",
            "fontSize": "16px",
            "headingWeight": 600
        },
        "layout": {
            "borderRadius": "8px",
            "spacing": "16px",
            "maxWidth": "640px"
        }
    })
}
