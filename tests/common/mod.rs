use formlab::experiments::config::{Test, TestDefinition, VariantDefinition};
use formlab::{EngineConfig, ExperimentStore};
use serde_json::json;

pub fn store() -> ExperimentStore {
    ExperimentStore::new(EngineConfig::default())
}

pub fn two_variant_definition(split: [u32; 2]) -> TestDefinition {
    TestDefinition {
        name: "Contact form headline".to_string(),
        description: None,
        variants: vec![
            VariantDefinition::new("A", "Control", "contact-form"),
            VariantDefinition::new("B", "Friendly", "contact-form"),
        ],
        traffic_split: split.to_vec(),
        targeting: None,
        goals: vec![],
    }
}

/// Creates and starts a two-variant test.
pub fn running_test(store: &ExperimentStore, split: [u32; 2]) -> Test {
    let test = store.create_test(two_variant_definition(split)).unwrap();
    assert!(store.start_test(&test.id));
    store.get_test_results(&test.id).unwrap()
}

#[allow(dead_code)]
pub fn contact_form_json() -> serde_json::Value {
    json!({
        "id": "contact-form",
        "name": "Contact us",
        "description": "We answer within a day",
        "fields": [
            {"id": "name", "type": "text", "label": "Name", "required": true, "width": "half"},
            {"id": "email", "type": "email", "label": "Email", "required": true, "width": "half"},
            {"id": "message", "type": "textarea", "label": "Message"}
        ],
        "settings": {"submitButtonText": "Send", "successMessage": "Thanks!", "redirectUrl": "/thanks"},
        "version": 3
    })
}
