mod common;

use std::collections::HashMap;
use std::sync::Arc;

use formlab::experiments::snapshot::{read_snapshot, write_snapshot};
use formlab::experiments::stats::two_proportion_z_test;
use formlab::{
    apply_variant, AssignmentStrategy, EngineConfig, ExperimentError, ExperimentStore,
    FormDocument, MetricsEvent, TestDefinition, TestStatus,
};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn traffic_split_must_sum_to_one_hundred() {
    let store = common::store();
    for split in [[50, 49], [60, 60], [0, 0], [100, 1]] {
        assert!(
            matches!(
                store.create_test(common::two_variant_definition(split)),
                Err(ExperimentError::Validation(_))
            ),
            "split {:?} accepted",
            split
        );
    }
    let ok = store
        .create_test(common::two_variant_definition([100, 0]))
        .unwrap();
    assert_eq!(ok.traffic_split.iter().sum::<u32>(), 100);
    assert_eq!(store.list_tests().len(), 1);
}

#[test]
fn split_length_must_match_variants() {
    let mut def = common::two_variant_definition([50, 50]);
    def.traffic_split = vec![100];
    assert!(common::store().create_test(def).is_err());
}

#[test]
fn assignment_sticks_after_split_change() {
    let store = common::store();
    let test = common::running_test(&store, [50, 50]);
    let first: HashMap<String, String> = (1..=300)
        .map(|i| {
            let user = format!("u{}", i);
            let variant = store.get_variant_for_user(&test.id, &user).unwrap();
            (user, variant)
        })
        .collect();

    store.set_traffic_split(&test.id, vec![100, 0]).unwrap();
    store.pause_test(&test.id);
    store.start_test(&test.id);

    for (user, variant) in &first {
        assert_eq!(
            store.get_variant_for_user(&test.id, user).as_ref(),
            Some(variant)
        );
    }
}

fn share_of_first_variant(store: &ExperimentStore, users: usize) -> f64 {
    let test = common::running_test(store, [70, 30]);
    let hits = (0..users)
        .filter(|i| {
            store
                .get_variant_for_user(&test.id, &format!("visitor-{}", i))
                .as_deref()
                == Some("A")
        })
        .count();
    hits as f64 / users as f64 * 100.0
}

#[test]
fn random_assignment_converges_to_split() {
    let share = share_of_first_variant(&common::store(), 10_000);
    assert!((share - 70.0).abs() < 3.0, "A share was {:.2}%", share);
}

#[test]
fn hashed_assignment_converges_to_split() {
    let store = ExperimentStore::new(EngineConfig {
        assignment: AssignmentStrategy::Hashed,
        ..Default::default()
    });
    let share = share_of_first_variant(&store, 10_000);
    assert!((share - 70.0).abs() < 3.0, "A share was {:.2}%", share);
}

#[test]
fn significance_matches_reference_and_completes_test() {
    let store = common::store();
    let test = common::running_test(&store, [50, 50]);
    store.record_event(&test.id, "A", &MetricsEvent::counts(1000, 100));
    store.record_event(&test.id, "B", &MetricsEvent::counts(1000, 150));

    let reference = two_proportion_z_test(100, 1000, 150, 1000).unwrap();
    assert!((reference.z_score - 3.3806).abs() < 1e-3);
    assert!((reference.p_value - 0.000723).abs() < 2e-5);

    let done = store.get_test_results(&test.id).unwrap();
    assert!((done.confidence - reference.confidence).abs() < 1e-9);
    assert!(done.confidence > 95.0);
    assert_eq!(done.winner.as_deref(), Some("B"));
    assert_eq!(done.status, TestStatus::Completed);
    assert!(done.end_date >= done.start_date);
}

#[test]
fn underpowered_samples_do_not_conclude() {
    let store = common::store();
    let test = common::running_test(&store, [50, 50]);
    for _ in 0..30 {
        store.record_event(&test.id, "A", &MetricsEvent::counts(1, 0));
        store.record_event(&test.id, "B", &MetricsEvent::counts(1, 1));
    }
    let t = store.get_test_results(&test.id).unwrap();
    assert_eq!(t.result("A").unwrap().submissions, 30);
    assert_eq!(t.confidence, 0.0);
    assert!(t.winner.is_none());
    assert_eq!(t.status, TestStatus::Running);

    // The 31st submission on each side crosses the guard.
    store.record_event(&test.id, "A", &MetricsEvent::counts(1, 0));
    store.record_event(&test.id, "B", &MetricsEvent::counts(1, 1));
    let t = store.get_test_results(&test.id).unwrap();
    assert_eq!(t.winner.as_deref(), Some("B"));
    assert_eq!(t.status, TestStatus::Completed);
}

#[test]
fn lifecycle_and_delete() {
    let store = common::store();
    let test = common::running_test(&store, [50, 50]);
    store.get_variant_for_user(&test.id, "u1").unwrap();

    assert!(store.stop_test(&test.id));
    let completed = store.get_test_results(&test.id).unwrap();
    assert!(!store.start_test(&test.id));
    assert_eq!(store.get_test_results(&test.id).unwrap(), completed);
    assert_eq!(store.list_tests_by_status(TestStatus::Completed).len(), 1);
    assert!(store.list_tests_by_status(TestStatus::Running).is_empty());

    assert!(store.delete_test(&test.id));
    assert!(store.list_tests().is_empty());
    assert!(store.assignments_for_user("u1").is_empty());
    assert!(store.get_test_results(&test.id).is_none());
    assert!(store.export_results(&test.id).is_none());
    assert_eq!(store.generate_report(&test.id), "No results available");
}

#[test]
fn fifty_fifty_scenario_declares_b() {
    let store = common::store();
    let test = common::running_test(&store, [50, 50]);
    let mut counts: HashMap<String, usize> = HashMap::new();
    for i in 1..=1000 {
        let variant = store
            .get_variant_for_user(&test.id, &format!("u{}", i))
            .unwrap();
        *counts.entry(variant).or_default() += 1;
    }
    assert_eq!(counts.values().sum::<usize>(), 1000);
    assert!(counts.keys().all(|v| v == "A" || v == "B"));

    store.record_event(&test.id, "A", &MetricsEvent::counts(500, 100));
    store.record_event(&test.id, "B", &MetricsEvent::counts(500, 160));

    let expected = two_proportion_z_test(100, 500, 160, 500).unwrap();
    let t = store.get_test_results(&test.id).unwrap();
    assert!((t.confidence - expected.confidence).abs() < 1e-9);
    assert!(t.confidence > 95.0);
    assert_eq!(t.winner.as_deref(), Some("B"));
    assert_eq!(t.status, TestStatus::Completed);

    let report = store.generate_report(&test.id);
    assert!(report.contains("Status: completed"));
    assert!(report.contains("Winner: Friendly (B)"));
    assert!(report.contains("+60.00%"));
}

#[test]
fn concurrent_first_contact_agrees() {
    let store = Arc::new(common::store());
    let test = common::running_test(&store, [50, 50]);
    let users: Vec<String> = (0..64).map(|i| format!("racer-{}", i)).collect();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let test_id = test.id.clone();
            let users = users.clone();
            std::thread::spawn(move || {
                users
                    .iter()
                    .map(|u| store.get_variant_for_user(&test_id, u).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let seen: Vec<Vec<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for per_thread in &seen[1..] {
        assert_eq!(per_thread, &seen[0]);
    }
    for (user, variant) in users.iter().zip(&seen[0]) {
        assert_eq!(store.assignments_for_user(user)[&test.id], *variant);
    }
}

#[test]
fn concurrent_events_are_all_counted() {
    let store = Arc::new(common::store());
    let test = common::running_test(&store, [50, 50]);
    std::thread::scope(|s| {
        for variant in ["A", "B", "A", "B"] {
            let store = &store;
            let test_id = &test.id;
            s.spawn(move || {
                for _ in 0..250 {
                    store.record_event(test_id, variant, &MetricsEvent::counts(1, 0));
                }
            });
        }
    });
    let t = store.get_test_results(&test.id).unwrap();
    assert_eq!(t.result("A").unwrap().submissions, 500);
    assert_eq!(t.result("B").unwrap().submissions, 500);
}

#[test]
fn variant_renders_from_wire_definition() {
    let store = common::store();
    let definition: TestDefinition = serde_json::from_value(json!({
        "name": "Shorter form",
        "trafficSplit": [0, 100],
        "goals": [{"type": "completion_rate", "value": 40}],
        "variants": [
            {"id": "control", "name": "Control", "formId": "contact-form"},
            {"id": "short", "name": "Short", "formId": "contact-form", "modifications": [
                {"type": "field", "target": "message", "operation": "remove"},
                {"type": "field", "target": "email", "operation": "update", "value": {"label": "Work email"}},
                {"type": "content", "target": "submitButtonText", "operation": "update", "value": "Talk to us"},
                {"type": "style", "target": "colors.primary", "operation": "update", "value": "#ff5500"},
                {"type": "layout", "target": "columns", "operation": "update", "value": ["full", "full"]},
                {"type": "content", "target": "footer", "operation": "update", "value": "ignored"}
            ]}
        ]
    }))
    .unwrap();
    let test = store.create_test(definition).unwrap();
    store.start_test(&test.id);

    let base = FormDocument::from_json(&common::contact_form_json()).unwrap();
    let rendered = store.render_for_user(&test.id, "u1", &base).unwrap();

    assert_eq!(rendered.fields.len(), 2);
    assert!(rendered.field("message").is_none());
    assert_eq!(rendered.field("email").unwrap().attributes["label"], "Work email");
    assert_eq!(rendered.settings.submit_button_text.as_deref(), Some("Talk to us"));
    let styling = rendered.styling.as_ref().unwrap();
    assert_eq!(styling["colors"]["primary"], "#ff5500");
    assert_eq!(styling["theme"], "modern-dark");

    let out = rendered.to_json().unwrap();
    assert_eq!(out["fields"][0]["width"], "full");
    assert_eq!(out["settings"]["redirectUrl"], "/thanks");
    assert_eq!(out["version"], 3);

    // Base untouched; control renders identically to it.
    assert_eq!(base.fields.len(), 3);
    let control = store.get_test_results(&test.id).unwrap();
    assert_eq!(apply_variant(&base, &control.variants[0]), base);
}

#[test]
fn update_and_remove_are_idempotent() {
    use formlab::experiments::apply_modifications;
    use formlab::experiments::modification::{FieldOp, Modification};

    let base = FormDocument::from_json(&common::contact_form_json()).unwrap();
    let mut patch = serde_json::Map::new();
    patch.insert("label".to_string(), json!("Full name"));
    let update = Modification::field("name", FieldOp::Update(patch));
    let remove = Modification::field("message", FieldOp::Remove);

    let once = apply_modifications(&base, &[update.clone(), remove.clone()]);
    let twice = apply_modifications(&base, &[update.clone(), update, remove.clone(), remove]);
    assert_eq!(once, twice);
}

#[test]
fn snapshot_round_trip_through_disk() {
    let tmp = TempDir::new().unwrap();
    let store = common::store();
    let test = common::running_test(&store, [50, 50]);
    let variant = store.get_variant_for_user(&test.id, "u42").unwrap();
    store.record_event(
        &test.id,
        &variant,
        &MetricsEvent::counts(3, 1).with_average_time(12.0),
    );

    write_snapshot(tmp.path(), &store.snapshot()).unwrap();
    let snapshot = read_snapshot(tmp.path()).unwrap().unwrap();
    let restored = ExperimentStore::from_snapshot(EngineConfig::default(), snapshot).unwrap();

    assert_eq!(
        restored.get_test_results(&test.id),
        store.get_test_results(&test.id)
    );
    assert_eq!(restored.get_variant_for_user(&test.id, "u42"), Some(variant));
}

#[test]
fn export_includes_analysis_once_powered() {
    let store = common::store();
    let test = common::running_test(&store, [50, 50]);
    store.record_event(&test.id, "A", &MetricsEvent::counts(10, 1));
    let early = store.export_results(&test.id).unwrap();
    assert!(early.analysis.is_none());
    assert_eq!(early.results.len(), 1);

    store.record_event(&test.id, "A", &MetricsEvent::counts(90, 9));
    store.record_event(&test.id, "B", &MetricsEvent::counts(100, 11));
    let exported = store.export_results(&test.id).unwrap();
    let analysis = exported.analysis.unwrap();
    assert_eq!(analysis.control_variant_id, "A");
    assert_eq!(analysis.treatment_variant_id, "B");
    assert_eq!(analysis.leader, "B");
    assert!(!analysis.sample_ratio_mismatch);
    assert_eq!(exported.test.confidence, analysis.z_test.confidence);
}
