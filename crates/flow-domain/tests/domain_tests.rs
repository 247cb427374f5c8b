use flow_domain::{Flow, FlowSpec, PayloadKind, PayloadSchema, PropViolation};
use serde_json::json;

fn sample_flow(state: &str, props: serde_json::Value) -> Flow {
    let now = chrono::Utc::now();
    Flow { id: uuid::Uuid::new_v4(),
           flow_type: "invoice".to_string(),
           current_state: state.to_string(),
           props,
           completed_at: None,
           last_errored_at: None,
           created_at: now,
           updated_at: now }
}

#[test]
fn schema_validate_acumula_todas_las_violaciones() {
    let schema = PayloadSchema::new().field("name", PayloadKind::String)
                                     .field("amount", PayloadKind::Integer)
                                     .field("meta", PayloadKind::Object);

    // name falta, amount con tipo incorrecto, meta ok
    let violations = schema.validate(&json!({ "amount": "nope", "meta": {} }));
    assert_eq!(violations.len(), 2, "debe reportar ambas violaciones, no solo la primera");
    assert_eq!(violations[0], PropViolation::Missing { field: "name".into() });
    assert_eq!(violations[1],
               PropViolation::WrongType { field: "amount".into(),
                                          expected: PayloadKind::Integer });
}

#[test]
fn schema_vacio_no_reporta_violaciones() {
    let schema = PayloadSchema::new();
    assert!(schema.validate(&json!({ "whatever": 1 })).is_empty());
    assert!(schema.validate(&json!(null)).is_empty());
}

#[test]
fn null_cuenta_como_faltante() {
    let schema = PayloadSchema::new().field("name", PayloadKind::String);
    let violations = schema.validate(&json!({ "name": null }));
    assert_eq!(violations, vec![PropViolation::Missing { field: "name".into() }]);
}

#[test]
fn payload_kind_matches() {
    assert!(PayloadKind::String.matches(&json!("x")));
    assert!(!PayloadKind::String.matches(&json!(1)));
    assert!(PayloadKind::Integer.matches(&json!(3)));
    assert!(!PayloadKind::Integer.matches(&json!(3.5)));
    // un entero JSON es un float válido
    assert!(PayloadKind::Float.matches(&json!(3)));
    assert!(PayloadKind::Object.matches(&json!({})));
    assert!(!PayloadKind::Object.matches(&json!([])));
    assert!(PayloadKind::Array.matches(&json!([1, 2])));
    assert!(PayloadKind::Any.matches(&json!(false)));
    assert!(!PayloadKind::Any.matches(&json!(null)));
}

#[test]
fn spec_declara_estados_en_orden_y_subconjunto_de_error() {
    let spec = FlowSpec::builder("invoice").state("draft")
                                           .state("review")
                                           .error_state("failed")
                                           .initial_state("draft")
                                           .completed_state("review")
                                           .build();

    let declared: Vec<&str> = spec.states().collect();
    assert_eq!(declared, vec!["draft", "review", "failed"]);
    assert!(spec.is_declared("failed"));
    assert!(spec.is_error_state("failed"));
    assert!(!spec.is_error_state("draft"));
    assert_eq!(spec.initial_state(), Some("draft"));
    assert_eq!(spec.completed_state(), Some("review"));
    assert!(!spec.destroy_on_complete());
}

#[test]
fn spec_incompleto_es_legal_de_definir() {
    // La falta de inicial/completado se detecta al construir instancias,
    // no al definir el tipo.
    let spec = FlowSpec::builder("bare").state("only").build();
    assert_eq!(spec.initial_state(), None);
    assert_eq!(spec.completed_state(), None);
}

#[test]
fn predicados_completed_y_errored() {
    let spec = FlowSpec::builder("invoice").state("draft")
                                           .error_state("failed")
                                           .state("done")
                                           .initial_state("draft")
                                           .completed_state("done")
                                           .build();

    assert!(spec.completed(&sample_flow("done", json!({}))));
    assert!(!spec.completed(&sample_flow("draft", json!({}))));
    assert!(spec.errored(&sample_flow("failed", json!({}))));
    assert!(!spec.errored(&sample_flow("done", json!({}))));
}

#[test]
fn prop_lookup_tipado() {
    let flow = sample_flow("draft", json!({ "name": "Example", "amount": 7 }));
    assert_eq!(flow.prop("name"), Some(&json!("Example")));
    assert_eq!(flow.prop_as::<String>("name"), Some("Example".to_string()));
    assert_eq!(flow.prop_as::<i64>("amount"), Some(7));
    assert_eq!(flow.prop_as::<i64>("name"), None);
    assert!(flow.prop("missing").is_none());
}
