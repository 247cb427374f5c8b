//! Política de completitud y destrucción posterior al commit.

use std::sync::Arc;

use flow_core::{EngineError, FlowEngine, FlowStore, InMemoryFlowStore, TransitionCall};
use flow_domain::{FlowSpec, PayloadKind};
use serde_json::json;

fn spec(destroy: bool) -> Arc<FlowSpec> {
    let builder = FlowSpec::builder("job").state("queued")
                                          .state("running")
                                          .state("complete")
                                          .error_state("failed")
                                          .initial_state("queued")
                                          .completed_state("complete")
                                          .prop("name", PayloadKind::String);
    let builder = if destroy { builder.destroy_on_complete() } else { builder };
    Arc::new(builder.build())
}

#[test]
fn completar_sin_destroy_persiste_con_completed_at() {
    let engine = FlowEngine::new(spec(false), InMemoryFlowStore::new());
    let flow = engine.create(json!({ "name": "keep" })).expect("create");

    let outcome = engine.transition(flow.id, TransitionCall::new(["queued"], "complete")).expect("transition");
    assert!(!outcome.destroyed);
    assert!(engine.completed(&outcome.flow));

    // El registro sigue recuperable, con la marca puesta.
    let after = engine.find(flow.id).expect("find");
    assert_eq!(after.current_state, "complete");
    assert!(after.completed_at.is_some());
}

#[test]
fn completar_con_destroy_borra_el_registro() {
    let engine = FlowEngine::new(spec(true), InMemoryFlowStore::new());
    let flow = engine.create(json!({ "name": "gone" })).expect("create");

    let outcome = engine.transition(flow.id, TransitionCall::new(["queued"], "complete")).expect("transition");
    assert!(outcome.destroyed);
    assert!(outcome.flow.completed_at.is_some(), "el outcome conserva la última observación");

    // Inmediatamente irrecuperable por id.
    assert!(matches!(engine.find(flow.id), Err(EngineError::NotFound(_))));

    // La cascada se llevó también el historial.
    assert!(engine.transitions(flow.id).expect("history").is_empty());
}

#[test]
fn transicion_posterior_al_destroy_es_not_found() {
    let engine = FlowEngine::new(spec(true), InMemoryFlowStore::new());
    let flow = engine.create(json!({ "name": "gone" })).expect("create");
    engine.transition(flow.id, TransitionCall::new(["queued"], "complete")).expect("transition");

    // La destrucción es final: la identidad no persiste, y el error es
    // not-found, no un error de validación de estado.
    let err = engine.transition(flow.id, TransitionCall::new(["complete"], "queued")).unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[test]
fn on_success_observa_el_destroy() {
    let engine = FlowEngine::new(spec(true), InMemoryFlowStore::new());
    let flow = engine.create(json!({ "name": "cb" })).expect("create");

    let mut destroyed_seen = false;
    engine.transition(flow.id,
                      TransitionCall::new(["queued"], "complete")
                          .on_success(|outcome| destroyed_seen = outcome.destroyed))
          .expect("transition");
    assert!(destroyed_seen, "el callback corre después del destroy");
}

#[test]
fn salir_del_estado_completado_limpia_completed_at() {
    // Sin destroy: llegar a complete y volver a queued. Alcanzar el estado
    // completado no bloquea transiciones posteriores por sí solo.
    let engine = FlowEngine::new(spec(false), InMemoryFlowStore::new());
    let flow = engine.create(json!({ "name": "back" })).expect("create");

    engine.transition(flow.id, TransitionCall::new(["queued"], "complete")).expect("to complete");
    let outcome = engine.transition(flow.id, TransitionCall::new(["complete"], "queued")).expect("back out");

    assert!(outcome.flow.completed_at.is_none(), "una marca vieja contradiría completed()");
    assert!(!engine.completed(&outcome.flow));
    assert_eq!(engine.transitions(flow.id).expect("history").len(), 2);
}

#[test]
fn residuo_completado_sin_borrar_es_idempotente() {
    // Simula el crash entre commit y delete: el registro quedó completado
    // pero presente. Re-ejecutar la misma lógica de borrado es seguro.
    let store = Arc::new(InMemoryFlowStore::new());
    let engine = FlowEngine::new(spec(false), Arc::clone(&store));
    let flow = engine.create(json!({ "name": "residual" })).expect("create");
    engine.transition(flow.id, TransitionCall::new(["queued"], "complete")).expect("transition");

    store.delete_flow(flow.id).expect("first delete");
    store.delete_flow(flow.id).expect("second delete is a no-op");
    assert!(matches!(engine.find(flow.id), Err(EngineError::NotFound(_))));
}
