//! Demo ejecutable del ciclo de vida completo de un flow.
//!
//! Sin features corre contra el backend en memoria. Con `pg_demo` corre el
//! mismo ciclo contra Postgres (requiere `DATABASE_URL`).

use std::sync::Arc;

use flow_core::{FlowEngine, FlowStore, InMemoryFlowStore, TransitionCall};
use flow_domain::{FlowSpec, PayloadKind};
use serde_json::json;

/// Tipo de ejemplo: un documento que pasa por revisión y se borra al
/// completar.
fn document_spec() -> Arc<FlowSpec> {
    Arc::new(FlowSpec::builder("document").state("draft")
                                          .state("review")
                                          .state("published")
                                          .error_state("failed")
                                          .initial_state("draft")
                                          .completed_state("published")
                                          .destroy_on_complete()
                                          .prop("name", PayloadKind::String)
                                          .persists("api_response", PayloadKind::Object)
                                          .build())
}

fn run_demo<S: FlowStore>(engine: &FlowEngine<S>) {
    let flow = engine.create(json!({ "name": "Example" })).expect("create");
    println!("creado: {} en {}", flow.id, flow.current_state);

    // Transición guardada con artefacto capturado en el mismo commit.
    let outcome = engine.transition(flow.id,
                                    TransitionCall::new(["draft"], "review")
                                        .guard(|f| f.prop("name").is_some())
                                        .persists("api_response", |_| json!({ "status": "ok" }))
                                        .on_success(|o| {
                                            println!("commit: {} -> {}",
                                                     o.transition.transitioned_from,
                                                     o.transition.transitioned_to)
                                        }))
                        .expect("transition a review");
    println!("artefacto: {:?}", outcome.artefact.map(|a| a.name));

    // Completar dispara la política destroy-on-complete.
    let outcome = engine.transition(flow.id, TransitionCall::new(["review"], "published"))
                        .expect("transition a published");
    println!("completado y destruido: {}", outcome.destroyed);

    match engine.find(flow.id) {
        Err(e) => println!("lookup posterior: {e}"),
        Ok(_) => println!("lookup posterior: todavía presente"),
    }
}

#[cfg(feature = "pg_demo")]
fn run_pg_demo() {
    use flow_persistence::pg::{build_dev_pool_from_env, PgFlowStore, PoolProvider};

    let pool = build_dev_pool_from_env().expect("pool Postgres (DATABASE_URL)");
    let engine = FlowEngine::new(document_spec(), PgFlowStore::new(PoolProvider { pool }));
    println!("--- demo Postgres ---");
    run_demo(&engine);
}

fn main() {
    println!("--- demo en memoria ---");
    let engine = FlowEngine::new(document_spec(), InMemoryFlowStore::new());
    run_demo(&engine);

    #[cfg(feature = "pg_demo")]
    run_pg_demo();
}
