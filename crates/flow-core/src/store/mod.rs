//! Contrato de almacenamiento del motor.
//!
//! `FlowStore` abstrae el colaborador transaccional requerido: CRUD del
//! registro Flow, un lock exclusivo por registro con alcance de transacción
//! (rollback garantizado ante cualquier fallo interno) y borrado en cascada
//! de las filas dependientes. Dos implementaciones con paridad de
//! semántica: `InMemoryFlowStore` (este crate) y `PgFlowStore`
//! (flow-persistence).

pub mod memory;

use chrono::{DateTime, Utc};
use flow_domain::{ArtefactRecord, Flow, TransitionRecord};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{EngineError, StoreError};

pub use memory::InMemoryFlowStore;

/// Datos para insertar un flow nuevo.
#[derive(Debug, Clone)]
pub struct NewFlow {
    pub flow_type: String,
    pub current_state: String,
    pub props: Value,
}

/// Cambio de estado a aplicar sobre la fila del flow dentro de la sección
/// crítica.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub to: String,
    /// Valor nuevo de `completed_at`; `None` limpia la marca (salir del
    /// estado completado invalida una marca previa).
    pub completed_at: Option<DateTime<Utc>>,
    /// Marca de error; solo se escribe si es `Some` (las marcas previas se
    /// conservan).
    pub errored_at: Option<DateTime<Utc>>,
}

/// Operaciones disponibles dentro de la sección crítica (lock + tx).
///
/// Los writes quedan pendientes hasta el commit: si el cuerpo devuelve
/// `Err` la transacción entera se revierte y ningún write parcial queda
/// visible.
pub trait FlowTx {
    /// Fila autoritativa del flow, releída bajo el lock. Refleja los writes
    /// ya aplicados dentro de esta transacción.
    fn current(&self) -> &Flow;
    /// Inserta la fila de transición (`transitioned_from` -> `to`).
    fn insert_transition(&mut self, from: &str, to: &str) -> Result<TransitionRecord, StoreError>;
    /// Aplica el cambio de estado sobre la fila del flow.
    fn update_state(&mut self, change: &StateChange) -> Result<(), StoreError>;
    /// Inserta el artefacto ligado a la transición recién creada.
    fn insert_artefact(&mut self, transition_id: i64, name: &str, payload: Value) -> Result<ArtefactRecord, StoreError>;
}

/// Colaborador de almacenamiento transaccional.
pub trait FlowStore: Send + Sync {
    /// Inserta un flow nuevo y devuelve la fila persistida.
    fn insert_flow(&self, new: NewFlow) -> Result<Flow, StoreError>;

    /// Lee un flow por id.
    fn find_flow(&self, id: Uuid) -> Result<Flow, StoreError>;

    /// Adquisición con alcance explícito: begin tx -> lock exclusivo de la
    /// fila -> `body` -> commit si `Ok` / rollback si `Err`. La liberación
    /// está garantizada en todo camino de salida, incluidos fallos
    /// tempranos. El lock excluye únicamente transiciones sobre el mismo
    /// flow id; flows distintos proceden en paralelo.
    ///
    /// Si la fila ya no existe (p.ej. borrada por la política de
    /// completitud) devuelve `EngineError::NotFound`.
    fn with_flow_lock<T>(&self,
                         id: Uuid,
                         body: &mut dyn FnMut(&mut dyn FlowTx) -> Result<T, EngineError>)
                         -> Result<T, EngineError>;

    /// Borra el flow y, en cascada, sus transiciones y artefactos.
    /// Idempotente: borrar un id inexistente no es error.
    fn delete_flow(&self, id: Uuid) -> Result<(), StoreError>;

    /// Historial de transiciones del flow, en orden de commit (id
    /// secuencial ascendente).
    fn transitions(&self, flow_id: Uuid) -> Result<Vec<TransitionRecord>, StoreError>;

    /// Artefactos ligados a una transición.
    fn artefacts(&self, transition_id: i64) -> Result<Vec<ArtefactRecord>, StoreError>;
}

/// Delegación para compartir un mismo store entre varios engines/hilos.
impl<S: FlowStore> FlowStore for std::sync::Arc<S> {
    fn insert_flow(&self, new: NewFlow) -> Result<Flow, StoreError> {
        (**self).insert_flow(new)
    }

    fn find_flow(&self, id: Uuid) -> Result<Flow, StoreError> {
        (**self).find_flow(id)
    }

    fn with_flow_lock<T>(&self,
                         id: Uuid,
                         body: &mut dyn FnMut(&mut dyn FlowTx) -> Result<T, EngineError>)
                         -> Result<T, EngineError> {
        (**self).with_flow_lock(id, body)
    }

    fn delete_flow(&self, id: Uuid) -> Result<(), StoreError> {
        (**self).delete_flow(id)
    }

    fn transitions(&self, flow_id: Uuid) -> Result<Vec<TransitionRecord>, StoreError> {
        (**self).transitions(flow_id)
    }

    fn artefacts(&self, transition_id: i64) -> Result<Vec<ArtefactRecord>, StoreError> {
        (**self).artefacts(transition_id)
    }
}
