//! Backend en memoria con paridad de semántica respecto al backend
//! Postgres: mismo contrato de lock por registro, commit/rollback y
//! cascada de borrado. Es la referencia para tests y para validar la
//! implementación durable.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use flow_domain::{ArtefactRecord, Flow, TransitionRecord};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{EngineError, StoreError};
use crate::store::{FlowStore, FlowTx, NewFlow, StateChange};

/// Store en memoria. Las filas viven en mapas concurrentes; el lock por
/// registro es un `Mutex` por flow id, tomado durante toda la sección
/// crítica. Los ids de historial salen de contadores secuenciales (como
/// las secuencias BIGSERIAL del backend durable: un rollback deja huecos).
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    flows: DashMap<Uuid, Flow>,
    /// Transiciones por flow id, en orden de commit.
    transitions: DashMap<Uuid, Vec<TransitionRecord>>,
    /// Artefactos por transition id.
    artefacts: DashMap<i64, Vec<ArtefactRecord>>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    next_transition_id: AtomicI64,
    next_artefact_id: AtomicI64,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        // Clonar el Arc y soltar la referencia al shard antes de bloquear:
        // mantener el guard del mapa mientras se espera el mutex podría
        // trabar accesos no relacionados del mismo shard.
        self.locks.entry(id).or_default().clone()
    }
}

/// Transacción pendiente: los writes se aplican sobre copias locales y solo
/// se publican en los mapas si el cuerpo devuelve `Ok` (el rollback es
/// simplemente descartar).
struct MemoryTx<'s> {
    store: &'s InMemoryFlowStore,
    row: Flow,
    inserted_transitions: Vec<TransitionRecord>,
    inserted_artefacts: Vec<ArtefactRecord>,
}

impl FlowTx for MemoryTx<'_> {
    fn current(&self) -> &Flow {
        &self.row
    }

    fn insert_transition(&mut self, from: &str, to: &str) -> Result<TransitionRecord, StoreError> {
        let now = Utc::now();
        let record = TransitionRecord { id: self.store.next_transition_id.fetch_add(1, Ordering::SeqCst) + 1,
                                        flow_id: self.row.id,
                                        transitioned_from: from.to_string(),
                                        transitioned_to: to.to_string(),
                                        created_at: now,
                                        updated_at: now };
        self.inserted_transitions.push(record.clone());
        Ok(record)
    }

    fn update_state(&mut self, change: &StateChange) -> Result<(), StoreError> {
        self.row.current_state = change.to.clone();
        self.row.completed_at = change.completed_at;
        if let Some(ts) = change.errored_at {
            self.row.last_errored_at = Some(ts);
        }
        self.row.updated_at = Utc::now();
        Ok(())
    }

    fn insert_artefact(&mut self, transition_id: i64, name: &str, payload: Value) -> Result<ArtefactRecord, StoreError> {
        let now = Utc::now();
        let record = ArtefactRecord { id: self.store.next_artefact_id.fetch_add(1, Ordering::SeqCst) + 1,
                                      transition_id,
                                      name: name.to_string(),
                                      payload,
                                      created_at: now,
                                      updated_at: now };
        self.inserted_artefacts.push(record.clone());
        Ok(record)
    }
}

impl FlowStore for InMemoryFlowStore {
    fn insert_flow(&self, new: NewFlow) -> Result<Flow, StoreError> {
        let now = Utc::now();
        let flow = Flow { id: Uuid::new_v4(),
                          flow_type: new.flow_type,
                          current_state: new.current_state,
                          props: new.props,
                          completed_at: None,
                          last_errored_at: None,
                          created_at: now,
                          updated_at: now };
        self.flows.insert(flow.id, flow.clone());
        Ok(flow)
    }

    fn find_flow(&self, id: Uuid) -> Result<Flow, StoreError> {
        self.flows.get(&id).map(|r| r.clone()).ok_or(StoreError::NotFound)
    }

    fn with_flow_lock<T>(&self,
                         id: Uuid,
                         body: &mut dyn FnMut(&mut dyn FlowTx) -> Result<T, EngineError>)
                         -> Result<T, EngineError> {
        let lock = self.record_lock(id);
        let _guard = lock.lock()
                         .map_err(|_| EngineError::Store(StoreError::Backend("poisoned record lock".into())))?;

        // Relectura autoritativa bajo el lock. Un flow borrado entre la
        // lectura optimista y la adquisición debe fallar como not-found.
        let row = self.flows.get(&id).map(|r| r.clone()).ok_or(EngineError::NotFound(id))?;

        let mut tx = MemoryTx { store: self,
                                row,
                                inserted_transitions: Vec::new(),
                                inserted_artefacts: Vec::new() };
        let out = body(&mut tx)?;

        // Commit: publicar fila y filas hijas, aún bajo el lock.
        let MemoryTx { row, inserted_transitions, inserted_artefacts, .. } = tx;
        for t in inserted_transitions {
            self.transitions.entry(t.flow_id).or_default().push(t);
        }
        for a in inserted_artefacts {
            self.artefacts.entry(a.transition_id).or_default().push(a);
        }
        self.flows.insert(id, row);
        Ok(out)
    }

    fn delete_flow(&self, id: Uuid) -> Result<(), StoreError> {
        self.flows.remove(&id);
        if let Some((_, transitions)) = self.transitions.remove(&id) {
            for t in transitions {
                self.artefacts.remove(&t.id);
            }
        }
        self.locks.remove(&id);
        Ok(())
    }

    fn transitions(&self, flow_id: Uuid) -> Result<Vec<TransitionRecord>, StoreError> {
        Ok(self.transitions.get(&flow_id).map(|v| v.clone()).unwrap_or_default())
    }

    fn artefacts(&self, transition_id: i64) -> Result<Vec<ArtefactRecord>, StoreError> {
        Ok(self.artefacts.get(&transition_id).map(|v| v.clone()).unwrap_or_default())
    }
}
