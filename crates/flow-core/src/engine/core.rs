//! Motor de transiciones.
//!
//! Responsable de la validación de entradas, la evaluación de guards, el
//! commit atómico estado + historial + artefacto bajo lock por registro, y
//! la política de completitud/destrucción posterior al commit. El motor es
//! sincrónico y bloqueante; la concurrencia proviene de llamadores
//! independientes contra el mismo store.

use std::sync::Arc;

use chrono::Utc;
use flow_domain::{ArtefactRecord, Flow, FlowSpec, TransitionRecord};
use serde_json::Value;
use uuid::Uuid;

use crate::engine::TransitionCall;
use crate::errors::{EngineError, StoreError};
use crate::store::{FlowStore, NewFlow, StateChange};

/// Resultado de una transición comprometida.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    /// Fila del flow tras el commit. Si `destroyed` es `true`, es la última
    /// observación posible: la identidad ya no persiste.
    pub flow: Flow,
    pub transition: TransitionRecord,
    pub artefact: Option<ArtefactRecord>,
    /// `true` si la política destroy-on-complete borró el registro.
    pub destroyed: bool,
}

/// Motor ligado a un `FlowSpec` inmutable y a un store transaccional.
///
/// Un engine por tipo de flow; varios engines pueden compartir el mismo
/// store (vía `Arc<S>`) y operar en paralelo sobre flows distintos.
#[derive(Debug)]
pub struct FlowEngine<S: FlowStore> {
    spec: Arc<FlowSpec>,
    store: S,
}

impl<S: FlowStore> FlowEngine<S> {
    pub fn new(spec: Arc<FlowSpec>, store: S) -> Self {
        Self { spec, store }
    }

    pub fn spec(&self) -> &FlowSpec {
        &self.spec
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Crea una instancia del tipo.
    ///
    /// Validación de construcción: inicial y completado deben estar
    /// declarados y pertenecer al conjunto de estados; `current_state`
    /// arranca en el inicial. Las violaciones de props se acumulan todas y
    /// viajan como datos en `InvalidProps` (ningún insert ocurre si hay
    /// alguna).
    pub fn create(&self, props: Value) -> Result<Flow, EngineError> {
        let initial = self.spec
                          .initial_state()
                          .ok_or_else(|| EngineError::MissingInitialState(self.spec.name().to_string()))?;
        let completed = self.spec
                            .completed_state()
                            .ok_or_else(|| EngineError::MissingCompletedState(self.spec.name().to_string()))?;
        for state in [initial, completed] {
            if !self.spec.is_declared(state) {
                return Err(EngineError::UnknownState(state.to_string()));
            }
        }

        let violations = self.spec.props_schema().validate(&props);
        if !violations.is_empty() {
            return Err(EngineError::InvalidProps(violations));
        }

        let flow = self.store
                       .insert_flow(NewFlow { flow_type: self.spec.name().to_string(),
                                              current_state: initial.to_string(),
                                              props })?;
        Ok(flow)
    }

    /// Lee un flow por id; un id destruido es not-found, no un error de
    /// validación de estado.
    pub fn find(&self, id: Uuid) -> Result<Flow, EngineError> {
        self.store.find_flow(id).map_err(|e| match e {
                                    StoreError::NotFound => EngineError::NotFound(id),
                                    other => EngineError::Store(other),
                                })
    }

    /// Ejecuta una transición guardada y atómica.
    ///
    /// Orden: normalización de vocabulario -> chequeo optimista de `from`
    /// (salida temprana barata) -> guard -> productor de artefacto -> lock
    /// por registro + transacción (re-chequeo autoritativo, fila de
    /// transición, update de estado, validación e inserción del artefacto)
    /// -> commit -> destroy-on-complete -> `on_success`. Todo fallo dentro
    /// de la sección crítica revierte la transacción completa.
    pub fn transition(&self, id: Uuid, call: TransitionCall<'_>) -> Result<TransitionOutcome, EngineError> {
        let TransitionCall { from, to, guard, artefact, on_success } = call;

        // Normalizar from/to al vocabulario declarado del tipo.
        let mut from_states: Vec<String> = Vec::with_capacity(from.len());
        for state in from {
            if !self.spec.is_declared(&state) {
                return Err(EngineError::UnknownState(state));
            }
            if !from_states.contains(&state) {
                from_states.push(state);
            }
        }
        if !self.spec.is_declared(&to) {
            return Err(EngineError::UnknownState(to));
        }

        // Lectura optimista: entrada del guard y del productor. Puede estar
        // vieja; solo el chequeo bajo lock es autoritativo.
        let snapshot = self.find(id)?;
        if !from_states.iter().any(|s| *s == snapshot.current_state) {
            return Err(EngineError::InvalidTransition { current: snapshot.current_state.clone(),
                                                        expected: from_states });
        }

        // Guard contra el estado en memoria. Ninguna mutación persistida
        // ocurrió todavía.
        if let Some(guard) = &guard {
            if !guard(&snapshot) {
                return Err(EngineError::GuardFailed(to));
            }
        }

        // Artefacto: nombre declarado e invocación (especulativa) del
        // productor, antes del lock. El payload se valida dentro de la tx.
        let mut prepared = match artefact {
            Some((name, producer)) => {
                if !self.spec.artefact_schema().contains(&name) {
                    return Err(EngineError::UnknownArtefact(name));
                }
                Some((name, producer(&snapshot)))
            }
            None => None,
        };

        // Lock por registro + transacción.
        let spec = Arc::clone(&self.spec);
        let to_state = to;
        let from_set = from_states;
        let (flow, transition, artefact) =
            self.store.with_flow_lock(id, &mut |tx| {
                          // Re-chequeo autoritativo de from bajo el lock.
                          let current = tx.current();
                          if !from_set.iter().any(|s| *s == current.current_state) {
                              return Err(EngineError::InvalidTransition { current: current.current_state.clone(),
                                                                          expected: from_set.clone() });
                          }
                          let transitioned_from = current.current_state.clone();

                          // Fila de transición (auditoría append-only).
                          let record = tx.insert_transition(&transitioned_from, &to_state)?;

                          // Estado + marcas temporales.
                          let now = Utc::now();
                          let entering_completed = spec.completed_state() == Some(to_state.as_str());
                          let change = StateChange { to: to_state.clone(),
                                                     completed_at: entering_completed.then_some(now),
                                                     errored_at: spec.is_error_state(&to_state).then_some(now) };
                          tx.update_state(&change)?;

                          // Validar e insertar el artefacto preparado.
                          let artefact_row = match prepared.take() {
                              Some((name, payload)) => {
                                  let expected = spec.artefact_schema()
                                                     .kind_of(&name)
                                                     .ok_or_else(|| EngineError::UnknownArtefact(name.clone()))?;
                                  if !expected.matches(&payload) {
                                      return Err(EngineError::PayloadValidation { name, expected });
                                  }
                                  Some(tx.insert_artefact(record.id, &name, payload)?)
                              }
                              None => None,
                          };

                          Ok((tx.current().clone(), record, artefact_row))
                      })?;

        // Política de completitud, después del commit y fuera de la
        // sección crítica: no forma parte de la garantía atómica. Un crash
        // entre commit y delete deja un residuo completado-sin-borrar,
        // seguro e idempotente.
        let mut destroyed = false;
        if self.spec.destroy_on_complete() && self.spec.completed(&flow) {
            self.store.delete_flow(flow.id)?;
            destroyed = true;
        }

        let outcome = TransitionOutcome { flow, transition, artefact, destroyed };

        // Callback de éxito, fuera del lock y después del destroy.
        if let Some(callback) = on_success {
            callback(&outcome);
        }

        Ok(outcome)
    }

    /// `true` sii el tipo declara completado y el flow está en él.
    pub fn completed(&self, flow: &Flow) -> bool {
        self.spec.completed(flow)
    }

    /// `true` sii el estado actual pertenece al subconjunto de error.
    pub fn errored(&self, flow: &Flow) -> bool {
        self.spec.errored(flow)
    }

    /// Historial de transiciones del flow (orden de commit).
    pub fn transitions(&self, flow_id: Uuid) -> Result<Vec<TransitionRecord>, EngineError> {
        Ok(self.store.transitions(flow_id)?)
    }

    /// Artefactos capturados por una transición.
    pub fn artefacts(&self, transition_id: i64) -> Result<Vec<ArtefactRecord>, EngineError> {
        Ok(self.store.artefacts(transition_id)?)
    }
}
