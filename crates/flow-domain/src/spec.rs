//! Especificación inmutable de un tipo de flow.
//!
//! Reemplaza registros mutables a nivel de clase por un valor explícito e
//! inmutable que se construye una vez (vía `FlowSpecBuilder`) y se comparte
//! (`Arc`) con el motor. Después de `build()` no hay mutación posible.
//!
//! Declarar un tipo sin estado inicial/completado es legal; la falta se
//! detecta recién al intentar construir una instancia (el motor valida en
//! `create`).

use indexmap::IndexSet;

use crate::flow::Flow;
use crate::schema::{PayloadKind, PayloadSchema};

/// Descripción estática por tipo de flow: estados declarados (orden de
/// inserción), subconjunto de estados de error, estado inicial/completado
/// opcionales, política de borrado al completar y los dos esquemas de
/// payload.
#[derive(Debug, Clone)]
pub struct FlowSpec {
    name: String,
    states: IndexSet<String>,
    error_states: IndexSet<String>,
    initial_state: Option<String>,
    completed_state: Option<String>,
    destroy_on_complete: bool,
    props_schema: PayloadSchema,
    artefact_schema: PayloadSchema,
}

impl FlowSpec {
    /// Arranca un builder para el tipo `name` (discriminador persistido).
    pub fn builder(name: &str) -> FlowSpecBuilder {
        FlowSpecBuilder { name: name.to_string(),
                          states: IndexSet::new(),
                          error_states: IndexSet::new(),
                          initial_state: None,
                          completed_state: None,
                          destroy_on_complete: false,
                          props_schema: PayloadSchema::new(),
                          artefact_schema: PayloadSchema::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Estados declarados, en orden de declaración.
    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|s| s.as_str())
    }

    pub fn is_declared(&self, state: &str) -> bool {
        self.states.contains(state)
    }

    pub fn is_error_state(&self, state: &str) -> bool {
        self.error_states.contains(state)
    }

    pub fn initial_state(&self) -> Option<&str> {
        self.initial_state.as_deref()
    }

    pub fn completed_state(&self) -> Option<&str> {
        self.completed_state.as_deref()
    }

    pub fn destroy_on_complete(&self) -> bool {
        self.destroy_on_complete
    }

    pub fn props_schema(&self) -> &PayloadSchema {
        &self.props_schema
    }

    pub fn artefact_schema(&self) -> &PayloadSchema {
        &self.artefact_schema
    }

    /// `true` sii el tipo declara estado completado y el flow está en él.
    pub fn completed(&self, flow: &Flow) -> bool {
        self.completed_state.as_deref() == Some(flow.current_state.as_str())
    }

    /// `true` sii el estado actual del flow pertenece al subconjunto de error.
    pub fn errored(&self, flow: &Flow) -> bool {
        self.error_states.contains(flow.current_state.as_str())
    }
}

/// Builder consumible de `FlowSpec`. `build()` no valida completitud: un
/// tipo incompleto falla al construir instancias, no al definirse.
#[derive(Debug)]
pub struct FlowSpecBuilder {
    name: String,
    states: IndexSet<String>,
    error_states: IndexSet<String>,
    initial_state: Option<String>,
    completed_state: Option<String>,
    destroy_on_complete: bool,
    props_schema: PayloadSchema,
    artefact_schema: PayloadSchema,
}

impl FlowSpecBuilder {
    /// Declara un estado.
    pub fn state(mut self, name: &str) -> Self {
        self.states.insert(name.to_string());
        self
    }

    /// Declara un estado y lo marca como estado de error.
    pub fn error_state(mut self, name: &str) -> Self {
        self.states.insert(name.to_string());
        self.error_states.insert(name.to_string());
        self
    }

    pub fn initial_state(mut self, name: &str) -> Self {
        self.initial_state = Some(name.to_string());
        self
    }

    pub fn completed_state(mut self, name: &str) -> Self {
        self.completed_state = Some(name.to_string());
        self
    }

    /// Habilita el borrado del registro al llegar al estado completado.
    pub fn destroy_on_complete(mut self) -> Self {
        self.destroy_on_complete = true;
        self
    }

    /// Declara un campo del payload estructurado del flow.
    pub fn prop(mut self, name: &str, kind: PayloadKind) -> Self {
        self.props_schema = self.props_schema.field(name, kind);
        self
    }

    /// Declara un artefacto producible en transición.
    pub fn persists(mut self, name: &str, kind: PayloadKind) -> Self {
        self.artefact_schema = self.artefact_schema.field(name, kind);
        self
    }

    pub fn build(self) -> FlowSpec {
        FlowSpec { name: self.name,
                   states: self.states,
                   error_states: self.error_states,
                   initial_state: self.initial_state,
                   completed_state: self.completed_state,
                   destroy_on_complete: self.destroy_on_complete,
                   props_schema: self.props_schema,
                   artefact_schema: self.artefact_schema }
    }
}
