//! Errores del motor de transiciones.
//!
//! Taxonomía de dos canales, separados a propósito:
//! - `EngineError`: se eleva sincrónicamente al llamador de
//!   `transition`/`create`. Nada se reintenta internamente; el reintento
//!   ante contención es responsabilidad del llamador.
//! - Las violaciones de props NO se elevan una por una: viajan acumuladas
//!   como datos dentro de `EngineError::InvalidProps` (camino de
//!   construcción/guardado), a diferencia del payload de artefacto que
//!   falla con `PayloadValidation` en plena transición.

use flow_domain::{PayloadKind, PropViolation};
use thiserror::Error;
use uuid::Uuid;

/// Errores de la capa de almacenamiento, neutrales al backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")] NotFound,
    #[error("storage backend: {0}")] Backend(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// `from`/`to`/inicial/completado refiere un estado no declarado.
    #[error("unknown state `{0}`")]
    UnknownState(String),
    /// El estado autoritativo (bajo lock) no pertenece al conjunto `from`.
    #[error("state `{current}` not in {expected:?}")]
    InvalidTransition { current: String, expected: Vec<String> },
    #[error("guard failed for `{0}`")]
    GuardFailed(String),
    /// Nombre de artefacto no declarado en el esquema del tipo.
    #[error("artefact `{0}` not declared")]
    UnknownArtefact(String),
    /// El payload del artefacto no es del tipo declarado.
    #[error("artefact `{name}` must be {expected}")]
    PayloadValidation { name: String, expected: PayloadKind },
    #[error("no initial state declared for `{0}`")]
    MissingInitialState(String),
    #[error("no completed state declared for `{0}`")]
    MissingCompletedState(String),
    /// Violaciones de props acumuladas (todas, no solo la primera).
    #[error("invalid props: {0:?}")]
    InvalidProps(Vec<PropViolation>),
    /// El flow no existe (incluye el caso post-destroy: la identidad no
    /// persiste después del borrado por política de completitud).
    #[error("flow {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}
