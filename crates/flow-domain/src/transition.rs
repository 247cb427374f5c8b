//! Registro de auditoría de un cambio de estado.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fila append-only: un `TransitionRecord` nunca se modifica después de su
/// creación. `transitioned_to` coincide con el `current_state` del flow en
/// el instante del commit.
///
/// `id` es secuencial (BIGSERIAL en Postgres) y da el orden total del
/// historial; los timestamps son metadato, no orden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: i64,
    pub flow_id: Uuid,
    pub transitioned_from: String,
    pub transitioned_to: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
