//! Artefacto: payload lateral capturado en el momento de una transición.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fila inmutable ligada a la transición que la produjo. Solo existe si esa
/// transición comprometió con un payload del tipo declarado; el motor crea a
/// lo sumo uno por llamada de transición.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtefactRecord {
    pub id: i64,
    pub transition_id: i64,
    /// Nombre declarado en el esquema de artefactos del tipo.
    pub name: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
