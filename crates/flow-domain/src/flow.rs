//! Entidad `Flow`: el registro persistido cuyo ciclo de vida se modela como
//! máquina de estados finitos.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Fila persistida de un flow.
///
/// Invariante: `current_state` siempre es miembro del conjunto declarado
/// para `flow_type`; nunca es nulo después de la construcción. El motor es
/// el único camino de escritura.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: Uuid,
    /// Discriminador de tipo (el `name` del `FlowSpec`).
    pub flow_type: String,
    pub current_state: String,
    /// Payload estructurado, validado contra el esquema de props.
    pub props: Value,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_errored_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    /// Lookup único sobre el payload validado (no hay accessors dinámicos).
    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    /// Variante tipada de `prop`; `None` si falta o no deserializa a `T`.
    pub fn prop_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.prop(name).cloned().and_then(|v| serde_json::from_value(v).ok())
    }
}
