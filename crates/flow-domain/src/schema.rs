//! Esquemas de payload (props del flow y artefactos de transición).
//!
//! Un `PayloadSchema` es un mapa `nombre -> descriptor de tipo`. La
//! validación devuelve TODAS las violaciones encontradas (campo faltante,
//! tipo incorrecto) en lugar de cortar en la primera; el llamador decide si
//! acumula (camino de construcción/guardado) o eleva (camino de transición).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Descriptor de tipo admitido para un campo de payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Array,
    /// Cualquier valor JSON no nulo.
    Any,
}

impl PayloadKind {
    /// Chequea si `value` pertenece al tipo descrito.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            PayloadKind::String => value.is_string(),
            PayloadKind::Integer => value.is_i64() || value.is_u64(),
            // Un entero JSON es un float válido (serde_json no promociona solo).
            PayloadKind::Float => value.is_number(),
            PayloadKind::Boolean => value.is_boolean(),
            PayloadKind::Object => value.is_object(),
            PayloadKind::Array => value.is_array(),
            PayloadKind::Any => !value.is_null(),
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayloadKind::String => "string",
            PayloadKind::Integer => "integer",
            PayloadKind::Float => "float",
            PayloadKind::Boolean => "boolean",
            PayloadKind::Object => "object",
            PayloadKind::Array => "array",
            PayloadKind::Any => "any",
        };
        f.write_str(s)
    }
}

/// Violación detectada al validar un payload contra su esquema.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PropViolation {
    #[error("`{field}` missing")]
    Missing { field: String },
    #[error("`{field}` must be {expected}")]
    WrongType { field: String, expected: PayloadKind },
}

impl PropViolation {
    /// Campo al que refiere la violación.
    pub fn field(&self) -> &str {
        match self {
            PropViolation::Missing { field } | PropViolation::WrongType { field, .. } => field,
        }
    }
}

/// Mapa `nombre -> descriptor` con orden de inserción preservado.
///
/// Se usa dos veces por tipo de flow: una para las props del flow y otra
/// para los artefactos producibles en transición. Ambos mapas son
/// independientes entre sí.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadSchema {
    fields: IndexMap<String, PayloadKind>,
}

impl PayloadSchema {
    pub fn new() -> Self {
        Self { fields: IndexMap::new() }
    }

    /// Declara un campo (estilo builder, consume y devuelve `self`).
    pub fn field(mut self, name: &str, kind: PayloadKind) -> Self {
        self.fields.insert(name.to_string(), kind);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Descriptor declarado para `name`, si existe.
    pub fn kind_of(&self, name: &str) -> Option<PayloadKind> {
        self.fields.get(name).copied()
    }

    /// Valida `data` contra el esquema devolviendo todas las violaciones.
    ///
    /// Todo campo declarado es requerido: ausencia o `null` cuentan como
    /// faltante. Un esquema vacío no produce violaciones.
    pub fn validate(&self, data: &Value) -> Vec<PropViolation> {
        let mut violations = Vec::new();
        for (name, kind) in &self.fields {
            match data.get(name) {
                None | Some(Value::Null) => violations.push(PropViolation::Missing { field: name.clone() }),
                Some(v) if !kind.matches(v) => violations.push(PropViolation::WrongType { field: name.clone(),
                                                                                          expected: *kind }),
                Some(_) => {}
            }
        }
        violations
    }
}
