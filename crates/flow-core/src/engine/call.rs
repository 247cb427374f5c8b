//! Construcción de una llamada de transición.
//!
//! `TransitionCall` junta los argumentos de la operación: conjunto `from`,
//! estado destino `to`, y opcionalmente guard, artefacto a persistir y
//! callback de éxito. Se consume en `FlowEngine::transition`.

use flow_domain::Flow;
use serde_json::Value;

use crate::engine::TransitionOutcome;

/// Predicado que debe cumplirse para que la transición proceda. Se evalúa
/// contra el estado en memoria, antes de cualquier mutación persistida.
pub type Guard<'a> = Box<dyn Fn(&Flow) -> bool + 'a>;

/// Productor del payload de un artefacto.
pub type ArtefactProducer<'a> = Box<dyn FnOnce(&Flow) -> Value + 'a>;

/// Callback posterior al commit (y al destroy, si aplica). Corre fuera del
/// lock; sus efectos no tienen garantía de atomicidad.
pub type OnSuccess<'a> = Box<dyn FnOnce(&TransitionOutcome) + 'a>;

pub struct TransitionCall<'a> {
    pub(crate) from: Vec<String>,
    pub(crate) to: String,
    pub(crate) guard: Option<Guard<'a>>,
    pub(crate) artefact: Option<(String, ArtefactProducer<'a>)>,
    pub(crate) on_success: Option<OnSuccess<'a>>,
}

impl<'a> TransitionCall<'a> {
    /// `from` admite varios estados origen aceptables; la transición
    /// procede si el estado autoritativo es cualquiera de ellos.
    pub fn new<I, S>(from: I, to: &str) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        Self { from: from.into_iter().map(Into::into).collect(),
               to: to.to_string(),
               guard: None,
               artefact: None,
               on_success: None }
    }

    pub fn guard(mut self, guard: impl Fn(&Flow) -> bool + 'a) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Declara el artefacto a capturar en esta transición.
    ///
    /// El productor se invoca ANTES de adquirir el lock del registro: puede
    /// correr contra estado potencialmente viejo y debe tolerar invocación
    /// especulativa, porque su resultado se descarta si la verificación
    /// autoritativa de `from` falla bajo el lock. El payload se valida y
    /// persiste recién dentro de la sección crítica.
    pub fn persists(mut self, name: &str, producer: impl FnOnce(&Flow) -> Value + 'a) -> Self {
        self.artefact = Some((name.to_string(), Box::new(producer)));
        self
    }

    pub fn on_success(mut self, callback: impl FnOnce(&TransitionOutcome) + 'a) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }
}
