//! Motor de transiciones y la forma de sus llamadas.

pub mod call;
pub mod core;

pub use call::{ArtefactProducer, Guard, OnSuccess, TransitionCall};
pub use self::core::{FlowEngine, TransitionOutcome};
