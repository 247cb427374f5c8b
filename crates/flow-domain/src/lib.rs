// flow-domain library entry point
pub mod artefact;
pub mod flow;
pub mod schema;
pub mod spec;
pub mod transition;
pub use artefact::ArtefactRecord;
pub use flow::Flow;
pub use schema::{PayloadKind, PayloadSchema, PropViolation};
pub use spec::{FlowSpec, FlowSpecBuilder};
pub use transition::TransitionRecord;
