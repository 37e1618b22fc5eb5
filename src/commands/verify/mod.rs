mod normalize;
mod orchestrator;
mod run;

pub use run::run;
pub(crate) use normalize::canonical_form;
pub(crate) use orchestrator::{VerificationJob, VerificationOrchestrator};
pub(crate) use run::write_verified;
