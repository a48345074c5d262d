pub mod advice;
pub mod hypothesis;
pub mod root_cause;
pub mod severity;

pub use hypothesis::HypothesisPhase;
pub use root_cause::RootCausePhase;
pub use severity::SeverityPhase;
