pub mod orchestrator;
pub mod phase_timings;

pub use orchestrator::{extract_all, ExtractionOrchestrator};
pub use phase_timings::{OrchestrationPhase, PhaseTimings};
