pub mod actor;
pub mod enrichment;
pub mod filters;
pub mod orchestrator;
pub mod presets;
pub mod query;
pub mod state;
