//! Update services
//!
//! Everything a run needs apart from the transport: the orchestrator, its
//! output sinks, fault log files and the per-run context. Shells only build
//! these pieces and print the outcome.

pub mod fault_log;
pub mod output;
pub mod run_context;
#[cfg(test)]
pub(crate) mod testing;
pub mod translation;
pub mod upgrade;
