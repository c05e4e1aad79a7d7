//! `opspilot-agents`
//!
//! **Responsibility:** analysis units and the orchestration core that runs them.
//!
//! - [`Registry`] maps unique names to [`AnalysisUnit`]s in insertion order.
//! - [`Orchestrator`] runs one or all units with failure isolation.
//! - [`AuditLogWriter`] records one audit row per execution attempt (best-effort).
//!
//! Units never mutate global state; all persistence goes through the
//! [`opspilot_core::DataStore`] carried by the [`AgentContext`].

pub mod audit;
pub mod narrative;
pub mod orchestrator;
pub mod registry;
pub mod result;
pub mod unit;
pub mod units;

pub use audit::{AuditLogWriter, AuditWriteError};
pub use narrative::{NarrativeError, NarrativeService};
pub use orchestrator::{BatchEntry, BatchRunResult, BatchStatus, Orchestrator, OrchestratorConfig, OrchestratorError};
pub use registry::{AgentState, AgentStatus, Registry, RegistryError};
pub use result::{AgentError, AnalysisResult, Findings};
pub use unit::{AgentContext, AnalysisUnit, Trigger};
