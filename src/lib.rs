//! conclave - a multi-expert debate engine for decision intelligence.
//!
//! A user poses a decision question; a panel of simulated experts debates it
//! over multiple rounds and converges on a ranked set of options with a
//! consensus score. Four subsystems carry the weight:
//!
//! - **Readiness assessment** (`readiness`): does the question have enough
//!   stated context to debate at all?
//! - **Orchestration** (`orchestrator`): the round state machine, concurrent
//!   expert turns with deterministic transcript order, and moderator
//!   interventions.
//! - **Scoring** (`scoring`): consensus and quality signals derived from the
//!   transcript, idempotently.
//! - **Argument graphs** (`graph`): claims and relations extracted from the
//!   same transcript, cacheable by debate id.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   Client / UI layer                  │
//! └──────────────────────┬───────────────────────────────┘
//!                        │ DebateService commands
//!                        ▼
//! ┌──────────────────────────────────────────────────────┐
//! │  readiness::analyze / refine     (pre-debate, pure)  │
//! │  orchestrator round loop  ──► scoring + graph        │
//! │  store (memory / sqlite)      billing (credits)      │
//! │  agent::AgentPort  ◄── http adapter or scripted stub │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The model call itself is an injected capability (`agent::AgentPort`);
//! tests run the whole engine against `agent::ScriptedAgent`.

pub mod agent;
pub mod billing;
pub mod dimensions;
pub mod error;
pub mod graph;
pub mod http;
pub mod orchestrator;
pub mod panel;
pub mod readiness;
pub mod scoring;
pub mod service;
pub mod store;
pub mod types;

// Core surface
pub use error::{DebateError, Result};
pub use service::DebateService;
pub use types::*;

// Readiness endpoints
pub use readiness::{analyze, refine, Answer, RefineOutcome};

// Orchestration
pub use orchestrator::{Orchestrator, OrchestratorConfig};

// Agent boundary
pub use agent::{AgentFailure, AgentPort, AgentReply, ScriptedAgent, ScriptedTurn};
pub use http::{HttpAgentClient, HttpAgentConfig};

// Derived views
pub use graph::{build_graph, GraphBuilder, GraphConfig};
pub use scoring::{consensus_score, quality_metrics, Preference};

// Persistence boundary
pub use store::{DebateStore, MemoryStore, SqliteStore};

// Billing
pub use billing::CreditPolicy;

// Panels
pub use panel::default_panel;
