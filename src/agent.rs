//! Agent invocation boundary.
//!
//! The language-model call is an injected capability: the orchestrator only
//! ever sees `AgentPort`. Production wires in the HTTP adapter (`http`
//! module); tests and offline runs use `ScriptedAgent`, which replays a
//! fixed script deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Expert, Message};

/// What one agent call produced.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    pub tokens_used: u32,
    pub cost_usd: f64,
}

/// Failure kinds at the invocation boundary. Transient faults are retried
/// with backoff; content rejections are recorded as a skipped turn.
#[derive(Debug, Clone, Error)]
pub enum AgentFailure {
    #[error("transient agent failure: {0}")]
    Transient(String),
    #[error("content rejected: {0}")]
    ContentRejected(String),
}

/// Abstract capability: given an expert, a prompt and the conversation so
/// far, return text plus token/cost usage.
#[async_trait]
pub trait AgentPort: Send + Sync {
    async fn invoke(
        &self,
        expert: &Expert,
        prompt: &str,
        history: &[Message],
    ) -> std::result::Result<AgentReply, AgentFailure>;
}

/// One scripted turn for an expert.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    Say(String),
    TransientFailure,
    Rejected,
}

/// Deterministic `AgentPort` stub. Each expert pops its queued turns in
/// order; when a queue runs dry the default reply is used. Optional
/// per-expert delays let tests exercise completion-order independence.
pub struct ScriptedAgent {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedTurn>>>,
    delays: HashMap<String, Duration>,
    default_reply: String,
    cost_per_call: f64,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            default_reply: "I have nothing further to add.".to_string(),
            cost_per_call: 0.001,
        }
    }

    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    pub fn with_cost_per_call(mut self, cost_usd: f64) -> Self {
        self.cost_per_call = cost_usd;
        self
    }

    /// Queue turns for an expert, consumed one per invocation.
    pub fn script(self, expert_id: &str, turns: Vec<ScriptedTurn>) -> Self {
        self.scripts
            .lock()
            .expect("script lock")
            .entry(expert_id.to_string())
            .or_default()
            .extend(turns);
        self
    }

    /// Convenience: queue plain replies for an expert.
    pub fn says<S: AsRef<str>>(self, expert_id: &str, replies: &[S]) -> Self {
        self.script(
            expert_id,
            replies
                .iter()
                .map(|r| ScriptedTurn::Say(r.as_ref().to_string()))
                .collect(),
        )
    }

    /// Delay this expert's replies, to simulate slow networks.
    pub fn with_delay(mut self, expert_id: &str, delay: Duration) -> Self {
        self.delays.insert(expert_id.to_string(), delay);
        self
    }
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentPort for ScriptedAgent {
    async fn invoke(
        &self,
        expert: &Expert,
        _prompt: &str,
        _history: &[Message],
    ) -> std::result::Result<AgentReply, AgentFailure> {
        if let Some(delay) = self.delays.get(&expert.id) {
            tokio::time::sleep(*delay).await;
        }

        let turn = self
            .scripts
            .lock()
            .expect("script lock")
            .get_mut(&expert.id)
            .and_then(|queue| queue.pop_front());

        let text = match turn {
            Some(ScriptedTurn::TransientFailure) => {
                return Err(AgentFailure::Transient("scripted transient failure".into()))
            }
            Some(ScriptedTurn::Rejected) => {
                return Err(AgentFailure::ContentRejected("scripted rejection".into()))
            }
            Some(ScriptedTurn::Say(text)) => text,
            None => self.default_reply.clone(),
        };

        let tokens = text.split_whitespace().count() as u32;
        Ok(AgentReply {
            text,
            tokens_used: tokens,
            cost_usd: self.cost_per_call,
        })
    }
}
