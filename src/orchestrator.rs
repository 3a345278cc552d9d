//! Debate orchestration: the state machine and round scheduler.
//!
//! One debate runs its round loop as a single logical task. Within a round
//! every assigned expert is invoked concurrently, but results are appended
//! in expert assignment order, never completion order, so transcripts are
//! reproducible regardless of network timing. Pause takes effect at the
//! next round boundary; in-flight calls are allowed to finish so paid-for
//! work is never discarded.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;

use crate::agent::{AgentFailure, AgentPort};
use crate::error::{DebateError, Result};
use crate::scoring;
use crate::store::DebateStore;
use crate::types::{
    Debate, DebateStatus, Expert, FinalRankingEntry, InterventionKind, Message, Round,
};

/// Tunable loop parameters. The moderator thresholds are deliberately
/// configuration, not constants; the tests pin the defaults.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard cap per agent call; an elapsed timeout records a skipped turn.
    pub per_call_timeout: Duration,
    /// Bounded retries for transient agent failures within a turn.
    pub max_retries: u32,
    /// Base backoff between retries, doubled per attempt.
    pub retry_backoff: Duration,
    /// Seal-and-stop once consensus crosses this.
    pub early_stop_consensus: f64,
    /// Mean pairwise expert overlap above this reads as stagnation.
    pub stagnation_overlap: f64,
    /// Consensus movement below this across rounds reads as a stall.
    pub stall_delta: f64,
    /// Round coverage of the question's vocabulary below this reads as
    /// drift.
    pub drift_floor: f64,
    /// Verbatim transcript budget before older rounds are compressed.
    pub history_char_budget: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            per_call_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
            early_stop_consensus: 0.9,
            stagnation_overlap: 0.6,
            stall_delta: 0.02,
            drift_floor: 0.05,
            history_char_budget: 4000,
        }
    }
}

/// Drives debates from `in_progress` to a terminal status.
pub struct Orchestrator {
    store: Arc<dyn DebateStore>,
    agents: Arc<dyn AgentPort>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn DebateStore>, agents: Arc<dyn AgentPort>) -> Self {
        Self {
            store,
            agents,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the round loop for an `in_progress` debate until it completes,
    /// fails, or hits a pause. Returns the debate as persisted on exit;
    /// a fatal fault persists `failed` and surfaces `OrchestratorFatal`.
    pub async fn run(&self, debate_id: &str) -> Result<Debate> {
        loop {
            let debate = self
                .store
                .load(debate_id)
                .await?
                .ok_or_else(|| DebateError::NotFound(debate_id.to_string()))?;

            if debate.status != DebateStatus::InProgress {
                return Err(DebateError::InvalidState(format!(
                    "round loop needs in_progress, debate {} is {}",
                    debate_id,
                    debate.status.name()
                )));
            }
            if debate.paused {
                tracing::info!(debate = %debate_id, "paused at round boundary");
                return Ok(debate);
            }
            if debate.rounds.len() as u32 >= debate.max_rounds {
                return self.finalize(debate_id).await;
            }

            let round_number = debate.rounds.len() as u32 + 1;
            let prompt = build_prompt(&debate, self.config.history_char_budget);
            let history: Vec<Message> = debate.transcript().cloned().collect();

            tracing::info!(
                debate = %debate_id,
                round = round_number,
                experts = debate.experts.len(),
                "starting round"
            );

            // Concurrent fan-out; join_all keeps assignment order, which
            // fixes the transcript order.
            let turns = join_all(
                debate
                    .experts
                    .iter()
                    .map(|expert| self.expert_turn(expert, round_number, &prompt, &history)),
            )
            .await;

            let mut messages: Vec<Message> = turns.into_iter().flatten().collect();
            if messages.is_empty() {
                return self
                    .fail(debate_id, "no expert responded in the round")
                    .await;
            }

            if let Some(intervention) =
                self.moderate(&debate, round_number, &messages)
            {
                tracing::info!(
                    debate = %debate_id,
                    round = round_number,
                    kind = ?intervention.intervention,
                    "moderator intervention"
                );
                messages.push(intervention);
            }

            let round_cost: f64 = messages.iter().map(|m| m.cost_usd).sum();
            let sealed = self
                .store
                .update(
                    debate_id,
                    Box::new(move |d| {
                        if d.status != DebateStatus::InProgress {
                            return Err(DebateError::InvalidState(
                                "debate left in_progress while a round was in flight".into(),
                            ));
                        }
                        d.rounds.push(Round::sealed(round_number, messages));
                        d.total_cost_usd += round_cost;
                        d.consensus_score = scoring::consensus_score(&d.rounds);
                        d.quality = Some(scoring::quality_metrics(&d.rounds));
                        Ok(())
                    }),
                )
                .await?;

            tracing::debug!(
                debate = %debate_id,
                round = round_number,
                consensus = sealed.consensus_score,
                "round sealed"
            );

            if sealed.consensus_score >= self.config.early_stop_consensus {
                tracing::info!(
                    debate = %debate_id,
                    round = round_number,
                    consensus = sealed.consensus_score,
                    "early stop on consensus"
                );
                return self.finalize(debate_id).await;
            }
        }
    }

    /// One expert's turn: timeout, bounded retries on transient failures,
    /// skip on rejection. Returns None when the turn is skipped.
    async fn expert_turn(
        &self,
        expert: &Expert,
        round: u32,
        prompt: &str,
        history: &[Message],
    ) -> Option<Message> {
        let mut attempt = 0u32;
        loop {
            let call = self.agents.invoke(expert, prompt, history);
            match tokio::time::timeout(self.config.per_call_timeout, call).await {
                Ok(Ok(reply)) => {
                    return Some(Message::from_expert(
                        round,
                        &expert.id,
                        reply.text,
                        reply.tokens_used,
                        reply.cost_usd,
                    ))
                }
                Ok(Err(AgentFailure::ContentRejected(reason))) => {
                    tracing::warn!(expert = %expert.id, %reason, "turn rejected, skipping");
                    return None;
                }
                Ok(Err(AgentFailure::Transient(reason))) => {
                    if attempt >= self.config.max_retries {
                        tracing::warn!(
                            expert = %expert.id,
                            %reason,
                            "retries exhausted, skipping turn"
                        );
                        return None;
                    }
                    let backoff = self.config.retry_backoff * 2u32.saturating_pow(attempt);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(_elapsed) => {
                    tracing::warn!(expert = %expert.id, "call timed out, skipping turn");
                    return None;
                }
            }
        }
    }

    /// Meta-moderator policy: at most one intervention per round. Drift
    /// beats stagnation when both trigger.
    fn moderate(
        &self,
        debate: &Debate,
        round_number: u32,
        round_messages: &[Message],
    ) -> Option<Message> {
        let question_tokens = scoring::tokens(&debate.question);
        let message_tokens: Vec<HashSet<String>> = round_messages
            .iter()
            .map(|m| scoring::tokens(&m.content))
            .collect();

        if !question_tokens.is_empty() {
            let covered = question_tokens
                .iter()
                .filter(|t| message_tokens.iter().any(|set| set.contains(*t)))
                .count();
            let coverage = covered as f64 / question_tokens.len() as f64;
            if coverage < self.config.drift_floor {
                return Some(Message::intervention(
                    round_number,
                    InterventionKind::Redirect,
                    format!(
                        "The discussion has drifted. Refocus on the original question: {}",
                        debate.question
                    ),
                ));
            }
        }

        let stagnated = if message_tokens.len() >= 2 {
            let mut similarity_sum = 0.0;
            let mut pairs = 0usize;
            for i in 0..message_tokens.len() {
                for j in (i + 1)..message_tokens.len() {
                    similarity_sum += scoring::jaccard(&message_tokens[i], &message_tokens[j]);
                    pairs += 1;
                }
            }
            similarity_sum / pairs as f64 > self.config.stagnation_overlap
        } else {
            false
        };

        let stalled = if !debate.rounds.is_empty() {
            let mut extended = debate.rounds.clone();
            extended.push(Round::sealed(round_number, round_messages.to_vec()));
            (scoring::consensus_score(&extended) - debate.consensus_score).abs()
                < self.config.stall_delta
        } else {
            false
        };

        if stagnated || stalled {
            return Some(Message::intervention(
                round_number,
                InterventionKind::Deepen,
                "The panel is converging on familiar ground. Take the strongest \
                 unresolved objection and examine it in depth before restating positions."
                    .to_string(),
            ));
        }

        None
    }

    /// Derive the final ranking and complete the debate. A transcript with
    /// no extractable preferences cannot be ranked and fails instead.
    async fn finalize(&self, debate_id: &str) -> Result<Debate> {
        let debate = self
            .store
            .load(debate_id)
            .await?
            .ok_or_else(|| DebateError::NotFound(debate_id.to_string()))?;

        let ranking = derive_ranking(&debate);
        if ranking.is_empty() {
            return self
                .fail(debate_id, "no ranking derivable from the transcript")
                .await;
        }

        let completed = self
            .store
            .update(
                debate_id,
                Box::new(move |d| {
                    d.status = DebateStatus::Completed;
                    d.final_ranking = ranking;
                    d.consensus_score = scoring::consensus_score(&d.rounds);
                    d.quality = Some(scoring::quality_metrics(&d.rounds));
                    d.completed_at = Some(Utc::now());
                    d.paused = false;
                    Ok(())
                }),
            )
            .await?;

        tracing::info!(
            debate = %debate_id,
            rounds = completed.rounds.len(),
            consensus = completed.consensus_score,
            "debate completed"
        );
        Ok(completed)
    }

    /// Persist the failed status (rounds retained) and surface the fault.
    async fn fail(&self, debate_id: &str, reason: &str) -> Result<Debate> {
        tracing::error!(debate = %debate_id, reason, "debate failed");
        self.store
            .update(
                debate_id,
                Box::new(|d| {
                    d.status = DebateStatus::Failed;
                    d.completed_at = Some(Utc::now());
                    d.paused = false;
                    Ok(())
                }),
            )
            .await?;
        Err(DebateError::OrchestratorFatal(reason.to_string()))
    }
}

/// Shared round prompt: question, accumulated context, history. Older
/// rounds are compressed (not dropped) once the verbatim transcript
/// exceeds the budget.
fn build_prompt(debate: &Debate, history_char_budget: usize) -> String {
    let mut prompt = format!("Question: {}\n", debate.question);

    if let Some(background) = &debate.context.background {
        prompt.push_str(&format!("Background: {}\n", background));
    }
    if !debate.context.constraints.is_empty() {
        prompt.push_str("Constraints:\n");
        for constraint in &debate.context.constraints {
            prompt.push_str(&format!("- {}\n", constraint));
        }
    }
    if !debate.context.additional.is_empty() {
        prompt.push_str("Additional context:\n");
        for entry in &debate.context.additional {
            prompt.push_str(&format!("- {}\n", entry.text));
        }
    }

    if !debate.rounds.is_empty() {
        prompt.push_str(&render_history(&debate.rounds, history_char_budget));
    }

    prompt.push_str(
        "\nState your position with explicit reasoning. End with a line \
         `RECOMMENDATION: <option>` and a line `CONFIDENCE: <0-1>`.\n",
    );
    prompt
}

fn render_history(rounds: &[Round], budget: usize) -> String {
    let verbatim = rounds
        .iter()
        .map(render_round_verbatim)
        .collect::<Vec<_>>()
        .join("");

    if verbatim.len() <= budget {
        return format!("Discussion so far:\n{}", verbatim);
    }

    // Over budget: compress every round but the newest to one line per
    // message.
    let (older, newest) = rounds.split_at(rounds.len() - 1);
    let mut out = String::from("Discussion so far (earlier rounds summarized):\n");
    for round in older {
        out.push_str(&format!("Round {}:\n", round.number));
        for message in &round.messages {
            let summary: String = message.content.chars().take(100).collect();
            out.push_str(&format!("  [{}] {}\n", message.author_id, summary));
        }
    }
    for round in newest {
        out.push_str(&render_round_verbatim(round));
    }
    out
}

fn render_round_verbatim(round: &Round) -> String {
    let mut out = format!("Round {}:\n", round.number);
    for message in &round.messages {
        out.push_str(&format!("  [{}] {}\n", message.author_id, message.content));
    }
    out
}

/// Rank candidate options by confidence-weighted expert support.
fn derive_ranking(debate: &Debate) -> Vec<FinalRankingEntry> {
    let preferences = scoring::latest_preferences(&debate.rounds);
    if preferences.is_empty() {
        return Vec::new();
    }

    let total_weight: f64 = preferences.iter().map(|p| p.confidence.max(0.01)).sum();
    let mut by_option: std::collections::BTreeMap<&str, Vec<&scoring::Preference>> =
        std::collections::BTreeMap::new();
    for preference in &preferences {
        by_option
            .entry(preference.option.as_str())
            .or_default()
            .push(preference);
    }

    let mut entries: Vec<FinalRankingEntry> = by_option
        .into_iter()
        .map(|(option, group)| {
            let weight: f64 = group.iter().map(|p| p.confidence.max(0.01)).sum();
            let (pros, cons) = collect_pros_cons(debate, option);
            let mut supporting: Vec<String> =
                group.iter().map(|p| p.expert_id.clone()).collect();
            supporting.sort();
            let confidence = weight / group.len() as f64;
            FinalRankingEntry {
                option: option.to_string(),
                score: 100.0 * weight / total_weight,
                reasoning: format!(
                    "{} of {} experts favored \"{}\" after {} round(s)",
                    group.len(),
                    debate.experts.len(),
                    option,
                    debate.rounds.len()
                ),
                supporting_experts: supporting,
                pros,
                cons,
                confidence: confidence.clamp(0.0, 1.0),
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.option.cmp(&b.option))
    });
    entries
}

/// Sentences mentioning the option, bucketed by objection markers.
fn collect_pros_cons(debate: &Debate, option: &str) -> (Vec<String>, Vec<String>) {
    let mut pros = Vec::new();
    let mut cons = Vec::new();
    for message in debate.transcript().filter(|m| !m.is_intervention()) {
        for sentence in message
            .content
            .split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            let lower = sentence.to_lowercase();
            if !lower.contains(option) || lower.starts_with("recommendation:") {
                continue;
            }
            if scoring::has_objection_marker(&lower) {
                if cons.len() < 3 && !cons.iter().any(|c: &String| c == sentence) {
                    cons.push(sentence.to_string());
                }
            } else if pros.len() < 3 && !pros.iter().any(|p: &String| p == sentence) {
                pros.push(sentence.to_string());
            }
        }
    }
    (pros, cons)
}
