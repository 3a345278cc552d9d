//! Core types for the conclave debate engine.
//!
//! A `Debate` is the aggregate root: it owns its rounds exclusively, status
//! moves forward only (`draft -> pending -> in_progress -> completed|failed`),
//! and sealed rounds are never edited. Everything derived from a transcript
//! (scores, rankings, argument graphs) is recomputable from these types alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a debate. Transitions are monotonic; pause is a
/// side-flag on the aggregate, not a status value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    Draft,
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl DebateStatus {
    pub fn name(&self) -> &'static str {
        match self {
            DebateStatus::Draft => "draft",
            DebateStatus::Pending => "pending",
            DebateStatus::InProgress => "in_progress",
            DebateStatus::Completed => "completed",
            DebateStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DebateStatus::Draft),
            "pending" => Some(DebateStatus::Pending),
            "in_progress" => Some(DebateStatus::InProgress),
            "completed" => Some(DebateStatus::Completed),
            "failed" => Some(DebateStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DebateStatus::Completed | DebateStatus::Failed)
    }
}

/// How experts are selected for the panel.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DebateMode {
    /// Panel chosen per question category.
    #[default]
    Dynamic,
    /// Caller supplies the panel explicitly.
    Fixed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Shared,
}

/// Category of question being debated. Drives dimension weights and the
/// default expert panel.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebateType {
    BusinessDecision,
    Strategy,
    Product,
    #[default]
    General,
}

impl DebateType {
    pub fn name(&self) -> &'static str {
        match self {
            DebateType::BusinessDecision => "business_decision",
            DebateType::Strategy => "strategy",
            DebateType::Product => "product",
            DebateType::General => "general",
        }
    }
}

/// A simulated debate participant with a fixed specialization.
/// Assigned once at debate start; the assignment is immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expert {
    pub id: String,
    pub name: String,
    pub specializations: Vec<String>,
}

impl Expert {
    /// Build an expert with a stable slug id derived from the name.
    pub fn new(name: impl Into<String>, specializations: Vec<String>) -> Self {
        let name = name.into();
        let id = name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>();
        Self {
            id,
            name,
            specializations,
        }
    }
}

/// Moderator intervention kinds. At most one per round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InterventionKind {
    /// The round drifted off-topic; steer back to the question.
    Redirect,
    /// The round stagnated; push for new ground.
    Deepen,
}

/// Author id used for moderator intervention messages.
pub const MODERATOR_ID: &str = "moderator";

/// One contribution to a round. Append-only; never edited after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub round: u32,
    pub author_id: String,
    pub content: String,
    pub tokens_used: u32,
    pub cost_usd: f64,
    pub intervention: Option<InterventionKind>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn from_expert(
        round: u32,
        expert_id: &str,
        content: String,
        tokens_used: u32,
        cost_usd: f64,
    ) -> Self {
        Self {
            round,
            author_id: expert_id.to_string(),
            content,
            tokens_used,
            cost_usd,
            intervention: None,
            created_at: Utc::now(),
        }
    }

    pub fn intervention(round: u32, kind: InterventionKind, content: String) -> Self {
        Self {
            round,
            author_id: MODERATOR_ID.to_string(),
            content,
            tokens_used: 0,
            cost_usd: 0.0,
            intervention: Some(kind),
            created_at: Utc::now(),
        }
    }

    pub fn is_intervention(&self) -> bool {
        self.intervention.is_some()
    }
}

/// One synchronized turn of all assigned experts plus an optional moderator
/// intervention. Sealed rounds are immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub number: u32,
    pub messages: Vec<Message>,
    pub sealed_at: DateTime<Utc>,
}

impl Round {
    pub fn sealed(number: u32, messages: Vec<Message>) -> Self {
        Self {
            number,
            messages,
            sealed_at: Utc::now(),
        }
    }

    /// Messages from experts only, moderator interventions excluded.
    pub fn expert_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.is_intervention())
    }
}

/// Context attached mid-debate. Takes effect from the next round's prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub text: String,
    pub added_at: DateTime<Utc>,
}

/// Structured context for the question under debate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebateContext {
    pub background: Option<String>,
    pub constraints: Vec<String>,
    pub additional: Vec<ContextEntry>,
}

/// Derived quality signals over the transcript, all in [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityMetrics {
    pub overall: f64,
    pub depth: f64,
    pub balance: f64,
    pub originality: f64,
}

/// One candidate option in the final ranking. Produced exactly once, at
/// completion, and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalRankingEntry {
    pub option: String,
    /// 0-100.
    pub score: f64,
    pub supporting_experts: Vec<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    /// 0-1.
    pub confidence: f64,
    pub reasoning: String,
}

/// The aggregate tracking one question's multi-round deliberation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debate {
    pub id: String,
    pub owner_id: String,
    pub question: String,
    pub context: DebateContext,
    pub debate_type: DebateType,
    pub mode: DebateMode,
    pub status: DebateStatus,
    /// Only meaningful while `in_progress`.
    pub paused: bool,
    pub visibility: Visibility,
    pub max_rounds: u32,
    pub experts: Vec<Expert>,
    pub rounds: Vec<Round>,
    pub final_ranking: Vec<FinalRankingEntry>,
    /// 0-1, agreement-weighted convergence across experts.
    pub consensus_score: f64,
    pub quality: Option<QualityMetrics>,
    pub total_cost_usd: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Debate {
    /// Create a fresh draft owned by `owner_id`.
    pub fn new(owner_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            question: question.into(),
            context: DebateContext::default(),
            debate_type: DebateType::default(),
            mode: DebateMode::default(),
            status: DebateStatus::Draft,
            paused: false,
            visibility: Visibility::default(),
            max_rounds: 0,
            experts: Vec::new(),
            rounds: Vec::new(),
            final_ranking: Vec::new(),
            consensus_score: 0.0,
            quality: None,
            total_cost_usd: 0.0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Full ordered message stream across sealed rounds.
    pub fn transcript(&self) -> impl Iterator<Item = &Message> {
        self.rounds.iter().flat_map(|r| r.messages.iter())
    }

    pub fn is_active(&self) -> bool {
        self.status == DebateStatus::InProgress
    }
}

/// How ready a question is to be debated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessLevel {
    Insufficient,
    Basic,
    Good,
    Excellent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Proceed,
    Clarify,
    Refine,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestionPriority {
    High,
    Normal,
}

/// A plausible default synthesized for a dimension the input left unstated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assumption {
    pub id: String,
    pub dimension: String,
    pub text: String,
    /// 0-1; rises with the keyword evidence behind the dimension.
    pub confidence: f64,
    /// None until the user confirms or rejects it.
    pub confirmed: Option<bool>,
}

/// A clarifying question back to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    pub id: String,
    pub dimension: String,
    pub text: String,
    pub priority: QuestionPriority,
    /// Present for dimensions with a natural closed answer set.
    pub options: Option<Vec<String>>,
}

/// Per-dimension score contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: String,
    /// 0, 40 or 80 depending on keyword evidence.
    pub score: u32,
    pub weight: f64,
}

/// Pre-debate scoring of whether the question has enough stated context.
/// Ephemeral: not persisted as part of the debate aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessAssessment {
    pub debate_type: DebateType,
    pub dimension_scores: Vec<DimensionScore>,
    /// Weighted sum, 0-100.
    pub overall_score: f64,
    pub level: ReadinessLevel,
    pub action: RecommendedAction,
    pub assumptions: Vec<Assumption>,
    pub questions: Vec<ClarifyingQuestion>,
}

impl ReadinessAssessment {
    pub fn has_critical_question(&self) -> bool {
        self.questions
            .iter()
            .any(|q| q.priority == QuestionPriority::High)
    }
}

/// Kind of extracted claim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Premise,
    Conclusion,
    Objection,
    Support,
}

/// Kind of relation between two claims.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Supports,
    Attacks,
    Cites,
    AgreesWith,
    DisagreesWith,
}

/// One extracted claim. Ids are deterministic over the transcript, so
/// recomputation yields the same graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArgumentNode {
    pub id: String,
    pub kind: NodeKind,
    pub expert_id: String,
    pub round: u32,
    pub content: String,
    /// 0-1.
    pub strength: f64,
}

/// Directed relation between two extracted claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArgumentEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    /// 0-1, textual similarity behind the inference.
    pub strength: f64,
}

/// Derived claim/relation graph for a debate transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArgumentGraph {
    pub debate_id: String,
    /// Number of sealed rounds the graph covers; cache invalidation key.
    pub rounds_covered: usize,
    pub nodes: Vec<ArgumentNode>,
    pub edges: Vec<ArgumentEdge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrips_through_names() {
        for status in [
            DebateStatus::Draft,
            DebateStatus::Pending,
            DebateStatus::InProgress,
            DebateStatus::Completed,
            DebateStatus::Failed,
        ] {
            assert_eq!(DebateStatus::parse(status.name()), Some(status));
        }
        assert_eq!(DebateStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(DebateStatus::Completed.is_terminal());
        assert!(DebateStatus::Failed.is_terminal());
        assert!(!DebateStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_expert_slug_ids_are_stable() {
        let a = Expert::new("Risk Officer", vec!["risk".into()]);
        let b = Expert::new("Risk Officer", vec!["risk".into()]);
        assert_eq!(a.id, "risk-officer");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_new_debate_starts_in_draft() {
        let debate = Debate::new("user-1", "Should we migrate to the new platform?");
        assert_eq!(debate.status, DebateStatus::Draft);
        assert!(!debate.paused);
        assert!(debate.rounds.is_empty());
        assert!(debate.final_ranking.is_empty());
        assert_eq!(debate.total_cost_usd, 0.0);
    }

    #[test]
    fn test_transcript_preserves_round_and_message_order() {
        let mut debate = Debate::new("user-1", "question text here");
        debate.rounds.push(Round::sealed(
            1,
            vec![
                Message::from_expert(1, "a", "first".into(), 1, 0.0),
                Message::from_expert(1, "b", "second".into(), 1, 0.0),
            ],
        ));
        debate.rounds.push(Round::sealed(
            2,
            vec![Message::from_expert(2, "a", "third".into(), 1, 0.0)],
        ));

        let order: Vec<&str> = debate.transcript().map(|m| m.content.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_expert_messages_skip_interventions() {
        let round = Round::sealed(
            1,
            vec![
                Message::from_expert(1, "a", "claim".into(), 1, 0.0),
                Message::intervention(1, InterventionKind::Deepen, "go deeper".into()),
            ],
        );
        assert_eq!(round.expert_messages().count(), 1);
        assert_eq!(round.messages.len(), 2);
    }
}
