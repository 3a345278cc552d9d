//! Readiness assessment for debate questions.
//!
//! Scores free-text input against the dimension model for its debate type,
//! synthesizes assumptions and clarifying questions for missing dimensions,
//! and recommends whether to proceed, clarify, or refine. Both entry points
//! are pure functions of their inputs: no clock reads, no randomness, so
//! identical calls return identical output.

use std::collections::BTreeMap;

use crate::dimensions::{infer_debate_type, model_for, Dimension};
use crate::error::{DebateError, Result};
use crate::types::{
    Assumption, ClarifyingQuestion, DebateType, DimensionScore, QuestionPriority,
    ReadinessAssessment, ReadinessLevel, RecommendedAction,
};

/// Minimum input length `analyze` accepts.
pub const MIN_INPUT_LEN: usize = 10;

/// Dimension score below which the input is treated as not stating the
/// dimension: an assumption is synthesized in its place.
const PRESENT_THRESHOLD: u32 = 80;

/// A user's answer to a clarifying question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Text(String),
    Choices(Vec<String>),
}

impl Answer {
    fn as_text(&self) -> String {
        match self {
            Answer::Text(t) => t.clone(),
            Answer::Choices(c) => c.join(", "),
        }
    }
}

/// Output of `refine`: the textually enhanced input and its re-assessment.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    pub enhanced_input: String,
    pub assessment: ReadinessAssessment,
}

/// Score `user_input` against the dimension model of `debate_type`
/// (inferred from the text when not given).
pub fn analyze(
    user_input: &str,
    debate_type: Option<DebateType>,
) -> Result<ReadinessAssessment> {
    let trimmed = user_input.trim();
    if trimmed.len() < MIN_INPUT_LEN {
        return Err(DebateError::InvalidInput(format!(
            "input must be at least {} characters, got {}",
            MIN_INPUT_LEN,
            trimmed.len()
        )));
    }

    let debate_type = debate_type.unwrap_or_else(|| infer_debate_type(trimmed));
    let model = model_for(debate_type);
    let lower = trimmed.to_lowercase();

    let mut dimension_scores = Vec::with_capacity(model.len());
    let mut assumptions = Vec::new();
    let mut questions = Vec::new();

    for dim in model {
        let score = score_dimension(&lower, dim);
        dimension_scores.push(DimensionScore {
            dimension: dim.name.to_string(),
            score,
            weight: dim.weight,
        });

        if score < PRESENT_THRESHOLD {
            assumptions.push(Assumption {
                id: format!("assume:{}:{}", debate_type.name(), dim.name),
                dimension: dim.name.to_string(),
                text: default_assumption(dim.name),
                confidence: 0.5 + f64::from(score) / 200.0,
                confirmed: None,
            });

            if dim.is_critical() || score == 0 {
                questions.push(ClarifyingQuestion {
                    id: format!("ask:{}:{}", debate_type.name(), dim.name),
                    dimension: dim.name.to_string(),
                    text: clarifying_question(dim.name),
                    priority: if dim.is_critical() {
                        QuestionPriority::High
                    } else {
                        QuestionPriority::Normal
                    },
                    options: dim.options.map(|opts| {
                        opts.iter().map(|o| o.to_string()).collect()
                    }),
                });
            }
        }
    }

    let overall_score: f64 = dimension_scores
        .iter()
        .map(|d| f64::from(d.score) * d.weight)
        .sum();
    let level = readiness_level(overall_score);
    let has_critical = questions
        .iter()
        .any(|q| q.priority == QuestionPriority::High);
    let action = recommended_action(overall_score, has_critical);

    Ok(ReadinessAssessment {
        debate_type,
        dimension_scores,
        overall_score,
        level,
        action,
        assumptions,
        questions,
    })
}

/// Fold confirmed assumptions and question answers back into the input as
/// bracketed annotations, then re-score the enhanced text.
pub fn refine(
    original_input: &str,
    assumption_responses: &BTreeMap<String, bool>,
    question_responses: &BTreeMap<String, Answer>,
    additional_context: Option<&str>,
) -> Result<RefineOutcome> {
    let base = analyze(original_input, None)?;

    let mut enhanced = original_input.trim().to_string();
    for assumption in &base.assumptions {
        if assumption_responses.get(&assumption.id) == Some(&true) {
            enhanced.push_str(&format!(" [Confirmed: {}]", assumption.text));
        }
    }
    for question in &base.questions {
        if let Some(answer) = question_responses.get(&question.id) {
            enhanced.push_str(&format!(
                " [{}: {}]",
                question.dimension,
                answer.as_text()
            ));
        }
    }
    if let Some(context) = additional_context {
        let context = context.trim();
        if !context.is_empty() {
            enhanced.push_str(&format!(" [Context: {}]", context));
        }
    }

    // Keep the originally inferred type so extra context cannot flip the
    // dimension model mid-refinement.
    let assessment = analyze(&enhanced, Some(base.debate_type))?;

    Ok(RefineOutcome {
        enhanced_input: enhanced,
        assessment,
    })
}

/// Keyword-evidence score for one dimension: 0 hits -> 0, 1 -> 40, 2+ -> 80.
fn score_dimension(input_lower: &str, dim: &Dimension) -> u32 {
    let hits = dim
        .keywords
        .iter()
        .filter(|k| input_lower.contains(*k))
        .count();
    match hits {
        0 => 0,
        1 => 40,
        _ => 80,
    }
}

/// Map an overall score to a readiness level.
pub fn readiness_level(score: f64) -> ReadinessLevel {
    if score >= 75.0 {
        ReadinessLevel::Excellent
    } else if score >= 50.0 {
        ReadinessLevel::Good
    } else if score >= 30.0 {
        ReadinessLevel::Basic
    } else {
        ReadinessLevel::Insufficient
    }
}

/// Recommended next step. Proceed needs a strong score with no critical
/// question outstanding; below 40 the question needs rework, not answers.
pub fn recommended_action(overall: f64, has_critical_question: bool) -> RecommendedAction {
    if overall >= 70.0 && !has_critical_question {
        RecommendedAction::Proceed
    } else if overall >= 40.0 {
        RecommendedAction::Clarify
    } else {
        RecommendedAction::Refine
    }
}

/// Plausible default for a dimension the input left unstated. Phrased with
/// the dimension's own vocabulary so a confirmation counts as evidence on
/// re-scoring.
fn default_assumption(dimension: &str) -> String {
    match dimension {
        "objective" => {
            "The main objective is a clear go or no-go decision on the stated question".into()
        }
        "constraints" => {
            "Normal budget limits apply and spending is capped at current plans".into()
        }
        "timeline" => {
            "A decision is wanted within the current quarter, with no hard deadline".into()
        }
        "stakeholders" => {
            "The immediate team and management are the main stakeholders".into()
        }
        "risks" => "The main risk is a reversible worst case with limited downside".into(),
        "alternatives" => {
            "At least one alternative option exists, including doing nothing".into()
        }
        "market_context" => {
            "The market is competitive but no single competitor dominates the segment".into()
        }
        "users" => "Existing users are the target audience and adoption is the main concern".into(),
        "metrics" => "Success will be measured by one primary metric such as revenue impact".into(),
        other => format!("No specific {} was stated; a conventional default applies", other),
    }
}

fn clarifying_question(dimension: &str) -> String {
    match dimension {
        "objective" => "What outcome would make this decision a success?".into(),
        "constraints" => "What hard constraints (budget, people, policy) bound the options?".into(),
        "timeline" => "When does this need to be decided and delivered?".into(),
        "stakeholders" => "Who is affected by or must sign off on the outcome?".into(),
        "risks" => "What is the worst case if the chosen option fails?".into(),
        "alternatives" => "Which alternatives are already on the table?".into(),
        "market_context" => "What does the competitive landscape look like?".into(),
        "users" => "Which users or customers does this serve first?".into(),
        "metrics" => "Which metric should move if this works?".into(),
        other => format!("What should be known about {} before debating?", other),
    }
}
