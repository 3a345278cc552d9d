//! Consensus and quality scoring over debate transcripts.
//!
//! Everything here is a pure function of the ordered message stream:
//! re-running over the same prefix yields the same numbers, and consensus is
//! monotone under extensions that only add agreement.

use std::collections::{BTreeMap, HashSet};

use crate::types::{Message, QualityMetrics, Round};

/// An expert's latest stated preference.
#[derive(Debug, Clone, PartialEq)]
pub struct Preference {
    pub expert_id: String,
    pub option: String,
    pub confidence: f64,
    pub round: u32,
}

const PREFERENCE_PHRASES: &[&str] = &[
    "i recommend ",
    "i prefer ",
    "my preference is ",
    "we should go with ",
    "i support ",
];

const PREMISE_MARKERS: &[&str] = &[
    "if ", "because", "since ", "given that", "due to", "assuming",
];

const CONCLUSION_MARKERS: &[&str] = &[
    "this means",
    "therefore",
    "thus",
    "in conclusion",
    "so we should",
    "it follows",
];

const OBJECTION_MARKERS: &[&str] = &[
    "however",
    " but ",
    "disagree",
    "on the contrary",
    "the problem is",
    "i doubt",
    "fails to",
];

// " agree" deliberately keeps its leading space so "disagree" never counts
// as support.
const SUPPORT_MARKERS: &[&str] = &[
    " agree",
    "as noted",
    "building on",
    "exactly",
    "in line with",
    "echo ",
];

/// Extract a stated preference from free-form message content.
///
/// Structured `RECOMMENDATION:` / `CONFIDENCE:` lines win; natural phrasing
/// ("i recommend ...") is the fallback. Returns the normalized option label
/// and a confidence in [0, 1] (0.5 when unstated).
pub fn extract_preference(content: &str) -> Option<(String, f64)> {
    let mut option = None;
    let mut confidence = 0.5_f64;

    for line in content.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();
        if let Some(rest) = lower.strip_prefix("recommendation:") {
            let normalized = normalize_option(rest);
            if !normalized.is_empty() {
                option = Some(normalized);
            }
        } else if let Some(rest) = lower.strip_prefix("confidence:") {
            if let Ok(value) = rest.trim().trim_end_matches('%').parse::<f64>() {
                confidence = if value > 1.0 { value / 100.0 } else { value };
                confidence = confidence.clamp(0.0, 1.0);
            }
        }
    }

    if option.is_none() {
        let lower = content.to_lowercase();
        for phrase in PREFERENCE_PHRASES {
            if let Some(idx) = lower.find(phrase) {
                let tail = &lower[idx + phrase.len()..];
                let end = tail
                    .find(|c| matches!(c, '.' | ',' | ';' | '\n' | '!' | '?'))
                    .unwrap_or(tail.len());
                let normalized = normalize_option(&tail[..end]);
                if !normalized.is_empty() {
                    option = Some(normalized);
                    break;
                }
            }
        }
    }

    option.map(|o| (o, confidence))
}

fn normalize_option(raw: &str) -> String {
    let mut s = raw.trim().to_lowercase();
    for prefix in ["the ", "option "] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.to_string();
        }
    }
    s.trim_matches(|c: char| !c.is_alphanumeric() && !c.is_whitespace())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Latest stated preference per expert, in expert-id order.
pub fn latest_preferences(rounds: &[Round]) -> Vec<Preference> {
    let mut latest: BTreeMap<String, Preference> = BTreeMap::new();
    for round in rounds {
        for message in round.expert_messages() {
            if let Some((option, confidence)) = extract_preference(&message.content) {
                latest.insert(
                    message.author_id.clone(),
                    Preference {
                        expert_id: message.author_id.clone(),
                        option,
                        confidence,
                        round: round.number,
                    },
                );
            }
        }
    }
    latest.into_values().collect()
}

/// Agreement-weighted convergence in [0, 1]: the confidence share of the
/// modal preferred option over each expert's latest stated preference.
pub fn consensus_score(rounds: &[Round]) -> f64 {
    let preferences = latest_preferences(rounds);
    if preferences.is_empty() {
        return 0.0;
    }

    let mut by_option: BTreeMap<&str, f64> = BTreeMap::new();
    let mut total = 0.0;
    for pref in &preferences {
        *by_option.entry(pref.option.as_str()).or_insert(0.0) += pref.confidence;
        total += pref.confidence;
    }

    if total <= 0.0 {
        // All confidences zero: fall back to a plain head-count share.
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for pref in &preferences {
            *counts.entry(pref.option.as_str()).or_insert(0) += 1;
        }
        let modal = counts.values().max().copied().unwrap_or(0);
        return modal as f64 / preferences.len() as f64;
    }

    let modal = by_option.values().cloned().fold(0.0, f64::max);
    modal / total
}

/// Quality metrics over the transcript, all in [0, 1].
pub fn quality_metrics(rounds: &[Round]) -> QualityMetrics {
    let depth = depth_score(rounds);
    let balance = balance_score(rounds);
    let originality = originality_score(rounds);
    let overall = (0.4 * depth + 0.3 * balance + 0.3 * originality).clamp(0.0, 1.0);
    QualityMetrics {
        overall,
        depth,
        balance,
        originality,
    }
}

/// Argument chain length: premises backing each conclusion. Three or more
/// premises per conclusion counts as full depth.
fn depth_score(rounds: &[Round]) -> f64 {
    let mut premises = 0usize;
    let mut conclusions = 0usize;
    for message in expert_stream(rounds) {
        let lower = message.content.to_lowercase();
        premises += marker_hits(&lower, PREMISE_MARKERS);
        conclusions += marker_hits(&lower, CONCLUSION_MARKERS);
    }
    if conclusions == 0 {
        // Premises with nothing to land on only get partial credit.
        return ((premises as f64) / 6.0).min(0.5);
    }
    ((premises as f64 / conclusions as f64) / 3.0).min(1.0)
}

/// Objection/support balance: extreme imbalance in either direction lowers
/// the score.
fn balance_score(rounds: &[Round]) -> f64 {
    let mut objections = 0usize;
    let mut supports = 0usize;
    for message in expert_stream(rounds) {
        let lower = message.content.to_lowercase();
        objections += marker_hits(&lower, OBJECTION_MARKERS);
        supports += marker_hits(&lower, SUPPORT_MARKERS);
    }
    match (objections, supports) {
        (0, 0) => 0.5,
        (0, _) | (_, 0) => 0.2,
        (o, s) => (o.min(s) as f64) / (o.max(s) as f64),
    }
}

/// Penalizes near-duplicate content across experts within the same round.
fn originality_score(rounds: &[Round]) -> f64 {
    if rounds.is_empty() {
        return 1.0;
    }
    let mut per_round = Vec::with_capacity(rounds.len());
    for round in rounds {
        let token_sets: Vec<HashSet<String>> = round
            .expert_messages()
            .map(|m| tokens(&m.content))
            .collect();
        if token_sets.len() < 2 {
            per_round.push(1.0);
            continue;
        }
        let mut similarity_sum = 0.0;
        let mut pairs = 0usize;
        for i in 0..token_sets.len() {
            for j in (i + 1)..token_sets.len() {
                similarity_sum += jaccard(&token_sets[i], &token_sets[j]);
                pairs += 1;
            }
        }
        per_round.push(1.0 - similarity_sum / pairs as f64);
    }
    per_round.iter().sum::<f64>() / per_round.len() as f64
}

fn expert_stream(rounds: &[Round]) -> impl Iterator<Item = &Message> {
    rounds.iter().flat_map(|r| r.expert_messages())
}

fn marker_hits(lower: &str, markers: &[&str]) -> usize {
    markers.iter().filter(|m| lower.contains(*m)).count()
}

/// Whether a lowercased sentence reads as an objection. Shared with the
/// ranking derivation for pro/con bucketing.
pub(crate) fn has_objection_marker(lower: &str) -> bool {
    OBJECTION_MARKERS.iter().any(|m| lower.contains(m))
}

/// Lowercased alphanumeric tokens longer than two characters.
pub(crate) fn tokens(content: &str) -> HashSet<String> {
    content
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

pub(crate) fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Round;

    fn round(number: u32, turns: &[(&str, &str)]) -> Round {
        Round::sealed(
            number,
            turns
                .iter()
                .map(|(author, content)| {
                    Message::from_expert(number, author, content.to_string(), 10, 0.001)
                })
                .collect(),
        )
    }

    // =========================================================================
    // preference extraction
    // =========================================================================

    #[test]
    fn test_extract_structured_recommendation() {
        let content = "Weighing both sides.\nRECOMMENDATION: Option Alpha\nCONFIDENCE: 0.9";
        let (option, confidence) = extract_preference(content).unwrap();
        assert_eq!(option, "alpha");
        assert_eq!(confidence, 0.9);
    }

    #[test]
    fn test_extract_percent_confidence() {
        let content = "RECOMMENDATION: beta\nCONFIDENCE: 80%";
        let (option, confidence) = extract_preference(content).unwrap();
        assert_eq!(option, "beta");
        assert!((confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_extract_natural_phrasing() {
        let content = "Given the constraints, I recommend the phased rollout, with caveats.";
        let (option, confidence) = extract_preference(content).unwrap();
        assert_eq!(option, "phased rollout");
        assert_eq!(confidence, 0.5);
    }

    #[test]
    fn test_no_preference_stated() {
        assert!(extract_preference("Lots of analysis, no commitment yet.").is_none());
    }

    // =========================================================================
    // consensus
    // =========================================================================

    #[test]
    fn test_consensus_unanimous_is_full() {
        let rounds = vec![round(
            1,
            &[
                ("a", "RECOMMENDATION: alpha\nCONFIDENCE: 0.9"),
                ("b", "RECOMMENDATION: alpha\nCONFIDENCE: 0.8"),
                ("c", "RECOMMENDATION: alpha\nCONFIDENCE: 0.95"),
            ],
        )];
        assert_eq!(consensus_score(&rounds), 1.0);
    }

    #[test]
    fn test_consensus_three_way_split_is_low() {
        let rounds = vec![round(
            1,
            &[
                ("a", "RECOMMENDATION: alpha\nCONFIDENCE: 0.8"),
                ("b", "RECOMMENDATION: beta\nCONFIDENCE: 0.8"),
                ("c", "RECOMMENDATION: gamma\nCONFIDENCE: 0.8"),
            ],
        )];
        let score = consensus_score(&rounds);
        assert!((score - 1.0 / 3.0).abs() < 1e-9, "{}", score);
    }

    #[test]
    fn test_consensus_uses_latest_preference_per_expert() {
        let rounds = vec![
            round(
                1,
                &[
                    ("a", "RECOMMENDATION: alpha\nCONFIDENCE: 0.8"),
                    ("b", "RECOMMENDATION: beta\nCONFIDENCE: 0.8"),
                ],
            ),
            round(
                2,
                &[
                    ("a", "RECOMMENDATION: alpha\nCONFIDENCE: 0.8"),
                    ("b", "RECOMMENDATION: alpha\nCONFIDENCE: 0.8"),
                ],
            ),
        ];
        assert_eq!(consensus_score(&rounds), 1.0);
    }

    #[test]
    fn test_consensus_monotone_under_agreeing_extension() {
        let prefix = vec![round(
            1,
            &[
                ("a", "RECOMMENDATION: alpha\nCONFIDENCE: 0.8"),
                ("b", "RECOMMENDATION: beta\nCONFIDENCE: 0.6"),
                ("c", "RECOMMENDATION: alpha\nCONFIDENCE: 0.7"),
            ],
        )];
        let before = consensus_score(&prefix);

        let mut extended = prefix.clone();
        extended.push(round(
            2,
            &[
                ("a", "RECOMMENDATION: alpha\nCONFIDENCE: 0.9"),
                ("b", "RECOMMENDATION: alpha\nCONFIDENCE: 0.7"),
                ("c", "RECOMMENDATION: alpha\nCONFIDENCE: 0.9"),
            ],
        ));
        let after = consensus_score(&extended);
        assert!(after >= before, "{} should not drop below {}", after, before);
    }

    #[test]
    fn test_consensus_idempotent() {
        let rounds = vec![round(
            1,
            &[
                ("a", "I recommend alpha."),
                ("b", "I prefer beta, strongly."),
            ],
        )];
        assert_eq!(consensus_score(&rounds), consensus_score(&rounds));
    }

    #[test]
    fn test_consensus_empty_transcript_is_zero() {
        assert_eq!(consensus_score(&[]), 0.0);
    }

    // =========================================================================
    // quality metrics
    // =========================================================================

    #[test]
    fn test_depth_rewards_premise_chains() {
        let shallow = vec![round(1, &[("a", "Alpha is nice. I recommend alpha.")])];
        let deep = vec![round(
            1,
            &[(
                "a",
                "Because margins are thin, and since churn is rising, given that \
                 the runway is short, this means we must cut scope. Therefore alpha.",
            )],
        )];
        let shallow_q = quality_metrics(&shallow);
        let deep_q = quality_metrics(&deep);
        assert!(deep_q.depth > shallow_q.depth);
    }

    #[test]
    fn test_balance_penalizes_one_sided_debates() {
        let one_sided = vec![round(
            1,
            &[
                ("a", "I agree completely, exactly right."),
                ("b", "Building on that, I agree as noted."),
            ],
        )];
        let contested = vec![round(
            1,
            &[
                ("a", "I agree with the premise, exactly."),
                ("b", "However, I disagree; the problem is cost."),
            ],
        )];
        assert!(quality_metrics(&contested).balance > quality_metrics(&one_sided).balance);
    }

    #[test]
    fn test_originality_penalizes_duplicate_experts() {
        let duplicated = vec![round(
            1,
            &[
                ("a", "The phased rollout protects revenue and retention numbers."),
                ("b", "The phased rollout protects revenue and retention numbers."),
            ],
        )];
        let distinct = vec![round(
            1,
            &[
                ("a", "The phased rollout protects revenue and retention numbers."),
                ("b", "Compliance exposure matters more than launch speed here."),
            ],
        )];
        assert!(
            quality_metrics(&distinct).originality > quality_metrics(&duplicated).originality
        );
    }

    #[test]
    fn test_quality_metrics_stay_in_unit_range() {
        let rounds = vec![round(
            1,
            &[
                ("a", "Because because because therefore thus this means."),
                ("b", "However but disagree. I agree exactly."),
            ],
        )];
        let q = quality_metrics(&rounds);
        for value in [q.overall, q.depth, q.balance, q.originality] {
            assert!((0.0..=1.0).contains(&value), "{}", value);
        }
    }
}
