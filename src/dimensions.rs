//! Static assessment dimensions per debate type.
//!
//! Read-only process-wide state: weights sum to 1.0 per type, keyword sets
//! drive the evidence scoring in `readiness`, and dimensions with a natural
//! closed answer set carry multiple-choice options for clarifying questions.

use crate::types::DebateType;

/// One assessment dimension of a debate type.
pub struct Dimension {
    pub name: &'static str,
    /// Share of the overall readiness score. Weights above
    /// `CRITICAL_WEIGHT` mark the dimension as critical.
    pub weight: f64,
    pub keywords: &'static [&'static str],
    /// Closed answer set, when one exists.
    pub options: Option<&'static [&'static str]>,
}

/// Dimensions whose weight exceeds this are critical: leaving them unstated
/// always produces a clarifying question.
pub const CRITICAL_WEIGHT: f64 = 0.15;

impl Dimension {
    pub fn is_critical(&self) -> bool {
        self.weight > CRITICAL_WEIGHT
    }
}

const TIMELINE_OPTIONS: &[&str] = &[
    "Immediately (days)",
    "This quarter",
    "This year",
    "No fixed deadline",
];

const STAKEHOLDER_OPTIONS: &[&str] = &[
    "Just me",
    "My team",
    "The whole company",
    "External customers or partners",
];

const OBJECTIVE_KEYWORDS: &[&str] = &[
    "goal", "objective", "decide", "decision", "outcome", "achieve", "aim", "want to", "need to",
];

const CONSTRAINT_KEYWORDS: &[&str] = &[
    "constraint",
    "budget",
    "limit",
    "restriction",
    "cannot",
    "capped",
    "headcount",
    "only have",
];

const TIMELINE_KEYWORDS: &[&str] = &[
    "timeline", "deadline", "quarter", "month", "week", "by end of", "urgent", "this year",
];

const STAKEHOLDER_KEYWORDS: &[&str] = &[
    "stakeholder",
    "team",
    "customer",
    "board",
    "investor",
    "management",
    "users",
    "partner",
];

const RISK_KEYWORDS: &[&str] = &[
    "risk", "downside", "failure", "worst case", "exposure", "liability", "fallback",
];

const ALTERNATIVE_KEYWORDS: &[&str] = &[
    "alternative",
    "option",
    "versus",
    " vs ",
    "instead",
    "other choice",
    "either",
];

const MARKET_KEYWORDS: &[&str] = &[
    "market",
    "competitor",
    "competitive",
    "industry",
    "trend",
    "landscape",
    "segment",
    "positioning",
];

const USER_KEYWORDS: &[&str] = &[
    "user", "customer", "persona", "audience", "adoption", "retention", "churn",
];

const METRIC_KEYWORDS: &[&str] = &[
    "metric",
    "kpi",
    "measure",
    "success criteria",
    "conversion",
    "revenue",
    "target number",
];

static BUSINESS_DECISION: &[Dimension] = &[
    Dimension {
        name: "objective",
        weight: 0.30,
        keywords: OBJECTIVE_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "constraints",
        weight: 0.20,
        keywords: CONSTRAINT_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "timeline",
        weight: 0.15,
        keywords: TIMELINE_KEYWORDS,
        options: Some(TIMELINE_OPTIONS),
    },
    Dimension {
        name: "stakeholders",
        weight: 0.15,
        keywords: STAKEHOLDER_KEYWORDS,
        options: Some(STAKEHOLDER_OPTIONS),
    },
    Dimension {
        name: "risks",
        weight: 0.10,
        keywords: RISK_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "alternatives",
        weight: 0.10,
        keywords: ALTERNATIVE_KEYWORDS,
        options: None,
    },
];

static STRATEGY: &[Dimension] = &[
    Dimension {
        name: "objective",
        weight: 0.25,
        keywords: OBJECTIVE_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "market_context",
        weight: 0.20,
        keywords: MARKET_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "constraints",
        weight: 0.15,
        keywords: CONSTRAINT_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "timeline",
        weight: 0.15,
        keywords: TIMELINE_KEYWORDS,
        options: Some(TIMELINE_OPTIONS),
    },
    Dimension {
        name: "stakeholders",
        weight: 0.15,
        keywords: STAKEHOLDER_KEYWORDS,
        options: Some(STAKEHOLDER_OPTIONS),
    },
    Dimension {
        name: "risks",
        weight: 0.10,
        keywords: RISK_KEYWORDS,
        options: None,
    },
];

static PRODUCT: &[Dimension] = &[
    Dimension {
        name: "objective",
        weight: 0.25,
        keywords: OBJECTIVE_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "users",
        weight: 0.25,
        keywords: USER_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "constraints",
        weight: 0.15,
        keywords: CONSTRAINT_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "timeline",
        weight: 0.15,
        keywords: TIMELINE_KEYWORDS,
        options: Some(TIMELINE_OPTIONS),
    },
    Dimension {
        name: "metrics",
        weight: 0.10,
        keywords: METRIC_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "risks",
        weight: 0.10,
        keywords: RISK_KEYWORDS,
        options: None,
    },
];

static GENERAL: &[Dimension] = &[
    Dimension {
        name: "objective",
        weight: 0.30,
        keywords: OBJECTIVE_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "constraints",
        weight: 0.25,
        keywords: CONSTRAINT_KEYWORDS,
        options: None,
    },
    Dimension {
        name: "timeline",
        weight: 0.20,
        keywords: TIMELINE_KEYWORDS,
        options: Some(TIMELINE_OPTIONS),
    },
    Dimension {
        name: "stakeholders",
        weight: 0.15,
        keywords: STAKEHOLDER_KEYWORDS,
        options: Some(STAKEHOLDER_OPTIONS),
    },
    Dimension {
        name: "risks",
        weight: 0.10,
        keywords: RISK_KEYWORDS,
        options: None,
    },
];

/// Dimension model for a debate type.
pub fn model_for(debate_type: DebateType) -> &'static [Dimension] {
    match debate_type {
        DebateType::BusinessDecision => BUSINESS_DECISION,
        DebateType::Strategy => STRATEGY,
        DebateType::Product => PRODUCT,
        DebateType::General => GENERAL,
    }
}

const BUSINESS_TYPE_KEYWORDS: &[&str] = &[
    "should we buy",
    "vendor",
    "invest",
    "acquire",
    "budget",
    "hire",
    "outsource",
    "contract",
    "pricing",
];

const STRATEGY_TYPE_KEYWORDS: &[&str] = &[
    "strategy",
    "strategic",
    "long-term",
    "roadmap",
    "expansion",
    "positioning",
    "market entry",
    "competitive",
];

const PRODUCT_TYPE_KEYWORDS: &[&str] = &[
    "product", "feature", "launch", "mvp", "ux", "onboarding", "release", "beta",
];

/// Infer a debate type from free text. First match wins, in priority order
/// business_decision, strategy, product; `general` is the fallback.
pub fn infer_debate_type(input: &str) -> DebateType {
    let lower = input.to_lowercase();
    if BUSINESS_TYPE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return DebateType::BusinessDecision;
    }
    if STRATEGY_TYPE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return DebateType::Strategy;
    }
    if PRODUCT_TYPE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return DebateType::Product;
    }
    DebateType::General
}
