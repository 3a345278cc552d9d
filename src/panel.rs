//! Expert panel definitions.
//!
//! Panels are read-only process-wide state: a running debate copies its
//! experts at configure time and never mutates the definitions here.

use crate::types::{DebateType, Expert};

/// The Strategist: long horizons, second-order effects.
pub fn strategist() -> Expert {
    Expert::new(
        "Strategist",
        vec!["long-term planning".into(), "competitive positioning".into()],
    )
}

/// The Analyst: numbers first, evidence over narrative.
pub fn analyst() -> Expert {
    Expert::new(
        "Analyst",
        vec!["financial modeling".into(), "quantitative evidence".into()],
    )
}

/// The Risk Officer: failure modes, reversibility, exposure.
pub fn risk_officer() -> Expert {
    Expert::new(
        "Risk Officer",
        vec!["risk assessment".into(), "compliance".into()],
    )
}

/// The Customer Advocate: who actually has to live with the outcome.
pub fn customer_advocate() -> Expert {
    Expert::new(
        "Customer Advocate",
        vec!["user research".into(), "customer experience".into()],
    )
}

/// The Technologist: feasibility, build cost, operational load.
pub fn technologist() -> Expert {
    Expert::new(
        "Technologist",
        vec!["architecture".into(), "delivery feasibility".into()],
    )
}

/// The Operator: execution, staffing, what breaks on Monday.
pub fn operator() -> Expert {
    Expert::new(
        "Operator",
        vec!["operations".into(), "organizational capacity".into()],
    )
}

/// Default panel for a debate type. Order matters: it fixes the
/// deterministic message order within every round.
pub fn default_panel(debate_type: DebateType) -> Vec<Expert> {
    match debate_type {
        DebateType::BusinessDecision => vec![analyst(), risk_officer(), operator()],
        DebateType::Strategy => vec![strategist(), analyst(), risk_officer()],
        DebateType::Product => vec![customer_advocate(), technologist(), analyst()],
        DebateType::General => vec![strategist(), risk_officer(), customer_advocate()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_gets_a_panel_of_three() {
        for debate_type in [
            DebateType::BusinessDecision,
            DebateType::Strategy,
            DebateType::Product,
            DebateType::General,
        ] {
            let panel = default_panel(debate_type);
            assert_eq!(panel.len(), 3, "{}", debate_type.name());
        }
    }

    #[test]
    fn test_panel_ids_are_unique_within_a_panel() {
        let panel = default_panel(DebateType::Strategy);
        let mut ids: Vec<&str> = panel.iter().map(|e| e.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), panel.len());
    }

    #[test]
    fn test_panel_order_is_stable() {
        let a = default_panel(DebateType::Product);
        let b = default_panel(DebateType::Product);
        let order_a: Vec<&str> = a.iter().map(|e| e.id.as_str()).collect();
        let order_b: Vec<&str> = b.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order_a, order_b);
    }
}
