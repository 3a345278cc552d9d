//! Credit accounting.
//!
//! Raw USD cost accumulates on the debate as agent calls return; credits are
//! derived only at the presentation/billing boundary and never written back.

/// Margin and unit-price configuration. Override the defaults by
/// constructing your own policy; nothing else in the engine reads these.
#[derive(Debug, Clone, Copy)]
pub struct CreditPolicy {
    pub margin_multiplier: f64,
    pub credit_unit_price: f64,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            margin_multiplier: 1.75,
            credit_unit_price: 0.005,
        }
    }
}

impl CreditPolicy {
    /// Credits billed for a total USD cost, rounded up to whole credits.
    pub fn credits_for(&self, total_cost_usd: f64) -> u64 {
        if total_cost_usd <= 0.0 {
            return 0;
        }
        (total_cost_usd * self.margin_multiplier / self.credit_unit_price).ceil() as u64
    }
}
