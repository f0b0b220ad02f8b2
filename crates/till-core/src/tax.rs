//! # Tax Module
//!
//! Applies the configured tax rate to an order's net amount.
//!
//! ```text
//! subtotal ──► − points discount ──► net ──► + tax(net) ──► total
//! ```
//!
//! Tax is computed on the amount after the points discount, once per order.

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::TaxRate;

/// Net amount, tax and total of one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxedAmount {
    pub net: Money,
    pub tax: Money,
    pub total: Money,
}

/// Applies a fixed tax rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaxCalculator {
    rate: TaxRate,
}

impl TaxCalculator {
    pub fn new(rate: TaxRate) -> Self {
        Self { rate }
    }

    pub fn rate(&self) -> TaxRate {
        self.rate
    }

    /// Returns `amount × (1 + rate)` split into its parts.
    ///
    /// Negative amounts are treated as zero.
    ///
    /// ```rust
    /// use till_core::money::Money;
    /// use till_core::tax::TaxCalculator;
    /// use till_core::types::TaxRate;
    ///
    /// let taxed = TaxCalculator::new(TaxRate::from_bps(500)).apply(Money::from_cents(9500));
    /// assert_eq!(taxed.tax.cents(), 475);
    /// assert_eq!(taxed.total.cents(), 9975);
    /// ```
    pub fn apply(&self, amount: Money) -> TaxedAmount {
        let net = amount.non_negative();
        let tax = net.calculate_tax(self.rate);
        TaxedAmount {
            net,
            tax,
            total: net + tax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_leaves_amount_unchanged() {
        let taxed = TaxCalculator::default().apply(Money::from_cents(12345));
        assert!(taxed.tax.is_zero());
        assert_eq!(taxed.total.cents(), 12345);
    }

    #[test]
    fn test_negative_net_is_floored() {
        let taxed = TaxCalculator::new(TaxRate::from_bps(500)).apply(Money::from_cents(-100));
        assert_eq!(taxed.net, Money::zero());
        assert_eq!(taxed.total, Money::zero());
    }

    #[test]
    fn test_rounding_on_tax_component() {
        // 1999 × 8.25% = 164.9175 → 165
        let taxed = TaxCalculator::new(TaxRate::from_bps(825)).apply(Money::from_cents(1999));
        assert_eq!(taxed.tax.cents(), 165);
        assert_eq!(taxed.total.cents(), 2164);
    }
}
