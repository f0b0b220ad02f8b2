//! # Pricing Module
//!
//! Picks the best promotion for a cart line and computes the discounted unit
//! price.
//!
//! ## Promotion Specificity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Scope           Matches when                         Score             │
//! │  ─────────────   ───────────────────────────────────  ─────             │
//! │  Product         promotion.product_id == product.id     2               │
//! │  Subcategory     promotion.subcategory_id == product's  1               │
//! │  Category        promotion.category_id == product's     0               │
//! │  (anything else) excluded                               -               │
//! │                                                                         │
//! │  Winner: highest score → highest priority → earliest start → lowest id  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Specificity beats priority: a subcategory promotion with priority 0 wins
//! over a category promotion with priority 100.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{DiscountType, Product, Promotion};

// =============================================================================
// Promotion Scope
// =============================================================================

/// Which catalogue level a promotion targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionScope<'a> {
    Product(&'a str),
    Subcategory(&'a str),
    Category(&'a str),
}

impl<'a> PromotionScope<'a> {
    /// Reads the scope selector columns of a promotion.
    ///
    /// The most specific non-null column wins; `None` when all three are null.
    pub fn of(promotion: &'a Promotion) -> Option<Self> {
        if let Some(id) = promotion.product_id.as_deref() {
            Some(PromotionScope::Product(id))
        } else if let Some(id) = promotion.subcategory_id.as_deref() {
            Some(PromotionScope::Subcategory(id))
        } else {
            promotion.category_id.as_deref().map(PromotionScope::Category)
        }
    }

    /// Specificity score against a product, `None` if the scope does not match.
    pub fn score(&self, product: &Product) -> Option<u8> {
        match self {
            PromotionScope::Product(id) if *id == product.id => Some(2),
            PromotionScope::Subcategory(id)
                if product.subcategory_id.as_deref() == Some(*id) =>
            {
                Some(1)
            }
            PromotionScope::Category(id) if *id == product.category_id => Some(0),
            _ => None,
        }
    }
}

// =============================================================================
// Priced Line
// =============================================================================

/// Result of pricing one cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub base_price: Money,
    pub unit_price: Money,
    pub quantity: i64,
    /// `(base − unit) × quantity`.
    pub line_discount: Money,
    /// `unit × quantity`.
    pub line_total: Money,
    pub promotion_id: Option<String>,
}

// =============================================================================
// Pricing Resolver
// =============================================================================

/// Resolves promotional prices as of a fixed instant.
///
/// Holding the instant keeps every line of one checkout priced against the
/// same promotion window.
#[derive(Debug, Clone, Copy)]
pub struct PricingResolver {
    at: DateTime<Utc>,
}

impl PricingResolver {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    /// Picks the winning promotion for a product, if any.
    pub fn best_promotion<'p>(
        &self,
        product: &Product,
        promotions: &'p [Promotion],
    ) -> Option<&'p Promotion> {
        promotions
            .iter()
            .filter(|p| p.is_live_at(self.at))
            .filter_map(|p| {
                PromotionScope::of(p)
                    .and_then(|scope| scope.score(product))
                    .map(|score| (score, p))
            })
            .max_by(|(sa, a), (sb, b)| {
                sa.cmp(sb)
                    .then_with(|| a.priority.cmp(&b.priority))
                    // Earlier start and lower id rank higher, hence reversed.
                    .then_with(|| b.starts_at.cmp(&a.starts_at))
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|(_, p)| p)
    }

    /// Prices one line: unit price after the best promotion, line discount and
    /// line total.
    ///
    /// ```rust
    /// use chrono::Utc;
    /// use till_core::pricing::PricingResolver;
    /// # use till_core::types::Product;
    /// # let now = Utc::now();
    /// # let product = Product {
    /// #     id: "p".into(), sku: "SKU".into(), name: "Widget".into(),
    /// #     selling_price_cents: 10000, purchase_price_cents: 6000,
    /// #     category_id: "c".into(), subcategory_id: None,
    /// #     default_location_id: "l".into(), created_at: now, updated_at: now,
    /// # };
    ///
    /// let line = PricingResolver::new(now).resolve(&product, 2, &[]);
    /// assert_eq!(line.unit_price.cents(), 10000);
    /// assert_eq!(line.line_total.cents(), 20000);
    /// assert!(line.promotion_id.is_none());
    /// ```
    pub fn resolve(&self, product: &Product, quantity: i64, promotions: &[Promotion]) -> PricedLine {
        let base_price = product.selling_price();
        let promotion = self.best_promotion(product, promotions);

        let unit_price = match promotion {
            Some(p) => discounted_price(base_price, p),
            None => base_price,
        };

        PricedLine {
            base_price,
            unit_price,
            quantity,
            line_discount: (base_price - unit_price).multiply_quantity(quantity),
            line_total: unit_price.multiply_quantity(quantity),
            promotion_id: promotion.map(|p| p.id.clone()),
        }
    }
}

/// Applies a promotion's discount to a unit price, clamped at zero.
///
/// PERCENTAGE values are whole percents (10 = 10% off).
pub fn discounted_price(price: Money, promotion: &Promotion) -> Money {
    match promotion.discount_type {
        DiscountType::Percentage => {
            price.apply_percentage_discount(promotion.discount_value.saturating_mul(100))
        }
        DiscountType::FixedAmount => {
            price.apply_fixed_discount(Money::from_cents(promotion.discount_value))
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
