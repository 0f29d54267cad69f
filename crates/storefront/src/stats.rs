//! Inventory analytics for the admin dashboard.

use std::collections::HashSet;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sweetshop_core::Sweet;

/// Aggregates over one catalog slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStats {
    pub total_sweets: usize,
    /// Σ price × available quantity.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
    /// Items below the low-stock threshold (out-of-stock items included).
    pub low_stock_items: usize,
    /// Distinct categories.
    pub categories: usize,
    /// Mean unit price, to two decimal places. Zero for an empty slice.
    #[serde(with = "rust_decimal::serde::float")]
    pub average_price: Decimal,
}

impl InventoryStats {
    /// Aggregate `items`. Returns `None` if a monetary sum overflows.
    #[must_use]
    pub fn from_items(items: &[Sweet]) -> Option<Self> {
        let total_value = items.iter().try_fold(Decimal::ZERO, |total, s| {
            total.checked_add(s.price.checked_mul(Decimal::from(s.quantity))?)
        })?;
        let low_stock_items = items.iter().filter(|s| s.is_low_stock()).count();
        let categories = items
            .iter()
            .map(|s| s.category.as_str())
            .collect::<HashSet<_>>()
            .len();

        let price_sum = items
            .iter()
            .try_fold(Decimal::ZERO, |total, s| total.checked_add(s.price))?;
        let average_price = if items.is_empty() {
            Decimal::ZERO
        } else {
            price_sum
                .checked_div(Decimal::from(items.len()))?
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        };

        Some(Self {
            total_sweets: items.len(),
            total_value,
            low_stock_items,
            categories,
            average_price,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use sweetshop_core::SweetId;

    use super::*;

    fn sweet(id: i64, category: &str, price: Decimal, quantity: u32) -> Sweet {
        Sweet {
            id: SweetId::new(id),
            name: format!("Sweet {id}"),
            category: category.to_string(),
            price,
            quantity,
            description: None,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_slice() {
        let stats = InventoryStats::from_items(&[]).unwrap();
        assert_eq!(stats.total_sweets, 0);
        assert_eq!(stats.total_value, Decimal::ZERO);
        assert_eq!(stats.average_price, Decimal::ZERO);
    }

    #[test]
    fn test_aggregates() {
        let items = [
            sweet(1, "Cakes", Decimal::new(2599, 2), 15),
            sweet(2, "Pastries", Decimal::new(250, 2), 50),
            sweet(3, "Candies", Decimal::new(625, 2), 0),
            sweet(4, "Cakes", Decimal::new(400, 2), 9),
        ];

        let stats = InventoryStats::from_items(&items).unwrap();

        assert_eq!(stats.total_sweets, 4);
        // 389.85 + 125 + 0 + 36
        assert_eq!(stats.total_value, Decimal::new(55085, 2));
        assert_eq!(stats.low_stock_items, 2);
        assert_eq!(stats.categories, 3);
        // 38.74 / 4 = 9.685
        assert_eq!(stats.average_price, Decimal::new(969, 2));
    }

    #[test]
    fn test_overflowing_value_is_none() {
        let huge = Decimal::from_i128_with_scale(10_i128.pow(25), 0);
        let items = [
            sweet(1, "Cakes", Decimal::ONE, 5),
            sweet(2, "Cakes", huge, 100_000),
        ];
        assert!(InventoryStats::from_items(&items).is_none());

        let pair = [sweet(1, "Cakes", Decimal::MAX, 0), sweet(2, "Cakes", Decimal::MAX, 0)];
        assert!(InventoryStats::from_items(&pair).is_none());
    }
}
