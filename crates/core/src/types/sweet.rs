//! Catalog items and the filters used to select them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::SweetId;
use super::price::{CurrencyCode, Price};
use super::validation::ValidationErrors;

const MIN_NAME_LENGTH: usize = 3;
const MIN_DESCRIPTION_LENGTH: usize = 10;

/// Items with fewer units than this count as low stock.
pub const LOW_STOCK_THRESHOLD: u32 = 10;

/// A purchasable catalog item.
///
/// `quantity` is the number of units the shop has available; being unsigned
/// it can never go negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sweet {
    pub id: SweetId,
    pub name: String,
    pub category: String,
    /// Unit price in rupees.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sweet {
    /// Unit price with currency.
    #[must_use]
    pub const fn unit_price(&self) -> Price {
        Price::new(self.price, CurrencyCode::INR)
    }

    /// Whether no units are available.
    #[must_use]
    pub const fn is_out_of_stock(&self) -> bool {
        self.quantity == 0
    }

    /// Whether the item is below the low-stock threshold.
    #[must_use]
    pub const fn is_low_stock(&self) -> bool {
        self.quantity < LOW_STOCK_THRESHOLD
    }

    /// Whether this item belongs in the slice selected by `filter`.
    ///
    /// The free-text query matches name or description case-insensitively,
    /// the category must match exactly, and the price range is inclusive.
    #[must_use]
    pub fn matches(&self, filter: &SearchFilter) -> bool {
        if let Some(query) = filter.query.as_deref() {
            let query = query.to_lowercase();
            let in_name = self.name.to_lowercase().contains(&query);
            let in_description = self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&query));
            if !in_name && !in_description {
                return false;
            }
        }

        if let Some(category) = filter.category.as_deref()
            && self.category != category
        {
            return false;
        }

        filter
            .price
            .as_ref()
            .is_none_or(|range| range.contains(self.price))
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &SweetUpdate) {
        if let Some(name) = &update.name {
            self.name.clone_from(name);
        }
        if let Some(category) = &update.category {
            self.category.clone_from(category);
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(quantity) = update.quantity {
            self.quantity = quantity;
        }
        if let Some(description) = &update.description {
            self.description.clone_from(description);
        }
        if let Some(image_url) = &update.image_url {
            self.image_url.clone_from(image_url);
        }
    }
}

/// Payload for creating a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSweet {
    pub name: String,
    pub category: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl NewSweet {
    /// Check the admin form rules.
    ///
    /// # Errors
    ///
    /// Returns every failing field.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_name(&self.name, &mut errors);
        check_category(&self.category, &mut errors);
        check_price(self.price, &mut errors);
        check_description(self.description.as_deref(), &mut errors);
        check_image_url(self.image_url.as_deref(), &mut errors);
        errors.into_result()
    }
}

/// Partial update of a catalog item. `None` leaves a field unchanged.
///
/// For the optional fields, `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweetUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub image_url: Option<Option<String>>,
}

impl SweetUpdate {
    /// Check the admin form rules for the fields being changed.
    ///
    /// # Errors
    ///
    /// Returns every failing field.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(name) = &self.name {
            check_name(name, &mut errors);
        }
        if let Some(category) = &self.category {
            check_category(category, &mut errors);
        }
        if let Some(price) = self.price {
            check_price(price, &mut errors);
        }
        if let Some(description) = &self.description {
            check_description(description.as_deref(), &mut errors);
        }
        if let Some(image_url) = &self.image_url {
            check_image_url(image_url.as_deref(), &mut errors);
        }
        errors.into_result()
    }

    /// Whether the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.price.is_none()
            && self.quantity.is_none()
            && self.description.is_none()
            && self.image_url.is_none()
    }
}

/// Distinguishes an explicit `null` (clear the field) from an absent key.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn check_name(name: &str, errors: &mut ValidationErrors) {
    if name.trim().chars().count() < MIN_NAME_LENGTH {
        errors.push("name", "Name must be at least 3 characters");
    }
}

fn check_category(category: &str, errors: &mut ValidationErrors) {
    if category.trim().is_empty() {
        errors.push("category", "Category is required");
    }
}

fn check_price(price: Decimal, errors: &mut ValidationErrors) {
    if price < Decimal::ONE {
        errors.push("price", "Price must be at least ₹1");
    }
}

fn check_description(description: Option<&str>, errors: &mut ValidationErrors) {
    if let Some(description) = description
        && description.trim().chars().count() < MIN_DESCRIPTION_LENGTH
    {
        errors.push("description", "Description must be at least 10 characters");
    }
}

fn check_image_url(image_url: Option<&str>, errors: &mut ValidationErrors) {
    if let Some(image_url) = image_url
        && url::Url::parse(image_url).is_err()
    {
        errors.push("imageUrl", "Must be a valid URL");
    }
}

/// Inclusive price interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceRange {
    #[serde(with = "rust_decimal::serde::float")]
    pub min: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub max: Decimal,
}

impl PriceRange {
    /// Create a range; the bounds are swapped if given in the wrong order.
    #[must_use]
    pub fn new(a: Decimal, b: Decimal) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Whether `price` lies within the range (both ends inclusive).
    #[must_use]
    pub fn contains(&self, price: Decimal) -> bool {
        self.min <= price && price <= self.max
    }
}

/// Selects a slice of the catalog.
///
/// Also the cache key for that slice: two filters share cached results only
/// when every field is equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchFilter {
    pub query: Option<String>,
    pub category: Option<String>,
    pub price: Option<PriceRange>,
}

impl SearchFilter {
    /// Filter matching the whole catalog.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Set the free-text query. Blank input clears it.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = non_blank(query.into());
        self
    }

    /// Set the category. Blank input clears it.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = non_blank(category.into());
        self
    }

    /// Restrict to an inclusive price interval.
    #[must_use]
    pub fn with_price_range(mut self, min: Decimal, max: Decimal) -> Self {
        self.price = Some(PriceRange::new(min, max));
        self
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_owned())
    }
}
