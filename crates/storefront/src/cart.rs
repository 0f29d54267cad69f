//! The shopper's cart.
//!
//! A cart line is a snapshot of the item as it was when added plus the
//! desired quantity. Quantities are checked against the snapshot's stock;
//! the server re-checks at payment time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sweetshop_core::{CurrencyCode, Price, Sweet, SweetId};
use thiserror::Error;

/// Errors from cart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Asked to add zero units.
    #[error("Quantity must be at least 1")]
    ZeroQuantity,

    /// The item has no stock left.
    #[error("{name} is out of stock")]
    OutOfStock { name: String },

    /// Adding would take the line past the available stock.
    #[error("Cannot add more {name}. Only {available} available in stock.")]
    ExceedsStock {
        name: String,
        requested: u32,
        available: u32,
    },

    /// A line was set above the available stock and has been clamped.
    #[error("Only {available} of {name} available in stock.")]
    Clamped {
        name: String,
        requested: u32,
        available: u32,
    },

    /// No line for this item.
    #[error("Item {0} is not in the cart")]
    NotInCart(SweetId),
}

/// One item in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item: Sweet,
    pub quantity: u32,
}

impl CartLine {
    /// Unit price times quantity, `None` if the amount overflows.
    #[must_use]
    pub fn subtotal(&self) -> Option<Price> {
        self.item.unit_price().times(self.quantity)
    }
}

/// A line changed because fresh stock figures arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockAdjustment {
    /// Quantity lowered to what is now available.
    Clamped {
        sweet_id: SweetId,
        from: u32,
        to: u32,
    },
    /// Line dropped because the item sold out.
    Removed { sweet_id: SweetId },
}

/// Lines in the order they were first added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartStore {
    lines: Vec<CartLine>,
}

impl CartStore {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Add `quantity` units of `item`, merging with an existing line.
    ///
    /// The line's snapshot is refreshed from `item`.
    ///
    /// # Errors
    ///
    /// Leaves the cart unchanged and returns a [`CartError`] if `quantity`
    /// is zero or the line would exceed `item.quantity`.
    pub fn add_item(&mut self, item: &Sweet, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }
        if item.is_out_of_stock() {
            return Err(CartError::OutOfStock {
                name: item.name.clone(),
            });
        }

        let in_cart = self.quantity_of(item.id);
        let requested = in_cart.saturating_add(quantity);
        if requested > item.quantity {
            return Err(CartError::ExceedsStock {
                name: item.name.clone(),
                requested,
                available: item.quantity,
            });
        }

        match self.line_mut(item.id) {
            Some(line) => {
                line.quantity = requested;
                line.item = item.clone();
            }
            None => self.lines.push(CartLine {
                item: item.clone(),
                quantity,
            }),
        }
        Ok(())
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// A quantity above the line's available stock is clamped to it; the
    /// clamp is kept and reported as [`CartError::Clamped`].
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotInCart`] if there is no such line, or
    /// [`CartError::Clamped`] after clamping.
    pub fn update_quantity(&mut self, sweet_id: SweetId, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove_item(sweet_id);
        }

        let line = self
            .line_mut(sweet_id)
            .ok_or(CartError::NotInCart(sweet_id))?;
        let available = line.item.quantity;
        if quantity > available {
            if available == 0 {
                let name = line.item.name.clone();
                self.lines.retain(|l| l.item.id != sweet_id);
                return Err(CartError::OutOfStock { name });
            }
            line.quantity = available;
            return Err(CartError::Clamped {
                name: line.item.name.clone(),
                requested: quantity,
                available,
            });
        }

        line.quantity = quantity;
        Ok(())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotInCart`] if there is no such line.
    pub fn remove_item(&mut self, sweet_id: SweetId) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| l.item.id != sweet_id);
        if self.lines.len() == before {
            Err(CartError::NotInCart(sweet_id))
        } else {
            Ok(())
        }
    }

    /// Empty the cart.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Refresh line snapshots from freshly fetched items.
    ///
    /// Lines whose item is not in `fresh` are left alone. Lines above the
    /// new stock are clamped; lines whose item sold out are removed.
    pub fn reconcile(&mut self, fresh: &[Sweet]) -> Vec<StockAdjustment> {
        let mut adjustments = Vec::new();

        for line in &mut self.lines {
            let Some(item) = fresh.iter().find(|s| s.id == line.item.id) else {
                continue;
            };
            line.item = item.clone();
            if item.quantity == 0 {
                adjustments.push(StockAdjustment::Removed { sweet_id: item.id });
            } else if line.quantity > item.quantity {
                adjustments.push(StockAdjustment::Clamped {
                    sweet_id: item.id,
                    from: line.quantity,
                    to: item.quantity,
                });
                line.quantity = item.quantity;
            }
        }

        self.lines.retain(|l| l.item.quantity > 0);
        adjustments
    }

    /// All lines.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Line for an item, if any.
    #[must_use]
    pub fn line(&self, sweet_id: SweetId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.item.id == sweet_id)
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total units across all lines.
    #[must_use]
    pub fn total_items(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Sum of line subtotals, `None` if any amount overflows.
    #[must_use]
    pub fn total_price(&self) -> Option<Price> {
        self.lines
            .iter()
            .try_fold(Price::new(Decimal::ZERO, CurrencyCode::INR), |total, line| {
                total.checked_add(line.subtotal()?)
            })
    }

    fn quantity_of(&self, sweet_id: SweetId) -> u32 {
        self.line(sweet_id).map_or(0, |l| l.quantity)
    }

    fn line_mut(&mut self, sweet_id: SweetId) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|l| l.item.id == sweet_id)
    }
}
