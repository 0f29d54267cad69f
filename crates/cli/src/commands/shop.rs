//! Catalog, cart, and checkout commands.

use sweetshop_core::{Price, SearchFilter, Sweet, SweetId};
use sweetshop_storefront::Storefront;
use tracing::info;

use super::CliError;

fn stock_label(sweet: &Sweet) -> String {
    if sweet.is_out_of_stock() {
        "Out of Stock".to_string()
    } else if sweet.is_low_stock() {
        format!("Only {} left", sweet.quantity)
    } else {
        format!("{} in stock", sweet.quantity)
    }
}

fn show_item(sweet: &Sweet) {
    info!(
        "#{:<4} {:<28} {:<10} {:>9}  {}",
        sweet.id,
        sweet.name,
        sweet.category,
        sweet.unit_price().to_string(),
        stock_label(sweet)
    );
}

pub async fn browse(shop: &mut Storefront, filter: &SearchFilter) -> Result<(), CliError> {
    let items = shop.browse(filter).await?;
    if items.is_empty() {
        info!("No sweets found");
        return Ok(());
    }
    for sweet in &items {
        show_item(sweet);
    }
    Ok(())
}

pub async fn stats(shop: &mut Storefront, filter: &SearchFilter) -> Result<(), CliError> {
    let stats = shop.stats(filter).await?;
    info!("Total sweets:    {}", stats.total_sweets);
    info!("Inventory value: ₹{:.2}", stats.total_value);
    info!("Low stock items: {}", stats.low_stock_items);
    info!("Categories:      {}", stats.categories);
    info!("Average price:   ₹{:.2}", stats.average_price);
    Ok(())
}

pub fn show_cart(shop: &Storefront) {
    let cart = shop.cart();
    if cart.is_empty() {
        info!("Your cart is empty");
        return;
    }
    for line in cart.lines() {
        info!(
            "#{:<4} {:<28} x{:<4} {:>9}",
            line.item.id,
            line.item.name,
            line.quantity,
            display_amount(line.subtotal())
        );
    }
    info!(
        "{} items, total {}",
        cart.total_items(),
        display_amount(cart.total_price())
    );
}

fn display_amount(amount: Option<Price>) -> String {
    amount.map_or_else(|| "out of range".to_string(), |price| price.to_string())
}

pub async fn add_to_cart(shop: &mut Storefront, sweet_id: i64, quantity: u32) -> Result<(), CliError> {
    let item = shop.find_sweet(SweetId::new(sweet_id)).await?;
    shop.add_to_cart(&item, quantity).await?;
    info!("Added {quantity} x {} to your cart", item.name);
    Ok(())
}

pub async fn set_quantity(shop: &mut Storefront, sweet_id: i64, quantity: u32) -> Result<(), CliError> {
    shop.set_cart_quantity(SweetId::new(sweet_id), quantity).await?;
    show_cart(shop);
    Ok(())
}

pub async fn remove(shop: &mut Storefront, sweet_id: i64) -> Result<(), CliError> {
    shop.remove_from_cart(SweetId::new(sweet_id)).await?;
    show_cart(shop);
    Ok(())
}

pub async fn clear(shop: &mut Storefront) -> Result<(), CliError> {
    shop.clear_cart().await?;
    info!("Cart cleared");
    Ok(())
}

pub async fn checkout(shop: &mut Storefront, sweet_id: i64) -> Result<(), CliError> {
    let receipt = shop.checkout(SweetId::new(sweet_id)).await?;
    info!(
        "Payment successful! Purchase #{} for ₹{:.2} (order {})",
        receipt.id, receipt.total_price, receipt.order_id
    );
    Ok(())
}

/// Sign in to the demo shop, buy two of the first item in stock, and show
/// the catalog before and after.
pub async fn demo(shop: &mut Storefront) -> Result<(), CliError> {
    let user = shop.login("demo@example.com", "password").await?;
    info!("Signed in as {}", user.username);

    let items = shop.browse(&SearchFilter::all()).await?;
    for sweet in &items {
        show_item(sweet);
    }

    let Some(item) = items.iter().find(|s| s.quantity >= 2) else {
        info!("Nothing in stock");
        return Ok(());
    };
    shop.add_to_cart(item, 2).await?;
    show_cart(shop);

    let receipt = shop.checkout(item.id).await?;
    info!(
        "Payment successful! Purchase #{} for ₹{:.2}",
        receipt.id, receipt.total_price
    );

    let after = shop.find_sweet(item.id).await?;
    show_item(&after);
    Ok(())
}
