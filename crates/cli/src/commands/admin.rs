//! Inventory management commands. All require an admin session.

use sweetshop_core::{NewSweet, SweetId, SweetUpdate};
use sweetshop_storefront::Storefront;
use tracing::info;

use super::CliError;

pub async fn create(shop: &mut Storefront, sweet: &NewSweet) -> Result<(), CliError> {
    let created = shop.create_item(sweet).await?;
    info!("Created #{} {}", created.id, created.name);
    Ok(())
}

pub async fn update(shop: &mut Storefront, sweet_id: i64, update: &SweetUpdate) -> Result<(), CliError> {
    let updated = shop.update_item(SweetId::new(sweet_id), update).await?;
    info!("Updated #{} {}", updated.id, updated.name);
    Ok(())
}

pub async fn delete(shop: &mut Storefront, sweet_id: i64) -> Result<(), CliError> {
    shop.delete_item(SweetId::new(sweet_id)).await?;
    info!("Deleted #{sweet_id}");
    Ok(())
}

pub async fn restock(shop: &mut Storefront, sweet_id: i64, amount: u32) -> Result<(), CliError> {
    let updated = shop.restock(SweetId::new(sweet_id), amount).await?;
    info!("{} now has {} in stock", updated.name, updated.quantity);
    Ok(())
}

pub async fn set_stock(shop: &mut Storefront, sweet_id: i64, quantity: u32) -> Result<(), CliError> {
    let updated = shop.set_stock(SweetId::new(sweet_id), quantity).await?;
    info!("{} now has {} in stock", updated.name, updated.quantity);
    Ok(())
}
