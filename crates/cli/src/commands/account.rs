//! Sign-in and account commands.

use sweetshop_storefront::Storefront;
use tracing::info;

use super::CliError;

/// Sign in and keep the session.
pub async fn login(shop: &mut Storefront, email: &str, password: &str) -> Result<(), CliError> {
    let user = shop.login(email, password).await?;
    info!("Welcome back, {}!", user.username);
    Ok(())
}

/// Create an account and sign in to it.
pub async fn register(
    shop: &mut Storefront,
    username: &str,
    email: &str,
    password: &str,
) -> Result<(), CliError> {
    let user = shop.register(username, email, password).await?;
    info!("Account created. Welcome, {}!", user.username);
    Ok(())
}

pub async fn logout(shop: &mut Storefront) -> Result<(), CliError> {
    shop.logout().await?;
    info!("Signed out");
    Ok(())
}

pub fn whoami(shop: &Storefront) {
    match shop.user() {
        Some(user) => info!("{} <{}> ({})", user.username, user.email, user.role),
        None => info!("Not signed in"),
    }
}
