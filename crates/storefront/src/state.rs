//! The storefront: injected stores plus the collaborators they sync with.
//!
//! [`Storefront`] owns the cart, the session, and the catalog cache, and
//! talks to a [`ShopBackend`], a [`PaymentWidget`], and a [`StateStore`]
//! handed to it at construction. Cart and session are restored from the
//! state store on open and written back after every change.
//!
//! All remote failures come back as [`AppError`] values. A 401 from any
//! call ends the session.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use sweetshop_core::{
    Email, NewSweet, PurchaseReceipt, SearchFilter, Sweet, SweetId, SweetUpdate, UserProfile,
    ValidationErrors,
};
use tracing::{info, instrument, warn};

use crate::api::{ApiError, Credentials, Registration, ShopBackend};
use crate::cart::{CartError, CartStore, StockAdjustment};
use crate::catalog::CatalogCache;
use crate::checkout::{CheckoutError, CheckoutFlow, PaymentWidget, WidgetSettings};
use crate::config::StorefrontConfig;
use crate::error::{AppError, Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::optimistic::{self, QuantityEdit};
use crate::persist::{StateStore, keys, load_json, save_json};
use crate::session::{PersistedSession, Session, SessionStore};
use crate::stats::InventoryStats;

const MIN_PASSWORD_LENGTH: usize = 6;
const MIN_USERNAME_LENGTH: usize = 3;

/// Tunables for a [`Storefront`].
#[derive(Debug, Clone)]
pub struct StorefrontOptions {
    /// How long a fetched catalog slice stays fresh.
    pub cache_ttl: Duration,
    /// Merchant details passed to the payment widget.
    pub widget: WidgetSettings,
}

impl Default for StorefrontOptions {
    fn default() -> Self {
        Self::from(&StorefrontConfig::default())
    }
}

impl From<&StorefrontConfig> for StorefrontOptions {
    fn from(config: &StorefrontConfig) -> Self {
        Self {
            cache_ttl: config.cache_ttl,
            widget: WidgetSettings::new(config.payment.key_id.clone()),
        }
    }
}

/// Client-side state of the shop and the operations on it.
pub struct Storefront {
    backend: Arc<dyn ShopBackend>,
    widget: Arc<dyn PaymentWidget>,
    store: Arc<dyn StateStore>,
    catalog: CatalogCache,
    cart: CartStore,
    session: SessionStore,
    widget_settings: WidgetSettings,
}

impl Storefront {
    /// Build a storefront and restore the persisted cart and session.
    ///
    /// # Arguments
    ///
    /// * `backend` - Remote inventory and order API
    /// * `widget` - Payment overlay used at checkout
    /// * `store` - Where the cart and session are persisted
    /// * `options` - Cache and widget settings
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read.
    pub async fn open(
        backend: Arc<dyn ShopBackend>,
        widget: Arc<dyn PaymentWidget>,
        store: Arc<dyn StateStore>,
        options: StorefrontOptions,
    ) -> Result<Self> {
        let cart = load_json::<CartStore>(&*store, keys::CART)
            .await?
            .unwrap_or_default();

        let mut session = SessionStore::new();
        if let Some(persisted) = load_json::<PersistedSession>(&*store, keys::SESSION).await? {
            let restored = Session::from(persisted);
            set_sentry_user(&restored.user().id, Some(restored.user().email.as_str()));
            session.login(restored);
        }

        Ok(Self {
            backend,
            widget,
            store,
            catalog: CatalogCache::new(options.cache_ttl),
            cart,
            session,
            widget_settings: options.widget,
        })
    }

    /// The cart.
    #[must_use]
    pub const fn cart(&self) -> &CartStore {
        &self.cart
    }

    /// The session store.
    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// The signed-in account, if any.
    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.session.user()
    }

    /// The catalog cache.
    #[must_use]
    pub const fn catalog(&self) -> &CatalogCache {
        &self.catalog
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Sign in.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a malformed email or short
    /// password (nothing is sent), or `AppError::Authentication` if the
    /// credentials are wrong.
    #[instrument(skip(self, password))]
    pub async fn login(&mut self, email: &str, password: &str) -> Result<UserProfile> {
        let mut errors = ValidationErrors::new();
        check_email(email, &mut errors);
        check_password(password, &mut errors);
        errors.into_result()?;

        let credentials = Credentials {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let response = match self.backend.login(&credentials).await {
            Ok(response) => response,
            Err(e) => return Err(self.api_failure(e).await),
        };

        self.start_session(response.user, response.token).await
    }

    /// Create an account and sign in to it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for invalid fields (nothing is sent),
    /// or `AppError::Conflict` on the `email` field if it is taken.
    #[instrument(skip(self, password))]
    pub async fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile> {
        let mut errors = ValidationErrors::new();
        if username.trim().chars().count() < MIN_USERNAME_LENGTH {
            errors.push("username", "Username must be at least 3 characters");
        }
        check_email(email, &mut errors);
        check_password(password, &mut errors);
        errors.into_result()?;

        let registration = Registration {
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let response = match self.backend.register(&registration).await {
            Ok(response) => response,
            Err(ApiError::Conflict(message)) => {
                return Err(AppError::Conflict {
                    field: Some("email".to_string()),
                    message,
                });
            }
            Err(e) => return Err(self.api_failure(e).await),
        };

        self.start_session(response.user, response.token).await
    }

    /// Sign out and forget the persisted session.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted session cannot be removed.
    pub async fn logout(&mut self) -> Result<()> {
        if let Some(ended) = self.session.logout() {
            info!(user_id = %ended.user().id, "Signed out");
        }
        clear_sentry_user();
        self.store.remove(keys::SESSION).await?;
        Ok(())
    }

    async fn start_session(&mut self, user: UserProfile, token: String) -> Result<UserProfile> {
        let session = Session::new(user.clone(), SecretString::from(token));
        save_json(&*self.store, keys::SESSION, &PersistedSession::from(&session)).await?;
        self.session.login(session);

        set_sentry_user(&user.id, Some(user.email.as_str()));
        let role = user.role.to_string();
        add_breadcrumb("auth", "Signed in", Some(&[("role", role.as_str())]));
        info!(user_id = %user.id, role = %user.role, "Signed in");
        Ok(user)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Items matching `filter`, through the catalog cache.
    ///
    /// Cart lines for returned items are refreshed against the new stock
    /// figures: clamped if stock fell below the line, dropped if sold out.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails.
    pub async fn browse(&mut self, filter: &SearchFilter) -> Result<Vec<Sweet>> {
        let items = match self.catalog.fetch(&*self.backend, filter).await {
            Ok(items) => items,
            Err(e) => return Err(self.api_failure(e).await),
        };

        let adjustments = self.cart.reconcile(&items);
        for adjustment in &adjustments {
            match adjustment {
                StockAdjustment::Clamped { sweet_id, from, to } => {
                    info!(%sweet_id, from, to, "Cart line clamped to available stock");
                }
                StockAdjustment::Removed { sweet_id } => {
                    info!(%sweet_id, "Sold-out item removed from cart");
                }
            }
        }
        if !adjustments.is_empty() {
            self.persist_cart().await?;
        }

        Ok(items)
    }

    /// One item, looked up in the full catalog.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no such item exists.
    pub async fn find_sweet(&mut self, id: SweetId) -> Result<Sweet> {
        self.browse(&SearchFilter::all())
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound("Sweet not found".to_string()))
    }

    /// Dashboard analytics over the slice selected by `filter` (admin).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` for non-admins, `AppError::OutOfRange`
    /// if the slice's value overflows, or the fetch error.
    pub async fn stats(&mut self, filter: &SearchFilter) -> Result<InventoryStats> {
        self.admin_token()?;
        let items = self.browse(filter).await?;
        InventoryStats::from_items(&items).ok_or_else(|| {
            AppError::OutOfRange("Inventory value is too large to total".to_string())
        })
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Add `quantity` units of `item` to the cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cart` (and leaves the cart alone) if the cart
    /// would exceed the item's stock.
    pub async fn add_to_cart(&mut self, item: &Sweet, quantity: u32) -> Result<()> {
        self.cart.add_item(item, quantity)?;
        let sweet_id = item.id.to_string();
        add_breadcrumb("cart", "Added item", Some(&[("sweet_id", sweet_id.as_str())]));
        self.persist_cart().await
    }

    /// Set a cart line's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cart` if the line is missing, or if the quantity
    /// exceeded stock (the line is then clamped to stock and saved).
    pub async fn set_cart_quantity(&mut self, sweet_id: SweetId, quantity: u32) -> Result<()> {
        match self.cart.update_quantity(sweet_id, quantity) {
            Ok(()) => self.persist_cart().await,
            Err(err @ (CartError::Clamped { .. } | CartError::OutOfStock { .. })) => {
                self.persist_cart().await?;
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove a line from the cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cart` if there is no such line.
    pub async fn remove_from_cart(&mut self, sweet_id: SweetId) -> Result<()> {
        self.cart.remove_item(sweet_id)?;
        self.persist_cart().await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be saved.
    pub async fn clear_cart(&mut self) -> Result<()> {
        self.cart.clear();
        self.persist_cart().await
    }

    async fn persist_cart(&self) -> Result<()> {
        save_json(&*self.store, keys::CART, &self.cart).await?;
        Ok(())
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Pay for one cart line.
    ///
    /// On success the line leaves the cart and the catalog cache is dropped
    /// (stock changed). A failure to save the updated cart is reported but
    /// still yields the receipt. On any failure the cart is untouched.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Checkout` naming the step that failed.
    #[instrument(skip(self))]
    pub async fn checkout(&mut self, sweet_id: SweetId) -> Result<PurchaseReceipt> {
        let session = self
            .session
            .current()
            .ok_or(CheckoutError::NotAuthenticated)?
            .clone();
        let line = self
            .cart
            .line(sweet_id)
            .ok_or(CheckoutError::NotInCart(sweet_id))?
            .clone();

        let id = sweet_id.to_string();
        add_breadcrumb("checkout", "Started checkout", Some(&[("sweet_id", id.as_str())]));

        let mut flow = CheckoutFlow::new();
        let outcome = flow
            .run(
                &*self.backend,
                &*self.widget,
                &self.widget_settings,
                &session,
                &line,
            )
            .await;

        match outcome {
            Ok(receipt) => {
                self.catalog.invalidate_all().await;
                self.cart.remove_item(sweet_id)?;
                // Purchase is final: report a failed save, keep the receipt.
                if let Err(err) = self.persist_cart().await {
                    let _ = err.report();
                }
                Ok(receipt)
            }
            Err(err) => {
                if err.api_error().is_some_and(ApiError::is_unauthorized) {
                    self.end_rejected_session().await;
                }
                Err(AppError::Checkout(err).report())
            }
        }
    }

    // =========================================================================
    // Admin
    // =========================================================================

    /// Add an item to the catalog (admin).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for invalid fields, or
    /// `AppError::Forbidden` for non-admins; nothing is sent in either case.
    #[instrument(skip(self, sweet), fields(name = %sweet.name))]
    pub async fn create_item(&mut self, sweet: &NewSweet) -> Result<Sweet> {
        let token = self.admin_token()?;
        sweet.validate()?;

        match self.backend.create_sweet(&token, sweet).await {
            Ok(created) => {
                self.catalog.invalidate_all().await;
                info!(sweet_id = %created.id, "Item created");
                Ok(created)
            }
            Err(e) => Err(self.api_failure(e).await),
        }
    }

    /// Edit an item (admin).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for invalid or empty updates,
    /// `AppError::Forbidden` for non-admins, or the backend error.
    #[instrument(skip(self, update))]
    pub async fn update_item(&mut self, id: SweetId, update: &SweetUpdate) -> Result<Sweet> {
        let token = self.admin_token()?;
        if update.is_empty() {
            let mut errors = ValidationErrors::new();
            errors.push("update", "Nothing to update");
            return Err(errors.into());
        }
        update.validate()?;

        match self.backend.update_sweet(&token, id, update).await {
            Ok(updated) => {
                self.catalog.invalidate_all().await;
                Ok(updated)
            }
            Err(e) => Err(self.api_failure(e).await),
        }
    }

    /// Remove an item from the catalog (admin).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` for non-admins, or the backend error.
    #[instrument(skip(self))]
    pub async fn delete_item(&mut self, id: SweetId) -> Result<()> {
        let token = self.admin_token()?;

        match self.backend.delete_sweet(&token, id).await {
            Ok(()) => {
                self.catalog.invalidate_all().await;
                info!(sweet_id = %id, "Item deleted");
                Ok(())
            }
            Err(e) => Err(self.api_failure(e).await),
        }
    }

    /// Add `amount` units to an item's stock (admin).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if `amount` is zero,
    /// `AppError::Forbidden` for non-admins, or the backend error.
    #[instrument(skip(self))]
    pub async fn restock(&mut self, id: SweetId, amount: u32) -> Result<Sweet> {
        let token = self.admin_token()?;
        if amount == 0 {
            let mut errors = ValidationErrors::new();
            errors.push("quantityToAdd", "Must add at least 1 unit");
            return Err(errors.into());
        }

        match self.backend.restock(&token, id, amount).await {
            Ok(updated) => {
                self.catalog.invalidate_all().await;
                Ok(updated)
            }
            Err(e) => Err(self.api_failure(e).await),
        }
    }

    /// Overwrite an item's available quantity (admin), optimistically.
    ///
    /// Cached slices show the new quantity immediately; if the server
    /// refuses, they are restored exactly.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` for non-admins, or the backend error
    /// after rolling back.
    pub async fn set_stock(&mut self, id: SweetId, quantity: u32) -> Result<Sweet> {
        let token = self.admin_token()?;
        let edit = QuantityEdit {
            sweet_id: id,
            quantity,
        };

        match optimistic::update_quantity(&self.catalog, &*self.backend, &token, edit).await {
            Ok(updated) => Ok(updated),
            Err(e) => Err(self.api_failure(e).await),
        }
    }

    /// Token of the signed-in admin.
    fn admin_token(&self) -> Result<SecretString> {
        let session = self
            .session
            .current()
            .ok_or_else(|| AppError::Authentication("Please log in".to_string()))?;
        if !session.user().is_admin() {
            return Err(AppError::Forbidden(
                "Administrator privileges required".to_string(),
            ));
        }
        Ok(session.token().clone())
    }

    // =========================================================================
    // Failure Handling
    // =========================================================================

    /// Convert a backend error, ending the session on 401.
    async fn api_failure(&mut self, err: ApiError) -> AppError {
        if err.is_unauthorized() && self.session.is_authenticated() {
            self.end_rejected_session().await;
        }
        AppError::from(err).report()
    }

    async fn end_rejected_session(&mut self) {
        warn!("Session rejected by server, signing out");
        self.session.logout();
        clear_sentry_user();
        if let Err(e) = self.store.remove(keys::SESSION).await {
            warn!(error = %e, "Failed to remove persisted session");
        }
    }
}

fn check_email(email: &str, errors: &mut ValidationErrors) {
    if Email::parse(email.trim()).is_err() {
        errors.push("email", "Invalid email address");
    }
}

fn check_password(password: &str, errors: &mut ValidationErrors) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push("password", "Password must be at least 6 characters");
    }
}
