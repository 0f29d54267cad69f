//! In-process implementation of [`ShopBackend`].
//!
//! Applies the same rules as the real API: unique emails, admin-only
//! inventory changes, stock checks, and signature verification before a
//! purchase is finalized. Seeded with the demo catalog and three demo
//! accounts (`admin@example.com`, `user@example.com`, `demo@example.com`,
//! all with password `password`).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sweetshop_core::{
    CurrencyCode, Email, NewSweet, PaymentOrder, PaymentProof, Price, PurchaseId,
    PurchaseReceipt, Role, SearchFilter, Sweet, SweetId, SweetUpdate, UserId, UserProfile,
};
use tracing::{debug, instrument};

use super::{ApiError, AuthResponse, Credentials, OrderRequest, Registration, ShopBackend};
use crate::checkout::signature::{random_token, verify_signature};

const DEMO_PASSWORD: &str = "password";
const MIN_PASSWORD_LENGTH: usize = 6;
const MIN_USERNAME_LENGTH: usize = 3;

/// Backend operations, for failure injection and call inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    Register,
    ListSweets,
    CreateSweet,
    UpdateSweet,
    SetQuantity,
    DeleteSweet,
    Restock,
    CreatePaymentOrder,
    VerifyPayment,
}

struct Account {
    profile: UserProfile,
    password: String,
}

struct PendingOrder {
    user_id: UserId,
    sweet_id: SweetId,
    quantity: u32,
    amount: i64,
}

#[derive(Default)]
struct MemoryState {
    sweets: Vec<Sweet>,
    accounts: Vec<Account>,
    tokens: HashMap<String, UserId>,
    orders: HashMap<String, PendingOrder>,
    purchases: Vec<PurchaseReceipt>,
    failures: HashMap<Operation, ApiError>,
    calls: Vec<Operation>,
    next_sweet_id: i64,
    next_user_id: i64,
    next_purchase_id: i64,
}

/// In-memory inventory and order API.
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    payment_secret: SecretString,
}

impl InMemoryBackend {
    /// An empty backend: no items, no accounts.
    #[must_use]
    pub fn new(payment_secret: SecretString) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_sweet_id: 1,
                next_user_id: 1,
                next_purchase_id: 1,
                ..MemoryState::default()
            }),
            payment_secret,
        }
    }

    /// A backend holding the demo catalog and demo accounts.
    #[must_use]
    pub fn seeded(payment_secret: SecretString) -> Self {
        let backend = Self::new(payment_secret);
        {
            let mut state = backend.lock();
            for (username, email, role) in [
                ("Admin", "admin@example.com", Role::Admin),
                ("User", "user@example.com", Role::User),
                ("Demo User", "demo@example.com", Role::User),
            ] {
                if let Ok(email) = Email::parse(email) {
                    state.add_account(username, email, DEMO_PASSWORD, role);
                }
            }
            for sweet in demo_catalog() {
                state.add_sweet(sweet);
            }
            // Seeded in id order; new items go to the front.
            state.sweets.reverse();
        }
        backend
    }

    /// Add an item directly, bypassing authorization.
    pub fn insert_sweet(&self, sweet: NewSweet) -> Sweet {
        let mut state = self.lock();
        state.add_sweet(sweet)
    }

    /// Current server-side copy of an item.
    #[must_use]
    pub fn sweet(&self, id: SweetId) -> Option<Sweet> {
        self.lock().sweets.iter().find(|s| s.id == id).cloned()
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: ApiError) {
        self.lock().failures.insert(operation, error);
    }

    /// Every operation called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Operation> {
        self.lock().calls.clone()
    }

    /// How many times `operation` has been called.
    #[must_use]
    pub fn call_count(&self, operation: Operation) -> usize {
        self.lock().calls.iter().filter(|&&op| op == operation).count()
    }

    /// Finalized purchases.
    #[must_use]
    pub fn purchases(&self) -> Vec<PurchaseReceipt> {
        self.lock().purchases.clone()
    }

    /// Secret the gateway signs payments with.
    #[must_use]
    pub const fn payment_secret(&self) -> &SecretString {
        &self.payment_secret
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryBackend")
            .field("sweets", &state.sweets.len())
            .field("accounts", &state.accounts.len())
            .field("payment_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl MemoryState {
    /// Record the call and surface an injected failure, if any.
    fn begin(&mut self, operation: Operation) -> Result<(), ApiError> {
        self.calls.push(operation);
        match self.failures.remove(&operation) {
            Some(error) => {
                debug!(?operation, "Injected failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn add_account(&mut self, username: &str, email: Email, password: &str, role: Role) -> UserProfile {
        let profile = UserProfile {
            id: UserId::new(self.next_user_id),
            email,
            username: username.to_string(),
            role,
            created_at: Utc::now(),
        };
        self.next_user_id += 1;
        self.accounts.push(Account {
            profile: profile.clone(),
            password: password.to_string(),
        });
        profile
    }

    /// New items go to the front of the catalog.
    fn add_sweet(&mut self, sweet: NewSweet) -> Sweet {
        let now = Utc::now();
        let created = Sweet {
            id: SweetId::new(self.next_sweet_id),
            name: sweet.name,
            category: sweet.category,
            price: sweet.price,
            quantity: sweet.quantity,
            description: sweet.description,
            image_url: sweet.image_url,
            created_at: now,
            updated_at: now,
        };
        self.next_sweet_id += 1;
        self.sweets.insert(0, created.clone());
        created
    }

    fn issue_token(&mut self, user_id: UserId) -> String {
        let token = format!("mock-token-{}", uuid::Uuid::new_v4());
        self.tokens.insert(token.clone(), user_id);
        token
    }

    fn authenticate(&self, token: &SecretString) -> Result<&UserProfile, ApiError> {
        let user_id = self
            .tokens
            .get(token.expose_secret())
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;
        self.accounts
            .iter()
            .map(|a| &a.profile)
            .find(|p| p.id == *user_id)
            .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))
    }

    fn require_admin(&self, token: &SecretString) -> Result<(), ApiError> {
        if self.authenticate(token)?.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin access required".to_string()))
        }
    }

    fn sweet_mut(&mut self, id: SweetId) -> Result<&mut Sweet, ApiError> {
        self.sweets
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ApiError::NotFound("Sweet not found".to_string()))
    }
}

#[async_trait]
impl ShopBackend for InMemoryBackend {
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        let mut state = self.lock();
        state.begin(Operation::Login)?;

        let user = state
            .accounts
            .iter()
            .find(|a| a.profile.email.as_str() == credentials.email)
            .filter(|a| a.password == credentials.password)
            .map(|a| a.profile.clone())
            .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

        let token = state.issue_token(user.id);
        Ok(AuthResponse { user, token })
    }

    #[instrument(skip(self, registration), fields(email = %registration.email))]
    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        let mut state = self.lock();
        state.begin(Operation::Register)?;

        let email = Email::parse(&registration.email)
            .map_err(|e| ApiError::Rejected(format!("Invalid email address: {e}")))?;
        if registration.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::Rejected(
                "Password must be at least 6 characters".to_string(),
            ));
        }
        if registration.username.trim().chars().count() < MIN_USERNAME_LENGTH {
            return Err(ApiError::Rejected(
                "Username must be at least 3 characters".to_string(),
            ));
        }
        if state.accounts.iter().any(|a| a.profile.email == email) {
            return Err(ApiError::Conflict(
                "This email is already registered.".to_string(),
            ));
        }

        let user = state.add_account(
            registration.username.trim(),
            email,
            &registration.password,
            Role::User,
        );
        let token = state.issue_token(user.id);
        Ok(AuthResponse { user, token })
    }

    #[instrument(skip(self))]
    async fn list_sweets(&self, filter: &SearchFilter) -> Result<Vec<Sweet>, ApiError> {
        let mut state = self.lock();
        state.begin(Operation::ListSweets)?;

        Ok(state
            .sweets
            .iter()
            .filter(|s| s.matches(filter))
            .cloned()
            .collect())
    }

    #[instrument(skip(self, token, sweet), fields(name = %sweet.name))]
    async fn create_sweet(
        &self,
        token: &SecretString,
        sweet: &NewSweet,
    ) -> Result<Sweet, ApiError> {
        let mut state = self.lock();
        state.begin(Operation::CreateSweet)?;
        state.require_admin(token)?;
        sweet
            .validate()
            .map_err(|e| ApiError::Rejected(e.to_string()))?;

        Ok(state.add_sweet(sweet.clone()))
    }

    #[instrument(skip(self, token, update), fields(sweet_id = %id))]
    async fn update_sweet(
        &self,
        token: &SecretString,
        id: SweetId,
        update: &SweetUpdate,
    ) -> Result<Sweet, ApiError> {
        let mut state = self.lock();
        state.begin(Operation::UpdateSweet)?;
        state.require_admin(token)?;
        update
            .validate()
            .map_err(|e| ApiError::Rejected(e.to_string()))?;

        let sweet = state.sweet_mut(id)?;
        sweet.apply(update);
        sweet.updated_at = Utc::now();
        Ok(sweet.clone())
    }

    #[instrument(skip(self, token), fields(sweet_id = %id))]
    async fn set_quantity(
        &self,
        token: &SecretString,
        id: SweetId,
        quantity: u32,
    ) -> Result<Sweet, ApiError> {
        let mut state = self.lock();
        state.begin(Operation::SetQuantity)?;
        state.require_admin(token)?;

        let sweet = state.sweet_mut(id)?;
        sweet.quantity = quantity;
        sweet.updated_at = Utc::now();
        Ok(sweet.clone())
    }

    #[instrument(skip(self, token), fields(sweet_id = %id))]
    async fn delete_sweet(&self, token: &SecretString, id: SweetId) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.begin(Operation::DeleteSweet)?;
        state.require_admin(token)?;

        let before = state.sweets.len();
        state.sweets.retain(|s| s.id != id);
        if state.sweets.len() == before {
            return Err(ApiError::NotFound("Sweet not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, token), fields(sweet_id = %id))]
    async fn restock(
        &self,
        token: &SecretString,
        id: SweetId,
        quantity: u32,
    ) -> Result<Sweet, ApiError> {
        let mut state = self.lock();
        state.begin(Operation::Restock)?;
        state.require_admin(token)?;
        if quantity == 0 {
            return Err(ApiError::Rejected(
                "Restock amount must be at least 1".to_string(),
            ));
        }

        let sweet = state.sweet_mut(id)?;
        sweet.quantity = sweet
            .quantity
            .checked_add(quantity)
            .ok_or_else(|| ApiError::Rejected("Quantity too large".to_string()))?;
        sweet.updated_at = Utc::now();
        Ok(sweet.clone())
    }

    #[instrument(skip(self, token), fields(sweet_id = %request.sweet_id, amount = request.amount))]
    async fn create_payment_order(
        &self,
        token: &SecretString,
        request: &OrderRequest,
    ) -> Result<PaymentOrder, ApiError> {
        let mut state = self.lock();
        state.begin(Operation::CreatePaymentOrder)?;
        let user_id = state.authenticate(token)?.id;

        if request.quantity == 0 {
            return Err(ApiError::Rejected("Quantity must be at least 1".to_string()));
        }
        let sweet = state.sweet_mut(request.sweet_id)?;
        if sweet.quantity < request.quantity {
            return Err(ApiError::Rejected("Not enough stock available".to_string()));
        }
        let expected = sweet
            .unit_price()
            .times(request.quantity)
            .and_then(Price::to_minor_units)
            .ok_or_else(|| ApiError::Rejected("Amount out of range".to_string()))?;
        if expected != request.amount {
            return Err(ApiError::Rejected(
                "Order amount does not match the current price".to_string(),
            ));
        }

        let order = PaymentOrder {
            id: format!("order_{}", random_token(14)),
            amount: expected,
            currency: CurrencyCode::INR,
            receipt: format!("receipt_{}", state.orders.len() + state.purchases.len() + 1),
        };
        state.orders.insert(
            order.id.clone(),
            PendingOrder {
                user_id,
                sweet_id: request.sweet_id,
                quantity: request.quantity,
                amount: expected,
            },
        );
        Ok(order)
    }

    #[instrument(skip(self, token, proof), fields(order_id = %proof.order_id))]
    async fn verify_payment(
        &self,
        token: &SecretString,
        proof: &PaymentProof,
    ) -> Result<PurchaseReceipt, ApiError> {
        let mut state = self.lock();
        state.begin(Operation::VerifyPayment)?;
        let user_id = state.authenticate(token)?.id;

        let order = state
            .orders
            .get(&proof.order_id)
            .ok_or_else(|| ApiError::NotFound("Payment order not found".to_string()))?;
        if order.user_id != user_id {
            return Err(ApiError::Forbidden(
                "Payment order belongs to another account".to_string(),
            ));
        }
        if !verify_signature(&self.payment_secret, proof) {
            return Err(ApiError::Rejected("Payment verification failed".to_string()));
        }
        let (sweet_id, quantity, amount) = (order.sweet_id, order.quantity, order.amount);

        let sweet = state.sweet_mut(sweet_id)?;
        if sweet.quantity < quantity {
            return Err(ApiError::Rejected("Not enough stock available".to_string()));
        }
        sweet.quantity -= quantity;
        sweet.updated_at = Utc::now();

        state.orders.remove(&proof.order_id);
        let receipt = PurchaseReceipt {
            id: PurchaseId::new(state.next_purchase_id),
            user_id,
            sweet_id,
            quantity,
            total_price: Price::from_minor_units(amount, CurrencyCode::INR).amount,
            purchase_date: Utc::now(),
            order_id: proof.order_id.clone(),
        };
        state.next_purchase_id += 1;
        state.purchases.push(receipt.clone());
        Ok(receipt)
    }
}

// =============================================================================
// Demo Data
// =============================================================================

fn demo_sweet(
    name: &str,
    category: &str,
    price: Decimal,
    quantity: u32,
    description: &str,
    photo: &str,
) -> NewSweet {
    NewSweet {
        name: name.to_string(),
        category: category.to_string(),
        price,
        quantity,
        description: Some(description.to_string()),
        image_url: Some(format!(
            "https://images.unsplash.com/photo-{photo}?auto=format&fit=crop&w=500&q=60"
        )),
    }
}

/// Demo catalog in id order.
fn demo_catalog() -> Vec<NewSweet> {
    vec![
        demo_sweet(
            "Chocolate Fudge Cake",
            "Cakes",
            Decimal::new(2599, 2),
            15,
            "A rich and decadent chocolate fudge cake, perfect for any celebration.",
            "1578985545062-69928b1d9587",
        ),
        demo_sweet(
            "Glazed Doughnuts",
            "Pastries",
            Decimal::new(250, 2),
            50,
            "Classic glazed doughnuts, light, fluffy, and utterly irresistible.",
            "1551024601-bec78aea704b",
        ),
        demo_sweet(
            "Gummy Bears",
            "Candies",
            Decimal::new(500, 2),
            120,
            "A colorful assortment of fruity gummy bears.",
            "1580574993627-3a49c78a3908",
        ),
        demo_sweet(
            "Strawberry Ice Cream",
            "Frozen",
            Decimal::new(750, 2),
            30,
            "Creamy strawberry ice cream made with real fruit.",
            "1580915411954-282cb1b0d780",
        ),
        demo_sweet(
            "Red Velvet Cupcakes",
            "Cakes",
            Decimal::new(400, 2),
            24,
            "Moist red velvet cupcakes with cream cheese frosting.",
            "1614707267537-78974675b872",
        ),
        demo_sweet(
            "Croissants",
            "Pastries",
            Decimal::new(300, 2),
            40,
            "Buttery, flaky croissants, perfect for breakfast.",
            "1555507036-ab1f4038808a",
        ),
        demo_sweet(
            "Lollipops",
            "Candies",
            Decimal::new(150, 2),
            200,
            "A rainbow of swirly lollipops in various flavors.",
            "1575849639852-ff4573677446",
        ),
        demo_sweet(
            "Mint Chocolate Chip Gelato",
            "Frozen",
            Decimal::new(800, 2),
            25,
            "Authentic Italian gelato with a refreshing mint flavor and rich chocolate chips.",
            "1567206563064-6f60f40a2b57",
        ),
        demo_sweet(
            "Macarons",
            "Pastries",
            Decimal::new(275, 2),
            60,
            "Delicate and colorful French macarons in assorted flavors.",
            "1558326567-98ae2405596b",
        ),
        demo_sweet(
            "Caramel Popcorn",
            "Candies",
            Decimal::new(625, 2),
            0,
            "Sweet and crunchy caramel-coated popcorn. Currently out of stock.",
            "1575379121482-6ce0d3d6242d",
        ),
    ]
}
