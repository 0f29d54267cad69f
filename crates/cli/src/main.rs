//! Sweet Shop CLI - Browse, buy, and manage inventory from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the session is kept in the state directory)
//! sweetshop login -e demo@example.com -p password
//!
//! # Browse the catalog
//! sweetshop browse --category Candies --min-price 1 --max-price 5
//!
//! # Fill the cart and pay for one line
//! sweetshop cart add 3 --quantity 2
//! sweetshop checkout 3
//!
//! # Inventory management (admin accounts)
//! sweetshop admin restock 10 --amount 25
//!
//! # Walk through a purchase against the built-in demo shop
//! sweetshop demo
//! ```
//!
//! # Environment Variables
//!
//! - `SWEETSHOP_API_URL` - Base URL of the inventory API (required unless `--offline`)
//! - `SWEETSHOP_STATE_DIR` - Where the cart and session are saved
//! - `SENTRY_DSN` - Optional error tracking

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use sweetshop_core::{NewSweet, SearchFilter, SweetUpdate};
use sweetshop_storefront::api::{HttpBackend, InMemoryBackend};
use sweetshop_storefront::checkout::signature::generate_secret;
use sweetshop_storefront::checkout::{SimulatedPayment, SimulatedWidget};
use sweetshop_storefront::config::StorefrontConfig;
use sweetshop_storefront::persist::{FileStore, MemoryStore};
use sweetshop_storefront::{Storefront, StorefrontOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod widget;

use commands::CliError;
use widget::ConsoleWidget;

#[derive(Parser)]
#[command(name = "sweetshop")]
#[command(author, version, about = "Sweet Shop command-line storefront")]
struct Cli {
    /// Use the built-in demo shop instead of the remote API.
    /// Nothing is kept between runs.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Sign out
    Logout,
    /// Show the signed-in account
    Whoami,
    /// List catalog items
    Browse(FilterArgs),
    /// Inventory analytics (admin)
    Stats(FilterArgs),
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Pay for one cart line
    Checkout {
        /// Item id of the cart line
        sweet_id: i64,
    },
    /// Manage inventory (admin)
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Sign in to the demo shop and buy something
    Demo,
}

/// Catalog search options.
#[derive(Args)]
struct FilterArgs {
    /// Case-insensitive name search
    #[arg(short, long)]
    query: Option<String>,
    /// Exact category
    #[arg(short, long)]
    category: Option<String>,
    /// Lowest unit price (needs --max-price)
    #[arg(long, requires = "max_price")]
    min_price: Option<Decimal>,
    /// Highest unit price (needs --min-price)
    #[arg(long, requires = "min_price")]
    max_price: Option<Decimal>,
}

impl From<FilterArgs> for SearchFilter {
    fn from(args: FilterArgs) -> Self {
        let mut filter = Self::all();
        if let Some(query) = args.query {
            filter = filter.with_query(query);
        }
        if let Some(category) = args.category {
            filter = filter.with_category(category);
        }
        if let (Some(min), Some(max)) = (args.min_price, args.max_price) {
            filter = filter.with_price_range(min, max);
        }
        filter
    }
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add units of an item
    Add {
        sweet_id: i64,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set a line's quantity (0 removes it)
    Set { sweet_id: i64, quantity: u32 },
    /// Remove a line
    Remove { sweet_id: i64 },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum AdminAction {
    /// Add an item to the catalog
    Create {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        category: String,
        #[arg(short, long)]
        price: Decimal,
        #[arg(short, long, default_value_t = 0)]
        quantity: u32,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        image_url: Option<String>,
    },
    /// Edit an item's details
    Update {
        sweet_id: i64,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        price: Option<Decimal>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        image_url: Option<String>,
    },
    /// Remove an item
    Delete { sweet_id: i64 },
    /// Add units to an item's stock
    Restock {
        sweet_id: i64,
        #[arg(short, long)]
        amount: u32,
    },
    /// Overwrite an item's stock
    SetStock { sweet_id: i64, quantity: u32 },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::debug!("Sentry initialized");
    Some(guard)
}

/// Log directives used when `RUST_LOG` is unset. Command output is logged
/// from this binary's own target, so it must be enabled here.
fn default_log_filter() -> String {
    format!("{}=info,sweetshop_storefront=info", env!("CARGO_CRATE_NAME"))
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let config = StorefrontConfig::from_env().expect("Failed to load configuration");

    // Sentry must be up before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_log_filter().into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().without_time().with_target(false))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &StorefrontConfig) -> Result<(), CliError> {
    let offline = cli.offline || matches!(cli.command, Commands::Demo);
    let mut shop = if offline {
        open_offline(config).await?
    } else {
        open_online(config).await?
    };

    match cli.command {
        Commands::Login { email, password } => {
            commands::account::login(&mut shop, &email, &password).await?;
        }
        Commands::Register {
            username,
            email,
            password,
        } => commands::account::register(&mut shop, &username, &email, &password).await?,
        Commands::Logout => commands::account::logout(&mut shop).await?,
        Commands::Whoami => commands::account::whoami(&shop),
        Commands::Browse(filter) => commands::shop::browse(&mut shop, &filter.into()).await?,
        Commands::Stats(filter) => commands::shop::stats(&mut shop, &filter.into()).await?,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::shop::show_cart(&shop),
            CartAction::Add { sweet_id, quantity } => {
                commands::shop::add_to_cart(&mut shop, sweet_id, quantity).await?;
            }
            CartAction::Set { sweet_id, quantity } => {
                commands::shop::set_quantity(&mut shop, sweet_id, quantity).await?;
            }
            CartAction::Remove { sweet_id } => {
                commands::shop::remove(&mut shop, sweet_id).await?;
            }
            CartAction::Clear => commands::shop::clear(&mut shop).await?,
        },
        Commands::Checkout { sweet_id } => commands::shop::checkout(&mut shop, sweet_id).await?,
        Commands::Admin { action } => match action {
            AdminAction::Create {
                name,
                category,
                price,
                quantity,
                description,
                image_url,
            } => {
                let sweet = NewSweet {
                    name,
                    category,
                    price,
                    quantity,
                    description,
                    image_url,
                };
                commands::admin::create(&mut shop, &sweet).await?;
            }
            AdminAction::Update {
                sweet_id,
                name,
                category,
                price,
                description,
                image_url,
            } => {
                let update = SweetUpdate {
                    name,
                    category,
                    price,
                    description: description.map(Some),
                    image_url: image_url.map(Some),
                    ..Default::default()
                };
                commands::admin::update(&mut shop, sweet_id, &update).await?;
            }
            AdminAction::Delete { sweet_id } => commands::admin::delete(&mut shop, sweet_id).await?,
            AdminAction::Restock { sweet_id, amount } => {
                commands::admin::restock(&mut shop, sweet_id, amount).await?;
            }
            AdminAction::SetStock { sweet_id, quantity } => {
                commands::admin::set_stock(&mut shop, sweet_id, quantity).await?;
            }
        },
        Commands::Demo => commands::shop::demo(&mut shop).await?,
    }
    Ok(())
}

/// Storefront against the remote API, saving state under the state dir.
async fn open_online(config: &StorefrontConfig) -> Result<Storefront, CliError> {
    let base_url = config.require_api_url()?.clone();
    let backend = HttpBackend::new(base_url, config.http_timeout)?;
    let store = FileStore::new(config.state_dir.clone());

    Ok(Storefront::open(
        Arc::new(backend),
        Arc::new(ConsoleWidget),
        Arc::new(store),
        StorefrontOptions::from(config),
    )
    .await?)
}

/// Storefront against the seeded in-memory shop.
async fn open_offline(config: &StorefrontConfig) -> Result<Storefront, CliError> {
    let secret = config
        .payment
        .secret
        .clone()
        .unwrap_or_else(generate_secret);
    let backend = InMemoryBackend::seeded(secret.clone());
    let widget = SimulatedWidget::new(secret, SimulatedPayment::Approve);

    Ok(Storefront::open(
        Arc::new(backend),
        Arc::new(widget),
        Arc::new(MemoryStore::new()),
        StorefrontOptions::from(config),
    )
    .await?)
}
