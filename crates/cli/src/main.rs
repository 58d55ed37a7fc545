//! Aurora CLI - a terminal front end for the storefront client.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog
//! aurora products --category Deportivo --gender Mujer
//!
//! # Fill the cart (works signed out; synced once you sign in)
//! aurora cart add 4 --size M --color Gris
//! aurora cart show
//!
//! # Sign in, like a product, start a checkout
//! aurora login -e ana@example.com
//! aurora wishlist add 2 --notify
//! aurora checkout --shipping express --coupon VERANO15
//! ```
//!
//! Remote collaborators are read from the environment (see
//! `StorefrontConfig::from_env`); without them the cart is local-only.

#![cfg_attr(not(test), forbid(unsafe_code))]

use aurora_core::checkout::{PaymentProvider, ShippingMethod};
use aurora_core::{ProductId, filter::ALL_CATEGORIES};
use aurora_storefront::config::StorefrontConfig;
use aurora_storefront::error::AppError;
use aurora_storefront::notice::{Notice, NoticeLevel};
use aurora_storefront::AppState;
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "aurora")]
#[command(author, version, about = "Aurora storefront client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog products
    Products {
        /// Case-insensitive text searched in name and description
        #[arg(short, long, default_value = "")]
        query: String,

        /// Style category
        #[arg(short, long, default_value = ALL_CATEGORIES)]
        category: String,

        /// Target gender (repeatable)
        #[arg(short, long)]
        gender: Vec<String>,

        /// Garment type (repeatable)
        #[arg(short = 't', long = "type")]
        kind: Vec<String>,
    },
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "AURORA_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage liked products
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Start a checkout for the current cart
    Checkout {
        /// Receipt email (defaults to the signed-in user's)
        #[arg(short, long)]
        email: Option<String>,

        #[arg(short, long)]
        name: Option<String>,

        /// `standard`, `express` or `pickup`
        #[arg(short, long, default_value = "standard")]
        shipping: ShippingMethod,

        #[arg(long)]
        coupon: Option<String>,

        #[arg(long, default_value = "mercadopago")]
        provider: PaymentProvider,
    },
    /// List your orders
    Orders,
    /// Show or edit your profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add a product
    Add {
        product_id: ProductId,

        /// Size (defaults to the product's first size)
        #[arg(short, long)]
        size: Option<String>,

        /// Color (defaults to the product's first color)
        #[arg(short, long)]
        color: Option<String>,
    },
    /// Remove a line by its position in `cart show`
    Remove { line: usize },
    /// Set a line's quantity; zero removes it
    Update { line: usize, quantity: u32 },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Show liked products
    Show,
    /// Like a product
    Add {
        product_id: ProductId,

        /// Notify when back in stock
        #[arg(long)]
        notify: bool,
    },
    /// Unlike a product
    Remove { product_id: ProductId },
    /// Turn restock notifications on or off
    Notify {
        product_id: ProductId,

        #[arg(long)]
        off: bool,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Show your profile
    Show,
    /// Update profile fields
    Update {
        #[arg(long)]
        full_name: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        avatar_url: Option<String>,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[allow(clippy::print_stderr)]
fn print_notices(notices: &mut broadcast::Receiver<Notice>) {
    loop {
        let notice = match notices.try_recv() {
            Ok(notice) => notice,
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        };
        let tag = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Error => "error",
        };
        eprintln!("[{tag}] {}", notice.message);
    }
}

#[tokio::main]
#[allow(clippy::print_stderr)]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    // Logs go to stderr so command output stays pipeable
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "aurora=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let state = match AppState::from_config(&config) {
        Ok(state) => state,
        Err(e) => {
            e.report();
            eprintln!("error: {}", e.user_message());
            std::process::exit(1);
        }
    };
    let mut notices = state.notices().subscribe();

    // A restored session is reconciled before the command runs
    state.settle().await;
    let result = run(&state, cli.command).await;
    state.settle().await;
    state.shutdown().await;

    print_notices(&mut notices);
    if let Err(e) = result {
        e.report();
        eprintln!("error: {}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(state: &AppState, command: Commands) -> Result<(), AppError> {
    match command {
        Commands::Products {
            query,
            category,
            gender,
            kind,
        } => commands::catalog::list(state, query, &category, gender, kind),
        Commands::Login { email, password } => {
            commands::account::login(state, email, password).await
        }
        Commands::Logout => commands::account::logout(state).await,
        Commands::Whoami => {
            commands::account::whoami(state);
            Ok(())
        }
        Commands::Cart { action } => match action {
            CartAction::Show => {
                commands::cart::show(state);
                Ok(())
            }
            CartAction::Add {
                product_id,
                size,
                color,
            } => commands::cart::add(state, product_id, size.as_deref(), color.as_deref()),
            CartAction::Remove { line } => commands::cart::remove(state, line),
            CartAction::Update { line, quantity } => {
                commands::cart::update(state, line, quantity)
            }
            CartAction::Clear => {
                state.cart().clear();
                Ok(())
            }
        },
        Commands::Wishlist { action } => match action {
            WishlistAction::Show => commands::wishlist::show(state),
            WishlistAction::Add { product_id, notify } => {
                commands::wishlist::add(state, product_id, notify).await
            }
            WishlistAction::Remove { product_id } => {
                commands::wishlist::remove(state, product_id).await
            }
            WishlistAction::Notify { product_id, off } => {
                commands::wishlist::notify(state, product_id, !off).await
            }
        },
        Commands::Checkout {
            email,
            name,
            shipping,
            coupon,
            provider,
        } => {
            commands::checkout::start(state, email, name, shipping, coupon, provider).await
        }
        Commands::Orders => commands::account::orders(state).await,
        Commands::Profile { action } => match action {
            ProfileAction::Show => commands::account::profile(state),
            ProfileAction::Update {
                full_name,
                phone,
                avatar_url,
            } => {
                commands::account::update_profile(state, full_name, phone, avatar_url).await
            }
        },
    }
}
