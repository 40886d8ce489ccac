use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "timepiece-orders")]
#[command(
    author,
    version,
    about = "Order fulfillment bot: payment review and delivery tracking over Telegram",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the Telegram webhook and the storefront API (default)
    Serve {
        /// Port to listen on (overrides WEB_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print an order as the operator sees it
    Show {
        order_id: i64,
    },

    /// Re-render the operator message of an order from the ledger
    Resync {
        order_id: i64,
    },

    /// Append a line to the operator note of an order
    Note {
        order_id: i64,
        text: String,
    },

    /// List orders of a customer, newest first
    Orders {
        username: String,
    },

    /// Link a customer to a Telegram chat for status notifications
    LinkChat {
        username: String,
        chat_id: i64,
    },

    /// Catalog maintenance
    #[command(subcommand)]
    Product(ProductCommand),

    /// Apply database migrations and exit
    Migrate,
}

#[derive(Subcommand)]
pub enum ProductCommand {
    /// Add a catalog entry
    Add {
        #[arg(long)]
        name: String,
        /// Price in whole sums
        #[arg(long)]
        price: i64,
        #[arg(long, default_value = "")]
        tag: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Change the live price; existing orders keep theirs
    Price { product_id: i64, price: i64 },

    /// Hide an entry from checkout
    Hide { product_id: i64 },

    /// Show a hidden entry again
    Show { product_id: i64 },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
