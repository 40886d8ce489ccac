use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;

use timepiece_orders::cli::{Cli, Commands, ProductCommand};
use timepiece_orders::core::config::{self, Config};
use timepiece_orders::core::{init_logger, log_notification_configuration};
use timepiece_orders::order::types::Order;
use timepiece_orders::storage::catalog::{insert_product, set_product_active, update_product_price, NewProduct};
use timepiece_orders::storage::customers::{ensure_customer, find_customer, link_customer_chat};
use timepiece_orders::storage::orders::{append_operator_note, get_order, orders_for_customer};
use timepiece_orders::storage::{create_pool, get_connection, DbPool};
use timepiece_orders::telegram::gateway::{messenger_from_config, DeliveryError};
use timepiece_orders::telegram::notifications::{notify_operator, refresh_operator_prompt};
use timepiece_orders::telegram::render::render;
use timepiece_orders::telegram::{run_server, AppState};

/// Main entry point
///
/// Parses CLI arguments and dispatches to the subcommand; serving is the default.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env if present
    let _ = dotenv();

    // Initialize logger (console + file)
    init_logger(&config::log_file_path())?;

    let config = Config::from_env();

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => run_serve(config, port).await,
        Commands::Show { order_id } => run_show(&config, order_id),
        Commands::Resync { order_id } => run_resync(config, order_id).await,
        Commands::Note { order_id, text } => run_note(&config, order_id, &text),
        Commands::Orders { username } => run_orders(&config, &username),
        Commands::LinkChat { username, chat_id } => run_link_chat(&config, &username, chat_id),
        Commands::Product(command) => run_product(&config, command),
        Commands::Migrate => {
            open_pool(&config)?;
            log::info!("Database at {} is up to date", config.database_path);
            Ok(())
        }
    }
}

fn open_pool(config: &Config) -> Result<DbPool> {
    create_pool(&config.database_path).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))
}

fn load_order(pool: &DbPool, order_id: i64) -> Result<Order> {
    let conn = get_connection(pool)?;
    get_order(&conn, order_id)?.ok_or_else(|| anyhow::anyhow!("Order #{} not found", order_id))
}

/// Run the HTTP server (webhook + storefront API)
async fn run_serve(config: Config, port: Option<u16>) -> Result<()> {
    log_notification_configuration(&config);

    let pool = Arc::new(open_pool(&config)?);
    let messenger = messenger_from_config(&config);
    let port = port.unwrap_or(config.web_port);
    let state = AppState::new(pool, messenger, Arc::new(config));

    tokio::select! {
        result = run_server(port, state) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
            Ok(())
        }
    }
}

fn run_show(config: &Config, order_id: i64) -> Result<()> {
    let pool = open_pool(config)?;
    let order = load_order(&pool, order_id)?;
    let rendered = render(&order);

    println!("{}", rendered.body_text);
    if !rendered.actions.is_empty() {
        let actions: Vec<&str> = rendered.actions.iter().map(|a| a.as_ref()).collect();
        println!("\nactions: {}", actions.join(", "));
    }
    Ok(())
}

/// Manual reconciliation: push the ledger's view to the operator chat.
///
/// Edits the recorded prompt; for a paid order without one, sends a fresh prompt.
async fn run_resync(config: Config, order_id: i64) -> Result<()> {
    let pool = open_pool(&config)?;
    let order = load_order(&pool, order_id)?;
    let messenger = messenger_from_config(&config);

    match refresh_operator_prompt(&pool, messenger.as_ref(), &order, None).await {
        Ok(()) => {
            log::info!("Order #{} operator message updated ({})", order.id, order.status);
            Ok(())
        }
        Err(DeliveryError::NoDestination) if order.has_receipt() => {
            let sent = notify_operator(&pool, messenger.as_ref(), &config, &order).await?;
            log::info!("Order #{} prompt re-sent as message {}", order.id, sent.message.message_id);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn run_note(config: &Config, order_id: i64, text: &str) -> Result<()> {
    let pool = open_pool(config)?;
    let conn = get_connection(&pool)?;
    if !append_operator_note(&conn, order_id, text)? {
        anyhow::bail!("Order #{} not found or note is empty", order_id);
    }
    log::info!("Note added to order #{}", order_id);
    Ok(())
}

fn run_orders(config: &Config, username: &str) -> Result<()> {
    let pool = open_pool(config)?;
    let conn = get_connection(&pool)?;
    let Some(customer_id) = find_customer(&conn, username)? else {
        anyhow::bail!("Customer {:?} not found", username);
    };

    for order in orders_for_customer(&conn, customer_id)? {
        println!(
            "#{}\t{}\t{}\t{}",
            order.id,
            order.created_at.format("%Y-%m-%d %H:%M"),
            order.status.label(),
            order.total_amount()
        );
    }
    Ok(())
}

fn run_link_chat(config: &Config, username: &str, chat_id: i64) -> Result<()> {
    let pool = open_pool(config)?;
    let conn = get_connection(&pool)?;
    let customer_id = ensure_customer(&conn, username)?;
    link_customer_chat(&conn, customer_id, chat_id)?;
    log::info!("Customer {:?} linked to chat {}", username, chat_id);
    Ok(())
}

fn run_product(config: &Config, command: ProductCommand) -> Result<()> {
    let pool = open_pool(config)?;
    let conn = get_connection(&pool)?;

    let (product_id, changed) = match command {
        ProductCommand::Add {
            name,
            price,
            tag,
            description,
        } => {
            let id = insert_product(
                &conn,
                &NewProduct {
                    name: &name,
                    tag: &tag,
                    description: &description,
                    price,
                    sort_order: 0,
                },
            )?;
            println!("{}", id);
            (id, true)
        }
        ProductCommand::Price { product_id, price } => (product_id, update_product_price(&conn, product_id, price)?),
        ProductCommand::Hide { product_id } => (product_id, set_product_active(&conn, product_id, false)?),
        ProductCommand::Show { product_id } => (product_id, set_product_active(&conn, product_id, true)?),
    };

    if !changed {
        anyhow::bail!("Product #{} not found", product_id);
    }
    Ok(())
}
