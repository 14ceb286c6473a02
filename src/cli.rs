use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};

use crate::{
    api::{ApiClient, FavoriteService, OrderService},
    config::ClientConfig,
    engine::OrderEngine,
    errors::ClientError,
    favorites::FavoriteToggle,
    feed::{FeedKind, FeedUpdate, OrderFeed},
    lifecycle::{self, Action, Role},
    messages::{self, MessageId, NewMessage},
    orders::{ItemId, Order, Rating},
    session::{Session, TokenStore, Viewer},
    utils::shutdown_token,
};

/// Command-line client for the campus marketplace
#[derive(Parser)]
#[command(name = "campus-market")]
#[command(version, about = "Track and drive your marketplace orders from the terminal")]
struct Cli {
    #[command(flatten)]
    config: ClientConfig,

    /// Log request details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and remember the session
    Login {
        email: String,
        #[arg(long, env = "MARKET_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the saved session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Orders you bought
    Purchases {
        /// How many pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Orders you sold
    Sales {
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Order detail with its progress timeline
    Show { order_id: String },
    /// Place an order for an item
    Buy { item_id: ItemId },
    /// Accept an order (seller)
    Confirm { order_id: String },
    /// Cancel an order, or reject it as the seller
    Cancel {
        order_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Mark your side of the hand-over complete
    Complete { order_id: String },
    /// Rate the other party of a completed order
    Rate {
        order_id: String,
        #[arg(value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: u8,
    },
    /// Toggle an item in your favorites
    Favorite { item_id: ItemId },
    /// List your favorite items
    Favorites,
    /// Comments on an item
    Messages { item_id: ItemId },
    /// Comment on an item, or reply to a comment
    Comment {
        item_id: ItemId,
        content: String,
        #[arg(long)]
        reply_to: Option<MessageId>,
    },
    /// Delete one of your comments
    Uncomment { message_id: MessageId },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn require_viewer(session: &Session, api: &ApiClient) -> Result<Viewer, ClientError> {
    match session.viewer() {
        Some(viewer) => Ok(viewer),
        None => session
            .restore(api)
            .await
            .ok_or(ClientError::Unauthorized),
    }
}

fn print_order_row(order: &Order, role: Role) {
    let view = lifecycle::classify(order, role);
    let counterparty = match role {
        Role::Seller => &order.buyer.username,
        _ => &order.seller.username,
    };
    let actions: Vec<String> = view.actions.iter().map(|a| a.to_string()).collect();
    println!(
        "{:<22} {:<24} {:>10} {:<12} {:<34} [{}]",
        order.order_id,
        order.item.item_name,
        order.order_amount,
        counterparty,
        view.label,
        actions.join(", ")
    );
}

fn print_order_detail(order: &Order, role: Role) {
    let view = lifecycle::classify(order, role);
    println!("------ Order {} ------", order.order_id);
    println!("Item:    {} (#{})", order.item.item_name, order.item.item_id);
    println!("Amount:  {}", order.order_amount);
    println!("Buyer:   {}", order.buyer.username);
    println!("Seller:  {}", order.seller.username);
    if role != Role::Observer {
        let phone = match role {
            Role::Buyer => order.seller.phone.as_deref(),
            _ => order.buyer.phone.as_deref(),
        };
        if let Some(phone) = phone {
            println!("Contact: {}", phone);
        }
    }
    println!("Status:  {}", view.label);
    println!("         {}", lifecycle::describe_progress(order));
    if let Some(reason) = &order.cancel_reason {
        println!("Reason:  {}", reason);
    }
    println!("Timeline:");
    for step in lifecycle::timeline(order) {
        let mark = if step.completed { "x" } else { " " };
        match step.time {
            Some(t) if step.completed => println!("  [{}] {} ({})", mark, step.title, t),
            _ => println!("  [{}] {}", mark, step.title),
        }
    }
    for (who, credit) in [("Buyer", order.buyer_credit), ("Seller", order.seller_credit)] {
        if let Some(credit) = credit {
            println!("{} rated {} ({})", who, credit.rating, credit.rating.label());
        }
    }
    if !view.actions.is_empty() {
        let actions: Vec<String> = view.actions.iter().map(|a| a.to_string()).collect();
        println!("You can: {}", actions.join(", "));
    }
    println!("--------------------------");
}

async fn list_orders(
    api: &ApiClient,
    viewer: &Viewer,
    kind: FeedKind,
    page_size: u32,
    pages: u32,
) -> Result<(), ClientError> {
    let mut feed = OrderFeed::new(kind, page_size);
    feed.set_viewer(Some(viewer.user_id));
    for _ in 0..pages.max(1) {
        match feed.load_next(api).await {
            FeedUpdate::Failed => {
                // one retry, as the list view offers
                if feed.retry(api).await == FeedUpdate::Failed {
                    if let Some(e) = feed.take_error() {
                        return Err(e);
                    }
                }
            }
            FeedUpdate::Skipped => break,
            _ => {}
        }
    }
    if feed.orders().is_empty() {
        println!("No orders.");
        return Ok(());
    }
    for order in feed.orders() {
        print_order_row(order, Role::of(Some(viewer.user_id), order));
    }
    if feed.has_more() {
        println!("... more available, use --pages to load further");
    }
    Ok(())
}

async fn mutate(
    api: &ApiClient,
    viewer: &Viewer,
    order_id: &str,
    action: Action,
    reason: Option<&str>,
    rating: Option<Rating>,
) -> Result<(), ClientError> {
    let engine = OrderEngine::new(api.clone(), Some(viewer.user_id));
    let mut order = api.order_detail(order_id).await?;
    match (action, rating) {
        (Action::Confirm, _) => engine.seller_confirm(&mut order).await?,
        (Action::Cancel, _) => engine.cancel(&mut order, reason).await?,
        (Action::MarkComplete, _) => engine.mark_complete(&mut order).await?,
        (Action::Rate, Some(rating)) => engine.submit_rating(&mut order, rating).await?,
        (Action::Rate, None) => {
            return Err(ClientError::Validation("a rating is required".into()));
        }
    }
    println!("{}: {}", order.order_id, engine.view(&order).label);
    Ok(())
}

async fn execute(
    command: Commands,
    config: &ClientConfig,
    api: &ApiClient,
    session: &Session,
) -> Result<(), ClientError> {
    match command {
        Commands::Login { email, password } => {
            let viewer = session.login(api, &email, &password).await?;
            println!("Logged in as {}", viewer.username);
        }
        Commands::Logout => {
            session.logout(api).await?;
            println!("Logged out");
        }
        Commands::Whoami => {
            let viewer = require_viewer(session, api).await?;
            println!("{} (#{})", viewer.username, viewer.user_id);
            if let Some(email) = viewer.email {
                println!("{}", email);
            }
        }
        Commands::Purchases { pages } => {
            let viewer = require_viewer(session, api).await?;
            list_orders(api, &viewer, FeedKind::Purchased, config.page_size, pages).await?;
        }
        Commands::Sales { pages } => {
            let viewer = require_viewer(session, api).await?;
            list_orders(api, &viewer, FeedKind::Sold, config.page_size, pages).await?;
        }
        Commands::Show { order_id } => {
            let viewer = require_viewer(session, api).await?;
            let order = api.order_detail(&order_id).await?;
            print_order_detail(&order, Role::of(Some(viewer.user_id), &order));
        }
        Commands::Buy { item_id } => {
            require_viewer(session, api).await?;
            api.buy_item(item_id).await?;
            info!("order placed for item {}", item_id);
            println!("Order placed, waiting for the seller to confirm");
        }
        Commands::Confirm { order_id } => {
            let viewer = require_viewer(session, api).await?;
            mutate(api, &viewer, &order_id, Action::Confirm, None, None).await?;
        }
        Commands::Cancel { order_id, reason } => {
            let viewer = require_viewer(session, api).await?;
            mutate(api, &viewer, &order_id, Action::Cancel, reason.as_deref(), None).await?;
        }
        Commands::Complete { order_id } => {
            let viewer = require_viewer(session, api).await?;
            mutate(api, &viewer, &order_id, Action::MarkComplete, None, None).await?;
        }
        Commands::Rate { order_id, rating } => {
            let viewer = require_viewer(session, api).await?;
            let rating = Rating::try_from(rating)?;
            mutate(api, &viewer, &order_id, Action::Rate, None, Some(rating)).await?;
        }
        Commands::Favorite { item_id } => {
            require_viewer(session, api).await?;
            let mut toggle = FavoriteToggle::load(api, item_id).await?;
            let now = toggle.toggle(api).await?;
            println!(
                "Item {} {}",
                item_id,
                if now { "added to favorites" } else { "removed from favorites" }
            );
        }
        Commands::Favorites => {
            require_viewer(session, api).await?;
            let items = api.favorites().await?;
            if items.is_empty() {
                println!("No favorites yet.");
            }
            for item in items {
                let price = item.price.map(|p| p.to_string()).unwrap_or_default();
                println!("{:<8} {:<32} {:>10}", item.item_id, item.title, price);
            }
        }
        Commands::Messages { item_id } => {
            let threads = messages::build_threads(api.item_messages(item_id).await?);
            if threads.is_empty() {
                println!("No comments.");
            }
            for thread in threads {
                let root = &thread.root;
                println!("#{} {}: {}", root.message_id, root.username, root.content);
                for reply in thread.replies {
                    println!("    #{} {}: {}", reply.message_id, reply.username, reply.content);
                }
            }
        }
        Commands::Comment {
            item_id,
            content,
            reply_to,
        } => {
            require_viewer(session, api).await?;
            let new = match reply_to {
                None => NewMessage::root(item_id, &content)?,
                Some(id) => {
                    let threads = messages::build_threads(api.item_messages(item_id).await?);
                    let parent = messages::find_message(&threads, id).ok_or_else(|| {
                        ClientError::Validation(format!("no comment #{} on item {}", id, item_id))
                    })?;
                    NewMessage::reply(parent, &content)?
                }
            };
            let posted = api.post_message(&new).await?;
            println!("Posted comment #{}", posted.message_id);
        }
        Commands::Uncomment { message_id } => {
            require_viewer(session, api).await?;
            api.delete_message(message_id).await?;
            println!("Deleted comment #{}", message_id);
        }
    }
    Ok(())
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let tokens = Arc::new(TokenStore::open(&cli.config.token_file)?);
    let api = ApiClient::new(&cli.config, Arc::clone(&tokens))?;
    let session = Session::new(tokens);
    let shutdown = shutdown_token();

    tokio::select! {
        _ = shutdown.cancelled() => {
            warn!("interrupted, request abandoned");
            Ok(())
        }
        result = execute(cli.command, &cli.config, &api, &session) => {
            result.map_err(|e| {
                let message = e.user_message();
                anyhow::Error::new(e).context(message)
            })
        }
    }
}
