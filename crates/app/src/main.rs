//! Morning Brew Collective storefront CLI

use std::process;

use brew::{
    cart::CartItem,
    decimal::Amount,
    orders::OrderUuid,
    payments::{
        flow::{Confirmation, FlowState, Processing},
        models::PaymentMethod,
    },
};
use brew_app::{
    auth::{LoginCredentials, RegisterData},
    checkout::{ControllerError, PaymentFlowController},
    config::AppConfig,
    context::AppContext,
    observability,
};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "brew-app", about = "Morning Brew Collective storefront", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Edit the cart
    Cart(CartCommand),
    /// Pay for an order
    Checkout(CheckoutArgs),
    /// Show an order
    Order(OrderArgs),
    /// Create an account and sign in
    Register(RegisterArgs),
    /// Sign in
    Login(LoginArgs),
    /// Sign out
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Forget everything stored locally
    Reset,
}

#[derive(Debug, Args)]
struct CartCommand {
    #[command(subcommand)]
    command: CartSubcommand,
}

#[derive(Debug, Subcommand)]
enum CartSubcommand {
    /// List the lines and totals
    Show,
    /// Add one unit of a product
    Add(AddItemArgs),
    /// Remove a line
    Remove {
        /// Product identifier
        id: String,
    },
    /// Set a line's quantity; zero removes it
    Qty {
        /// Product identifier
        id: String,
        /// New quantity
        quantity: u32,
    },
    /// Remove every line
    Clear,
    /// Undo the last change
    Undo,
    /// Redo the last undone change
    Redo,
}

#[derive(Debug, Args)]
struct AddItemArgs {
    /// Product identifier
    #[arg(long)]
    id: String,

    /// Display name
    #[arg(long)]
    name: String,

    /// Unit price, e.g. 3.50
    #[arg(long)]
    price: Amount,

    /// Menu category
    #[arg(long, default_value = "coffee")]
    category: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodArg {
    /// PayNow QR transfer
    Qr,
    /// Card
    Card,
}

impl From<MethodArg> for PaymentMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Qr => Self::QrTransfer,
            MethodArg::Card => Self::Card,
        }
    }
}

#[derive(Debug, Args)]
struct CheckoutArgs {
    /// Order to pay for
    #[arg(long)]
    order: Option<OrderUuid>,

    /// Payment method
    #[arg(long, value_enum, default_value_t = MethodArg::Qr)]
    method: MethodArg,

    /// Drop a stored payment for this order instead of resuming it
    #[arg(long)]
    start_over: bool,
}

#[derive(Debug, Args)]
struct OrderArgs {
    /// Order identifier
    id: OrderUuid,
}

#[derive(Debug, Args)]
struct RegisterArgs {
    /// Display name
    #[arg(long)]
    name: String,

    /// Email address
    #[arg(long)]
    email: String,

    /// Password
    #[arg(long, env = "BREW_PASSWORD", hide_env_values = true)]
    password: String,

    /// Password again
    #[arg(long)]
    password_confirmation: String,
}

#[derive(Debug, Args)]
struct LoginArgs {
    /// Email address
    #[arg(long)]
    email: String,

    /// Password
    #[arg(long, env = "BREW_PASSWORD", hide_env_values = true)]
    password: String,
}

#[tokio::main]
pub async fn main() {
    let _env = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(error) = observability::init(&cli.config.logging) {
        eprintln!("{error}");
        process::exit(1);
    }

    if let Err(error) = run(cli).await {
        eprintln!("{error}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let ctx = AppContext::from_config(&cli.config).map_err(|error| format!("failed to start: {error}"))?;

    match cli.command {
        Commands::Cart(CartCommand { command }) => edit_cart(&ctx, command),
        Commands::Checkout(args) => checkout(&ctx, args).await,
        Commands::Order(args) => show_order(&ctx, args.id).await,
        Commands::Register(args) => register(&ctx, args).await,
        Commands::Login(args) => login(&ctx, args).await,
        Commands::Logout => ctx
            .auth
            .logout()
            .await
            .map_err(|error| format!("failed to sign out: {error}")),
        Commands::Whoami => whoami(&ctx).await,
        Commands::Reset => ctx
            .persistence
            .clear_all()
            .map_err(|error| format!("failed to clear local data: {error}")),
    }
}

fn edit_cart(ctx: &AppContext, command: CartSubcommand) -> Result<(), String> {
    let changed = ctx.cart.with(|cart| match command {
        CartSubcommand::Show => false,
        CartSubcommand::Add(args) => {
            cart.add_item(CartItem::new(args.id, args.name, args.price, args.category));
            true
        }
        CartSubcommand::Remove { id } => {
            cart.remove_item(&id);
            true
        }
        CartSubcommand::Qty { id, quantity } => {
            cart.update_quantity(&id, quantity);
            true
        }
        CartSubcommand::Clear => {
            cart.clear_cart();
            true
        }
        CartSubcommand::Undo => cart.undo(),
        CartSubcommand::Redo => cart.redo(),
    });

    if changed {
        ctx.save_cart()
            .map_err(|error| format!("failed to save cart: {error}"))?;
    }

    let cart = ctx.cart.lock();

    for item in cart.items() {
        println!(
            "{:>3} x {} ({}) {}",
            item.quantity,
            item.name,
            item.id,
            item.line_total().format()
        );
    }

    println!("subtotal: {}", cart.subtotal().format());
    println!("gst: {}", cart.gst().format());
    println!("total: {}", cart.total_for_display().format());

    Ok(())
}

async fn checkout(ctx: &AppContext, args: CheckoutArgs) -> Result<(), String> {
    let mut controller = PaymentFlowController::open(ctx.checkout_deps(), args.order).map_err(|error| {
        match error.destination() {
            Some(destination) => format!("{error}; go to {destination}"),
            None => error.to_string(),
        }
    })?;

    let result = drive(&mut controller, &args).await;

    controller.teardown();

    result
}

async fn drive(controller: &mut PaymentFlowController, args: &CheckoutArgs) -> Result<(), String> {
    controller.initialize(true).await.map_err(|error| stopped(&error))?;

    if matches!(controller.state(), FlowState::Recovery { .. }) {
        controller.resolve_recovery(!args.start_over).await.map_err(|error| stopped(&error))?;
    }

    if matches!(controller.state(), FlowState::MethodSelection { .. }) {
        controller.select_method(args.method.into()).await.map_err(|error| stopped(&error))?;
    }

    match controller.state() {
        FlowState::Processing(Processing::Qr(session)) => {
            println!("scan to pay: {}", session.payload);
            println!("expires at {}", session.expires_at);
        }
        FlowState::Processing(Processing::Card { client_secret, .. }) => {
            if client_secret.is_none() {
                return Err("the card form can't be shown for this payment".to_string());
            }

            println!("complete the card form in the browser");
        }
        _ => return report(controller),
    }

    if let Some(destination) = controller.track_status().await.map_err(|error| stopped(&error))? {
        println!("payment complete: {destination}");

        return Ok(());
    }

    report(controller)
}

fn stopped(error: &ControllerError) -> String {
    format!("checkout stopped: {error}")
}

fn report(controller: &PaymentFlowController) -> Result<(), String> {
    let actions = controller.state().onward_actions();

    match controller.state() {
        FlowState::Processing(_) => {
            println!("still waiting for the payment; run checkout again to keep checking");

            Ok(())
        }
        FlowState::Confirmation(Confirmation::Failed { reason, .. }) => {
            Err(format!("payment failed: {reason} (next: {actions:?})"))
        }
        FlowState::Error { error, .. } => Err(format!("{} (next: {actions:?})", error.message)),
        FlowState::Offline => Err(format!("payments are offline (next: {actions:?})")),
        state => Err(format!("checkout stopped while {}", state.name())),
    }
}

async fn show_order(ctx: &AppContext, id: OrderUuid) -> Result<(), String> {
    let order = ctx
        .orders
        .get_order(id)
        .await
        .map_err(|error| format!("failed to fetch order: {error}"))?;

    println!("{} ({:?})", order.invoice_number, order.status);
    println!("pickup: {}", order.pickup_at);
    println!("items: {}", order.item_count());
    println!("total: {}", order.total().format());

    Ok(())
}

async fn register(ctx: &AppContext, args: RegisterArgs) -> Result<(), String> {
    let user = ctx
        .auth
        .register(&RegisterData {
            name: args.name,
            email: args.email,
            password: args.password,
            password_confirmation: args.password_confirmation,
        })
        .await
        .map_err(|error| format!("failed to register: {error}"))?;

    println!("signed in as {}", user.email);

    Ok(())
}

async fn login(ctx: &AppContext, args: LoginArgs) -> Result<(), String> {
    let user = ctx
        .auth
        .login(&LoginCredentials {
            email: args.email,
            password: args.password,
        })
        .await
        .map_err(|error| format!("failed to sign in: {error}"))?;

    println!("signed in as {}", user.email);

    Ok(())
}

async fn whoami(ctx: &AppContext) -> Result<(), String> {
    if !ctx.session.is_signed_in() {
        return Err("not signed in".to_string());
    }

    let user = ctx
        .auth
        .me()
        .await
        .map_err(|error| format!("failed to fetch account: {error}"))?;

    println!("{} <{}> ({:?})", user.name, user.email, user.role);

    Ok(())
}
