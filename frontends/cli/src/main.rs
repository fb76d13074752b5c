use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use barkeep::{
    Dashboard, Drink, MemoryGateway, MissingProduct, Notification, Notifier, Order, Premix,
    Severity, View, ViewModel,
};
use barkeep_cli::config::{resolve_config_path, AppConfig, Backend};
use barkeep_cli::notify;
use barkeep_cli::render::{section, Line};
use barkeep_core::{Entity, Gateway};
use barkeep_supabase::SupabaseClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Dashboard,
    Drinks,
    Premixes,
    Orders,
    Missing,
    Watch,
}

impl Command {
    fn parse(arg: &str) -> Result<Self> {
        Ok(match arg {
            "dashboard" => Command::Dashboard,
            "drinks" => Command::Drinks,
            "premixes" => Command::Premixes,
            "orders" => Command::Orders,
            "missing" => Command::Missing,
            "watch" => Command::Watch,
            other => bail!(
                "unknown command `{}` (expected dashboard, drinks, premixes, orders, missing or watch)",
                other
            ),
        })
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let mut args = std::env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut command = Command::Dashboard;

    // Simple argument parsing: --config <path> and one positional command
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => bail!("--config needs a path"),
            }
        } else if !arg.starts_with('-') {
            command = Command::parse(&arg)?;
        } else {
            bail!("unknown option `{}`", arg);
        }
    }

    let mut config = match resolve_config_path(config_path, env_var) {
        Some(path) => AppConfig::load_from_file(&path)?,
        None => AppConfig::default(),
    };
    config.apply_env(env_var);

    // RUST_LOG wins over the configured filter. Logs go to stderr, rows to stdout.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let gateway: Arc<dyn Gateway> = match config.backend {
        Backend::Supabase => Arc::new(SupabaseClient::new(config.supabase_config()?)?),
        Backend::Memory => {
            warn!("Using the in-memory backend, nothing is persisted");
            Arc::new(MemoryGateway::new())
        }
    };
    info!("Running {:?} against {:?} backend", command, config.backend);

    let notifier = Notifier::new();
    let notifications = notifier.subscribe();

    match command {
        Command::Dashboard => {
            let mut dashboard =
                Dashboard::open(gateway, notifier, config.recent_orders_limit).await;
            print!("{}", render_dashboard(&dashboard));
            dashboard.close().await;
        }
        Command::Drinks => print_view(gateway, View::<Drink>::drinks(), notifier, &config).await,
        Command::Premixes => {
            print_view(gateway, View::<Premix>::premixes(), notifier, &config).await
        }
        Command::Orders => print_view(gateway, View::<Order>::orders(), notifier, &config).await,
        Command::Missing => {
            print_view(
                gateway,
                View::<MissingProduct>::missing_products(),
                notifier,
                &config,
            )
            .await
        }
        Command::Watch => watch(gateway, notifier, notifications, &config).await?,
    }

    Ok(())
}

fn render_dashboard(dashboard: &Dashboard) -> String {
    let mut out = section("Missing products", &dashboard.missing_products.rows());
    out.push_str(&section("Pending premixes", &dashboard.pending_premixes.rows()));
    out.push_str(&section("Recent orders", &dashboard.recent_orders.rows()));
    out
}

async fn print_view<E: Entity + Line>(
    gateway: Arc<dyn Gateway>,
    view: View<E>,
    notifier: Notifier,
    config: &AppConfig,
) {
    let title = view.name().to_string();
    let mut view_model = ViewModel::new(gateway, view, notifier)
        .with_images_bucket(config.supabase.images_bucket.clone());
    // A failed fetch has already been reported
    if view_model.refresh().await.is_ok() {
        print!("{}", section(&title, &view_model.rows()));
    }
    view_model.close().await;
}

fn report(notification: &Notification) {
    match notification.severity {
        Severity::Success => info!("{}", notification.message),
        Severity::Error => warn!("{}", notification.message),
    }
}

/// Print the dashboard, then reprint whichever part changes until Ctrl-C.
async fn watch(
    gateway: Arc<dyn Gateway>,
    notifier: Notifier,
    mut notifications: broadcast::Receiver<Notification>,
    config: &AppConfig,
) -> Result<()> {
    let mut dashboard = Dashboard::open(gateway, notifier, config.recent_orders_limit).await;
    print!("{}", render_dashboard(&dashboard));

    let mut missing = dashboard.missing_products.watch();
    let mut pending = dashboard.pending_premixes.watch();
    let mut recent = dashboard.recent_orders.watch();
    let mut notifying = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing subscriptions");
                break;
            }
            Ok(()) = missing.changed() => {
                let rows = missing.borrow_and_update().clone();
                print!("{}", section("Missing products", &rows));
            }
            Ok(()) = pending.changed() => {
                let rows = pending.borrow_and_update().clone();
                print!("{}", section("Pending premixes", &rows));
            }
            Ok(()) = recent.changed() => {
                let rows = recent.borrow_and_update().clone();
                print!("{}", section("Recent orders", &rows));
            }
            received = notify::next(&mut notifications), if notifying => match received {
                Some(notification) => report(&notification),
                None => notifying = false,
            },
        }
    }

    dashboard.close().await;
    Ok(())
}
