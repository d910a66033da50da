//! Orderflow command-line entry point
//!
//! `serve` runs one domain service (or all four in-process for local
//! development), `migrate` applies the schema, `seed` loads demo products.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use orderflow_api::{AppState, ServiceKind};
use orderflow_core::bus::envelope::{EventKind, Topics};
use orderflow_core::{
    auto_migrate, create_pool, AuthService, Cache, Config, Database, EventConsumer,
    EventProducer, ExpirySweeper, IdempotencyStore, InventoryEventHandler, InventoryService,
    LagMonitor, Migrator, MockGateway, OrderSagaHandler, OrderService, OutboxPublisher,
    PaymentEventHandler, PaymentService,
};

#[derive(Parser)]
#[command(name = "orderflow", version, about = "Event-driven order processing platform")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a service (HTTP surface plus its background workers)
    Serve {
        /// Which service to run
        #[arg(long, value_enum, default_value_t = ServiceArg::All)]
        service: ServiceArg,

        /// Path to a TOML config file
        #[arg(long, env = "ORDERFLOW_CONFIG")]
        config: Option<String>,

        /// Override the configured HTTP port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Apply database migrations and exit
    Migrate {
        #[arg(long, env = "ORDERFLOW_CONFIG")]
        config: Option<String>,
    },

    /// Seed demo products for local runs
    Seed {
        #[arg(long, env = "ORDERFLOW_CONFIG")]
        config: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ServiceArg {
    Users,
    Orders,
    Inventory,
    Payments,
    All,
}

impl From<ServiceArg> for ServiceKind {
    fn from(arg: ServiceArg) -> Self {
        match arg {
            ServiceArg::Users => ServiceKind::Users,
            ServiceArg::Orders => ServiceKind::Orders,
            ServiceArg::Inventory => ServiceKind::Inventory,
            ServiceArg::Payments => ServiceKind::Payments,
            ServiceArg::All => ServiceKind::All,
        }
    }
}

fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path).context("loading config file"),
        None => Config::from_env().context("loading config from environment"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { service, config, port } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.service.port = port;
            }
            serve(config, service.into()).await
        }
        Commands::Migrate { config } => {
            let config = load_config(config.as_deref())?;
            let pool = create_pool(&config.database).await?;
            auto_migrate(&pool).await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Commands::Seed { config } => {
            let config = load_config(config.as_deref())?;
            let pool = create_pool(&config.database).await?;
            auto_migrate(&pool).await?;
            Migrator::new(pool).seed_demo_data().await?;
            Ok(())
        }
    }
}

async fn serve(mut config: Config, kind: ServiceKind) -> anyhow::Result<()> {
    config.service.name = kind.as_str().to_string();
    let service_name = config.service.name.clone();

    let metrics_handle = orderflow_core::metrics::install_recorder()?;

    let pool = create_pool(&config.database).await?;
    auto_migrate(&pool).await?;
    let db = Database::new(pool);

    let cache = Cache::connect(&config.redis.url).await?;
    let producer = EventProducer::new(&config.kafka, &config.ops, &service_name)?;

    let auth = Arc::new(AuthService::new(db.clone(), cache.clone(), config.auth.clone()));
    let inventory = Arc::new(InventoryService::new(
        db.clone(),
        cache.clone(),
        config.ops.clone(),
    ));
    let orders = Arc::new(OrderService::new(db.clone(), cache.clone()));
    let payments = Arc::new(PaymentService::new(
        db.clone(),
        Arc::new(MockGateway::new()),
        config.ops.gateway_timeout_seconds,
    ));

    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        db: db.clone(),
        cache: cache.clone(),
        auth,
        inventory: inventory.clone(),
        orders,
        payments: payments.clone(),
        metrics: metrics_handle,
    };

    // Workers stop when this flips to true
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    // Every service drains its own outbox
    {
        let publisher = OutboxPublisher::new(db.clone(), producer.clone(), &config.ops, &service_name);
        let rx = shutdown_rx.clone();
        workers.push(tokio::spawn(async move { publisher.run(rx).await }));
    }

    let run_inventory = matches!(kind, ServiceKind::Inventory | ServiceKind::All);
    let run_orders = matches!(kind, ServiceKind::Orders | ServiceKind::All);
    let run_payments = matches!(kind, ServiceKind::Payments | ServiceKind::All);

    if run_inventory {
        let handler = Arc::new(InventoryEventHandler::new(inventory.clone()));
        let mut consumer = EventConsumer::new(
            &config.kafka,
            &config.ops,
            &[Topics::ORDERS, Topics::INVENTORY],
            "inventory-service",
            &service_name,
            IdempotencyStore::new(cache.clone(), "inventory-service"),
            producer.clone(),
        )?;
        consumer.register(EventKind::OrderCreated, handler.clone());
        consumer.register(EventKind::OrderCancelled, handler.clone());
        consumer.register(EventKind::InventoryConfirm, handler.clone());
        consumer.register(EventKind::InventoryRelease, handler);
        workers.extend(spawn_consumer(consumer, &shutdown_rx));

        let sweeper = ExpirySweeper::new(inventory.clone(), config.ops.sweeper_interval_seconds);
        let rx = shutdown_rx.clone();
        workers.push(tokio::spawn(async move { sweeper.run(rx).await }));
    }

    if run_orders {
        let handler = Arc::new(OrderSagaHandler::new(db.clone(), cache.clone()));
        let mut consumer = EventConsumer::new(
            &config.kafka,
            &config.ops,
            &[Topics::INVENTORY, Topics::PAYMENTS],
            "order-service",
            &service_name,
            IdempotencyStore::new(cache.clone(), "order-service"),
            producer.clone(),
        )?;
        consumer.register(EventKind::InventoryReserved, handler.clone());
        consumer.register(EventKind::InventoryRejected, handler.clone());
        consumer.register(EventKind::PaymentCompleted, handler.clone());
        consumer.register(EventKind::PaymentFailed, handler);
        workers.extend(spawn_consumer(consumer, &shutdown_rx));
    }

    if run_payments {
        let handler = Arc::new(PaymentEventHandler::new(payments.clone()));
        let mut consumer = EventConsumer::new(
            &config.kafka,
            &config.ops,
            &[Topics::PAYMENTS],
            "payment-service",
            &service_name,
            IdempotencyStore::new(cache.clone(), "payment-service"),
            producer.clone(),
        )?;
        consumer.register(EventKind::PaymentInitiated, handler);
        workers.extend(spawn_consumer(consumer, &shutdown_rx));
    }

    // HTTP serves until Ctrl-C, then workers drain
    let mut server_shutdown = shutdown_rx.clone();
    let server = orderflow_api::run(state, kind, async move {
        let _ = server_shutdown.changed().await;
    });

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = signal_tx.send(true);
        }
    });

    server.await?;

    let _ = shutdown_tx.send(true);
    let deadline = Duration::from_secs(config.service.graceful_shutdown_timeout_secs);
    if tokio::time::timeout(deadline, async {
        for worker in workers {
            let _ = worker.await;
        }
    })
    .await
    .is_err()
    {
        tracing::warn!("Workers did not drain within {:?}", deadline);
    }

    producer.flush(Duration::from_secs(5));
    tracing::info!("{} stopped", kind.as_str());
    Ok(())
}

/// Spawn a consumer loop plus its lag monitor
fn spawn_consumer(
    consumer: EventConsumer,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let consumer = Arc::new(consumer);
    let monitor = LagMonitor::new(consumer.clone());

    let consumer_rx = shutdown.clone();
    let monitor_rx = shutdown.clone();

    vec![
        tokio::spawn(async move { consumer.run(consumer_rx).await }),
        tokio::spawn(async move { monitor.run(monitor_rx).await }),
    ]
}
