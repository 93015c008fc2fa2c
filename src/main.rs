// src/main.rs

use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::info;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

mod adapter;
mod api;
mod bidding;
mod config;
mod host;
mod identity;
mod logging;
mod mock_vendor;
mod model;

use adapter::cwire::CwireAdapter;
use adapter::AdapterRegistry;
use bidding::vendor_client::VendorClient;
use config::source::FileConfigSource;
use config::ConfigManager;
use host::{FixedDevice, HostContext, HttpBeacon, MemoryStorage, StaticPage};
use identity::merkle::MerkleIdSystem;
use logging::runtime_logger::RuntimeLogger;
use model::context::SessionContext;

pub struct AppState {
    pub runtime_logger: Arc<RuntimeLogger>,
    pub registry: AdapterRegistry,
    pub merkle: Option<Arc<MerkleIdSystem>>,
    pub host: HostContext,
    pub session: Mutex<SessionContext>,
    pub client: VendorClient,
}

#[derive(Parser, Debug)]
#[command(version = "1.0", about = "A header-bidding adapter host")]
struct CliArgs {
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
    #[arg(long, default_value = "logs")]
    log_dir: String,
    #[arg(long, default_value = "static/adapters.json")]
    settings: String,
    #[arg(long, default_value_t = 9001)]
    mock_vendor_port: u16,
    /// Root domain reported to adapters as the hosting page's domain.
    #[arg(long)]
    page_domain: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    // Global tracing subscriber with an hourly rolling JSON file.
    let log_file = rolling::hourly(&args.log_dir, "hb_log.json");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);
    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().json().with_writer(non_blocking));
    tracing::subscriber::set_global_default(subscriber)
        .expect("Unable to set global tracing subscriber");
    info!("header-bidding host starting on port {}", args.port);

    let runtime_logger = RuntimeLogger::new(&args.log_dir, "runtime", 1000, 100, 1000);
    runtime_logger
        .log("INFO", "header-bidding host is starting...")
        .await;

    // Stand-in vendor so the adapters can be exercised end to end.
    let mock_port = args.mock_vendor_port;
    let mock_server = tokio::spawn(async move {
        mock_vendor::start_mock_vendor_server(mock_port).await;
    });

    let config = ConfigManager::from_source(&FileConfigSource::new(&args.settings));

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(CwireAdapter::new(config.cwire().clone())));
    let merkle = config
        .merkle()
        .cloned()
        .map(|cfg| Arc::new(MerkleIdSystem::new(cfg)));

    let http = reqwest::Client::new();
    let mut host_ctx = HostContext::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(HttpBeacon::new(http)),
    );
    host_ctx.page = Some(Arc::new(StaticPage::new(args.page_domain.as_deref())));
    host_ctx.device = Some(Arc::new(FixedDevice {
        autoplay: Some(true),
        downlink: Some(10.0),
    }));

    let state = Arc::new(AppState {
        runtime_logger: runtime_logger.clone(),
        registry,
        merkle,
        host: host_ctx,
        session: Mutex::new(SessionContext::new()),
        client: VendorClient::new(),
    });

    let hb_server = tokio::spawn({
        let state = state.clone();
        let runtime_logger = runtime_logger.clone();
        let port = args.port;
        async move {
            let app = Router::new()
                .route("/auction", post(api::handlers::handle_auction))
                .with_state(state);
            let addr = format!("0.0.0.0:{}", port);
            runtime_logger
                .log("INFO", &format!("auction endpoint at http://{}/auction", addr))
                .await;
            let listener = TcpListener::bind(&addr).await.expect("auction port unavailable");
            axum::serve(listener, app).await.expect("auction server failed");
        }
    });

    tokio::select! {
        _ = signal::ctrl_c() => {
            runtime_logger.log("INFO", "Shutting down gracefully...").await;
        }
    }

    runtime_logger.shutdown().await;
    hb_server.abort();
    mock_server.abort();
    runtime_logger
        .log("INFO", "header-bidding host shut down.")
        .await;
}
