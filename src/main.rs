use breakwatch::broker::{RestBroker, Throttle, VenueDetector};
use breakwatch::config::{Config, TradingSettings};
use breakwatch::db::{init_db, Repository};
use breakwatch::execution::OrderExecutor;
use breakwatch::monitor::Monitor;
use breakwatch::notify::Notifier;
use breakwatch::pricing::{PriceCache, PricePoller};
use breakwatch::strategy::{FileTriggerStore, MarketSession, StrategyEngine, TriggerLedger};
use breakwatch::sync::SyncService;
use breakwatch::BrokerClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    let repo = Arc::new(Repository::new(pool));

    let throttle = Arc::new(Throttle::new(Duration::from_millis(
        config.broker_min_interval_ms,
    )));
    let broker: Arc<dyn BrokerClient> = Arc::new(RestBroker::new(
        config.broker_api_url.clone(),
        config.broker_app_key.clone(),
        config.broker_app_secret.clone(),
        config.account_no.clone(),
        config.account_product_code.clone(),
        throttle,
    ));

    let notifier = Notifier::new(
        config.telegram_bot_token.clone(),
        config.telegram_chat_id.clone(),
    );
    let venues = Arc::new(VenueDetector::new());
    let price_cache = Arc::new(PriceCache::new());
    let watched_symbols = Arc::new(RwLock::new(Vec::new()));

    let executor = OrderExecutor::new(broker.clone(), venues.clone(), notifier.clone());
    let triggers = TriggerLedger::load_for(
        Box::new(FileTriggerStore::new(config.trigger_file_path.clone())),
        MarketSession::now().trading_date,
    );
    let engine = StrategyEngine::new(
        broker.clone(),
        repo.clone(),
        executor,
        triggers,
        notifier.clone(),
    );
    let sync = Arc::new(SyncService::new(broker.clone(), repo.clone()));

    let poller = PricePoller::new(
        broker.clone(),
        venues.clone(),
        price_cache.clone(),
        watched_symbols.clone(),
    );

    let mut monitor = Monitor::new(
        config,
        TradingSettings::default(),
        engine,
        sync,
        venues,
        price_cache,
        watched_symbols,
        notifier,
    );
    monitor.startup().await;
    monitor.run(poller).await;
}
