use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use truemailer::api::{start_api_server, ApiState};
use truemailer::config::Config;
use truemailer::engine::{DomainResolver, HttpListFetcher, ListFetcher, SourceCache, SyncOrchestrator};
use truemailer::init::{init_store, setup_logging};
use truemailer::stats::StatsCollector;
use truemailer::validator::EmailValidator;

enum Mode {
    Serve,
    SyncOnce,
}

fn parse_args() -> (Mode, String) {
    let mut args = std::env::args().skip(1).peekable();
    let mode = if args.peek().map(String::as_str) == Some("sync") {
        args.next();
        Mode::SyncOnce
    } else {
        Mode::Serve
    };
    let config_path = args.next().unwrap_or("config.toml".to_string());
    (mode, config_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load Config
    let (mode, config_path) = parse_args();
    let config_exists = std::path::Path::new(&config_path).exists();
    let config = if config_exists {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    // 2. Setup Logging
    setup_logging(&config);
    info!("Starting truemailer...");

    if !config_exists {
        info!("Config file not found, using defaults.");
    }

    // 3. Init Store & Fetcher
    let store = init_store(&config);
    let fetcher: Arc<dyn ListFetcher> = Arc::new(HttpListFetcher::new(&config.fetch)?);
    let orchestrator = Arc::new(SyncOrchestrator::new(
        fetcher.clone(),
        store.clone(),
        &config,
    ));

    if let Mode::SyncOnce = mode {
        return run_sync_once(&orchestrator).await;
    }

    // 4. Init Resolver Pipeline
    let cache = Arc::new(SourceCache::new(
        fetcher,
        Duration::from_secs(config.cache.ttl_seconds),
    ));
    let resolver = Arc::new(DomainResolver::new(
        store.clone(),
        cache.clone(),
        config.sources.clone(),
    ));
    let validator = Arc::new(EmailValidator::new(resolver));

    // 5. Init Stats
    let log_interval = if config.stats.enable {
        config.stats.log_interval_seconds
    } else {
        0
    };
    let stats = StatsCollector::new(log_interval);

    // 6. Spawn Scheduled Sync
    // Channel for forcing a sync from the API
    let (sync_tx, mut sync_rx) = tokio::sync::mpsc::channel::<()>(1);

    if config.sync.enable {
        let sync_interval = Duration::from_secs(config.sync.interval_hours.max(1) * 3600);
        let orchestrator_for_loop = orchestrator.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sync_interval);
            // The first tick completes immediately: sync once at startup
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        info!("Scheduled domain sync...");
                    }
                    Some(()) = sync_rx.recv() => {
                        info!("Forced domain sync triggered via API...");
                        interval.reset(); // Reset timer to avoid double sync
                    }
                }
                orchestrator_for_loop.sync_all_sources().await;
            }
        });
    } else {
        info!("Scheduled sync disabled.");
    }

    // 7. Start API Server
    let api_state = ApiState {
        validator,
        orchestrator,
        cache,
        store,
        stats,
        sync_trigger: sync_tx,
        cron_secret: config.sync.cron_secret.clone(),
    };

    // 8. Graceful Shutdown
    tokio::select! {
        res = start_api_server(api_state, &config.host, config.port) => res?,
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }

    Ok(())
}

async fn run_sync_once(orchestrator: &SyncOrchestrator) -> Result<()> {
    let results = orchestrator.sync_all_sources().await;

    for result in &results {
        println!(
            "{}: total={} new={} updated={} errors={}",
            result.source,
            result.total_domains,
            result.new_domains,
            result.updated_domains,
            result.errors.len()
        );
        for e in result.errors.iter().take(5) {
            println!("  - {}", e);
        }
    }

    let all_failed = results
        .iter()
        .all(|r| r.total_domains == 0 && !r.errors.is_empty());
    if all_failed {
        error!("Every source failed to sync");
        bail!("sync failed for all sources");
    }
    Ok(())
}
