use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::Parser;

use receipt_watch::{
    api::ApiClient,
    cli::Cli,
    cloud::CloudinaryUploader,
    config::ReceiptWatchConfig,
    logging,
    tag::ScriptTagWriter,
    watcher::DirectoryWatcher,
    Dispatcher, ReceiptFilter, ReceiptPipeline, WatchService,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    logging::init(cli.verbose);

    let mut config = ReceiptWatchConfig::load(cli.config.as_deref())?;
    if cli.no_tag {
        config.tag.enabled = false;
    }
    if let Err(err) = config.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut service = build_service(&cli, &config, running)?;

    match service.run() {
        Ok(summary) => {
            tracing::info!(
                "Stopped: {} receipts processed, {} failed, {} events ignored",
                summary.processed,
                summary.failed,
                summary.ignored
            );
            Ok(())
        }
        Err(err) => {
            tracing::error!("Receipt processing stopped: {:#}", err);
            std::process::exit(1);
        }
    }
}

fn build_service(cli: &Cli, config: &ReceiptWatchConfig, running: Arc<AtomicBool>) -> Result<WatchService> {
    tracing::info!("Authenticating User Client...");
    let backend = ApiClient::login(&config.backend).context("Authentication failed")?;
    tracing::info!("Authentication Complete for user {}!", config.backend.email);

    let uploader = CloudinaryUploader::new(&config.cloud).context("Failed to create uploader")?;

    let mut pipeline = ReceiptPipeline::new(Box::new(backend), Box::new(uploader))
        .with_config(config.pipeline.clone());
    if config.tag.enabled {
        pipeline = pipeline.with_tag_writer(Box::new(ScriptTagWriter::from_config(&config.tag)));
    } else {
        tracing::info!("Tag writing disabled");
    }

    let watcher = DirectoryWatcher::new(cli.watch_path(), cli.recursive)?;
    let dispatcher = Dispatcher::new(ReceiptFilter::new(), pipeline);

    Ok(WatchService::new(watcher, dispatcher, config.watcher.poll_interval(), running))
}
