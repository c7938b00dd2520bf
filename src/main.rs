use std::process::ExitCode;
use std::sync::Arc;

use ble_gatt_explorer_lib::config::AppConfig;
use ble_gatt_explorer_lib::core::bluetooth::{BluestTransport, Session, completion};
use ble_gatt_explorer_lib::error::SessionError;
use ble_gatt_explorer_lib::logging;
use log::{error, info, warn};

const USAGE: &str = "usage: ble-gatt-explorer [peripheral-id]";

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() > 1 {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    }

    if let Err(e) = logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let mut config = match AppConfig::load_config(&AppConfig::default_path()).await {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(target) = args.into_iter().next() {
        config.session.target = Some(target);
    }

    logging::set_level(config.level_filter());

    let (transport, events) = match BluestTransport::open().await {
        Ok(opened) => opened,
        Err(e) => {
            error!("{}", SessionError::AdapterOpen(e));
            return ExitCode::FAILURE;
        }
    };

    match config.session.target.as_deref() {
        Some(target) => info!("Looking for {}", target),
        None => info!("Looking for any peripheral"),
    }

    let session = Session::new(Arc::new(transport), events, config.session);
    let shutdown = session.shutdown_token();
    let (signal, waiter) = completion();
    tokio::spawn(session.run(signal));

    let wait = waiter.wait();
    tokio::pin!(wait);
    let outcome = tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Ctrl-C received; shutting down");
            shutdown.cancel();
            wait.await
        }
    };

    info!("done");
    if outcome.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
