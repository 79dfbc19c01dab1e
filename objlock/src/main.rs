mod app;
mod config;

use app::{App, Outcome};
use chrono::SecondsFormat;
use config::{AppConfig, CONFIG_PATH_ENV};
use std::{env, path::PathBuf, process};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status when the lease is held by someone else.
const EXIT_HELD: i32 = 3;

#[tokio::main]
async fn main() {
    // Install global log collector.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|err| {
        error!("{} is not set: {}", CONFIG_PATH_ENV, err);
        process::exit(1);
    });

    let config = AppConfig::load(&PathBuf::from(config_path)).unwrap_or_else(|err| {
        error!("{}", err);
        process::exit(1);
    });

    // Interrupt aborts a pending acquisition.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling acquisition");
            trigger.cancel();
        }
    });

    match App::new(config).run(cancel).await {
        Ok(Outcome::Acquired { not_before }) => {
            info!(
                "lock acquired until {}",
                not_before.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
            process::exit(0);
        }
        Ok(Outcome::Held { not_before }) => {
            info!(
                "lock held until {}",
                not_before.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
            process::exit(EXIT_HELD);
        }
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    }
}
