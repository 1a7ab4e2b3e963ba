//! `sdui-watch` -- follow a Stable Diffusion web UI job from the terminal.
//!
//! Polls the backend's progress endpoint for one job, logs the progress
//! text as it changes, and optionally writes live previews to a directory.
//! Job ids are stored per tab so an interrupted watch can be restored.
//!
//! # Commands
//!
//! | Command             | Effect                                               |
//! |---------------------|------------------------------------------------------|
//! | `new-id`            | Generate a job id, store it for the tab, print it    |
//! | `track <job-id>`    | Store the id, watch the job, forget the id at the end |
//! | `restore`           | Watch the job stored for the tab                     |
//! | `hash <path>...`    | Print SHA-256 digests of files                       |
//!
//! Exit codes: `0` when the command succeeded and any watched job
//! completed, `1` when the watched job ended any other way, `2` on usage,
//! configuration or I/O errors. See [`WatchConfig::from_env`] for the
//! environment variables.

use sdui_watch::commands::{self, Command};
use sdui_watch::config::WatchConfig;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sdui_watch=info,sdui_progress=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = Command::parse(std::env::args().skip(1)).unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(2);
    });

    let config = WatchConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(2);
    });

    tracing::debug!(
        api_url = %config.api_url,
        tab = %config.tab,
        state_file = %config.state_file.display(),
        "Starting sdui-watch",
    );

    match commands::run(command, &config).await {
        Ok(report) => {
            println!("{report}");
            std::process::exit(report.exit_code());
        }
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            std::process::exit(2);
        }
    }
}
