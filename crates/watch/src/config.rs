use std::path::PathBuf;
use std::time::Duration;

use sdui_core::error::CoreError;
use sdui_progress::config::PollConfig;

/// Watcher configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local web UI on port 7860.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Backend base URL.
    pub api_url: String,
    /// Tab whose job id is stored and restored (`txt2img`, `img2img`, ...).
    pub tab: String,
    /// JSON file holding the per-tab job ids.
    pub state_file: PathBuf,
    /// Where live previews are written; previews are skipped when unset.
    pub preview_dir: Option<PathBuf>,
    /// Timeout for a single progress request.
    pub request_timeout: Duration,
    pub poll: PollConfig,
}

impl WatchConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                          | Default                  |
    /// |----------------------------------|--------------------------|
    /// | `SDUI_API_URL`                   | `http://127.0.0.1:7860`  |
    /// | `SDUI_TAB`                       | `txt2img`                |
    /// | `SDUI_STATE_FILE`                | `.sdui-tasks.json`       |
    /// | `SDUI_PREVIEW_DIR`               | unset                    |
    /// | `SDUI_REQUEST_TIMEOUT_SECS`      | `30`                     |
    /// | `SHOW_PROGRESS_IN_TITLE`         | `true`                   |
    /// | `SHOW_PROGRESSBAR`               | `true`                   |
    /// | `LIVE_PREVIEW_REFRESH_PERIOD_MS` | `500`                    |
    /// | `INACTIVITY_TIMEOUT_SECS`        | `60`                     |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the real environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = PollConfig::default();

        let api_url = get("SDUI_API_URL").unwrap_or_else(|| "http://127.0.0.1:7860".into());
        let tab = get("SDUI_TAB").unwrap_or_else(|| "txt2img".into());
        let state_file = get("SDUI_STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".sdui-tasks.json"));
        let preview_dir = get("SDUI_PREVIEW_DIR").map(PathBuf::from);

        let request_timeout = match get("SDUI_REQUEST_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_u64("SDUI_REQUEST_TIMEOUT_SECS", &v)?),
            None => Duration::from_secs(30),
        };

        let show_progress_in_title = match get("SHOW_PROGRESS_IN_TITLE") {
            Some(v) => parse_bool("SHOW_PROGRESS_IN_TITLE", &v)?,
            None => defaults.show_progress_in_title,
        };
        let show_progress_bar = match get("SHOW_PROGRESSBAR") {
            Some(v) => parse_bool("SHOW_PROGRESSBAR", &v)?,
            None => defaults.show_progress_bar,
        };
        let live_preview_refresh_period = match get("LIVE_PREVIEW_REFRESH_PERIOD_MS") {
            Some(v) => Duration::from_millis(parse_u64("LIVE_PREVIEW_REFRESH_PERIOD_MS", &v)?),
            None => defaults.live_preview_refresh_period,
        };
        let inactivity_timeout = match get("INACTIVITY_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_u64("INACTIVITY_TIMEOUT_SECS", &v)?),
            None => defaults.inactivity_timeout,
        };

        Ok(Self {
            api_url,
            tab,
            state_file,
            preview_dir,
            request_timeout,
            poll: PollConfig {
                show_progress_in_title,
                show_progress_bar,
                live_preview_refresh_period,
                inactivity_timeout,
                ..defaults
            },
        })
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, CoreError> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("{key} must be a non-negative integer, got {value:?}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CoreError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Validation(format!("{key} must be a boolean, got {value:?}"))),
    }
}
