use std::{env, path::PathBuf, time::Duration};

pub const DEFAULT_BACKEND_URL: &str = "https://back-end-blockchain.onrender.com";

/// Runtime settings, read once at startup from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_path: PathBuf,
    pub backend_url: String,
    pub session_check_interval: Duration,
    pub backend_timeout: Duration,
    /// Upper bound on `quantidadeCo2` for the emission attached to side transactions.
    /// `None` disables the linkage.
    pub emission_link_max_co2: Option<f64>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8080);

        let data_path = env::var("APP_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/session.json"));

        let backend_url = env::var("BACKEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());

        let session_check_interval = Duration::from_secs(parse_secs("SESSION_CHECK_SECS", 300));
        let backend_timeout = Duration::from_secs(parse_secs("BACKEND_TIMEOUT_SECS", 30));

        let emission_link_max_co2 = parse_link_threshold(env::var("EMISSION_LINK_MAX_CO2").ok());

        Self {
            port,
            data_path,
            backend_url,
            session_check_interval,
            backend_timeout,
            emission_link_max_co2,
        }
    }
}

fn parse_secs(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(default)
}

fn parse_link_threshold(raw: Option<String>) -> Option<f64> {
    match raw {
        None => Some(0.5),
        Some(value) => {
            let value = value.trim();
            if value.eq_ignore_ascii_case("none") || value.is_empty() {
                None
            } else {
                value.parse::<f64>().ok().or(Some(0.5))
            }
        }
    }
}
