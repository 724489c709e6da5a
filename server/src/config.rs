use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// | Env Var                        | Default     |
/// |--------------------------------|-------------|
/// | `DUBSYNC_HOST`                 | `127.0.0.1` |
/// | `DUBSYNC_PORT`                 | `8080`      |
/// | `DUBSYNC_MEDIA_DIR`            | `./media`   |
/// | `DUBSYNC_RECONNECT_GRACE_SECS` | `120`       |
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// One sub-directory per episode, each holding `captions.json` and the media files.
    pub media_dir: PathBuf,
    /// How long a dropped socket keeps its room membership.
    pub reconnect_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            media_dir: PathBuf::from("./media"),
            reconnect_grace: Duration::from_secs(120),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("DUBSYNC_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "DUBSYNC_PORT", defaults.port),
            media_dir: lookup("DUBSYNC_MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_dir),
            reconnect_grace: Duration::from_secs(parse_or(
                &lookup,
                "DUBSYNC_RECONNECT_GRACE_SECS",
                defaults.reconnect_grace.as_secs(),
            )),
        }
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{} has invalid value {:?}, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}
