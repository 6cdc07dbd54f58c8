use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Telegram refuses uploads above 50 MiB, so this is a hard ceiling.
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// How the Instagram connector treats its optional credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginPolicy {
    /// Log in only after the upstream refuses an anonymous request.
    OnDemand,
    /// Log in before the first resolve (still lazily, never at startup).
    Always,
    /// Never log in, even when credentials are configured.
    Disabled,
}

impl LoginPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "" | "auto" | "lazy" | "on-demand" | "on_demand" => Some(Self::OnDemand),
            "force" | "always" => Some(Self::Always),
            "disabled" | "off" | "never" | "false" | "0" => Some(Self::Disabled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Knobs for one upstream's rate governor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateConfig {
    pub min_interval: Duration,
    pub cooldown: Duration,
}

#[derive(Clone, Debug)]
pub struct InstagramConfig {
    pub download_dir: PathBuf,
    pub max_file_size: u64,
    pub credentials: Option<Credentials>,
    pub login_policy: LoginPolicy,
    pub rate: RateConfig,
}

impl InstagramConfig {
    /// Whether the connector may attempt a login at all.
    pub fn can_login(&self) -> bool {
        self.credentials.is_some() && self.login_policy != LoginPolicy::Disabled
    }
}

#[derive(Clone, Debug)]
pub struct TikTokConfig {
    pub download_dir: PathBuf,
    pub max_file_size: u64,
    pub ytdlp_path: PathBuf,
    pub rate: RateConfig,
}

#[derive(Clone, Copy, Debug)]
pub struct DeliveryConfig {
    /// Pause between consecutive uploads of one batch.
    pub pacing: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(500),
        }
    }
}

/// Typed configuration loaded from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Transport
    pub bot_token: String,

    // Downloads
    pub download_dir: PathBuf,
    pub max_file_size: u64,

    // Instagram
    pub instagram_credentials: Option<Credentials>,
    pub instagram_login_policy: LoginPolicy,
    pub instagram_rate: RateConfig,

    // TikTok
    pub ytdlp_path: PathBuf,
    pub tiktok_rate: RateConfig,

    // Delivery
    pub delivery: DeliveryConfig,

    // Process
    pub health_port: u16,
    pub restart_on_stop: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN")
            .and_then(non_empty)
            .or_else(|| env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty))
            .ok_or_else(|| {
                Error::Config("BOT_TOKEN environment variable is required".to_string())
            })?;

        let download_dir = env_path("DOWNLOAD_PATH").unwrap_or_else(|| PathBuf::from("./downloads"));
        fs::create_dir_all(&download_dir)?;

        // The transport limit is fixed; a smaller ceiling may be configured but never a larger one.
        let max_file_size = env_u64("MAX_FILE_SIZE")
            .map(|v| v.min(MAX_FILE_SIZE))
            .unwrap_or(MAX_FILE_SIZE);

        let instagram_credentials = match (
            env_str("INSTAGRAM_USERNAME").and_then(non_empty),
            env_str("INSTAGRAM_PASSWORD").and_then(non_empty),
        ) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        let instagram_login_policy = match env_str("INSTAGRAM_LOGIN") {
            Some(raw) => LoginPolicy::parse(&raw).ok_or_else(|| {
                Error::Config(format!(
                    "INSTAGRAM_LOGIN must be one of auto, force, disabled (got {raw:?})"
                ))
            })?,
            None => LoginPolicy::OnDemand,
        };

        let cooldown = Duration::from_secs(env_u64("INSTAGRAM_RATE_LIMIT_COOLDOWN").unwrap_or(600));
        let instagram_rate = RateConfig {
            min_interval: Duration::from_secs(env_u64("INSTAGRAM_MIN_REQUEST_INTERVAL").unwrap_or(8)),
            cooldown,
        };
        let tiktok_rate = RateConfig {
            min_interval: Duration::from_secs(env_u64("TIKTOK_MIN_REQUEST_INTERVAL").unwrap_or(2)),
            cooldown,
        };

        let ytdlp_path = env_path("YTDLP_PATH")
            .or_else(|| which_in_path("yt-dlp"))
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));

        let delivery = DeliveryConfig {
            pacing: Duration::from_millis(env_u64("DELIVERY_PACING_MS").unwrap_or(500)),
        };

        let health_port = env_u16("PORT").unwrap_or(8000);
        let restart_on_stop = env_bool("RESTART_ON_STOP").unwrap_or(true);

        Ok(Self {
            bot_token,
            download_dir,
            max_file_size,
            instagram_credentials,
            instagram_login_policy,
            instagram_rate,
            ytdlp_path,
            tiktok_rate,
            delivery,
            health_port,
            restart_on_stop,
        })
    }

    pub fn instagram(&self) -> InstagramConfig {
        InstagramConfig {
            download_dir: self.download_dir.clone(),
            max_file_size: self.max_file_size,
            credentials: self.instagram_credentials.clone(),
            login_policy: self.instagram_login_policy,
            rate: self.instagram_rate,
        }
    }

    pub fn tiktok(&self) -> TikTokConfig {
        TikTokConfig {
            download_dir: self.download_dir.clone(),
            max_file_size: self.max_file_size,
            ytdlp_path: self.ytdlp_path.clone(),
            rate: self.tiktok_rate,
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u16(key: &str) -> Option<u16> {
    env_str(key).and_then(|s| s.trim().parse::<u16>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_str(key).and_then(non_empty).map(PathBuf::from)
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_parsing_strips_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\nBOT_TOKEN=\"abc:123\"\n\nexport DOWNLOAD_PATH='/tmp/dl'\nBROKEN\n=novalue\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("BOT_TOKEN".to_string(), "abc:123".to_string()),
                ("DOWNLOAD_PATH".to_string(), "/tmp/dl".to_string()),
            ]
        );
    }

    #[test]
    fn login_policy_parsing() {
        assert_eq!(LoginPolicy::parse("auto"), Some(LoginPolicy::OnDemand));
        assert_eq!(LoginPolicy::parse(" FORCE "), Some(LoginPolicy::Always));
        assert_eq!(LoginPolicy::parse("disabled"), Some(LoginPolicy::Disabled));
        assert_eq!(LoginPolicy::parse("sometimes"), None);
    }

    #[test]
    fn bool_parsing_accepts_common_truthy_values() {
        assert!(parse_bool("yes"));
        assert!(parse_bool(" TRUE "));
        assert!(!parse_bool("no"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn login_requires_credentials_and_policy() {
        let mut cfg = InstagramConfig {
            download_dir: PathBuf::from("/tmp"),
            max_file_size: MAX_FILE_SIZE,
            credentials: None,
            login_policy: LoginPolicy::OnDemand,
            rate: RateConfig {
                min_interval: Duration::from_secs(8),
                cooldown: Duration::from_secs(600),
            },
        };
        assert!(!cfg.can_login());

        cfg.credentials = Some(Credentials {
            username: "u".to_string(),
            password: "p".to_string(),
        });
        assert!(cfg.can_login());

        cfg.login_policy = LoginPolicy::Disabled;
        assert!(!cfg.can_login());
    }
}
