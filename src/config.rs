use crate::error::ConfigError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// サーバー設定（環境変数から読み込む）
#[derive(Debug, Clone)]
pub struct Config {
    /// 待ち受けホスト (default: 0.0.0.0)
    pub host: String,
    /// 待ち受けポート (default: 3000)
    pub port: u16,
    /// ハートビート送信間隔 (default: 5秒)
    pub heartbeat_interval: Duration,
    /// これ以上応答がなければ切断 (default: 10秒)
    pub client_timeout: Duration,
    /// 不整合チェックの間隔 (default: 1秒)
    pub audit_interval: Duration,
    /// CORSで許可するオリジン（カンマ区切り、空ならすべて許可）
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(10),
            audit_interval: Duration::from_secs(1),
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 任意の取得関数から読み込む（テスト用に環境変数を経由しない）
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port)?,
            heartbeat_interval: parse_interval(
                &lookup,
                "HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            )?,
            client_timeout: parse_interval(&lookup, "CLIENT_TIMEOUT_SECS", defaults.client_timeout)?,
            audit_interval: parse_interval(&lookup, "AUDIT_INTERVAL_SECS", defaults.audit_interval)?,
            cors_origins: lookup("CORS_ORIGINS")
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
        })
    }
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

// 0秒の間隔はタイマーが回り続けるので不正値として扱う
fn parse_interval<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(lookup, name, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
