use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::adapter::database_error::DatabaseError;

/// 設定エラー
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// 環境変数を型付きで読む（未設定ならデフォルト値）
pub(crate) fn env_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// 注文側・ロイヤリティ側が共有するMySQLの接続設定
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
    /// プールから接続を取得するまでの待ち時間
    pub acquire_timeout: Duration,
    /// DATABASE_URL が設定されていれば個別の項目より優先する
    pub url: Option<String>,
}

impl DatabaseConfig {
    /// 環境変数から設定を読み取る
    /// 未設定の項目はデフォルト値になる
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_connections: u32 = env_or("DATABASE_MAX_CONNECTIONS", 10)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            host: env_or("DATABASE_HOST", "localhost".to_string())?,
            port: env_or("DATABASE_PORT", 3306)?,
            database: env_or("DATABASE_NAME", "discount_saga_db".to_string())?,
            username: env_or("DATABASE_USER", "discount_saga_user".to_string())?,
            password: env_or("DATABASE_PASSWORD", "discount_saga_password".to_string())?,
            max_connections,
            acquire_timeout: Duration::from_secs(env_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 5)?),
            url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
        })
    }

    /// 接続プールを作成する
    pub async fn connect(&self) -> Result<Pool<MySql>, DatabaseError> {
        MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.connection_string())
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))
    }

    /// MySQL接続文字列を生成
    pub fn connection_string(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "mysql://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.database
            ),
        }
    }
}
