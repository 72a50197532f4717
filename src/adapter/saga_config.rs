use std::env;
use std::time::Duration;

use crate::adapter::database_config::{env_or, ConfigError};

/// 割引サーガとサーバーの設定
#[derive(Debug, Clone, PartialEq)]
pub struct SagaConfig {
    /// 注文作成時にサーガ全体を待つ上限
    pub discount_timeout: Duration,
    /// 待機中の呼び出しを掃除する間隔
    pub sweep_interval: Duration,
    /// 掃除の対象になるまでの経過時間
    pub max_pending_age: Duration,
    pub bind_address: String,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            discount_timeout: Duration::from_millis(5_000),
            sweep_interval: Duration::from_millis(30_000),
            max_pending_age: Duration::from_millis(60_000),
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

impl SagaConfig {
    /// 環境変数から設定を読み取る
    /// 未設定の項目はデフォルト値になる
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let discount_timeout = Self::millis("DISCOUNT_SAGA_TIMEOUT_MS", defaults.discount_timeout)?;
        let sweep_interval =
            Self::millis("DISCOUNT_REGISTRY_SWEEP_INTERVAL_MS", defaults.sweep_interval)?;
        let max_pending_age =
            Self::millis("DISCOUNT_REGISTRY_MAX_AGE_MS", defaults.max_pending_age)?;
        let bind_address = env::var("SERVER_BIND_ADDRESS").unwrap_or(defaults.bind_address);

        if discount_timeout.is_zero() || sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "DISCOUNT_SAGA_TIMEOUT_MS and DISCOUNT_REGISTRY_SWEEP_INTERVAL_MS must be positive"
                    .to_string(),
            ));
        }
        if max_pending_age < discount_timeout {
            return Err(ConfigError::InvalidValue(format!(
                "DISCOUNT_REGISTRY_MAX_AGE_MS ({:?}) must not be shorter than DISCOUNT_SAGA_TIMEOUT_MS ({:?})",
                max_pending_age, discount_timeout
            )));
        }

        Ok(Self {
            discount_timeout,
            sweep_interval,
            max_pending_age,
            bind_address,
        })
    }

    fn millis(name: &str, default: Duration) -> Result<Duration, ConfigError> {
        let millis = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        env_or(name, millis).map(Duration::from_millis)
    }
}
