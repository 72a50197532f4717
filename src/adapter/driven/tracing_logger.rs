use crate::domain::port::Logger;
use std::collections::HashMap;
use uuid::Uuid;

/// tracingによるロガー実装
/// 出力先とレベルは起動時に設定する tracing-subscriber に従う
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }

    /// 追加コンテキストを `key=value, ...` 形式に整形（キー順）
    fn format_context(context: Option<HashMap<String, String>>) -> String {
        let Some(context) = context else {
            return String::new();
        };
        let mut pairs: Vec<(String, String)> = context.into_iter().collect();
        pairs.sort();
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn format_correlation_id(correlation_id: Option<Uuid>) -> String {
        correlation_id.map(|id| id.to_string()).unwrap_or_default()
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for TracingLogger {
    fn debug(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        tracing::debug!(
            component,
            correlation_id = %Self::format_correlation_id(correlation_id),
            context = %Self::format_context(context),
            "{}",
            message
        );
    }

    fn info(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        tracing::info!(
            component,
            correlation_id = %Self::format_correlation_id(correlation_id),
            context = %Self::format_context(context),
            "{}",
            message
        );
    }

    fn warn(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        tracing::warn!(
            component,
            correlation_id = %Self::format_correlation_id(correlation_id),
            context = %Self::format_context(context),
            "{}",
            message
        );
    }

    fn error(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    ) {
        tracing::error!(
            component,
            correlation_id = %Self::format_correlation_id(correlation_id),
            context = %Self::format_context(context),
            "{}",
            message
        );
    }
}
