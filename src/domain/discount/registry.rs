use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::domain::message::DiscountResponse;
use crate::domain::model::CorrelationId;
use crate::domain::port::Logger;

use super::saga::{DiscountContext, SagaState};

const COMPONENT: &str = "PendingCallRegistry";

/// レジストリのエラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Correlation id {0} is already registered")]
    AlreadyRegistered(CorrelationId),
}

/// 応答を待っている呼び出し1件
struct PendingCall {
    sender: oneshot::Sender<DiscountResponse>,
    context: DiscountContext,
    registered_at: Instant,
}

/// 相関IDごとに、待機中の呼び出しとサーガの途中結果を保持する
/// 各相関IDの待機は resolve / fail / expire のいずれか1回だけで終わる
pub struct PendingCallRegistry {
    entries: Mutex<HashMap<CorrelationId, PendingCall>>,
}

impl PendingCallRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 呼び出しを登録し、結果を受け取るレシーバーを返す
    ///
    /// # Returns
    /// * `Err(RegistryError::AlreadyRegistered)` - 同じ相関IDが処理中
    pub async fn register(
        &self,
        context: DiscountContext,
    ) -> Result<oneshot::Receiver<DiscountResponse>, RegistryError> {
        let correlation_id = context.correlation_id();
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&correlation_id) {
            return Err(RegistryError::AlreadyRegistered(correlation_id));
        }

        let (sender, receiver) = oneshot::channel();
        entries.insert(
            correlation_id,
            PendingCall {
                sender,
                context,
                registered_at: Instant::now(),
            },
        );
        Ok(receiver)
    }

    /// 成功結果で呼び出しを完了する
    /// 登録がなければ何もせず false を返す
    pub async fn resolve(&self, correlation_id: CorrelationId, response: DiscountResponse) -> bool {
        let call = self.entries.lock().await.remove(&correlation_id);
        match call {
            Some(call) => {
                // 待機側が既にいなくても結果は破棄するだけ
                let _ = call.sender.send(response);
                true
            }
            None => false,
        }
    }

    /// 失敗結果で呼び出しを完了する
    /// 登録がなければ何もせず false を返す
    pub async fn fail(&self, correlation_id: CorrelationId, message: &str) -> bool {
        let call = self.entries.lock().await.remove(&correlation_id);
        match call {
            Some(mut call) => {
                call.context.fail();
                let _ = call
                    .sender
                    .send(DiscountResponse::failure(correlation_id, message));
                true
            }
            None => false,
        }
    }

    /// 結果を送らずに登録を取り除く（待機側のタイムアウト時）
    pub async fn expire(&self, correlation_id: CorrelationId) -> bool {
        self.entries.lock().await.remove(&correlation_id).is_some()
    }

    /// 登録中のコンテキストを操作する
    /// 登録がなければ None を返す
    pub async fn advance<R, F>(&self, correlation_id: CorrelationId, f: F) -> Option<R>
    where
        F: FnOnce(&mut DiscountContext) -> R,
    {
        let mut entries = self.entries.lock().await;
        entries
            .get_mut(&correlation_id)
            .map(|call| f(&mut call.context))
    }

    /// 登録中のサーガの状態
    pub async fn state(&self, correlation_id: CorrelationId) -> Option<SagaState> {
        self.entries
            .lock()
            .await
            .get(&correlation_id)
            .map(|call| call.context.state())
    }

    pub async fn contains(&self, correlation_id: CorrelationId) -> bool {
        self.entries.lock().await.contains_key(&correlation_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// 登録から max_age 以上経過した呼び出しを失敗で完了する
    ///
    /// # Returns
    /// * 完了させた相関IDの一覧
    pub async fn sweep_expired(&self, max_age: Duration) -> Vec<CorrelationId> {
        let expired: Vec<(CorrelationId, PendingCall)> = {
            let mut entries = self.entries.lock().await;
            let ids: Vec<CorrelationId> = entries
                .iter()
                .filter(|(_, call)| call.registered_at.elapsed() >= max_age)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).map(|call| (id, call)))
                .collect()
        };

        expired
            .into_iter()
            .map(|(id, mut call)| {
                call.context.fail();
                let _ = call
                    .sender
                    .send(DiscountResponse::failure(id, "discount calculation expired"));
                id
            })
            .collect()
    }

    /// 期限切れの呼び出しを定期的に掃除するタスクを起動
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        max_age: Duration,
        logger: Arc<dyn Logger>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let swept = self.sweep_expired(max_age).await;
                for id in swept {
                    logger.warn(
                        COMPONENT,
                        "Expired pending discount call removed",
                        Some(id.as_uuid()),
                        None,
                    );
                }
            }
        })
    }
}

impl Default for PendingCallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::DiscountRequest;
    use crate::domain::model::{Money, OrderId, UserId};

    fn context(id: CorrelationId) -> DiscountContext {
        DiscountContext::new(
            id,
            DiscountRequest {
                correlation_id: Some(id),
                order_id: OrderId::new(),
                user_id: UserId::new(),
                items: vec![],
                subtotal: Money::zero(),
                total_items: 0,
                coupon_codes: vec![],
            },
        )
    }

    #[tokio::test]
    async fn test_resolve_completes_receiver_once() {
        let registry = PendingCallRegistry::new();
        let id = CorrelationId::new();
        let receiver = registry.register(context(id)).await.unwrap();

        let mut response = DiscountResponse::failure(id, "x");
        response.success = true;
        assert!(registry.resolve(id, response.clone()).await);
        assert!(!registry.resolve(id, response.clone()).await);
        assert!(!registry.fail(id, "late").await);

        assert_eq!(receiver.await.unwrap(), response);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let registry = PendingCallRegistry::new();
        let id = CorrelationId::new();
        let _receiver = registry.register(context(id)).await.unwrap();

        let result = registry.register(context(id)).await;

        assert_eq!(result.err(), Some(RegistryError::AlreadyRegistered(id)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_fail_sends_failure_response() {
        let registry = PendingCallRegistry::new();
        let id = CorrelationId::new();
        let receiver = registry.register(context(id)).await.unwrap();

        assert!(registry.fail(id, "remote error").await);

        let response = receiver.await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error_message.as_deref(), Some("remote error"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_a_no_op() {
        let registry = PendingCallRegistry::new();
        let id = CorrelationId::new();

        assert!(!registry.expire(id).await);
        assert!(registry.advance(id, |ctx| ctx.state()).await.is_none());
        assert!(registry.state(id).await.is_none());
    }

    #[tokio::test]
    async fn test_advance_mutates_context() {
        let registry = PendingCallRegistry::new();
        let id = CorrelationId::new();
        let _receiver = registry.register(context(id)).await.unwrap();

        let result = registry.advance(id, |ctx| ctx.skip_coupon()).await;

        assert!(matches!(result, Some(Ok(_))));
        assert_eq!(registry.state(id).await, Some(SagaState::AwaitingTier));
    }

    #[tokio::test]
    async fn test_expire_drops_sender() {
        let registry = PendingCallRegistry::new();
        let id = CorrelationId::new();
        let receiver = registry.register(context(id)).await.unwrap();

        assert!(registry.expire(id).await);

        assert!(receiver.await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_expired_fails_old_calls() {
        let registry = PendingCallRegistry::new();
        let old = CorrelationId::new();
        let old_receiver = registry.register(context(old)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let fresh = CorrelationId::new();
        let _fresh_receiver = registry.register(context(fresh)).await.unwrap();

        let swept = registry.sweep_expired(Duration::from_millis(20)).await;

        assert_eq!(swept, vec![old]);
        assert!(!old_receiver.await.unwrap().success);
        assert!(registry.contains(fresh).await);
    }
}
