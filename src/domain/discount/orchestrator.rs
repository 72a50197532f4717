use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::domain::channel::{HandlerError, MessageHandler};
use crate::domain::message::{
    CouponValidationRequest, CouponValidationResponse, DiscountRequest, DiscountResponse, Message,
    TierDiscountRequest, TierDiscountResponse,
};
use crate::domain::model::CorrelationId;
use crate::domain::port::{Logger, MessageChannel};
use crate::domain::serialization::{MessageSerializer, SerializationError};

use super::registry::PendingCallRegistry;
use super::rules::OrderDiscountRules;
use super::saga::{DiscountContext, SagaError, SagaState};

const COMPONENT: &str = "DiscountOrchestrator";

/// 次に送る依頼
enum NextHop {
    Coupon(CouponValidationRequest),
    Tier(TierDiscountRequest),
}

/// 応答を受けた結果の進み方
enum Step<T> {
    /// 次の処理に進む
    Next(T),
    /// 期待していない状態で届いた（重複や遅延）
    Ignored(SagaState),
    /// サーガを失敗させる
    Failed(String),
}

/// 計算中の割引呼び出し
/// `wait` で結果またはタイムアウトを待つ
pub struct DiscountCall {
    correlation_id: CorrelationId,
    receiver: oneshot::Receiver<DiscountResponse>,
    registry: Arc<PendingCallRegistry>,
}

impl DiscountCall {
    fn new(
        correlation_id: CorrelationId,
        receiver: oneshot::Receiver<DiscountResponse>,
        registry: Arc<PendingCallRegistry>,
    ) -> Self {
        Self {
            correlation_id,
            receiver,
            registry,
        }
    }

    /// 既に結果が決まっている呼び出し
    fn ready(response: DiscountResponse, registry: Arc<PendingCallRegistry>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let correlation_id = response.correlation_id;
        let _ = sender.send(response);
        Self::new(correlation_id, receiver, registry)
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// 結果を待つ
    /// タイムアウトした場合は登録を取り除き、後から届いた応答は無視される
    pub async fn wait(self, timeout: Duration) -> Result<DiscountResponse, SagaError> {
        let DiscountCall {
            correlation_id,
            receiver,
            registry,
        } = self;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(SagaError::Cancelled),
            Err(_) => {
                registry.expire(correlation_id).await;
                Err(SagaError::Timeout(timeout))
            }
        }
    }
}

/// 割引サーガのオーケストレーター（注文側）
/// 注文側の割引を計算し、クーポン検証と会員ランク割引をメッセージで順に依頼する
pub struct DiscountOrchestrator {
    registry: Arc<PendingCallRegistry>,
    channel: Arc<dyn MessageChannel>,
    rules: OrderDiscountRules,
    serializer: MessageSerializer,
    logger: Arc<dyn Logger>,
}

impl DiscountOrchestrator {
    pub fn new(
        registry: Arc<PendingCallRegistry>,
        channel: Arc<dyn MessageChannel>,
        rules: OrderDiscountRules,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            registry,
            channel,
            rules,
            serializer: MessageSerializer::new(),
            logger,
        }
    }

    pub fn registry(&self) -> Arc<PendingCallRegistry> {
        self.registry.clone()
    }

    /// 割引計算を開始する
    /// 相関IDが未設定なら採番する。最初の依頼を送った時点で呼び出しを返す
    ///
    /// 登録を先に行い、重複した相関IDではローカル規則も評価しない
    pub async fn calculate(&self, mut request: DiscountRequest) -> DiscountCall {
        let correlation_id = request.ensure_correlation_id();
        let order_id = request.order_id;
        let has_coupons = !request.coupon_codes.is_empty();

        let receiver = match self
            .registry
            .register(DiscountContext::new(correlation_id, request))
            .await
        {
            Ok(receiver) => receiver,
            Err(error) => {
                self.logger.warn(
                    COMPONENT,
                    &format!("Discount calculation rejected: {}", error),
                    Some(correlation_id.as_uuid()),
                    None,
                );
                return DiscountCall::ready(
                    DiscountResponse::failure(
                        correlation_id,
                        SagaError::DuplicateCorrelationId(correlation_id).to_string(),
                    ),
                    self.registry.clone(),
                );
            }
        };
        let call = DiscountCall::new(correlation_id, receiver, self.registry.clone());

        let rules = &self.rules;
        let next = self
            .registry
            .advance(correlation_id, |context| {
                let mut local = rules.calculate(context.request());
                let failures = std::mem::take(&mut local.failures);
                let hop = context.apply_local(local).and_then(|()| {
                    if has_coupons {
                        context.request_coupon().map(NextHop::Coupon)
                    } else {
                        context.skip_coupon().map(NextHop::Tier)
                    }
                });
                (failures, hop)
            })
            .await;

        if let Some((failures, hop)) = next {
            for failure in &failures {
                let mut context = HashMap::new();
                context.insert("rule".to_string(), failure.rule.clone());
                context.insert("order_id".to_string(), order_id.to_string());
                self.logger.warn(
                    COMPONENT,
                    &format!("LocalRuleError: rule treated as zero discount: {}", failure.error),
                    Some(correlation_id.as_uuid()),
                    Some(context),
                );
            }
            match hop {
                Ok(hop) => self.send_hop(correlation_id, hop).await,
                Err(error) => self.fail(correlation_id, &error.to_string()).await,
            }
        }

        self.logger.debug(
            COMPONENT,
            "Discount calculation started",
            Some(correlation_id.as_uuid()),
            None,
        );
        call
    }

    /// 次の依頼を発行し、発行できなければサーガを失敗させる
    async fn send_hop(&self, correlation_id: CorrelationId, hop: NextHop) {
        let result = match hop {
            NextHop::Coupon(request) => self.publish(correlation_id, &request).await,
            NextHop::Tier(request) => self.publish(correlation_id, &request).await,
        };
        if let Err(error) = result {
            self.fail(correlation_id, &error.to_string()).await;
        }
    }

    async fn publish<M: Message>(
        &self,
        correlation_id: CorrelationId,
        message: &M,
    ) -> Result<(), SagaError> {
        let envelope = self
            .serializer
            .encode(correlation_id, message)
            .map_err(|e| SagaError::PublishFailed(e.to_string()))?;
        self.channel
            .publish(envelope)
            .await
            .map_err(|e| SagaError::PublishFailed(e.to_string()))
    }

    async fn fail(&self, correlation_id: CorrelationId, message: &str) {
        if self.registry.fail(correlation_id, message).await {
            self.logger.warn(
                COMPONENT,
                &format!("Discount calculation failed: {}", message),
                Some(correlation_id.as_uuid()),
                None,
            );
        }
    }

    fn log_ignored(&self, correlation_id: CorrelationId, topic: &str, state: Option<SagaState>) {
        let mut context = HashMap::new();
        context.insert("topic".to_string(), topic.to_string());
        context.insert(
            "state".to_string(),
            state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "NotRegistered".to_string()),
        );
        self.logger.debug(
            COMPONENT,
            "DuplicateResponse: response ignored",
            Some(correlation_id.as_uuid()),
            Some(context),
        );
    }

    /// クーポン検証結果を処理する
    async fn on_coupon_response(
        &self,
        key: CorrelationId,
        response: CouponValidationResponse,
    ) -> Result<(), HandlerError> {
        let step = self
            .registry
            .advance(key, |context| {
                if context.state() != SagaState::AwaitingCoupon {
                    return Step::Ignored(context.state());
                }
                if response.correlation_id != key {
                    return Step::Failed("correlation id does not match message key".to_string());
                }
                match context.record_coupon(&response) {
                    Ok(request) => Step::Next(request),
                    Err(error) => Step::Failed(error.to_string()),
                }
            })
            .await;

        match step {
            None => self.log_ignored(key, CouponValidationResponse::TOPIC.as_str(), None),
            Some(Step::Ignored(state)) => {
                self.log_ignored(key, CouponValidationResponse::TOPIC.as_str(), Some(state))
            }
            Some(Step::Failed(message)) => self.fail(key, &message).await,
            Some(Step::Next(request)) => {
                if !response.errors.is_empty() {
                    self.logger.info(
                        COMPONENT,
                        &format!("Some coupons were not applied: {}", response.errors.join("; ")),
                        Some(key.as_uuid()),
                        None,
                    );
                }
                self.send_hop(key, NextHop::Tier(request)).await
            }
        }
        Ok(())
    }

    /// 会員ランク割引結果を処理し、サーガを完了させる
    async fn on_tier_response(
        &self,
        key: CorrelationId,
        response: TierDiscountResponse,
    ) -> Result<(), HandlerError> {
        let step = self
            .registry
            .advance(key, |context| {
                if context.state() != SagaState::AwaitingTier {
                    return Step::Ignored(context.state());
                }
                if response.correlation_id != key {
                    return Step::Failed("correlation id does not match message key".to_string());
                }
                match context.complete(&response) {
                    Ok(result) => Step::Next((result, context.elapsed())),
                    Err(error) => Step::Failed(error.to_string()),
                }
            })
            .await;

        match step {
            None => self.log_ignored(key, TierDiscountResponse::TOPIC.as_str(), None),
            Some(Step::Ignored(state)) => {
                self.log_ignored(key, TierDiscountResponse::TOPIC.as_str(), Some(state))
            }
            Some(Step::Failed(message)) => self.fail(key, &message).await,
            Some(Step::Next((result, elapsed))) => {
                let mut context = HashMap::new();
                context.insert("final_amount".to_string(), result.final_amount.to_string());
                context.insert("elapsed_ms".to_string(), elapsed.as_millis().to_string());
                if self.registry.resolve(key, result).await {
                    self.logger.info(
                        COMPONENT,
                        "Discount calculation completed",
                        Some(key.as_uuid()),
                        Some(context),
                    );
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler<CouponValidationResponse> for DiscountOrchestrator {
    async fn handle(
        &self,
        key: CorrelationId,
        message: CouponValidationResponse,
    ) -> Result<(), HandlerError> {
        self.on_coupon_response(key, message).await
    }

    async fn handle_malformed(
        &self,
        key: CorrelationId,
        error: SerializationError,
    ) -> Result<(), HandlerError> {
        self.fail(key, &format!("unparseable coupon validation response: {}", error))
            .await;
        Ok(())
    }
}

#[async_trait]
impl MessageHandler<TierDiscountResponse> for DiscountOrchestrator {
    async fn handle(
        &self,
        key: CorrelationId,
        message: TierDiscountResponse,
    ) -> Result<(), HandlerError> {
        self.on_tier_response(key, message).await
    }

    async fn handle_malformed(
        &self,
        key: CorrelationId,
        error: SerializationError,
    ) -> Result<(), HandlerError> {
        self.fail(key, &format!("unparseable tier discount response: {}", error))
            .await;
        Ok(())
    }
}
