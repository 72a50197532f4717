// ロイヤリティ側の応答ハンドラー
// クーポン検証、会員ランク割引、クーポン利用通知を処理する

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::channel::{HandlerError, MessageHandler};
use crate::domain::message::{
    AppliedCoupon, CouponUsageNotification, CouponValidationRequest, CouponValidationResponse,
    Message, TierDiscountRequest, TierDiscountResponse,
};
use crate::domain::model::{
    Coupon, CouponRejection, CouponUsage, CorrelationId, Money, ReservationOutcome,
};
use crate::domain::port::{
    CouponRepository, Logger, MembershipRepository, MessageChannel, RepositoryError,
};
use crate::domain::serialization::{MessageSerializer, SerializationError};

impl From<RepositoryError> for HandlerError {
    fn from(error: RepositoryError) -> Self {
        // リポジトリの失敗は一時的なものとして再試行させる
        HandlerError::TransientError(error.to_string())
    }
}

/// 応答を封筒に詰めて発行する
async fn publish_reply<M: Message>(
    channel: &dyn MessageChannel,
    serializer: &MessageSerializer,
    key: CorrelationId,
    message: &M,
) -> Result<(), HandlerError> {
    let envelope = serializer
        .encode(key, message)
        .map_err(|e| HandlerError::PermanentError(e.to_string()))?;
    channel
        .publish(envelope)
        .await
        .map_err(|e| HandlerError::TransientError(e.to_string()))
}

/// クーポン検証ハンドラー
/// 有効なクーポンは相関IDごとに予約し、同じ依頼の再配信では同じ予約を使う
pub struct CouponValidationHandler {
    coupon_repository: Arc<dyn CouponRepository>,
    channel: Arc<dyn MessageChannel>,
    serializer: MessageSerializer,
    logger: Arc<dyn Logger>,
}

impl CouponValidationHandler {
    const COMPONENT: &'static str = "CouponValidationHandler";

    pub fn new(
        coupon_repository: Arc<dyn CouponRepository>,
        channel: Arc<dyn MessageChannel>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            coupon_repository,
            channel,
            serializer: MessageSerializer::new(),
            logger,
        }
    }

    /// 依頼を評価して応答を作る
    async fn evaluate(
        &self,
        key: CorrelationId,
        request: &CouponValidationRequest,
    ) -> Result<CouponValidationResponse, HandlerError> {
        let now = Utc::now();
        let mut applied: Vec<AppliedCoupon> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut remaining = request.amount;
        let mut seen: Vec<String> = Vec::new();

        for raw_code in &request.coupon_codes {
            let code = Coupon::normalize_code(raw_code);
            if code.is_empty() || seen.contains(&code) {
                continue;
            }
            seen.push(code.clone());

            let Some(coupon) = self.coupon_repository.find_by_code(&code).await? else {
                errors.push(format!("{}: {}", code, CouponRejection::NotFound));
                continue;
            };

            if let Err(rejection) = coupon.check_terms(request.amount, now) {
                errors.push(format!("{}: {}", code, rejection));
                continue;
            }

            let discount = coupon
                .calculate_discount(request.amount)
                .map_err(|e| HandlerError::DomainError(e.to_string()))?
                .min(remaining);
            // 割引が残っていないクーポンは予約しない
            if discount.is_zero() {
                errors.push(format!("{}: {}", code, CouponRejection::NothingLeftToDiscount));
                continue;
            }

            // 同じ相関IDの予約があれば、再配信としてそのまま使う
            let usage = CouponUsage::reserve(code.clone(), request.user_id, key);
            match self.coupon_repository.try_reserve(&coupon, &usage).await? {
                ReservationOutcome::Reserved | ReservationOutcome::AlreadyReserved => {}
                ReservationOutcome::Rejected(rejection) => {
                    errors.push(format!("{}: {}", code, rejection));
                    continue;
                }
            }
            remaining = remaining.saturating_sub(&discount);

            applied.push(AppliedCoupon {
                code,
                discount_type: coupon.discount_type(),
                discount,
            });
        }

        let total_discount = applied
            .iter()
            .try_fold(Money::zero(), |acc, c| acc.add(&c.discount))
            .map_err(|e| HandlerError::DomainError(e.to_string()))?;

        Ok(CouponValidationResponse {
            correlation_id: key,
            success: true,
            error_message: None,
            applied_coupons: applied,
            total_discount,
            errors,
        })
    }
}

#[async_trait]
impl MessageHandler<CouponValidationRequest> for CouponValidationHandler {
    async fn handle(
        &self,
        key: CorrelationId,
        request: CouponValidationRequest,
    ) -> Result<(), HandlerError> {
        let response = match self.evaluate(key, &request).await {
            Ok(response) => response,
            Err(HandlerError::DomainError(message)) => {
                CouponValidationResponse::failure(key, message)
            }
            Err(error) => return Err(error),
        };

        let mut context = HashMap::new();
        context.insert("applied".to_string(), response.applied_coupons.len().to_string());
        context.insert("rejected".to_string(), response.errors.len().to_string());
        context.insert("total_discount".to_string(), response.total_discount.to_string());
        self.logger.info(
            Self::COMPONENT,
            "Coupon validation processed",
            Some(key.as_uuid()),
            Some(context),
        );

        publish_reply(self.channel.as_ref(), &self.serializer, key, &response).await
    }

    async fn handle_malformed(
        &self,
        key: CorrelationId,
        error: SerializationError,
    ) -> Result<(), HandlerError> {
        self.logger.warn(
            Self::COMPONENT,
            &format!("Invalid coupon validation request: {}", error),
            Some(key.as_uuid()),
            None,
        );
        let response = CouponValidationResponse::failure(key, "invalid coupon validation request");
        publish_reply(self.channel.as_ref(), &self.serializer, key, &response).await
    }
}

/// 会員ランク割引ハンドラー
/// 会員情報のないユーザーは割引0円で成功とする
pub struct TierDiscountHandler {
    membership_repository: Arc<dyn MembershipRepository>,
    channel: Arc<dyn MessageChannel>,
    serializer: MessageSerializer,
    logger: Arc<dyn Logger>,
}

impl TierDiscountHandler {
    const COMPONENT: &'static str = "TierDiscountHandler";

    pub fn new(
        membership_repository: Arc<dyn MembershipRepository>,
        channel: Arc<dyn MessageChannel>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            membership_repository,
            channel,
            serializer: MessageSerializer::new(),
            logger,
        }
    }
}

#[async_trait]
impl MessageHandler<TierDiscountRequest> for TierDiscountHandler {
    async fn handle(
        &self,
        key: CorrelationId,
        request: TierDiscountRequest,
    ) -> Result<(), HandlerError> {
        let membership = self
            .membership_repository
            .find_by_user(request.user_id)
            .await?;

        let response = match membership {
            Some(membership) => {
                let tier = membership.tier();
                match tier.calculate_discount(request.amount) {
                    Ok(discount) => TierDiscountResponse {
                        correlation_id: key,
                        success: true,
                        error_message: None,
                        tier: Some(tier),
                        discount_percentage: tier.discount_percentage(),
                        discount,
                    },
                    Err(error) => TierDiscountResponse::failure(key, error.to_string()),
                }
            }
            None => TierDiscountResponse {
                correlation_id: key,
                success: true,
                error_message: None,
                tier: None,
                discount_percentage: Decimal::ZERO,
                discount: Money::zero(),
            },
        };

        let mut context = HashMap::new();
        context.insert(
            "tier".to_string(),
            response
                .tier
                .map(|t| t.to_string())
                .unwrap_or_else(|| "NONE".to_string()),
        );
        context.insert("discount".to_string(), response.discount.to_string());
        self.logger.info(
            Self::COMPONENT,
            "Tier discount processed",
            Some(key.as_uuid()),
            Some(context),
        );

        publish_reply(self.channel.as_ref(), &self.serializer, key, &response).await
    }

    async fn handle_malformed(
        &self,
        key: CorrelationId,
        error: SerializationError,
    ) -> Result<(), HandlerError> {
        self.logger.warn(
            Self::COMPONENT,
            &format!("Invalid tier discount request: {}", error),
            Some(key.as_uuid()),
            None,
        );
        let response = TierDiscountResponse::failure(key, "invalid tier discount request");
        publish_reply(self.channel.as_ref(), &self.serializer, key, &response).await
    }
}

/// クーポン利用通知ハンドラー
/// 相関IDの予約を使用済みにする。予約がなければ使用済みの記録を作る
pub struct CouponUsageHandler {
    coupon_repository: Arc<dyn CouponRepository>,
    logger: Arc<dyn Logger>,
}

impl CouponUsageHandler {
    const COMPONENT: &'static str = "CouponUsageHandler";

    pub fn new(coupon_repository: Arc<dyn CouponRepository>, logger: Arc<dyn Logger>) -> Self {
        Self {
            coupon_repository,
            logger,
        }
    }
}

#[async_trait]
impl MessageHandler<CouponUsageNotification> for CouponUsageHandler {
    async fn handle(
        &self,
        key: CorrelationId,
        notification: CouponUsageNotification,
    ) -> Result<(), HandlerError> {
        for raw_code in &notification.coupon_codes {
            let code = Coupon::normalize_code(raw_code);
            let usages = self.coupon_repository.find_usages(&code).await?;

            match usages.into_iter().find(|u| u.correlation_id() == key) {
                Some(mut usage) => {
                    // 再配信された通知なら既に使用済み
                    if usage.mark_used(notification.order_id) {
                        self.coupon_repository.save_usage(&usage).await?;
                    }
                }
                None => {
                    let usage =
                        CouponUsage::used(code.clone(), notification.user_id, key, notification.order_id);
                    self.coupon_repository.save_usage(&usage).await?;
                }
            }
        }

        let mut context = HashMap::new();
        context.insert("order_id".to_string(), notification.order_id.to_string());
        context.insert("coupons".to_string(), notification.coupon_codes.join(","));
        self.logger.info(
            Self::COMPONENT,
            "Coupon usage recorded",
            Some(key.as_uuid()),
            Some(context),
        );
        Ok(())
    }
}
