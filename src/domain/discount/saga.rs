use std::fmt;
use std::time::{Duration, Instant};

use crate::domain::error::DomainError;
use crate::domain::message::{
    BreakdownEntry, CouponValidationRequest, CouponValidationResponse, DiscountRequest,
    DiscountResponse, TierDiscountRequest, TierDiscountResponse,
};
use crate::domain::model::{CorrelationId, DiscountType, Money};

use super::rules::LocalDiscounts;

/// 最終金額を0円に切り上げたことを示す内訳の名前
pub const CLAMP_ADJUSTMENT_SOURCE: &str = "FINAL_AMOUNT_CLAMPED";

/// サーガの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    /// 登録直後（注文側の割引を計算中）
    Initiated,
    /// クーポン検証の応答待ち
    AwaitingCoupon,
    /// 会員ランク割引の応答待ち
    AwaitingTier,
    Completed,
    Failed,
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SagaState::Initiated => "Initiated",
            SagaState::AwaitingCoupon => "AwaitingCoupon",
            SagaState::AwaitingTier => "AwaitingTier",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

/// サーガのエラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SagaError {
    #[error("Unexpected saga state: expected {expected}, found {actual}")]
    UnexpectedState {
        expected: SagaState,
        actual: SagaState,
    },
    #[error("Discount calculation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Discount calculation was cancelled")]
    Cancelled,
    #[error("Correlation id {0} is already in flight")]
    DuplicateCorrelationId(CorrelationId),
    #[error("Remote service reported an error: {0}")]
    RemoteError(String),
    #[error("Failed to publish message: {0}")]
    PublishFailed(String),
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),
}

impl From<DomainError> for SagaError {
    fn from(error: DomainError) -> Self {
        SagaError::Arithmetic(error.to_string())
    }
}

/// 計算中のサーガが持つ途中結果
/// 状態ごとの操作で一方向にだけ進む
#[derive(Debug, Clone)]
pub struct DiscountContext {
    correlation_id: CorrelationId,
    request: DiscountRequest,
    state: SagaState,
    product_discount: Money,
    order_level_discount: Money,
    amount_after_order_discount: Money,
    coupon_discount: Money,
    amount_after_coupon_discount: Money,
    tier_discount: Money,
    breakdown: Vec<BreakdownEntry>,
    started_at: Instant,
}

impl DiscountContext {
    /// 相関IDが設定済みの依頼からコンテキストを作成
    pub fn new(correlation_id: CorrelationId, request: DiscountRequest) -> Self {
        let subtotal = request.subtotal;
        Self {
            correlation_id,
            request,
            state: SagaState::Initiated,
            product_discount: Money::zero(),
            order_level_discount: Money::zero(),
            amount_after_order_discount: subtotal,
            coupon_discount: Money::zero(),
            amount_after_coupon_discount: subtotal,
            tier_discount: Money::zero(),
            breakdown: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn request(&self) -> &DiscountRequest {
        &self.request
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn amount_after_order_discount(&self) -> Money {
        self.amount_after_order_discount
    }

    pub fn amount_after_coupon_discount(&self) -> Money {
        self.amount_after_coupon_discount
    }

    pub fn breakdown(&self) -> &[BreakdownEntry] {
        &self.breakdown
    }

    /// 注文側で計算した割引を取り込む
    pub fn apply_local(&mut self, local: LocalDiscounts) -> Result<(), SagaError> {
        self.expect_state(SagaState::Initiated)?;

        let local_total = local.product_discount.add(&local.order_level_discount)?;
        self.product_discount = local.product_discount;
        self.order_level_discount = local.order_level_discount;
        self.amount_after_order_discount = self.request.subtotal.saturating_sub(&local_total);
        self.amount_after_coupon_discount = self.amount_after_order_discount;
        self.breakdown.extend(local.breakdown);
        Ok(())
    }

    /// クーポン検証の依頼を作り、応答待ちに進む
    pub fn request_coupon(&mut self) -> Result<CouponValidationRequest, SagaError> {
        self.expect_state(SagaState::Initiated)?;

        self.state = SagaState::AwaitingCoupon;
        Ok(CouponValidationRequest {
            correlation_id: self.correlation_id,
            user_id: self.request.user_id,
            coupon_codes: self.request.coupon_codes.clone(),
            amount: self.amount_after_order_discount,
        })
    }

    /// クーポンがない場合にクーポン検証を飛ばして会員ランク割引に進む
    pub fn skip_coupon(&mut self) -> Result<TierDiscountRequest, SagaError> {
        self.expect_state(SagaState::Initiated)?;

        self.state = SagaState::AwaitingTier;
        Ok(self.tier_request())
    }

    /// クーポン検証の結果を記録し、会員ランク割引の依頼を作る
    pub fn record_coupon(
        &mut self,
        response: &CouponValidationResponse,
    ) -> Result<TierDiscountRequest, SagaError> {
        self.expect_state(SagaState::AwaitingCoupon)?;
        if !response.success {
            return Err(SagaError::RemoteError(
                response
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "coupon validation failed".to_string()),
            ));
        }

        let coupon_discount = response
            .applied_coupons
            .iter()
            .try_fold(Money::zero(), |acc, c| acc.add(&c.discount))?;
        if coupon_discount > self.amount_after_order_discount {
            return Err(SagaError::RemoteError(format!(
                "coupon discount {} exceeds amount {}",
                coupon_discount, self.amount_after_order_discount
            )));
        }

        self.coupon_discount = coupon_discount;
        self.amount_after_coupon_discount =
            self.amount_after_order_discount.saturating_sub(&coupon_discount);
        self.breakdown.extend(
            response
                .applied_coupons
                .iter()
                .filter(|c| !c.discount.is_zero())
                .map(|c| BreakdownEntry::new(DiscountType::Coupon, c.code.clone(), c.discount)),
        );

        self.state = SagaState::AwaitingTier;
        Ok(self.tier_request())
    }

    /// 会員ランク割引の結果を記録し、最終結果を組み立てる
    pub fn complete(
        &mut self,
        response: &TierDiscountResponse,
    ) -> Result<DiscountResponse, SagaError> {
        self.expect_state(SagaState::AwaitingTier)?;
        if !response.success {
            return Err(SagaError::RemoteError(
                response
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "tier discount failed".to_string()),
            ));
        }
        if response.discount > self.amount_after_coupon_discount {
            return Err(SagaError::RemoteError(format!(
                "tier discount {} exceeds amount {}",
                response.discount, self.amount_after_coupon_discount
            )));
        }

        self.tier_discount = response.discount;
        if !response.discount.is_zero() {
            let source = response
                .tier
                .map(|tier| tier.to_string())
                .unwrap_or_else(|| "TIER".to_string());
            self.breakdown
                .push(BreakdownEntry::new(DiscountType::Tier, source, response.discount));
        }

        let total = self
            .product_discount
            .add(&self.order_level_discount)?
            .add(&self.coupon_discount)?
            .add(&self.tier_discount)?;
        let final_amount = self.request.subtotal.saturating_sub(&total);
        if total > self.request.subtotal {
            self.breakdown.push(BreakdownEntry::new(
                DiscountType::ClampAdjustment,
                CLAMP_ADJUSTMENT_SOURCE,
                Money::zero(),
            ));
        }

        self.state = SagaState::Completed;
        Ok(DiscountResponse {
            correlation_id: self.correlation_id,
            success: true,
            error_message: None,
            product_discount: self.product_discount,
            order_level_discount: self.order_level_discount,
            coupon_discount: self.coupon_discount,
            tier_discount: self.tier_discount,
            final_amount,
            breakdown: self.breakdown.clone(),
        })
    }

    /// 失敗状態にする（以降の応答は重複として扱われる）
    pub fn fail(&mut self) {
        self.state = SagaState::Failed;
    }

    fn tier_request(&self) -> TierDiscountRequest {
        TierDiscountRequest {
            correlation_id: self.correlation_id,
            user_id: self.request.user_id,
            amount: self.amount_after_coupon_discount,
        }
    }

    fn expect_state(&self, expected: SagaState) -> Result<(), SagaError> {
        if self.state != expected {
            return Err(SagaError::UnexpectedState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }
}
