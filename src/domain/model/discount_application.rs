use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::model::{CorrelationId, Money, OrderId};

/// 割引内訳の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// 商品ごとの値引き
    Product,
    /// 注文全体に対するルール割引
    OrderLevel,
    /// クーポン割引
    Coupon,
    /// 会員ランク割引
    Tier,
    /// 最終金額を0円に切り上げたことを示す印（金額は常に0）
    ClampAdjustment,
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscountType::Product => "PRODUCT",
            DiscountType::OrderLevel => "ORDER_LEVEL",
            DiscountType::Coupon => "COUPON",
            DiscountType::Tier => "TIER",
            DiscountType::ClampAdjustment => "CLAMP_ADJUSTMENT",
        };
        write!(f, "{}", s)
    }
}

impl DiscountType {
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "PRODUCT" => Ok(DiscountType::Product),
            "ORDER_LEVEL" => Ok(DiscountType::OrderLevel),
            "COUPON" => Ok(DiscountType::Coupon),
            "TIER" => Ok(DiscountType::Tier),
            "CLAMP_ADJUSTMENT" => Ok(DiscountType::ClampAdjustment),
            _ => Err(DomainError::InvalidValue(format!("無効な割引種別: {}", s))),
        }
    }
}

/// 割引適用の監査レコード
/// サーガ成功後に内訳1行につき1件作成され、以後変更されない
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountApplication {
    id: Uuid,
    order_id: OrderId,
    correlation_id: CorrelationId,
    discount_type: DiscountType,
    source: String,
    amount: Money,
    applied_at: DateTime<Utc>,
}

impl DiscountApplication {
    pub fn new(
        order_id: OrderId,
        correlation_id: CorrelationId,
        discount_type: DiscountType,
        source: String,
        amount: Money,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            correlation_id,
            discount_type,
            source,
            amount,
            applied_at: Utc::now(),
        }
    }

    /// データベースから取得したデータで再構築
    pub fn reconstruct(
        id: Uuid,
        order_id: OrderId,
        correlation_id: CorrelationId,
        discount_type: DiscountType,
        source: String,
        amount: Money,
        applied_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            correlation_id,
            discount_type,
            source,
            amount,
            applied_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn discount_type(&self) -> DiscountType {
        self.discount_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn applied_at(&self) -> DateTime<Utc> {
        self.applied_at
    }
}
