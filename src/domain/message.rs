use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::model::{
    CorrelationId, CouponDiscountType, DiscountType, LineItem, MembershipTier, Money, Order,
    OrderId, ProductId, UserId,
};

/// 現在のメッセージスキーマバージョン
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// メッセージチャネルのトピック
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// 注文側 → ロイヤリティ側: クーポン検証依頼
    CouponValidationRequest,
    /// ロイヤリティ側 → 注文側: クーポン検証結果
    CouponValidationResponse,
    /// 注文側 → ロイヤリティ側: 会員ランク割引依頼
    TierDiscountRequest,
    /// ロイヤリティ側 → 注文側: 会員ランク割引結果
    TierDiscountResponse,
    /// 注文側 → ロイヤリティ側: クーポン利用通知（応答なし）
    CouponUsageNotification,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CouponValidationRequest => "coupon-validation-request",
            Topic::CouponValidationResponse => "coupon-validation-response",
            Topic::TierDiscountRequest => "tier-discount-request",
            Topic::TierDiscountResponse => "tier-discount-response",
            Topic::CouponUsageNotification => "coupon-usage-notification",
        }
    }

    /// 文字列からTopicを作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "coupon-validation-request" => Ok(Topic::CouponValidationRequest),
            "coupon-validation-response" => Ok(Topic::CouponValidationResponse),
            "tier-discount-request" => Ok(Topic::TierDiscountRequest),
            "tier-discount-response" => Ok(Topic::TierDiscountResponse),
            "coupon-usage-notification" => Ok(Topic::CouponUsageNotification),
            _ => Err(DomainError::InvalidValue(format!("無効なトピック: {}", s))),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// メッセージのメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// メッセージごとの一意なID
    pub message_id: Uuid,
    /// 発行日時
    pub published_at: DateTime<Utc>,
    /// ペイロードのスキーマバージョン
    pub schema_version: u32,
}

impl MessageMetadata {
    pub fn new() -> Self {
        Self {
            message_id: Uuid::new_v4(),
            published_at: Utc::now(),
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }
}

impl Default for MessageMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// チャネル上を流れるメッセージの封筒
/// キーは相関IDで、同じキーのメッセージは同じパーティションに入る
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub metadata: MessageMetadata,
    pub topic: Topic,
    pub key: CorrelationId,
    /// JSONにシリアライズされたペイロード
    pub payload: String,
}

/// チャネルで送受信できるメッセージ
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 発行先のトピック
    const TOPIC: Topic;
    /// ログとエラーに使う型名
    const TYPE_NAME: &'static str;
}

/// 割引計算で使う明細
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountLineItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub per_item_discount: Money,
}

impl From<&LineItem> for DiscountLineItem {
    fn from(item: &LineItem) -> Self {
        Self {
            product_id: item.product_id(),
            quantity: item.quantity(),
            unit_price: item.unit_price(),
            per_item_discount: item.per_item_discount(),
        }
    }
}

/// 割引計算の依頼
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountRequest {
    /// 未設定なら計算開始時に採番される
    pub correlation_id: Option<CorrelationId>,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub items: Vec<DiscountLineItem>,
    pub subtotal: Money,
    pub total_items: u32,
    pub coupon_codes: Vec<String>,
}

impl DiscountRequest {
    /// 注文から割引計算の依頼を作成
    pub fn from_order(order: &Order) -> Self {
        Self {
            correlation_id: None,
            order_id: order.id(),
            user_id: order.user_id(),
            items: order.line_items().iter().map(DiscountLineItem::from).collect(),
            subtotal: order.subtotal(),
            total_items: order.total_items(),
            coupon_codes: order.coupon_codes().to_vec(),
        }
    }

    /// 相関IDを返す（未設定なら新規に採番して設定する）
    pub fn ensure_correlation_id(&mut self) -> CorrelationId {
        *self.correlation_id.get_or_insert_with(CorrelationId::new)
    }
}

/// 割引内訳の1行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownEntry {
    pub discount_type: DiscountType,
    /// ルール名、クーポンコード、ランク名など
    pub source: String,
    pub amount: Money,
}

impl BreakdownEntry {
    pub fn new(discount_type: DiscountType, source: impl Into<String>, amount: Money) -> Self {
        Self {
            discount_type,
            source: source.into(),
            amount,
        }
    }
}

/// 割引計算の結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountResponse {
    pub correlation_id: CorrelationId,
    pub success: bool,
    pub error_message: Option<String>,
    pub product_discount: Money,
    pub order_level_discount: Money,
    pub coupon_discount: Money,
    pub tier_discount: Money,
    pub final_amount: Money,
    pub breakdown: Vec<BreakdownEntry>,
}

impl DiscountResponse {
    /// 失敗した結果を作成（金額はすべて0）
    pub fn failure(correlation_id: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            correlation_id,
            success: false,
            error_message: Some(message.into()),
            product_discount: Money::zero(),
            order_level_discount: Money::zero(),
            coupon_discount: Money::zero(),
            tier_discount: Money::zero(),
            final_amount: Money::zero(),
            breakdown: Vec::new(),
        }
    }
}

/// クーポン検証依頼
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidationRequest {
    pub correlation_id: CorrelationId,
    pub user_id: UserId,
    pub coupon_codes: Vec<String>,
    /// 注文レベル割引適用後の金額
    pub amount: Money,
}

impl Message for CouponValidationRequest {
    const TOPIC: Topic = Topic::CouponValidationRequest;
    const TYPE_NAME: &'static str = "CouponValidationRequest";
}

/// 適用されたクーポン1件分の結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub code: String,
    pub discount_type: CouponDiscountType,
    pub discount: Money,
}

/// クーポン検証結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidationResponse {
    pub correlation_id: CorrelationId,
    pub success: bool,
    pub error_message: Option<String>,
    pub applied_coupons: Vec<AppliedCoupon>,
    pub total_discount: Money,
    /// 適用できなかったコードごとの理由
    pub errors: Vec<String>,
}

impl CouponValidationResponse {
    pub fn failure(correlation_id: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            correlation_id,
            success: false,
            error_message: Some(message.into()),
            applied_coupons: Vec::new(),
            total_discount: Money::zero(),
            errors: Vec::new(),
        }
    }
}

impl Message for CouponValidationResponse {
    const TOPIC: Topic = Topic::CouponValidationResponse;
    const TYPE_NAME: &'static str = "CouponValidationResponse";
}

/// 会員ランク割引依頼
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierDiscountRequest {
    pub correlation_id: CorrelationId,
    pub user_id: UserId,
    /// クーポン割引適用後の金額
    pub amount: Money,
}

impl Message for TierDiscountRequest {
    const TOPIC: Topic = Topic::TierDiscountRequest;
    const TYPE_NAME: &'static str = "TierDiscountRequest";
}

/// 会員ランク割引結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierDiscountResponse {
    pub correlation_id: CorrelationId,
    pub success: bool,
    pub error_message: Option<String>,
    /// 会員情報がないユーザーはNone
    pub tier: Option<MembershipTier>,
    pub discount_percentage: Decimal,
    pub discount: Money,
}

impl TierDiscountResponse {
    pub fn failure(correlation_id: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            correlation_id,
            success: false,
            error_message: Some(message.into()),
            tier: None,
            discount_percentage: Decimal::ZERO,
            discount: Money::zero(),
        }
    }
}

impl Message for TierDiscountResponse {
    const TOPIC: Topic = Topic::TierDiscountResponse;
    const TYPE_NAME: &'static str = "TierDiscountResponse";
}

/// クーポン利用通知
/// 割引が適用された注文の保存後に送られ、応答は待たない
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponUsageNotification {
    pub coupon_codes: Vec<String>,
    pub user_id: UserId,
    pub order_id: OrderId,
    pub timestamp: DateTime<Utc>,
}

impl CouponUsageNotification {
    pub fn new(coupon_codes: Vec<String>, user_id: UserId, order_id: OrderId) -> Self {
        Self {
            coupon_codes,
            user_id,
            order_id,
            timestamp: Utc::now(),
        }
    }
}

impl Message for CouponUsageNotification {
    const TOPIC: Topic = Topic::CouponUsageNotification;
    const TYPE_NAME: &'static str = "CouponUsageNotification";
}
