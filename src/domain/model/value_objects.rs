use crate::domain::error::DomainError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

/// 注文の一意識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// 新しい一意のOrderIdを生成
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// UUIDから OrderId を作成
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 文字列からOrderIdを作成
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        let uuid = Uuid::parse_str(s)?;
        Ok(Self(uuid))
    }

    /// 内部のUUIDを取得
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

/// 商品の一意識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(Uuid);

impl ProductId {
    /// 新しい一意のProductIdを生成
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// UUIDから ProductId を作成
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 文字列からProductIdを作成
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        let uuid = Uuid::parse_str(s)?;
        Ok(Self(uuid))
    }

    /// 内部のUUIDを取得
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

/// ユーザーの一意識別子
/// 注文側とロイヤリティ側で共有される
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// 新しい一意のUserIdを生成
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// UUIDから UserId を作成
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 文字列からUserIdを作成
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        let uuid = Uuid::parse_str(s)?;
        Ok(Self(uuid))
    }

    /// 内部のUUIDを取得
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

/// 相関ID
/// サーガの開始側が生成し、すべての応答メッセージで返される
/// メッセージのパーティションキーと応答の突き合わせキーを兼ねる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// 新しい一意の相関IDを生成
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// UUIDから CorrelationId を作成
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 文字列からCorrelationIdを作成
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        let uuid = Uuid::parse_str(s)?;
        Ok(Self(uuid))
    }

    /// 内部のUUIDを取得
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

/// 金額を表す値オブジェクト
/// 小数点以下2桁の正確な10進数で、負の値は持たない
/// デシリアライズ時も `Money::new` と同じ検証を通す
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money {
    amount: Decimal,
}

impl Money {
    /// 金額から作成
    /// 負の金額はエラー、小数点以下は2桁に丸める
    pub fn new(amount: Decimal) -> Result<Self, DomainError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::InvalidAmount(format!(
                "金額は0以上である必要があります: {}",
                amount
            )));
        }
        Ok(Self {
            amount: Self::round(amount),
        })
    }

    /// 0円
    pub fn zero() -> Self {
        Self {
            amount: Decimal::ZERO,
        }
    }

    /// 金額を取得
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// 金額を加算
    pub fn add(&self, other: &Money) -> Result<Money, DomainError> {
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(DomainError::ArithmeticOverflow)?;
        Ok(Money { amount })
    }

    /// 金額を減算（結果が負になる場合は0円）
    pub fn saturating_sub(&self, other: &Money) -> Money {
        if other.amount >= self.amount {
            Money::zero()
        } else {
            Money {
                amount: self.amount - other.amount,
            }
        }
    }

    /// 金額を乗算
    pub fn multiply(&self, factor: u32) -> Result<Money, DomainError> {
        let amount = self
            .amount
            .checked_mul(Decimal::from(factor))
            .ok_or(DomainError::ArithmeticOverflow)?;
        Ok(Money { amount })
    }

    /// パーセンテージ分の金額を計算
    ///
    /// # Arguments
    /// * `percent` - 百分率（10 なら 10%）
    pub fn percentage(&self, percent: Decimal) -> Result<Money, DomainError> {
        if percent.is_sign_negative() && !percent.is_zero() {
            return Err(DomainError::InvalidValue(format!(
                "割引率は0以上である必要があります: {}",
                percent
            )));
        }
        let amount = self
            .amount
            .checked_mul(percent)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .ok_or(DomainError::ArithmeticOverflow)?;
        Ok(Money {
            amount: Self::round(amount),
        })
    }

    /// 小さい方の金額を返す
    pub fn min(self, other: Money) -> Money {
        if self.amount <= other.amount {
            self
        } else {
            other
        }
    }

    fn round(amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.amount)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Money::new(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.amount
    }
}

/// 注文明細を表す値オブジェクト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    product_id: ProductId,
    quantity: u32,
    unit_price: Money,
    per_item_discount: Money,
}

impl LineItem {
    /// 新しい注文明細を作成
    /// 数量は1以上、1個あたりの値引きは単価以下である必要がある
    pub fn new(
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
        per_item_discount: Money,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity);
        }
        if per_item_discount > unit_price {
            return Err(DomainError::InvalidAmount(format!(
                "商品値引き {} が単価 {} を超えています",
                per_item_discount, unit_price
            )));
        }
        Ok(Self {
            product_id,
            quantity,
            unit_price,
            per_item_discount,
        })
    }

    /// 商品IDを取得
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// 数量を取得
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// 単価を取得
    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    /// 1個あたりの商品値引きを取得
    pub fn per_item_discount(&self) -> Money {
        self.per_item_discount
    }

    /// 小計を計算（単価 × 数量）
    pub fn subtotal(&self) -> Result<Money, DomainError> {
        self.unit_price.multiply(self.quantity)
    }

    /// 明細全体の商品値引き（1個あたりの値引き × 数量）
    pub fn discount_total(&self) -> Result<Money, DomainError> {
        self.per_item_discount.multiply(self.quantity)
    }
}

/// 注文のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// 保留中（作成直後）
    Pending,
    /// 確定済み
    Confirmed,
    /// キャンセル済み
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", s)
    }
}

impl OrderStatus {
    /// 文字列からOrderStatusを作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Confirmed" => Ok(OrderStatus::Confirmed),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(DomainError::InvalidValue(format!(
                "無効な注文ステータス: {}",
                s
            ))),
        }
    }
}

/// 注文に対する割引計算の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountStatus {
    /// 割引計算前
    NotCalculated,
    /// サーガが成功し割引が適用された
    Applied,
    /// タイムアウトまたは失敗のため割引なしで確定した
    Skipped,
}

impl fmt::Display for DiscountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscountStatus::NotCalculated => "NotCalculated",
            DiscountStatus::Applied => "Applied",
            DiscountStatus::Skipped => "Skipped",
        };
        write!(f, "{}", s)
    }
}

impl DiscountStatus {
    /// 文字列からDiscountStatusを作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "NotCalculated" => Ok(DiscountStatus::NotCalculated),
            "Applied" => Ok(DiscountStatus::Applied),
            "Skipped" => Ok(DiscountStatus::Skipped),
            _ => Err(DomainError::InvalidValue(format!(
                "無効な割引ステータス: {}",
                s
            ))),
        }
    }
}
