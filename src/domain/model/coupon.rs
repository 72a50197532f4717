use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::DomainError;
use crate::domain::model::{CorrelationId, Money, OrderId, UserId};

/// クーポンの割引種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponDiscountType {
    /// 対象金額に対する百分率
    Percentage,
    /// 固定額
    Fixed,
}

impl fmt::Display for CouponDiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CouponDiscountType::Percentage => "PERCENTAGE",
            CouponDiscountType::Fixed => "FIXED",
        };
        write!(f, "{}", s)
    }
}

impl CouponDiscountType {
    /// 文字列からCouponDiscountTypeを作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "PERCENTAGE" => Ok(CouponDiscountType::Percentage),
            "FIXED" => Ok(CouponDiscountType::Fixed),
            _ => Err(DomainError::InvalidValue(format!(
                "無効なクーポン割引種別: {}",
                s
            ))),
        }
    }
}

/// クーポンが適用できない理由
#[derive(Debug, Clone, PartialEq)]
pub enum CouponRejection {
    NotFound,
    Inactive,
    NotYetValid,
    Expired,
    MinimumPurchaseNotMet { required: Money },
    UserUsageLimitReached,
    TotalUsageLimitReached,
    /// 先に適用したクーポンで対象金額を使い切った
    NothingLeftToDiscount,
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouponRejection::NotFound => write!(f, "coupon not found"),
            CouponRejection::Inactive => write!(f, "coupon is inactive"),
            CouponRejection::NotYetValid => write!(f, "coupon is not yet valid"),
            CouponRejection::Expired => write!(f, "coupon has expired"),
            CouponRejection::MinimumPurchaseNotMet { required } => {
                write!(f, "minimum purchase of {} not met", required)
            }
            CouponRejection::UserUsageLimitReached => {
                write!(f, "usage limit for this user has been reached")
            }
            CouponRejection::TotalUsageLimitReached => {
                write!(f, "total usage limit has been reached")
            }
            CouponRejection::NothingLeftToDiscount => {
                write!(f, "no remaining amount to discount")
            }
        }
    }
}

/// 予約の試行結果
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationOutcome {
    /// 新しく予約した
    Reserved,
    /// 同じ相関IDの予約が既にある
    AlreadyReserved,
    /// 利用上限により予約できない
    Rejected(CouponRejection),
}

/// クーポン集約（ロイヤリティ側）
#[derive(Debug, Clone, PartialEq)]
pub struct Coupon {
    code: String,
    discount_type: CouponDiscountType,
    value: Decimal,
    max_discount_amount: Option<Money>,
    min_purchase_amount: Option<Money>,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
    usage_limit_per_user: Option<u32>,
    total_usage_limit: Option<u32>,
    active: bool,
}

impl Coupon {
    /// 新しいクーポンを作成
    /// 期限・上限・最低購入額なしの有効なクーポンになる
    pub fn new(
        code: String,
        discount_type: CouponDiscountType,
        value: Decimal,
    ) -> Result<Self, DomainError> {
        let code = Self::normalize_code(&code);
        if code.is_empty() {
            return Err(DomainError::InvalidValue(
                "クーポンコードは空にできません".to_string(),
            ));
        }
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidValue(format!(
                "クーポンの割引値は正である必要があります: {}",
                value
            )));
        }
        if discount_type == CouponDiscountType::Percentage && value > Decimal::ONE_HUNDRED {
            return Err(DomainError::InvalidValue(format!(
                "割引率は100%以下である必要があります: {}",
                value
            )));
        }
        Ok(Self {
            code,
            discount_type,
            value,
            max_discount_amount: None,
            min_purchase_amount: None,
            valid_from: DateTime::<Utc>::default(),
            valid_until: None,
            usage_limit_per_user: None,
            total_usage_limit: None,
            active: true,
        })
    }

    /// データベースから取得したデータでクーポンを再構築
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        code: String,
        discount_type: CouponDiscountType,
        value: Decimal,
        max_discount_amount: Option<Money>,
        min_purchase_amount: Option<Money>,
        valid_from: DateTime<Utc>,
        valid_until: Option<DateTime<Utc>>,
        usage_limit_per_user: Option<u32>,
        total_usage_limit: Option<u32>,
        active: bool,
    ) -> Self {
        Self {
            code,
            discount_type,
            value,
            max_discount_amount,
            min_purchase_amount,
            valid_from,
            valid_until,
            usage_limit_per_user,
            total_usage_limit,
            active,
        }
    }

    pub fn with_max_discount(mut self, max_discount_amount: Money) -> Self {
        self.max_discount_amount = Some(max_discount_amount);
        self
    }

    pub fn with_min_purchase(mut self, min_purchase_amount: Money) -> Self {
        self.min_purchase_amount = Some(min_purchase_amount);
        self
    }

    pub fn with_validity(
        mut self,
        valid_from: DateTime<Utc>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_until = valid_until;
        self
    }

    pub fn with_usage_limit_per_user(mut self, limit: u32) -> Self {
        self.usage_limit_per_user = Some(limit);
        self
    }

    pub fn with_total_usage_limit(mut self, limit: u32) -> Self {
        self.total_usage_limit = Some(limit);
        self
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// クーポンコードの正規化（前後の空白除去、大文字化）
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn discount_type(&self) -> CouponDiscountType {
        self.discount_type
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn max_discount_amount(&self) -> Option<Money> {
        self.max_discount_amount
    }

    pub fn min_purchase_amount(&self) -> Option<Money> {
        self.min_purchase_amount
    }

    pub fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.valid_until
    }

    pub fn usage_limit_per_user(&self) -> Option<u32> {
        self.usage_limit_per_user
    }

    pub fn total_usage_limit(&self) -> Option<u32> {
        self.total_usage_limit
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 有効状態・有効期間・最低購入金額を検証する
    /// 利用上限は予約時に reservation_outcome で判定する
    pub fn check_terms(&self, amount: Money, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        if !self.active {
            return Err(CouponRejection::Inactive);
        }
        if now < self.valid_from {
            return Err(CouponRejection::NotYetValid);
        }
        if let Some(valid_until) = self.valid_until {
            if now > valid_until {
                return Err(CouponRejection::Expired);
            }
        }
        if let Some(required) = self.min_purchase_amount {
            if amount < required {
                return Err(CouponRejection::MinimumPurchaseNotMet { required });
            }
        }
        Ok(())
    }

    /// 利用回数の上限を検証する
    pub fn check_limits(&self, user_usages: u32, total_usages: u32) -> Result<(), CouponRejection> {
        if let Some(limit) = self.usage_limit_per_user {
            if user_usages >= limit {
                return Err(CouponRejection::UserUsageLimitReached);
            }
        }
        if let Some(limit) = self.total_usage_limit {
            if total_usages >= limit {
                return Err(CouponRejection::TotalUsageLimitReached);
            }
        }
        Ok(())
    }

    /// 既存の利用記録に対して予約を取れるか判定する
    ///
    /// 同じ相関IDの記録があれば再配信として扱い、上限は数え直さない。
    /// リポジトリはこの判定と予約の書き込みを不可分に行うこと。
    pub fn reservation_outcome(
        &self,
        usages: &[CouponUsage],
        candidate: &CouponUsage,
    ) -> ReservationOutcome {
        let mut user_usages = 0u32;
        let mut total_usages = 0u32;
        for usage in usages.iter().filter(|u| u.coupon_code() == self.code) {
            if usage.correlation_id() == candidate.correlation_id() {
                return ReservationOutcome::AlreadyReserved;
            }
            total_usages += 1;
            if usage.user_id() == candidate.user_id() {
                user_usages += 1;
            }
        }
        match self.check_limits(user_usages, total_usages) {
            Ok(()) => ReservationOutcome::Reserved,
            Err(rejection) => ReservationOutcome::Rejected(rejection),
        }
    }

    /// 割引額を計算する
    /// 上限額が設定されていれば上限で打ち切り、対象金額を超えることはない
    pub fn calculate_discount(&self, amount: Money) -> Result<Money, DomainError> {
        let raw = match self.discount_type {
            CouponDiscountType::Percentage => amount.percentage(self.value)?,
            CouponDiscountType::Fixed => Money::new(self.value)?,
        };
        let capped = match self.max_discount_amount {
            Some(max) => raw.min(max),
            None => raw,
        };
        Ok(capped.min(amount))
    }
}

/// クーポン利用状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponUsageStatus {
    /// 検証時に確保された（注文の確定待ち）
    Reserved,
    /// 利用通知を受けて使用済みになった
    Used,
}

impl fmt::Display for CouponUsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CouponUsageStatus::Reserved => "RESERVED",
            CouponUsageStatus::Used => "USED",
        };
        write!(f, "{}", s)
    }
}

impl CouponUsageStatus {
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "RESERVED" => Ok(CouponUsageStatus::Reserved),
            "USED" => Ok(CouponUsageStatus::Used),
            _ => Err(DomainError::InvalidValue(format!(
                "無効なクーポン利用状態: {}",
                s
            ))),
        }
    }
}

/// クーポン利用記録
/// クーポンコードと相関IDの組につき1件
#[derive(Debug, Clone, PartialEq)]
pub struct CouponUsage {
    coupon_code: String,
    user_id: UserId,
    correlation_id: CorrelationId,
    order_id: Option<OrderId>,
    status: CouponUsageStatus,
    recorded_at: DateTime<Utc>,
}

impl CouponUsage {
    /// 検証成功時の予約を作成
    pub fn reserve(coupon_code: String, user_id: UserId, correlation_id: CorrelationId) -> Self {
        Self {
            coupon_code,
            user_id,
            correlation_id,
            order_id: None,
            status: CouponUsageStatus::Reserved,
            recorded_at: Utc::now(),
        }
    }

    /// 予約なしで使用済みの記録を作成
    pub fn used(
        coupon_code: String,
        user_id: UserId,
        correlation_id: CorrelationId,
        order_id: OrderId,
    ) -> Self {
        Self {
            coupon_code,
            user_id,
            correlation_id,
            order_id: Some(order_id),
            status: CouponUsageStatus::Used,
            recorded_at: Utc::now(),
        }
    }

    pub fn reconstruct(
        coupon_code: String,
        user_id: UserId,
        correlation_id: CorrelationId,
        order_id: Option<OrderId>,
        status: CouponUsageStatus,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            coupon_code,
            user_id,
            correlation_id,
            order_id,
            status,
            recorded_at,
        }
    }

    /// 使用済みにする
    /// 既に使用済みなら何もせず false を返す
    pub fn mark_used(&mut self, order_id: OrderId) -> bool {
        if self.status == CouponUsageStatus::Used {
            return false;
        }
        self.status = CouponUsageStatus::Used;
        self.order_id = Some(order_id);
        self.recorded_at = Utc::now();
        true
    }

    pub fn coupon_code(&self) -> &str {
        &self.coupon_code
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn status(&self) -> CouponUsageStatus {
        self.status
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn money(value: Decimal) -> Money {
        Money::new(value).unwrap()
    }

    #[test]
    fn test_percentage_coupon_is_capped() {
        let coupon = Coupon::new("save10".to_string(), CouponDiscountType::Percentage, dec!(10))
            .unwrap()
            .with_max_discount(money(dec!(15.00)));

        assert_eq!(coupon.code(), "SAVE10");
        assert_eq!(
            coupon.calculate_discount(money(dec!(90.00))).unwrap(),
            money(dec!(9.00))
        );
        assert_eq!(
            coupon.calculate_discount(money(dec!(400.00))).unwrap(),
            money(dec!(15.00))
        );
    }

    #[test]
    fn test_fixed_coupon_never_exceeds_amount() {
        let coupon = Coupon::new("FIVE".to_string(), CouponDiscountType::Fixed, dec!(5)).unwrap();

        assert_eq!(
            coupon.calculate_discount(money(dec!(3.00))).unwrap(),
            money(dec!(3.00))
        );
    }

    #[test]
    fn test_invalid_coupon_values_are_rejected() {
        assert!(Coupon::new("X".to_string(), CouponDiscountType::Fixed, dec!(0)).is_err());
        assert!(Coupon::new("X".to_string(), CouponDiscountType::Percentage, dec!(101)).is_err());
        assert!(Coupon::new("  ".to_string(), CouponDiscountType::Fixed, dec!(1)).is_err());
    }

    #[test]
    fn test_check_terms_and_limits() {
        let now = Utc::now();
        let coupon = Coupon::new("RULES".to_string(), CouponDiscountType::Fixed, dec!(5))
            .unwrap()
            .with_min_purchase(money(dec!(50.00)))
            .with_validity(now - Duration::days(1), Some(now + Duration::days(1)))
            .with_usage_limit_per_user(1)
            .with_total_usage_limit(10);

        assert!(coupon.check_terms(money(dec!(60.00)), now).is_ok());
        assert_eq!(
            coupon.check_terms(money(dec!(40.00)), now),
            Err(CouponRejection::MinimumPurchaseNotMet {
                required: money(dec!(50.00))
            })
        );
        assert_eq!(
            coupon.check_terms(money(dec!(60.00)), now + Duration::days(2)),
            Err(CouponRejection::Expired)
        );
        assert_eq!(
            coupon.check_terms(money(dec!(60.00)), now - Duration::days(2)),
            Err(CouponRejection::NotYetValid)
        );
        assert!(coupon.check_limits(0, 9).is_ok());
        assert_eq!(
            coupon.check_limits(1, 1),
            Err(CouponRejection::UserUsageLimitReached)
        );
        assert_eq!(
            coupon.check_limits(0, 10),
            Err(CouponRejection::TotalUsageLimitReached)
        );
    }

    #[test]
    fn test_inactive_coupon_is_rejected() {
        let mut coupon =
            Coupon::new("OFF".to_string(), CouponDiscountType::Fixed, dec!(5)).unwrap();
        coupon.deactivate();

        assert_eq!(
            coupon.check_terms(money(dec!(60.00)), Utc::now()),
            Err(CouponRejection::Inactive)
        );
    }

    #[test]
    fn test_reservation_outcome_counts_other_sagas_only() {
        let coupon = Coupon::new("ONCE".to_string(), CouponDiscountType::Fixed, dec!(5))
            .unwrap()
            .with_usage_limit_per_user(1)
            .with_total_usage_limit(2);
        let user = UserId::new();
        let first = CouponUsage::reserve("ONCE".to_string(), user, CorrelationId::new());
        let unrelated = CouponUsage::reserve("OTHER".to_string(), user, CorrelationId::new());

        assert_eq!(
            coupon.reservation_outcome(&[unrelated.clone()], &first),
            ReservationOutcome::Reserved
        );
        assert_eq!(
            coupon.reservation_outcome(&[first.clone()], &first),
            ReservationOutcome::AlreadyReserved
        );

        let second = CouponUsage::reserve("ONCE".to_string(), user, CorrelationId::new());
        assert_eq!(
            coupon.reservation_outcome(&[first.clone(), unrelated], &second),
            ReservationOutcome::Rejected(CouponRejection::UserUsageLimitReached)
        );

        let stranger = CouponUsage::reserve("ONCE".to_string(), UserId::new(), CorrelationId::new());
        let another = CouponUsage::reserve("ONCE".to_string(), UserId::new(), CorrelationId::new());
        assert_eq!(
            coupon.reservation_outcome(&[first, stranger], &another),
            ReservationOutcome::Rejected(CouponRejection::TotalUsageLimitReached)
        );
    }

    #[test]
    fn test_mark_used_is_idempotent() {
        let mut usage =
            CouponUsage::reserve("SAVE10".to_string(), UserId::new(), CorrelationId::new());
        let order_id = OrderId::new();

        assert!(usage.mark_used(order_id));
        assert!(!usage.mark_used(OrderId::new()));
        assert_eq!(usage.status(), CouponUsageStatus::Used);
        assert_eq!(usage.order_id(), Some(order_id));
    }
}
