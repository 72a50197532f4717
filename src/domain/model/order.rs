use chrono::{DateTime, Utc};

use crate::domain::error::DomainError;
use crate::domain::message::{CouponUsageNotification, DiscountResponse};
use crate::domain::model::{
    DiscountStatus, DiscountType, LineItem, Money, OrderId, OrderStatus, UserId,
};

/// 注文に記録された割引額の内訳
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderDiscounts {
    pub product_discount: Money,
    pub order_level_discount: Money,
    pub coupon_discount: Money,
    pub tier_discount: Money,
}

impl OrderDiscounts {
    /// 割引額の合計
    pub fn total(&self) -> Result<Money, DomainError> {
        self.product_discount
            .add(&self.order_level_discount)?
            .add(&self.coupon_discount)?
            .add(&self.tier_discount)
    }
}

/// Order集約
/// 注文の作成、割引の適用、確定とキャンセルを管理する
#[derive(Debug, Clone)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    line_items: Vec<LineItem>,
    coupon_codes: Vec<String>,
    subtotal: Money,
    discounts: OrderDiscounts,
    final_amount: Money,
    status: OrderStatus,
    discount_status: DiscountStatus,
    created_at: DateTime<Utc>,
    coupon_notifications: Vec<CouponUsageNotification>,
}

impl Order {
    /// 新しい注文を作成
    /// 初期ステータスはPending、割引は未計算
    pub fn new(
        id: OrderId,
        user_id: UserId,
        line_items: Vec<LineItem>,
        coupon_codes: Vec<String>,
    ) -> Result<Self, DomainError> {
        if line_items.is_empty() {
            return Err(DomainError::OrderValidation(
                "注文明細が空です。少なくとも1つの商品を追加してください".to_string(),
            ));
        }

        let subtotal = line_items
            .iter()
            .try_fold(Money::zero(), |acc, item| acc.add(&item.subtotal()?))?;

        // 空のコードを除き、正規化した上で重複を取り除く
        let mut normalized: Vec<String> = Vec::new();
        for code in coupon_codes {
            let code = code.trim().to_uppercase();
            if !code.is_empty() && !normalized.contains(&code) {
                normalized.push(code);
            }
        }

        Ok(Self {
            id,
            user_id,
            line_items,
            coupon_codes: normalized,
            subtotal,
            discounts: OrderDiscounts::default(),
            final_amount: subtotal,
            status: OrderStatus::Pending,
            discount_status: DiscountStatus::NotCalculated,
            created_at: Utc::now(),
            coupon_notifications: Vec::new(),
        })
    }

    /// データベースから取得したデータで注文を再構築
    /// リポジトリでの使用を想定
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        id: OrderId,
        user_id: UserId,
        line_items: Vec<LineItem>,
        coupon_codes: Vec<String>,
        subtotal: Money,
        discounts: OrderDiscounts,
        final_amount: Money,
        status: OrderStatus,
        discount_status: DiscountStatus,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if final_amount > subtotal {
            return Err(DomainError::OrderValidation(format!(
                "最終金額 {} が小計 {} を超えています",
                final_amount, subtotal
            )));
        }
        Ok(Self {
            id,
            user_id,
            line_items,
            coupon_codes,
            subtotal,
            discounts,
            final_amount,
            status,
            discount_status,
            created_at,
            coupon_notifications: Vec::new(),
        })
    }

    /// 注文IDを取得
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// ユーザーIDを取得
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// 注文明細のリストを取得
    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    /// 正規化済みのクーポンコードを取得
    pub fn coupon_codes(&self) -> &[String] {
        &self.coupon_codes
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn discounts(&self) -> OrderDiscounts {
        self.discounts
    }

    pub fn final_amount(&self) -> Money {
        self.final_amount
    }

    /// 注文ステータスを取得
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn discount_status(&self) -> DiscountStatus {
        self.discount_status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 商品点数の合計
    pub fn total_items(&self) -> u32 {
        self.line_items
            .iter()
            .fold(0u32, |acc, item| acc.saturating_add(item.quantity()))
    }

    /// 割引額の合計
    pub fn total_discount(&self) -> Result<Money, DomainError> {
        self.discounts.total()
    }

    /// 発行待ちのクーポン利用通知を取得してクリア
    pub fn take_coupon_notifications(&mut self) -> Vec<CouponUsageNotification> {
        std::mem::take(&mut self.coupon_notifications)
    }

    /// サーガの結果を注文に適用
    /// 事前条件:
    /// - ステータスがPending
    /// - 割引が未計算
    /// - 結果が成功で、内訳と最終金額が小計と整合している
    pub fn apply_discount(&mut self, response: &DiscountResponse) -> Result<(), DomainError> {
        self.ensure_discount_not_calculated()?;

        if !response.success {
            return Err(DomainError::DiscountMismatch(format!(
                "失敗した割引結果は適用できません: {}",
                response.error_message.as_deref().unwrap_or("unknown error")
            )));
        }

        let discounts = OrderDiscounts {
            product_discount: response.product_discount,
            order_level_discount: response.order_level_discount,
            coupon_discount: response.coupon_discount,
            tier_discount: response.tier_discount,
        };
        let total = discounts.total()?;

        // 内訳の合計は各割引額の合計と一致しなければならない
        let breakdown_total = response
            .breakdown
            .iter()
            .try_fold(Money::zero(), |acc, entry| acc.add(&entry.amount))?;
        if breakdown_total != total {
            return Err(DomainError::DiscountMismatch(format!(
                "内訳の合計 {} が割引合計 {} と一致しません",
                breakdown_total, total
            )));
        }

        let expected_final = self.subtotal.saturating_sub(&total);
        if response.final_amount != expected_final {
            return Err(DomainError::DiscountMismatch(format!(
                "最終金額 {} が期待値 {} と一致しません",
                response.final_amount, expected_final
            )));
        }

        self.discounts = discounts;
        self.final_amount = expected_final;
        self.discount_status = DiscountStatus::Applied;

        // 実際に割引に使われたクーポンだけを利用通知の対象にする
        if !discounts.coupon_discount.is_zero() {
            let redeemed: Vec<String> = response
                .breakdown
                .iter()
                .filter(|entry| entry.discount_type == DiscountType::Coupon)
                .map(|entry| entry.source.clone())
                .collect();
            if !redeemed.is_empty() {
                self.coupon_notifications.push(CouponUsageNotification::new(
                    redeemed,
                    self.user_id,
                    self.id,
                ));
            }
        }

        Ok(())
    }

    /// 割引なしで金額を確定する
    /// サーガがタイムアウトまたは失敗した場合に使う
    pub fn skip_discount(&mut self) -> Result<(), DomainError> {
        self.ensure_discount_not_calculated()?;

        self.discounts = OrderDiscounts::default();
        self.final_amount = self.subtotal;
        self.discount_status = DiscountStatus::Skipped;

        Ok(())
    }

    /// 注文を確定
    /// 事前条件:
    /// - ステータスがPending
    /// - 割引が適用済みまたはスキップ済み
    pub fn confirm(&mut self) -> Result<(), DomainError> {
        if self.status != OrderStatus::Pending {
            return Err(DomainError::InvalidOrderState(
                "注文を確定できるのはPending状態のみです".to_string(),
            ));
        }

        if self.discount_status == DiscountStatus::NotCalculated {
            return Err(DomainError::InvalidOrderState(
                "割引が計算されていない注文は確定できません".to_string(),
            ));
        }

        self.status = OrderStatus::Confirmed;
        Ok(())
    }

    /// 注文をキャンセル
    /// 事前条件:
    /// - ステータスがPendingまたはConfirmed
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        match self.status {
            OrderStatus::Pending | OrderStatus::Confirmed => {
                self.status = OrderStatus::Cancelled;
                Ok(())
            }
            OrderStatus::Cancelled => Err(DomainError::InvalidOrderState(
                "既にキャンセル済みの注文です".to_string(),
            )),
        }
    }

    fn ensure_discount_not_calculated(&self) -> Result<(), DomainError> {
        if self.status != OrderStatus::Pending {
            return Err(DomainError::InvalidOrderState(
                "割引を適用できるのはPending状態のみです".to_string(),
            ));
        }
        if self.discount_status != DiscountStatus::NotCalculated {
            return Err(DomainError::InvalidOrderState(format!(
                "割引は既に確定しています: {}",
                self.discount_status
            )));
        }
        Ok(())
    }
}
