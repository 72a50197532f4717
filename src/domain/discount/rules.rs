use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::error::DomainError;
use crate::domain::message::{BreakdownEntry, DiscountRequest};
use crate::domain::model::{DiscountType, Money};

/// 商品値引きの内訳に使う名前
pub const PRODUCT_DISCOUNT_SOURCE: &str = "PRODUCT_DISCOUNT";

/// 注文レベルの割引ルール
#[derive(Debug, Clone, PartialEq)]
pub enum OrderDiscountRule {
    /// 商品点数が閾値以上なら固定額を値引き
    BulkQuantity { min_items: u32, discount: Money },
    /// 小計が閾値以上なら固定額を値引き
    MinimumPurchase { threshold: Money, discount: Money },
    /// 小計が閾値以上なら小計の一定割合を値引き（上限あり）
    LargeOrder {
        threshold: Money,
        percent: Decimal,
        cap: Money,
    },
}

impl OrderDiscountRule {
    /// 内訳に記録するルール名
    pub fn name(&self) -> &'static str {
        match self {
            OrderDiscountRule::BulkQuantity { .. } => "BULK_QUANTITY",
            OrderDiscountRule::MinimumPurchase { .. } => "MINIMUM_PURCHASE",
            OrderDiscountRule::LargeOrder { .. } => "LARGE_ORDER",
        }
    }

    /// ルールを評価して割引額を返す（対象外なら0円）
    pub fn evaluate(&self, request: &DiscountRequest) -> Result<Money, DomainError> {
        match self {
            OrderDiscountRule::BulkQuantity {
                min_items,
                discount,
            } => {
                if request.total_items >= *min_items {
                    Ok(*discount)
                } else {
                    Ok(Money::zero())
                }
            }
            OrderDiscountRule::MinimumPurchase {
                threshold,
                discount,
            } => {
                if request.subtotal >= *threshold {
                    Ok(*discount)
                } else {
                    Ok(Money::zero())
                }
            }
            OrderDiscountRule::LargeOrder {
                threshold,
                percent,
                cap,
            } => {
                if request.subtotal >= *threshold {
                    Ok(request.subtotal.percentage(*percent)?.min(*cap))
                } else {
                    Ok(Money::zero())
                }
            }
        }
    }
}

/// 評価に失敗したルール
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFailure {
    pub rule: String,
    pub error: DomainError,
}

/// 注文側で計算する割引の結果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalDiscounts {
    pub product_discount: Money,
    pub order_level_discount: Money,
    pub breakdown: Vec<BreakdownEntry>,
    /// 0円として扱ったルール
    pub failures: Vec<RuleFailure>,
}

/// 注文レベル割引ルールの一覧
/// 該当するルールはすべて加算される
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDiscountRules {
    rules: Vec<OrderDiscountRule>,
}

impl OrderDiscountRules {
    pub fn new(rules: Vec<OrderDiscountRule>) -> Self {
        Self { rules }
    }

    /// 標準のルール表
    /// - 5点以上で15.00
    /// - 小計100.00以上で15.00
    /// - 小計500.00以上で5%（上限50.00）
    pub fn standard() -> Self {
        Self::new(vec![
            OrderDiscountRule::BulkQuantity {
                min_items: 5,
                discount: Self::money(dec!(15.00)),
            },
            OrderDiscountRule::MinimumPurchase {
                threshold: Self::money(dec!(100.00)),
                discount: Self::money(dec!(15.00)),
            },
            OrderDiscountRule::LargeOrder {
                threshold: Self::money(dec!(500.00)),
                percent: dec!(5),
                cap: Self::money(dec!(50.00)),
            },
        ])
    }

    pub fn rules(&self) -> &[OrderDiscountRule] {
        &self.rules
    }

    /// 商品値引きと注文レベル割引を計算する
    /// 計算に失敗したルールは0円として扱い、失敗として記録する
    pub fn calculate(&self, request: &DiscountRequest) -> LocalDiscounts {
        let mut result = LocalDiscounts::default();

        match Self::product_discount(request) {
            Ok(amount) => {
                if !amount.is_zero() {
                    result.breakdown.push(BreakdownEntry::new(
                        DiscountType::Product,
                        PRODUCT_DISCOUNT_SOURCE,
                        amount,
                    ));
                }
                result.product_discount = amount;
            }
            Err(error) => result.failures.push(RuleFailure {
                rule: PRODUCT_DISCOUNT_SOURCE.to_string(),
                error,
            }),
        }

        for rule in &self.rules {
            let evaluated = rule
                .evaluate(request)
                .and_then(|amount| Ok((amount, result.order_level_discount.add(&amount)?)));
            match evaluated {
                Ok((amount, total)) => {
                    if !amount.is_zero() {
                        result.breakdown.push(BreakdownEntry::new(
                            DiscountType::OrderLevel,
                            rule.name(),
                            amount,
                        ));
                    }
                    result.order_level_discount = total;
                }
                Err(error) => result.failures.push(RuleFailure {
                    rule: rule.name().to_string(),
                    error,
                }),
            }
        }

        result
    }

    /// 明細ごとの（1個あたり値引き × 数量）の合計
    fn product_discount(request: &DiscountRequest) -> Result<Money, DomainError> {
        request.items.iter().try_fold(Money::zero(), |acc, item| {
            acc.add(&item.per_item_discount.multiply(item.quantity)?)
        })
    }

    fn money(amount: Decimal) -> Money {
        Money::new(amount).unwrap_or_default()
    }
}

impl Default for OrderDiscountRules {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::DiscountLineItem;
    use crate::domain::model::{OrderId, ProductId, UserId};

    fn money(value: Decimal) -> Money {
        Money::new(value).unwrap()
    }

    fn request(subtotal: Decimal, total_items: u32, per_item_discount: Decimal) -> DiscountRequest {
        DiscountRequest {
            correlation_id: None,
            order_id: OrderId::new(),
            user_id: UserId::new(),
            items: vec![DiscountLineItem {
                product_id: ProductId::new(),
                quantity: total_items,
                unit_price: money(subtotal / Decimal::from(total_items.max(1))),
                per_item_discount: money(per_item_discount),
            }],
            subtotal: money(subtotal),
            total_items,
            coupon_codes: vec![],
        }
    }

    #[test]
    fn test_bulk_and_minimum_purchase_stack() {
        let local = OrderDiscountRules::standard().calculate(&request(dec!(120.00), 6, dec!(0)));

        assert_eq!(local.order_level_discount, money(dec!(30.00)));
        assert!(local.product_discount.is_zero());
        let sources: Vec<&str> = local.breakdown.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, vec!["BULK_QUANTITY", "MINIMUM_PURCHASE"]);
        assert!(local.failures.is_empty());
    }

    #[test]
    fn test_small_order_has_no_order_level_discount() {
        let local = OrderDiscountRules::standard().calculate(&request(dec!(40.00), 2, dec!(0)));

        assert!(local.order_level_discount.is_zero());
        assert!(local.breakdown.is_empty());
    }

    #[test]
    fn test_large_order_percentage_is_capped() {
        let local = OrderDiscountRules::standard().calculate(&request(dec!(2000.00), 1, dec!(0)));

        // 15.00（最低購入額） + 50.00（5%の上限）
        assert_eq!(local.order_level_discount, money(dec!(65.00)));
    }

    #[test]
    fn test_product_discount_is_per_item_times_quantity() {
        let local = OrderDiscountRules::standard().calculate(&request(dec!(30.00), 3, dec!(1.50)));

        assert_eq!(local.product_discount, money(dec!(4.50)));
        assert_eq!(local.breakdown[0].discount_type, DiscountType::Product);
    }

    #[test]
    fn test_overflowing_rule_is_treated_as_zero() {
        let rules = OrderDiscountRules::new(vec![
            OrderDiscountRule::LargeOrder {
                threshold: Money::zero(),
                percent: Decimal::MAX,
                cap: money(dec!(10.00)),
            },
            OrderDiscountRule::BulkQuantity {
                min_items: 1,
                discount: money(dec!(5.00)),
            },
        ]);

        let local = rules.calculate(&request(dec!(1000000.00), 1, dec!(0)));

        assert_eq!(local.order_level_discount, money(dec!(5.00)));
        assert_eq!(local.failures.len(), 1);
        assert_eq!(local.failures[0].rule, "LARGE_ORDER");
        assert_eq!(local.failures[0].error, DomainError::ArithmeticOverflow);
    }
}
