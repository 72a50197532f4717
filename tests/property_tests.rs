use order_discount_saga::domain::discount::{DiscountContext, OrderDiscountRules, SagaState};
use order_discount_saga::domain::message::{
    AppliedCoupon, CouponValidationResponse, DiscountLineItem, DiscountRequest,
    TierDiscountResponse,
};
use order_discount_saga::domain::model::{
    Coupon, CouponDiscountType, DiscountType, MembershipTier, Money, OrderId,
    ProductId, UserId,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn cents(value: i64) -> Money {
    Money::new(Decimal::new(value, 2)).unwrap()
}

fn tier_strategy() -> impl Strategy<Value = MembershipTier> {
    prop_oneof![
        Just(MembershipTier::Bronze),
        Just(MembershipTier::Silver),
        Just(MembershipTier::Gold),
        Just(MembershipTier::Platinum),
    ]
}

/// (数量, 単価, 1個あたり値引き) を円未満2桁で生成
fn line_strategy() -> impl Strategy<Value = (u32, i64, i64)> {
    (1u32..20, 1i64..50_000, 0i64..5_000)
}

fn request_from(lines: &[(u32, i64, i64)], coupon_codes: Vec<String>) -> DiscountRequest {
    let items: Vec<DiscountLineItem> = lines
        .iter()
        .map(|(quantity, unit_price, per_item_discount)| DiscountLineItem {
            product_id: ProductId::new(),
            quantity: *quantity,
            unit_price: cents(*unit_price),
            per_item_discount: cents(*per_item_discount),
        })
        .collect();
    let subtotal = items.iter().fold(Money::zero(), |acc, item| {
        acc.add(&item.unit_price.multiply(item.quantity).unwrap())
            .unwrap()
    });
    DiscountRequest {
        correlation_id: None,
        order_id: OrderId::new(),
        user_id: UserId::new(),
        total_items: items.iter().map(|item| item.quantity).sum(),
        items,
        subtotal,
        coupon_codes,
    }
}

// Money のプロパティベーステスト
proptest! {
    /// Money の加算は交換法則を満たす (a + b = b + a)
    #[test]
    fn test_money_addition_is_commutative(
        amount1 in 0i64..100_000_000,
        amount2 in 0i64..100_000_000,
    ) {
        let money1 = cents(amount1);
        let money2 = cents(amount2);

        prop_assert_eq!(money1.add(&money2).unwrap(), money2.add(&money1).unwrap());
    }

    /// 減算は負にならず、元の金額を超えない
    #[test]
    fn test_money_saturating_sub_never_negative(
        amount1 in 0i64..100_000_000,
        amount2 in 0i64..100_000_000,
    ) {
        let result = cents(amount1).saturating_sub(&cents(amount2));

        prop_assert!(result >= Money::zero());
        prop_assert!(result <= cents(amount1));
    }

    /// 割合計算の結果は元の金額以下
    #[test]
    fn test_money_percentage_within_amount(
        amount in 0i64..100_000_000,
        percent in 0u32..=100,
    ) {
        let money = cents(amount);
        let result = money.percentage(Decimal::from(percent)).unwrap();

        prop_assert!(result <= money);
    }
}

// 割引計算のプロパティベーステスト
proptest! {
    /// 注文レベル割引は該当ルールの合計と一致する
    #[test]
    fn test_order_level_rules_are_additive(
        lines in prop::collection::vec(line_strategy(), 1..6),
    ) {
        let request = request_from(&lines, vec![]);
        let rules = OrderDiscountRules::standard();

        let local = rules.calculate(&request);
        let expected = rules.rules().iter().fold(Money::zero(), |acc, rule| {
            acc.add(&rule.evaluate(&request).unwrap()).unwrap()
        });

        prop_assert!(local.failures.is_empty());
        prop_assert_eq!(local.order_level_discount, expected);
        let order_level_entries = local
            .breakdown
            .iter()
            .filter(|entry| entry.discount_type == DiscountType::OrderLevel)
            .fold(Money::zero(), |acc, entry| acc.add(&entry.amount).unwrap());
        prop_assert_eq!(order_level_entries, expected);
    }

    /// 会員ランク割引は上限と対象金額を超えない
    #[test]
    fn test_tier_discount_within_cap_and_amount(
        tier in tier_strategy(),
        amount in 0i64..100_000_000,
    ) {
        let amount = cents(amount);
        let discount = tier.calculate_discount(amount).unwrap();

        prop_assert!(discount <= tier.max_discount());
        prop_assert!(discount <= amount);
    }

    /// クーポン割引は対象金額を超えない
    #[test]
    fn test_coupon_discount_within_amount(
        percentage in any::<bool>(),
        value in 1u32..=100,
        cap in prop::option::of(1i64..10_000),
        amount in 0i64..10_000_000,
    ) {
        let discount_type = if percentage {
            CouponDiscountType::Percentage
        } else {
            CouponDiscountType::Fixed
        };
        let mut coupon = Coupon::new("PROP".to_string(), discount_type, Decimal::from(value)).unwrap();
        if let Some(cap) = cap {
            coupon = coupon.with_max_discount(cents(cap));
        }
        let amount = cents(amount);

        let discount = coupon.calculate_discount(amount).unwrap();

        prop_assert!(discount <= amount);
        if let Some(cap) = cap {
            prop_assert!(discount <= cents(cap));
        }
    }

    /// 最終金額は小計から内訳の合計を引いた値（下限0）で、小計を超えない
    #[test]
    fn test_final_amount_matches_breakdown(
        lines in prop::collection::vec(line_strategy(), 1..6),
        coupon_percent in prop::option::of(1u32..=100),
        tier in tier_strategy(),
    ) {
        let coupon_codes = if coupon_percent.is_some() {
            vec!["PROP".to_string()]
        } else {
            vec![]
        };
        let mut request = request_from(&lines, coupon_codes);
        let correlation_id = request.ensure_correlation_id();
        let subtotal = request.subtotal;
        let local = OrderDiscountRules::standard().calculate(&request);
        let mut context = DiscountContext::new(correlation_id, request);
        context.apply_local(local).unwrap();

        let tier_request = match coupon_percent {
            Some(percent) => {
                let coupon_request = context.request_coupon().unwrap();
                let coupon = Coupon::new(
                    "PROP".to_string(),
                    CouponDiscountType::Percentage,
                    Decimal::from(percent),
                )
                .unwrap();
                let discount = coupon.calculate_discount(coupon_request.amount).unwrap();
                context
                    .record_coupon(&CouponValidationResponse {
                        correlation_id,
                        success: true,
                        error_message: None,
                        applied_coupons: vec![AppliedCoupon {
                            code: "PROP".to_string(),
                            discount_type: CouponDiscountType::Percentage,
                            discount,
                        }],
                        total_discount: discount,
                        errors: vec![],
                    })
                    .unwrap()
            }
            None => context.skip_coupon().unwrap(),
        };

        let tier_discount = tier.calculate_discount(tier_request.amount).unwrap();
        let response = context
            .complete(&TierDiscountResponse {
                correlation_id,
                success: true,
                error_message: None,
                tier: Some(tier),
                discount_percentage: tier.discount_percentage(),
                discount: tier_discount,
            })
            .unwrap();

        let breakdown_total = response
            .breakdown
            .iter()
            .fold(Money::zero(), |acc, entry| acc.add(&entry.amount).unwrap());
        prop_assert_eq!(context.state(), SagaState::Completed);
        prop_assert_eq!(response.final_amount, subtotal.saturating_sub(&breakdown_total));
        prop_assert!(response.final_amount <= subtotal);
        prop_assert!(response.final_amount >= Money::zero());

        let clamped = response
            .breakdown
            .iter()
            .any(|entry| entry.discount_type == DiscountType::ClampAdjustment);
        prop_assert_eq!(clamped, breakdown_total > subtotal);
    }
}
