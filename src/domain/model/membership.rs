use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::DomainError;
use crate::domain::model::{Money, UserId};

/// 会員ランク
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl MembershipTier {
    /// ランクごとの割引率（%）
    pub fn discount_percentage(&self) -> Decimal {
        match self {
            MembershipTier::Bronze => Decimal::ZERO,
            MembershipTier::Silver => dec!(2),
            MembershipTier::Gold => dec!(5),
            MembershipTier::Platinum => dec!(10),
        }
    }

    /// ランクごとの割引上限額
    pub fn max_discount(&self) -> Money {
        let cap = match self {
            MembershipTier::Bronze => Decimal::ZERO,
            MembershipTier::Silver => dec!(20.00),
            MembershipTier::Gold => dec!(50.00),
            MembershipTier::Platinum => dec!(100.00),
        };
        Money::new(cap).unwrap_or_default()
    }

    /// 対象金額にランク割引を適用した割引額
    pub fn calculate_discount(&self, amount: Money) -> Result<Money, DomainError> {
        let discount = amount.percentage(self.discount_percentage())?;
        Ok(discount.min(self.max_discount()).min(amount))
    }

    /// 文字列からMembershipTierを作成
    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        match s {
            "BRONZE" => Ok(MembershipTier::Bronze),
            "SILVER" => Ok(MembershipTier::Silver),
            "GOLD" => Ok(MembershipTier::Gold),
            "PLATINUM" => Ok(MembershipTier::Platinum),
            _ => Err(DomainError::InvalidValue(format!("無効な会員ランク: {}", s))),
        }
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MembershipTier::Bronze => "BRONZE",
            MembershipTier::Silver => "SILVER",
            MembershipTier::Gold => "GOLD",
            MembershipTier::Platinum => "PLATINUM",
        };
        write!(f, "{}", s)
    }
}

/// 会員情報（ロイヤリティ側）
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    user_id: UserId,
    tier: MembershipTier,
}

impl Membership {
    pub fn new(user_id: UserId, tier: MembershipTier) -> Self {
        Self { user_id, tier }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn tier(&self) -> MembershipTier {
        self.tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gold_tier_discount() {
        let amount = Money::new(dec!(81.00)).unwrap();
        let discount = MembershipTier::Gold.calculate_discount(amount).unwrap();
        assert_eq!(discount.amount(), dec!(4.05));
    }

    #[test]
    fn test_tier_discount_is_capped() {
        let amount = Money::new(dec!(5000.00)).unwrap();
        let discount = MembershipTier::Silver.calculate_discount(amount).unwrap();
        assert_eq!(discount.amount(), dec!(20.00));
    }

    #[test]
    fn test_bronze_has_no_discount() {
        let amount = Money::new(dec!(100.00)).unwrap();
        assert!(MembershipTier::Bronze
            .calculate_discount(amount)
            .unwrap()
            .is_zero());
    }

    #[test]
    fn test_tier_from_string() {
        assert_eq!(MembershipTier::from_string("GOLD").unwrap(), MembershipTier::Gold);
        assert!(MembershipTier::from_string("gold").is_err());
    }
}
