use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::service::CreateOrderCommand;
use crate::domain::error::DomainError;
use crate::domain::model::{LineItem, Money, ProductId, UserId};

/// 注文明細のリクエストDTO
#[derive(Debug, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// 1個あたりの商品値引き（省略時は0）
    #[serde(default)]
    pub per_item_discount: Option<Decimal>,
}

/// 注文作成用のリクエストDTO
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    pub line_items: Vec<LineItemRequest>,
    #[serde(default)]
    pub coupon_codes: Vec<String>,
}

impl CreateOrderRequest {
    /// 金額と数量を検証してコマンドに変換する
    pub fn into_command(self) -> Result<CreateOrderCommand, DomainError> {
        let line_items = self
            .line_items
            .into_iter()
            .map(|item| {
                LineItem::new(
                    ProductId::from_uuid(item.product_id),
                    item.quantity,
                    Money::new(item.unit_price)?,
                    Money::new(item.per_item_discount.unwrap_or(Decimal::ZERO))?,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CreateOrderCommand {
            user_id: UserId::from_uuid(self.user_id),
            line_items,
            coupon_codes: self.coupon_codes,
        })
    }
}

/// 注文一覧取得用のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct OrdersQueryParams {
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_create_order_request_defaults() {
        let json = format!(
            r#"{{"user_id":"{}","line_items":[{{"product_id":"{}","quantity":2,"unit_price":"12.50"}}]}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );

        let request: CreateOrderRequest = serde_json::from_str(&json).unwrap();

        assert!(request.coupon_codes.is_empty());
        assert_eq!(request.line_items[0].per_item_discount, None);
        let command = request.into_command().unwrap();
        assert_eq!(command.line_items[0].unit_price().amount(), dec!(12.50));
        assert!(command.line_items[0].per_item_discount().is_zero());
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let request = CreateOrderRequest {
            user_id: Uuid::new_v4(),
            line_items: vec![LineItemRequest {
                product_id: Uuid::new_v4(),
                quantity: 1,
                unit_price: dec!(-1.00),
                per_item_discount: None,
            }],
            coupon_codes: vec![],
        };

        assert!(request.into_command().is_err());
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let request = CreateOrderRequest {
            user_id: Uuid::new_v4(),
            line_items: vec![LineItemRequest {
                product_id: Uuid::new_v4(),
                quantity: 0,
                unit_price: dec!(5.00),
                per_item_discount: None,
            }],
            coupon_codes: vec![],
        };

        assert_eq!(request.into_command().err(), Some(DomainError::InvalidQuantity));
    }
}
