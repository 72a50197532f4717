use crate::application::service::OrderDetail;
use crate::domain::model::{DiscountApplication, LineItem, Money, Order};
use serde::{Deserialize, Serialize};

/// 注文一覧用のレスポンスDTO
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderSummaryResponse {
    pub order_id: String,
    pub user_id: String,
    pub status: String,
    pub discount_status: String,
    pub subtotal: Money,
    pub final_amount: Money,
    pub created_at: String,
}

/// 注文明細用のレスポンスDTO
#[derive(Debug, Serialize, Deserialize)]
pub struct LineItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub per_item_discount: Money,
}

/// 割引額の内訳
#[derive(Debug, Serialize, Deserialize)]
pub struct DiscountsResponse {
    pub product_discount: Money,
    pub order_level_discount: Money,
    pub coupon_discount: Money,
    pub tier_discount: Money,
    pub total_discount: Money,
}

/// 割引適用記録のレスポンスDTO
#[derive(Debug, Serialize, Deserialize)]
pub struct DiscountApplicationResponse {
    pub discount_type: String,
    pub source: String,
    pub amount: Money,
    pub correlation_id: String,
    pub applied_at: String,
}

/// 注文詳細用のレスポンスDTO
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderDetailResponse {
    pub order_id: String,
    pub user_id: String,
    pub status: String,
    pub discount_status: String,
    pub line_items: Vec<LineItemResponse>,
    pub coupon_codes: Vec<String>,
    pub subtotal: Money,
    pub discounts: DiscountsResponse,
    pub final_amount: Money,
    pub discount_applications: Vec<DiscountApplicationResponse>,
    pub created_at: String,
}

impl OrderSummaryResponse {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id().to_string(),
            user_id: order.user_id().to_string(),
            status: order.status().to_string(),
            discount_status: order.discount_status().to_string(),
            subtotal: order.subtotal(),
            final_amount: order.final_amount(),
            created_at: order.created_at().to_rfc3339(),
        }
    }
}

impl LineItemResponse {
    fn from_line_item(item: &LineItem) -> Self {
        Self {
            product_id: item.product_id().to_string(),
            quantity: item.quantity(),
            unit_price: item.unit_price(),
            per_item_discount: item.per_item_discount(),
        }
    }
}

impl DiscountApplicationResponse {
    fn from_application(application: &DiscountApplication) -> Self {
        Self {
            discount_type: application.discount_type().to_string(),
            source: application.source().to_string(),
            amount: application.amount(),
            correlation_id: application.correlation_id().to_string(),
            applied_at: application.applied_at().to_rfc3339(),
        }
    }
}

impl OrderDetailResponse {
    /// 注文と割引適用記録からレスポンスを作成
    pub fn from_order(order: &Order, applications: &[DiscountApplication]) -> Self {
        let discounts = order.discounts();
        // 各割引額は小計以下に収まっているため合計が溢れることはない
        let total_discount = discounts.total().unwrap_or_default();

        Self {
            order_id: order.id().to_string(),
            user_id: order.user_id().to_string(),
            status: order.status().to_string(),
            discount_status: order.discount_status().to_string(),
            line_items: order
                .line_items()
                .iter()
                .map(LineItemResponse::from_line_item)
                .collect(),
            coupon_codes: order.coupon_codes().to_vec(),
            subtotal: order.subtotal(),
            discounts: DiscountsResponse {
                product_discount: discounts.product_discount,
                order_level_discount: discounts.order_level_discount,
                coupon_discount: discounts.coupon_discount,
                tier_discount: discounts.tier_discount,
                total_discount,
            },
            final_amount: order.final_amount(),
            discount_applications: applications
                .iter()
                .map(DiscountApplicationResponse::from_application)
                .collect(),
            created_at: order.created_at().to_rfc3339(),
        }
    }

    pub fn from_detail(detail: &OrderDetail) -> Self {
        Self::from_order(&detail.order, &detail.discount_applications)
    }
}
