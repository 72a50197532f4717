mod order_query_service;

pub use order_query_service::{OrderDetail, OrderQueryService};

use crate::application::ApplicationError;
use crate::domain::discount::DiscountOrchestrator;
use crate::domain::message::{CouponUsageNotification, DiscountRequest, DiscountResponse};
use crate::domain::model::{
    CorrelationId, DiscountApplication, LineItem, Order, OrderId, UserId,
};
use crate::domain::port::{DiscountApplicationRepository, Logger, MessageChannel, OrderRepository};
use crate::domain::serialization::MessageSerializer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const COMPONENT: &str = "OrderApplicationService";

/// 注文作成コマンド
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub user_id: UserId,
    pub line_items: Vec<LineItem>,
    pub coupon_codes: Vec<String>,
}

/// 注文アプリケーションサービス
/// 注文作成時に割引サーガを1回だけ実行し、結果に関わらず注文を保存する
#[derive(Clone)]
pub struct OrderApplicationService {
    order_repository: Arc<dyn OrderRepository>,
    discount_application_repository: Arc<dyn DiscountApplicationRepository>,
    orchestrator: Arc<DiscountOrchestrator>,
    channel: Arc<dyn MessageChannel>,
    logger: Arc<dyn Logger>,
    discount_timeout: Duration,
}

impl OrderApplicationService {
    /// 新しいアプリケーションサービスを作成
    ///
    /// # Arguments
    /// * `discount_timeout` - サーガ全体を待つ上限時間
    pub fn new(
        order_repository: Arc<dyn OrderRepository>,
        discount_application_repository: Arc<dyn DiscountApplicationRepository>,
        orchestrator: Arc<DiscountOrchestrator>,
        channel: Arc<dyn MessageChannel>,
        logger: Arc<dyn Logger>,
        discount_timeout: Duration,
    ) -> Self {
        Self {
            order_repository,
            discount_application_repository,
            orchestrator,
            channel,
            logger,
            discount_timeout,
        }
    }

    /// 新しい注文を作成し、割引を計算して保存する
    ///
    /// 保存と割引計算は別タスクで進めるため、呼び出し側が待つのをやめても
    /// 注文が割引未計算のまま残ることはない
    ///
    /// # Returns
    /// * `Ok(Order)` - 保存された注文（割引適用済み、または割引なし）
    /// * `Err(ApplicationError)` - 注文が不正、または保存に失敗
    pub async fn create_order(&self, command: CreateOrderCommand) -> Result<Order, ApplicationError> {
        let order = Order::new(
            self.order_repository.next_identity(),
            command.user_id,
            command.line_items,
            command.coupon_codes,
        )?;

        let service = self.clone();
        tokio::spawn(async move { service.place_order(order).await })
            .await
            .map_err(|e| ApplicationError::TaskFailed(e.to_string()))?
    }

    async fn place_order(&self, mut order: Order) -> Result<Order, ApplicationError> {
        let order_id = order.id();
        self.order_repository.save(&order).await?;

        let call = self
            .orchestrator
            .calculate(DiscountRequest::from_order(&order))
            .await;
        let correlation_id = call.correlation_id();

        let applied = match call.wait(self.discount_timeout).await {
            Ok(response) if response.success => match order.apply_discount(&response) {
                Ok(()) => Some(response),
                Err(error) => {
                    self.warn_skipped(order_id, correlation_id, &error.to_string());
                    None
                }
            },
            Ok(response) => {
                let reason = response
                    .error_message
                    .unwrap_or_else(|| "discount calculation failed".to_string());
                self.warn_skipped(order_id, correlation_id, &reason);
                None
            }
            Err(error) => {
                self.warn_skipped(order_id, correlation_id, &error.to_string());
                None
            }
        };

        if applied.is_none() {
            order.skip_discount()?;
        }
        self.order_repository.save(&order).await?;

        if let Some(response) = applied {
            // 適用記録は監査用。失敗しても注文と利用通知は止めない
            if let Err(error) = self.record_applications(&order, &response).await {
                let mut context = HashMap::new();
                context.insert("order_id".to_string(), order_id.to_string());
                self.logger.warn(
                    COMPONENT,
                    &format!("Discount applications were not recorded: {}", error),
                    Some(correlation_id.as_uuid()),
                    Some(context),
                );
            }
            for notification in order.take_coupon_notifications() {
                self.notify_coupon_usage(correlation_id, notification);
            }

            let mut context = HashMap::new();
            context.insert("order_id".to_string(), order_id.to_string());
            context.insert("final_amount".to_string(), order.final_amount().to_string());
            self.logger.info(
                COMPONENT,
                "Order created with discounts applied",
                Some(correlation_id.as_uuid()),
                Some(context),
            );
        }

        Ok(order)
    }

    /// 注文を確定
    pub async fn confirm_order(&self, order_id: OrderId) -> Result<Order, ApplicationError> {
        let mut order = self.load(order_id).await?;
        order.confirm()?;
        self.order_repository.save(&order).await?;
        Ok(order)
    }

    /// 注文をキャンセル
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order, ApplicationError> {
        let mut order = self.load(order_id).await?;
        order.cancel()?;
        self.order_repository.save(&order).await?;
        Ok(order)
    }

    async fn load(&self, order_id: OrderId) -> Result<Order, ApplicationError> {
        self.order_repository
            .find_by_id(order_id)
            .await?
            .ok_or(ApplicationError::OrderNotFound(order_id))
    }

    /// 内訳1行につき1件の割引適用記録を保存する（注文単位で置き換え）
    async fn record_applications(
        &self,
        order: &Order,
        response: &DiscountResponse,
    ) -> Result<(), ApplicationError> {
        let applications: Vec<DiscountApplication> = response
            .breakdown
            .iter()
            .map(|entry| {
                DiscountApplication::new(
                    order.id(),
                    response.correlation_id,
                    entry.discount_type,
                    entry.source.clone(),
                    entry.amount,
                )
            })
            .collect();

        self.discount_application_repository
            .replace_for_order(order.id(), &applications)
            .await?;
        Ok(())
    }

    /// クーポン利用通知を発行する
    /// 結果は待たず、失敗しても注文には影響しない
    fn notify_coupon_usage(&self, correlation_id: CorrelationId, notification: CouponUsageNotification) {
        let channel = self.channel.clone();
        let logger = self.logger.clone();

        tokio::spawn(async move {
            let result = MessageSerializer::new()
                .encode(correlation_id, &notification)
                .map_err(|e| e.to_string());
            let result = match result {
                Ok(envelope) => channel.publish(envelope).await.map_err(|e| e.to_string()),
                Err(error) => Err(error),
            };
            if let Err(error) = result {
                logger.warn(
                    COMPONENT,
                    &format!("Coupon usage notification was not published: {}", error),
                    Some(correlation_id.as_uuid()),
                    None,
                );
            }
        });
    }

    fn warn_skipped(&self, order_id: OrderId, correlation_id: CorrelationId, reason: &str) {
        let mut context = HashMap::new();
        context.insert("order_id".to_string(), order_id.to_string());
        context.insert("reason".to_string(), reason.to_string());
        self.logger.warn(
            COMPONENT,
            "Discount calculation unavailable, order saved without discounts",
            Some(correlation_id.as_uuid()),
            Some(context),
        );
    }
}
