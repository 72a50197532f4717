use crate::application::ApplicationError;
use crate::domain::model::{DiscountApplication, Order, OrderId, OrderStatus};
use crate::domain::port::{DiscountApplicationRepository, OrderRepository};
use std::sync::Arc;

/// 注文と割引適用記録
#[derive(Debug, Clone)]
pub struct OrderDetail {
    pub order: Order,
    pub discount_applications: Vec<DiscountApplication>,
}

/// 注文クエリサービス
/// 読み取り専用の注文操作を提供する
pub struct OrderQueryService {
    order_repository: Arc<dyn OrderRepository>,
    discount_application_repository: Arc<dyn DiscountApplicationRepository>,
}

impl OrderQueryService {
    pub fn new(
        order_repository: Arc<dyn OrderRepository>,
        discount_application_repository: Arc<dyn DiscountApplicationRepository>,
    ) -> Self {
        Self {
            order_repository,
            discount_application_repository,
        }
    }

    /// 注文IDで注文と割引適用記録を取得
    ///
    /// # Returns
    /// * `Ok(Some(OrderDetail))` - 注文が見つかった
    /// * `Ok(None)` - 注文が見つからなかった
    /// * `Err(ApplicationError)` - 取得失敗
    pub async fn get_order_detail(
        &self,
        id: OrderId,
    ) -> Result<Option<OrderDetail>, ApplicationError> {
        let Some(order) = self.order_repository.find_by_id(id).await? else {
            return Ok(None);
        };
        let discount_applications = self.discount_application_repository.find_by_order(id).await?;
        Ok(Some(OrderDetail {
            order,
            discount_applications,
        }))
    }

    /// すべての注文を作成日時の降順で取得
    pub async fn get_all_orders(&self) -> Result<Vec<Order>, ApplicationError> {
        self.order_repository
            .find_all()
            .await
            .map_err(ApplicationError::from)
    }

    /// 指定されたステータスの注文を作成日時の降順で取得
    pub async fn get_orders_by_status(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<Order>, ApplicationError> {
        self.order_repository
            .find_by_status(status)
            .await
            .map_err(ApplicationError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        CorrelationId, DiscountType, LineItem, Money, ProductId, UserId,
    };
    use crate::domain::port::RepositoryError;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MockOrderRepository {
        orders: Mutex<HashMap<OrderId, Order>>,
    }

    impl MockOrderRepository {
        fn new() -> Self {
            Self {
                orders: Mutex::new(HashMap::new()),
            }
        }

        fn add_order(&self, order: Order) {
            self.orders.lock().unwrap().insert(order.id(), order);
        }
    }

    #[async_trait]
    impl OrderRepository for MockOrderRepository {
        async fn save(&self, order: &Order) -> Result<(), RepositoryError> {
            self.add_order(order.clone());
            Ok(())
        }

        async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError> {
            Ok(self.orders.lock().unwrap().get(&order_id).cloned())
        }

        async fn find_all(&self) -> Result<Vec<Order>, RepositoryError> {
            Ok(self.orders.lock().unwrap().values().cloned().collect())
        }

        async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError> {
            Ok(self
                .orders
                .lock()
                .unwrap()
                .values()
                .filter(|order| order.status() == status)
                .cloned()
                .collect())
        }

        fn next_identity(&self) -> OrderId {
            OrderId::new()
        }
    }

    struct MockDiscountApplicationRepository {
        applications: Mutex<Vec<DiscountApplication>>,
    }

    #[async_trait]
    impl DiscountApplicationRepository for MockDiscountApplicationRepository {
        async fn replace_for_order(
            &self,
            order_id: OrderId,
            applications: &[DiscountApplication],
        ) -> Result<(), RepositoryError> {
            let mut stored = self.applications.lock().unwrap();
            stored.retain(|a| a.order_id() != order_id);
            stored.extend_from_slice(applications);
            Ok(())
        }

        async fn find_by_order(
            &self,
            order_id: OrderId,
        ) -> Result<Vec<DiscountApplication>, RepositoryError> {
            Ok(self
                .applications
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.order_id() == order_id)
                .cloned()
                .collect())
        }
    }

    fn service() -> (OrderQueryService, Arc<MockOrderRepository>, Arc<MockDiscountApplicationRepository>) {
        let orders = Arc::new(MockOrderRepository::new());
        let applications = Arc::new(MockDiscountApplicationRepository {
            applications: Mutex::new(Vec::new()),
        });
        (
            OrderQueryService::new(orders.clone(), applications.clone()),
            orders,
            applications,
        )
    }

    fn order() -> Order {
        let item = LineItem::new(
            ProductId::new(),
            2,
            Money::new(dec!(25.00)).unwrap(),
            Money::zero(),
        )
        .unwrap();
        Order::new(OrderId::new(), UserId::new(), vec![item], vec![]).unwrap()
    }

    #[tokio::test]
    async fn test_get_order_detail_includes_applications() {
        let (service, orders, applications) = service();
        let order = order();
        orders.add_order(order.clone());
        applications
            .replace_for_order(
                order.id(),
                &[DiscountApplication::new(
                    order.id(),
                    CorrelationId::new(),
                    DiscountType::Tier,
                    "GOLD".to_string(),
                    Money::new(dec!(2.50)).unwrap(),
                )],
            )
            .await
            .unwrap();

        let detail = service.get_order_detail(order.id()).await.unwrap().unwrap();

        assert_eq!(detail.order.id(), order.id());
        assert_eq!(detail.discount_applications.len(), 1);
        assert_eq!(detail.discount_applications[0].source(), "GOLD");
    }

    #[tokio::test]
    async fn test_get_order_detail_not_found() {
        let (service, _, _) = service();

        let result = service.get_order_detail(OrderId::new()).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_orders_by_status() {
        let (service, orders, _) = service();
        let mut confirmed = order();
        confirmed.skip_discount().unwrap();
        confirmed.confirm().unwrap();
        orders.add_order(confirmed);
        orders.add_order(order());

        let all = service.get_all_orders().await.unwrap();
        let result = service.get_orders_by_status(OrderStatus::Confirmed).await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].status(), OrderStatus::Confirmed);
    }
}
