use order_discount_saga::adapter::driven::{ChannelConfig, InMemoryMessageChannel};
use order_discount_saga::adapter::driver::response_dto::{
    OrderDetailResponse, OrderSummaryResponse,
};
use order_discount_saga::adapter::driver::rest_api::{create_router, ApiError, AppState};
use order_discount_saga::application::service::{OrderApplicationService, OrderQueryService};
use order_discount_saga::domain::discount::{
    CouponValidationHandler, DiscountOrchestrator, OrderDiscountRules, PendingCallRegistry,
    TierDiscountHandler,
};
use order_discount_saga::domain::message::{
    CouponValidationRequest, CouponValidationResponse, TierDiscountRequest, TierDiscountResponse,
};
use order_discount_saga::domain::model::{
    Coupon, CouponDiscountType, CouponUsage, DiscountApplication, Membership, MembershipTier,
    Money, Order, OrderId, OrderStatus, ReservationOutcome, UserId,
};
use order_discount_saga::domain::port::{
    CouponRepository, DiscountApplicationRepository, Logger, MembershipRepository,
    MessageChannel, OrderRepository, RepositoryError,
};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

struct MockLogger;

impl Logger for MockLogger {
    fn debug(&self, _: &str, _: &str, _: Option<Uuid>, _: Option<HashMap<String, String>>) {}
    fn info(&self, _: &str, _: &str, _: Option<Uuid>, _: Option<HashMap<String, String>>) {}
    fn warn(&self, _: &str, _: &str, _: Option<Uuid>, _: Option<HashMap<String, String>>) {}
    fn error(&self, _: &str, _: &str, _: Option<Uuid>, _: Option<HashMap<String, String>>) {}
}

#[derive(Default)]
struct MockOrderRepository {
    orders: Mutex<HashMap<OrderId, Order>>,
}

#[async_trait]
impl OrderRepository for MockOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), RepositoryError> {
        self.orders.lock().await.insert(order.id(), order.clone());
        Ok(())
    }

    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.lock().await.get(&order_id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Order>, RepositoryError> {
        Ok(self.orders.lock().await.values().cloned().collect())
    }

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .orders
            .lock()
            .await
            .values()
            .filter(|order| order.status() == status)
            .cloned()
            .collect())
    }

    fn next_identity(&self) -> OrderId {
        OrderId::new()
    }
}

#[derive(Default)]
struct MockDiscountApplicationRepository {
    applications: Mutex<HashMap<OrderId, Vec<DiscountApplication>>>,
}

#[async_trait]
impl DiscountApplicationRepository for MockDiscountApplicationRepository {
    async fn replace_for_order(
        &self,
        order_id: OrderId,
        applications: &[DiscountApplication],
    ) -> Result<(), RepositoryError> {
        self.applications
            .lock()
            .await
            .insert(order_id, applications.to_vec());
        Ok(())
    }

    async fn find_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<DiscountApplication>, RepositoryError> {
        Ok(self
            .applications
            .lock()
            .await
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct MockCouponRepository {
    coupons: Mutex<HashMap<String, Coupon>>,
    usages: Mutex<Vec<CouponUsage>>,
}

#[async_trait]
impl CouponRepository for MockCouponRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        Ok(self.coupons.lock().await.get(code).cloned())
    }

    async fn save(&self, coupon: &Coupon) -> Result<(), RepositoryError> {
        self.coupons
            .lock()
            .await
            .insert(coupon.code().to_string(), coupon.clone());
        Ok(())
    }

    async fn find_usages(&self, code: &str) -> Result<Vec<CouponUsage>, RepositoryError> {
        Ok(self
            .usages
            .lock()
            .await
            .iter()
            .filter(|u| u.coupon_code() == code)
            .cloned()
            .collect())
    }

    async fn save_usage(&self, usage: &CouponUsage) -> Result<(), RepositoryError> {
        let mut usages = self.usages.lock().await;
        usages.retain(|u| {
            !(u.coupon_code() == usage.coupon_code()
                && u.correlation_id() == usage.correlation_id())
        });
        usages.push(usage.clone());
        Ok(())
    }

    async fn try_reserve(
        &self,
        coupon: &Coupon,
        usage: &CouponUsage,
    ) -> Result<ReservationOutcome, RepositoryError> {
        let mut usages = self.usages.lock().await;
        let outcome = coupon.reservation_outcome(&usages, usage);
        if outcome == ReservationOutcome::Reserved {
            usages.push(usage.clone());
        }
        Ok(outcome)
    }
}

#[derive(Default)]
struct MockMembershipRepository {
    members: Mutex<HashMap<UserId, Membership>>,
}

#[async_trait]
impl MembershipRepository for MockMembershipRepository {
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Membership>, RepositoryError> {
        Ok(self.members.lock().await.get(&user_id).cloned())
    }

    async fn save(&self, membership: &Membership) -> Result<(), RepositoryError> {
        self.members
            .lock()
            .await
            .insert(membership.user_id(), membership.clone());
        Ok(())
    }
}

/// テスト用サーバーとゴールド会員のユーザーID
async fn create_test_server() -> (TestServer, UserId) {
    let logger: Arc<dyn Logger> = Arc::new(MockLogger);
    let channel = InMemoryMessageChannel::new(ChannelConfig::default(), logger.clone());
    let shared: Arc<dyn MessageChannel> = Arc::new(channel.clone());

    let orders = Arc::new(MockOrderRepository::default());
    let applications = Arc::new(MockDiscountApplicationRepository::default());
    let coupons = Arc::new(MockCouponRepository::default());
    let members = Arc::new(MockMembershipRepository::default());

    let coupon = Coupon::new("SAVE10".to_string(), CouponDiscountType::Percentage, dec!(10))
        .unwrap()
        .with_max_discount(Money::new(dec!(15.00)).unwrap());
    coupons.save(&coupon).await.unwrap();
    let gold = UserId::new();
    members
        .save(&Membership::new(gold, MembershipTier::Gold))
        .await
        .unwrap();

    channel
        .subscribe::<CouponValidationRequest, _>(CouponValidationHandler::new(
            coupons,
            shared.clone(),
            logger.clone(),
        ))
        .await
        .unwrap();
    channel
        .subscribe::<TierDiscountRequest, _>(TierDiscountHandler::new(
            members,
            shared.clone(),
            logger.clone(),
        ))
        .await
        .unwrap();

    let orchestrator = Arc::new(DiscountOrchestrator::new(
        Arc::new(PendingCallRegistry::new()),
        shared.clone(),
        OrderDiscountRules::standard(),
        logger.clone(),
    ));
    channel
        .subscribe::<CouponValidationResponse, _>(orchestrator.clone())
        .await
        .unwrap();
    channel
        .subscribe::<TierDiscountResponse, _>(orchestrator.clone())
        .await
        .unwrap();

    let state = AppState {
        order_service: Arc::new(OrderApplicationService::new(
            orders.clone(),
            applications.clone(),
            orchestrator,
            shared,
            logger,
            Duration::from_secs(3),
        )),
        order_query_service: Arc::new(OrderQueryService::new(orders, applications)),
    };

    let server = TestServer::new(create_router().with_state(state)).unwrap();
    (server, gold)
}

fn order_body(user_id: UserId) -> serde_json::Value {
    json!({
        "user_id": user_id.as_uuid(),
        "line_items": [
            { "product_id": Uuid::new_v4(), "quantity": 4, "unit_price": "20.00" },
            { "product_id": Uuid::new_v4(), "quantity": 2, "unit_price": "20.00" }
        ],
        "coupon_codes": ["SAVE10"]
    })
}

#[tokio::test]
async fn test_health_check() {
    let (server, _) = create_test_server().await;

    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_create_order_applies_discounts() {
    let (server, gold) = create_test_server().await;

    let response = server.post("/orders").json(&order_body(gold)).await;

    response.assert_status(StatusCode::CREATED);
    let detail: OrderDetailResponse = response.json();
    assert_eq!(detail.status, "Pending");
    assert_eq!(detail.discount_status, "Applied");
    assert_eq!(detail.subtotal, Money::new(dec!(120.00)).unwrap());
    assert_eq!(
        detail.discounts.total_discount,
        Money::new(dec!(43.05)).unwrap()
    );
    assert_eq!(detail.final_amount, Money::new(dec!(76.95)).unwrap());
    assert_eq!(detail.discount_applications.len(), 4);
}

#[tokio::test]
async fn test_create_order_rejects_empty_order() {
    let (server, gold) = create_test_server().await;

    let response = server
        .post("/orders")
        .json(&json!({ "user_id": gold.as_uuid(), "line_items": [] }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let error: ApiError = response.json();
    assert_eq!(error.code, "ORDER_VALIDATION");
}

#[tokio::test]
async fn test_create_order_rejects_negative_price() {
    let (server, gold) = create_test_server().await;

    let response = server
        .post("/orders")
        .json(&json!({
            "user_id": gold.as_uuid(),
            "line_items": [
                { "product_id": Uuid::new_v4(), "quantity": 1, "unit_price": "-1.00" }
            ]
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let error: ApiError = response.json();
    assert_eq!(error.code, "INVALID_AMOUNT");
}

#[tokio::test]
async fn test_get_order_not_found() {
    let (server, _) = create_test_server().await;

    let response = server.get(&format!("/orders/{}", Uuid::new_v4())).await;

    response.assert_status(StatusCode::NOT_FOUND);
    let error: ApiError = response.json();
    assert_eq!(error.code, "ORDER_NOT_FOUND");
}

#[tokio::test]
async fn test_confirm_then_cancel_twice_conflicts() {
    let (server, gold) = create_test_server().await;
    let created: OrderDetailResponse = server
        .post("/orders")
        .json(&order_body(gold))
        .await
        .json();

    let confirmed = server
        .post(&format!("/orders/{}/confirm", created.order_id))
        .await;
    confirmed.assert_status_ok();
    let summary: OrderSummaryResponse = confirmed.json();
    assert_eq!(summary.status, "Confirmed");

    let cancelled = server
        .post(&format!("/orders/{}/cancel", created.order_id))
        .await;
    cancelled.assert_status_ok();

    let again = server
        .post(&format!("/orders/{}/cancel", created.order_id))
        .await;
    again.assert_status(StatusCode::CONFLICT);
    let error: ApiError = again.json();
    assert_eq!(error.code, "INVALID_ORDER_STATE");
}

#[tokio::test]
async fn test_list_orders_filters_by_status() {
    let (server, gold) = create_test_server().await;
    let first: OrderDetailResponse = server
        .post("/orders")
        .json(&order_body(gold))
        .await
        .json();
    server.post("/orders").json(&order_body(gold)).await;
    server
        .post(&format!("/orders/{}/cancel", first.order_id))
        .await
        .assert_status_ok();

    let all: Vec<OrderSummaryResponse> = server.get("/orders").await.json();
    let cancelled: Vec<OrderSummaryResponse> = server
        .get("/orders")
        .add_query_param("status", "Cancelled")
        .await
        .json();

    assert_eq!(all.len(), 2);
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].order_id, first.order_id);

    server
        .get("/orders")
        .add_query_param("status", "Shipped")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
