use order_discount_saga::adapter::driven::{
    ChannelConfig, InMemoryMessageChannel, MySqlCouponRepository,
    MySqlDiscountApplicationRepository, MySqlMembershipRepository, MySqlOrderRepository,
    TracingLogger,
};
use order_discount_saga::adapter::driver::rest_api::{create_router, AppState};
use order_discount_saga::adapter::{DatabaseConfig, DatabaseMigration, SagaConfig};
use order_discount_saga::application::service::{OrderApplicationService, OrderQueryService};
use order_discount_saga::domain::discount::{
    CouponUsageHandler, CouponValidationHandler, DiscountOrchestrator, OrderDiscountRules,
    PendingCallRegistry, TierDiscountHandler,
};
use order_discount_saga::domain::message::{
    CouponUsageNotification, CouponValidationRequest, CouponValidationResponse,
    TierDiscountRequest, TierDiscountResponse,
};
use order_discount_saga::domain::port::{Logger, MessageChannel};

use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .envファイルから環境変数を読み込む
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let database_config = DatabaseConfig::from_env()?;
    let saga_config = SagaConfig::from_env()?;
    info!(
        host = %database_config.host,
        port = database_config.port,
        timeout_ms = saga_config.discount_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let pool = database_config.connect().await?;
    DatabaseMigration::new(pool.clone()).run().await?;

    let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new());

    // 注文側とロイヤリティ側は同じチャネルをトピック経由で共有する
    let channel = InMemoryMessageChannel::new(ChannelConfig::default(), logger.clone());
    let shared_channel: Arc<dyn MessageChannel> = Arc::new(channel.clone());

    let order_repository = Arc::new(MySqlOrderRepository::new(pool.clone()));
    let discount_application_repository =
        Arc::new(MySqlDiscountApplicationRepository::new(pool.clone()));
    let coupon_repository = Arc::new(MySqlCouponRepository::new(pool.clone()));
    let membership_repository = Arc::new(MySqlMembershipRepository::new(pool.clone()));

    // ロイヤリティ側
    channel
        .subscribe::<CouponValidationRequest, _>(CouponValidationHandler::new(
            coupon_repository.clone(),
            shared_channel.clone(),
            logger.clone(),
        ))
        .await?;
    channel
        .subscribe::<TierDiscountRequest, _>(TierDiscountHandler::new(
            membership_repository,
            shared_channel.clone(),
            logger.clone(),
        ))
        .await?;
    channel
        .subscribe::<CouponUsageNotification, _>(CouponUsageHandler::new(
            coupon_repository,
            logger.clone(),
        ))
        .await?;

    // 注文側
    let registry = Arc::new(PendingCallRegistry::new());
    let orchestrator = Arc::new(DiscountOrchestrator::new(
        registry.clone(),
        shared_channel.clone(),
        OrderDiscountRules::standard(),
        logger.clone(),
    ));
    channel
        .subscribe::<CouponValidationResponse, _>(orchestrator.clone())
        .await?;
    channel
        .subscribe::<TierDiscountResponse, _>(orchestrator.clone())
        .await?;

    let _sweeper = registry.spawn_sweeper(
        saga_config.sweep_interval,
        saga_config.max_pending_age,
        logger.clone(),
    );

    let order_service = OrderApplicationService::new(
        order_repository.clone(),
        discount_application_repository.clone(),
        orchestrator,
        shared_channel,
        logger,
        saga_config.discount_timeout,
    );
    let order_query_service =
        OrderQueryService::new(order_repository, discount_application_repository);

    let app_state = AppState {
        order_service: Arc::new(order_service),
        order_query_service: Arc::new(order_query_service),
    };

    let app = create_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&saga_config.bind_address).await?;
    info!(address = %saga_config.bind_address, "REST API server started");

    axum::serve(listener, app).await?;

    Ok(())
}
