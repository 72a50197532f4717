use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapter::driver::request_dto::{CreateOrderRequest, OrdersQueryParams};
use crate::adapter::driver::response_dto::{OrderDetailResponse, OrderSummaryResponse};
use crate::application::service::{OrderApplicationService, OrderQueryService};
use crate::application::ApplicationError;
use crate::domain::error::DomainError;
use crate::domain::model::{OrderId, OrderStatus};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// ハンドラーが共有する状態
#[derive(Clone)]
pub struct AppState {
    pub order_service: Arc<OrderApplicationService>,
    pub order_query_service: Arc<OrderQueryService>,
}

/// REST APIルーターを作成
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/orders", post(create_order).get(get_orders))
        .route("/orders/:order_id", get(get_order_by_id))
        .route("/orders/:order_id/confirm", post(confirm_order))
        .route("/orders/:order_id/cancel", post(cancel_order))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "order-discount-saga",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// 注文作成エンドポイント
// 割引サーガが失敗しても注文は作成される（割引なし）
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderDetailResponse>)> {
    let command = request.into_command().map_err(map_domain_error)?;

    let order = state
        .order_service
        .create_order(command)
        .await
        .map_err(map_application_error)?;

    let detail = state
        .order_query_service
        .get_order_detail(order.id())
        .await
        .map_err(map_application_error)?;
    let response = match detail {
        Some(detail) => OrderDetailResponse::from_detail(&detail),
        None => OrderDetailResponse::from_order(&order, &[]),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

// 注文一覧取得エンドポイント（statusで絞り込み可能）
async fn get_orders(
    State(state): State<AppState>,
    Query(params): Query<OrdersQueryParams>,
) -> ApiResult<Json<Vec<OrderSummaryResponse>>> {
    let orders = match params.status {
        Some(status) => {
            let status = OrderStatus::from_string(&status).map_err(|_| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiError {
                        error: format!("無効なステータスです: {}", status),
                        code: "INVALID_STATUS".to_string(),
                    }),
                )
            })?;
            state.order_query_service.get_orders_by_status(status).await
        }
        None => state.order_query_service.get_all_orders().await,
    }
    .map_err(map_application_error)?;

    Ok(Json(
        orders.iter().map(OrderSummaryResponse::from_order).collect(),
    ))
}

// 注文詳細取得エンドポイント
async fn get_order_by_id(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<OrderDetailResponse>> {
    let detail = state
        .order_query_service
        .get_order_detail(OrderId::from_uuid(order_id))
        .await
        .map_err(map_application_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiError {
                    error: "指定された注文が見つかりません".to_string(),
                    code: "ORDER_NOT_FOUND".to_string(),
                }),
            )
        })?;

    Ok(Json(OrderDetailResponse::from_detail(&detail)))
}

async fn confirm_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<OrderSummaryResponse>> {
    let order = state
        .order_service
        .confirm_order(OrderId::from_uuid(order_id))
        .await
        .map_err(map_application_error)?;
    Ok(Json(OrderSummaryResponse::from_order(&order)))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<OrderSummaryResponse>> {
    let order = state
        .order_service
        .cancel_order(OrderId::from_uuid(order_id))
        .await
        .map_err(map_application_error)?;
    Ok(Json(OrderSummaryResponse::from_order(&order)))
}

fn api_error(status: StatusCode, error: String, code: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error,
            code: code.to_string(),
        }),
    )
}

// アプリケーションエラーをHTTPエラーにマッピング
fn map_application_error(err: ApplicationError) -> (StatusCode, Json<ApiError>) {
    match err {
        ApplicationError::DomainError(domain_err) => map_domain_error(domain_err),
        ApplicationError::RepositoryError(repo_err) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            repo_err.to_string(),
            "REPOSITORY_ERROR",
        ),
        ApplicationError::OrderNotFound(order_id) => api_error(
            StatusCode::NOT_FOUND,
            format!("指定された注文が見つかりません: {}", order_id),
            "ORDER_NOT_FOUND",
        ),
        ApplicationError::TaskFailed(msg) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            msg,
            "ORDER_PROCESSING_FAILED",
        ),
    }
}

// ドメインエラーをHTTPステータスコードとエラーコードにマッピング
fn map_domain_error(domain_err: DomainError) -> (StatusCode, Json<ApiError>) {
    match domain_err {
        DomainError::InvalidOrderState(msg) => {
            api_error(StatusCode::CONFLICT, msg, "INVALID_ORDER_STATE")
        }
        DomainError::InvalidQuantity => api_error(
            StatusCode::BAD_REQUEST,
            "無効な数量です".to_string(),
            "INVALID_QUANTITY",
        ),
        DomainError::InvalidAmount(msg) => {
            api_error(StatusCode::BAD_REQUEST, msg, "INVALID_AMOUNT")
        }
        DomainError::OrderValidation(msg) => {
            api_error(StatusCode::BAD_REQUEST, msg, "ORDER_VALIDATION")
        }
        DomainError::InvalidValue(msg) => api_error(StatusCode::BAD_REQUEST, msg, "INVALID_VALUE"),
        DomainError::ArithmeticOverflow => api_error(
            StatusCode::BAD_REQUEST,
            "金額の計算が範囲を超えました".to_string(),
            "ARITHMETIC_OVERFLOW",
        ),
        DomainError::DiscountMismatch(msg) => {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, msg, "DISCOUNT_MISMATCH")
        }
    }
}
