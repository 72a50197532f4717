use crate::adapter::database_error::DatabaseError;
use crate::adapter::driven::order_repository::money_column;
use crate::domain::model::{
    Coupon, CouponDiscountType, CouponUsage, CouponUsageStatus, CorrelationId, OrderId,
    ReservationOutcome, UserId,
};
use crate::domain::port::{CouponRepository, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, Pool, Row};

/// MySQLクーポンリポジトリ（ロイヤリティ側）
/// クーポン定義と利用記録を扱う
pub struct MySqlCouponRepository {
    pool: Pool<MySql>,
}

impl MySqlCouponRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    fn optional_money(
        row: &MySqlRow,
        column: &str,
    ) -> Result<Option<crate::domain::model::Money>, RepositoryError> {
        let amount: Option<Decimal> = row.try_get(column).map_err(DatabaseError::from)?;
        match amount {
            Some(_) => money_column(row, column).map(Some),
            None => Ok(None),
        }
    }

    fn build_coupon(row: &MySqlRow) -> Result<Coupon, RepositoryError> {
        let discount_type: String = row.try_get("discount_type").map_err(DatabaseError::from)?;
        let discount_type = CouponDiscountType::from_string(&discount_type).map_err(|e| {
            RepositoryError::FetchFailed(format!("クーポン割引種別の解析に失敗しました: {}", e))
        })?;

        Ok(Coupon::reconstruct(
            row.try_get("code").map_err(DatabaseError::from)?,
            discount_type,
            row.try_get("discount_value").map_err(DatabaseError::from)?,
            Self::optional_money(row, "max_discount_amount")?,
            Self::optional_money(row, "min_purchase_amount")?,
            row.try_get("valid_from").map_err(DatabaseError::from)?,
            row.try_get("valid_until").map_err(DatabaseError::from)?,
            row.try_get("usage_limit_per_user").map_err(DatabaseError::from)?,
            row.try_get("total_usage_limit").map_err(DatabaseError::from)?,
            row.try_get("active").map_err(DatabaseError::from)?,
        ))
    }

    fn build_usage(row: &MySqlRow) -> Result<CouponUsage, RepositoryError> {
        let user_id: String = row.try_get("user_id").map_err(DatabaseError::from)?;
        let user_id = UserId::from_string(&user_id).map_err(|e| {
            RepositoryError::FetchFailed(format!("ユーザーIDの解析に失敗しました: {}", e))
        })?;
        let correlation_id: String = row.try_get("correlation_id").map_err(DatabaseError::from)?;
        let correlation_id = CorrelationId::from_string(&correlation_id).map_err(|e| {
            RepositoryError::FetchFailed(format!("相関IDの解析に失敗しました: {}", e))
        })?;
        let order_id: Option<String> = row.try_get("order_id").map_err(DatabaseError::from)?;
        let order_id = order_id
            .map(|id| OrderId::from_string(&id))
            .transpose()
            .map_err(|e| {
                RepositoryError::FetchFailed(format!("注文IDの解析に失敗しました: {}", e))
            })?;
        let status: String = row.try_get("status").map_err(DatabaseError::from)?;
        let status = CouponUsageStatus::from_string(&status).map_err(|e| {
            RepositoryError::FetchFailed(format!("クーポン利用状態の解析に失敗しました: {}", e))
        })?;
        let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(DatabaseError::from)?;

        Ok(CouponUsage::reconstruct(
            row.try_get("coupon_code").map_err(DatabaseError::from)?,
            user_id,
            correlation_id,
            order_id,
            status,
            recorded_at,
        ))
    }
}

#[async_trait]
impl CouponRepository for MySqlCouponRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT code, discount_type, discount_value, max_discount_amount, min_purchase_amount,
                valid_from, valid_until, usage_limit_per_user, total_usage_limit, active
            FROM coupons
            WHERE code = ?
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("クーポンの取得に失敗しました: {}", e)))?;

        row.as_ref().map(Self::build_coupon).transpose()
    }

    async fn save(&self, coupon: &Coupon) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO coupons (
                code, discount_type, discount_value, max_discount_amount, min_purchase_amount,
                valid_from, valid_until, usage_limit_per_user, total_usage_limit, active
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                discount_type = VALUES(discount_type),
                discount_value = VALUES(discount_value),
                max_discount_amount = VALUES(max_discount_amount),
                min_purchase_amount = VALUES(min_purchase_amount),
                valid_from = VALUES(valid_from),
                valid_until = VALUES(valid_until),
                usage_limit_per_user = VALUES(usage_limit_per_user),
                total_usage_limit = VALUES(total_usage_limit),
                active = VALUES(active)
            "#,
        )
        .bind(coupon.code())
        .bind(coupon.discount_type().to_string())
        .bind(coupon.value())
        .bind(coupon.max_discount_amount().map(|m| m.amount()))
        .bind(coupon.min_purchase_amount().map(|m| m.amount()))
        .bind(coupon.valid_from())
        .bind(coupon.valid_until())
        .bind(coupon.usage_limit_per_user())
        .bind(coupon.total_usage_limit())
        .bind(coupon.is_active())
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("クーポンの保存に失敗しました: {}", e)))?;
        Ok(())
    }

    async fn find_usages(&self, code: &str) -> Result<Vec<CouponUsage>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT coupon_code, correlation_id, user_id, order_id, status, recorded_at
            FROM coupon_usages
            WHERE coupon_code = ?
            "#,
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DatabaseError::QueryError(format!("クーポン利用記録の取得に失敗しました: {}", e))
        })?;

        rows.iter().map(Self::build_usage).collect()
    }

    async fn save_usage(&self, usage: &CouponUsage) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO coupon_usages
                (coupon_code, correlation_id, user_id, order_id, status, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                order_id = VALUES(order_id),
                status = VALUES(status),
                recorded_at = VALUES(recorded_at)
            "#,
        )
        .bind(usage.coupon_code())
        .bind(usage.correlation_id().to_string())
        .bind(usage.user_id().to_string())
        .bind(usage.order_id().map(|id| id.to_string()))
        .bind(usage.status().to_string())
        .bind(usage.recorded_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DatabaseError::QueryError(format!("クーポン利用記録の保存に失敗しました: {}", e))
        })?;
        Ok(())
    }

    async fn try_reserve(
        &self,
        coupon: &Coupon,
        usage: &CouponUsage,
    ) -> Result<ReservationOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            DatabaseError::ConnectionError(format!("トランザクション開始に失敗しました: {}", e))
        })?;

        // クーポン行をロックして、同じクーポンへの予約を直列化する
        sqlx::query("SELECT code FROM coupons WHERE code = ? FOR UPDATE")
            .bind(coupon.code())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                DatabaseError::QueryError(format!("クーポンのロックに失敗しました: {}", e))
            })?;

        let rows = sqlx::query(
            r#"
            SELECT coupon_code, correlation_id, user_id, order_id, status, recorded_at
            FROM coupon_usages
            WHERE coupon_code = ?
            "#,
        )
        .bind(coupon.code())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            DatabaseError::QueryError(format!("クーポン利用記録の取得に失敗しました: {}", e))
        })?;
        let usages = rows
            .iter()
            .map(Self::build_usage)
            .collect::<Result<Vec<_>, _>>()?;

        let outcome = coupon.reservation_outcome(&usages, usage);
        if outcome == ReservationOutcome::Reserved {
            sqlx::query(
                r#"
                INSERT INTO coupon_usages
                    (coupon_code, correlation_id, user_id, order_id, status, recorded_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(usage.coupon_code())
            .bind(usage.correlation_id().to_string())
            .bind(usage.user_id().to_string())
            .bind(usage.order_id().map(|id| id.to_string()))
            .bind(usage.status().to_string())
            .bind(usage.recorded_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DatabaseError::QueryError(format!("クーポンの予約に失敗しました: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            DatabaseError::QueryError(format!("トランザクションのコミットに失敗しました: {}", e))
        })?;

        Ok(outcome)
    }
}
