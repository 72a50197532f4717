use crate::adapter::database_error::DatabaseError;
use crate::adapter::driven::order_repository::money_column;
use crate::domain::model::{CorrelationId, DiscountApplication, DiscountType, OrderId};
use crate::domain::port::{DiscountApplicationRepository, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool, Row};
use uuid::Uuid;

/// MySQL割引適用記録リポジトリ
pub struct MySqlDiscountApplicationRepository {
    pool: Pool<MySql>,
}

impl MySqlDiscountApplicationRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DiscountApplicationRepository for MySqlDiscountApplicationRepository {
    async fn replace_for_order(
        &self,
        order_id: OrderId,
        applications: &[DiscountApplication],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            DatabaseError::ConnectionError(format!("トランザクション開始に失敗しました: {}", e))
        })?;

        sqlx::query("DELETE FROM discount_applications WHERE order_id = ?")
            .bind(order_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DatabaseError::QueryError(format!("割引適用記録の削除に失敗しました: {}", e))
            })?;

        for application in applications {
            sqlx::query(
                r#"
                INSERT INTO discount_applications
                    (id, order_id, correlation_id, discount_type, source, amount, applied_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(application.id().to_string())
            .bind(order_id.to_string())
            .bind(application.correlation_id().to_string())
            .bind(application.discount_type().to_string())
            .bind(application.source())
            .bind(application.amount().amount())
            .bind(application.applied_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DatabaseError::QueryError(format!("割引適用記録の保存に失敗しました: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            DatabaseError::QueryError(format!("トランザクションのコミットに失敗しました: {}", e))
        })?;
        Ok(())
    }

    async fn find_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<DiscountApplication>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, correlation_id, discount_type, source, amount, applied_at
            FROM discount_applications
            WHERE order_id = ?
            ORDER BY applied_at, id
            "#,
        )
        .bind(order_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("割引適用記録の取得に失敗しました: {}", e)))?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(DatabaseError::from)?;
                let id = Uuid::parse_str(&id).map_err(|e| {
                    RepositoryError::FetchFailed(format!("割引適用記録IDの解析に失敗しました: {}", e))
                })?;
                let correlation_id: String =
                    row.try_get("correlation_id").map_err(DatabaseError::from)?;
                let correlation_id = CorrelationId::from_string(&correlation_id).map_err(|e| {
                    RepositoryError::FetchFailed(format!("相関IDの解析に失敗しました: {}", e))
                })?;
                let discount_type: String =
                    row.try_get("discount_type").map_err(DatabaseError::from)?;
                let discount_type = DiscountType::from_string(&discount_type).map_err(|e| {
                    RepositoryError::FetchFailed(format!("割引種別の解析に失敗しました: {}", e))
                })?;
                let source: String = row.try_get("source").map_err(DatabaseError::from)?;
                let applied_at: DateTime<Utc> =
                    row.try_get("applied_at").map_err(DatabaseError::from)?;

                Ok(DiscountApplication::reconstruct(
                    id,
                    order_id,
                    correlation_id,
                    discount_type,
                    source,
                    money_column(row, "amount")?,
                    applied_at,
                ))
            })
            .collect()
    }
}
