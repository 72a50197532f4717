use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{Membership, MembershipTier, UserId};
use crate::domain::port::{MembershipRepository, RepositoryError};
use async_trait::async_trait;
use sqlx::{MySql, Pool, Row};

/// MySQL会員リポジトリ（ロイヤリティ側）
pub struct MySqlMembershipRepository {
    pool: Pool<MySql>,
}

impl MySqlMembershipRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipRepository for MySqlMembershipRepository {
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Membership>, RepositoryError> {
        let row = sqlx::query("SELECT tier FROM memberships WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("会員情報の取得に失敗しました: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let tier: String = row.try_get("tier").map_err(DatabaseError::from)?;
        let tier = MembershipTier::from_string(&tier).map_err(|e| {
            RepositoryError::FetchFailed(format!("会員ランクの解析に失敗しました: {}", e))
        })?;
        Ok(Some(Membership::new(user_id, tier)))
    }

    async fn save(&self, membership: &Membership) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO memberships (user_id, tier)
            VALUES (?, ?)
            ON DUPLICATE KEY UPDATE tier = VALUES(tier)
            "#,
        )
        .bind(membership.user_id().to_string())
        .bind(membership.tier().to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("会員情報の保存に失敗しました: {}", e)))?;
        Ok(())
    }
}
