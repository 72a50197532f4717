use crate::adapter::database_error::DatabaseError;
use sqlx::{MySql, Pool};

/// 適用順に並べたマイグレーション
const MIGRATIONS: [(&str, &str); 6] = [
    (
        "001_create_orders_table",
        include_str!("../../migrations/001_create_orders_table.sql"),
    ),
    (
        "002_create_order_line_items_table",
        include_str!("../../migrations/002_create_order_line_items_table.sql"),
    ),
    (
        "003_create_discount_applications_table",
        include_str!("../../migrations/003_create_discount_applications_table.sql"),
    ),
    (
        "004_create_coupons_table",
        include_str!("../../migrations/004_create_coupons_table.sql"),
    ),
    (
        "005_create_coupon_usages_table",
        include_str!("../../migrations/005_create_coupon_usages_table.sql"),
    ),
    (
        "006_create_memberships_table",
        include_str!("../../migrations/006_create_memberships_table.sql"),
    ),
];

/// データベースマイグレーションを管理する構造体
pub struct DatabaseMigration {
    pool: Pool<MySql>,
}

impl DatabaseMigration {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// マイグレーションを実行
    /// べき等性を保証（CREATE TABLE IF NOT EXISTS）
    pub async fn run(&self) -> Result<(), DatabaseError> {
        for (name, migration_sql) in MIGRATIONS.iter() {
            tracing::info!(migration = *name, "Running migration");
            sqlx::query(migration_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    DatabaseError::MigrationError(format!("Migration {} failed: {}", name, e))
                })?;
        }

        tracing::info!(count = MIGRATIONS.len(), "All migrations completed");
        Ok(())
    }
}
