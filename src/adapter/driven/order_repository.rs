use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{
    DiscountStatus, LineItem, Money, Order, OrderDiscounts, OrderId, OrderStatus, ProductId,
    UserId,
};
use crate::domain::port::{OrderRepository, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, Pool, Row};
use std::collections::HashMap;

const SELECT_ORDERS: &str = r#"
    SELECT id, user_id, coupon_codes, subtotal,
        product_discount, order_level_discount, coupon_discount, tier_discount,
        final_amount, status, discount_status, created_at
    FROM orders
"#;

/// MySQL注文リポジトリ
/// 注文本体を orders、明細を order_line_items に保存する
pub struct MySqlOrderRepository {
    pool: Pool<MySql>,
}

/// DECIMAL列を金額として読む
pub(crate) fn money_column(row: &MySqlRow, column: &str) -> Result<Money, RepositoryError> {
    let amount: Decimal = row.try_get(column).map_err(DatabaseError::from)?;
    Money::new(amount).map_err(|e| {
        RepositoryError::FetchFailed(format!("金額の構築に失敗しました ({}): {}", column, e))
    })
}

impl MySqlOrderRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// 注文IDごとの明細を取得する
    async fn load_line_items(
        &self,
        order_ids: &[String],
    ) -> Result<HashMap<String, Vec<LineItem>>, RepositoryError> {
        let mut items: HashMap<String, Vec<LineItem>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(items);
        }

        let placeholders = vec!["?"; order_ids.len()].join(", ");
        let sql = format!(
            "SELECT order_id, product_id, quantity, unit_price, per_item_discount \
             FROM order_line_items WHERE order_id IN ({}) ORDER BY order_id, line_number",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in order_ids {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("注文明細の取得に失敗しました: {}", e)))?;

        for row in &rows {
            let order_id: String = row.try_get("order_id").map_err(DatabaseError::from)?;
            let product_id: String = row.try_get("product_id").map_err(DatabaseError::from)?;
            let product_id = ProductId::from_string(&product_id).map_err(|e| {
                RepositoryError::FetchFailed(format!("商品IDの解析に失敗しました: {}", e))
            })?;
            let quantity: u32 = row.try_get("quantity").map_err(DatabaseError::from)?;

            let line_item = LineItem::new(
                product_id,
                quantity,
                money_column(row, "unit_price")?,
                money_column(row, "per_item_discount")?,
            )
            .map_err(|e| {
                RepositoryError::FetchFailed(format!("注文明細の構築に失敗しました: {}", e))
            })?;
            items.entry(order_id).or_default().push(line_item);
        }

        Ok(items)
    }

    /// 注文行と明細から注文集約を再構築する
    fn build_order(row: &MySqlRow, line_items: Vec<LineItem>) -> Result<Order, RepositoryError> {
        let id: String = row.try_get("id").map_err(DatabaseError::from)?;
        let order_id = OrderId::from_string(&id).map_err(|e| {
            RepositoryError::FetchFailed(format!("注文IDの解析に失敗しました: {}", e))
        })?;
        let user_id: String = row.try_get("user_id").map_err(DatabaseError::from)?;
        let user_id = UserId::from_string(&user_id).map_err(|e| {
            RepositoryError::FetchFailed(format!("ユーザーIDの解析に失敗しました: {}", e))
        })?;

        let coupon_codes: String = row.try_get("coupon_codes").map_err(DatabaseError::from)?;
        let coupon_codes: Vec<String> = serde_json::from_str(&coupon_codes).map_err(|e| {
            RepositoryError::FetchFailed(format!("クーポンコードの解析に失敗しました: {}", e))
        })?;

        let status: String = row.try_get("status").map_err(DatabaseError::from)?;
        let status = OrderStatus::from_string(&status).map_err(|e| {
            RepositoryError::FetchFailed(format!("注文ステータスの解析に失敗しました: {}", e))
        })?;
        let discount_status: String = row.try_get("discount_status").map_err(DatabaseError::from)?;
        let discount_status = DiscountStatus::from_string(&discount_status).map_err(|e| {
            RepositoryError::FetchFailed(format!("割引ステータスの解析に失敗しました: {}", e))
        })?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(DatabaseError::from)?;

        let discounts = OrderDiscounts {
            product_discount: money_column(row, "product_discount")?,
            order_level_discount: money_column(row, "order_level_discount")?,
            coupon_discount: money_column(row, "coupon_discount")?,
            tier_discount: money_column(row, "tier_discount")?,
        };

        Order::reconstruct(
            order_id,
            user_id,
            line_items,
            coupon_codes,
            money_column(row, "subtotal")?,
            discounts,
            money_column(row, "final_amount")?,
            status,
            discount_status,
            created_at,
        )
        .map_err(|e| RepositoryError::FetchFailed(format!("注文集約の再構築に失敗しました: {}", e)))
    }

    /// 取得した順序を保ったまま注文のリストを構築する
    async fn build_orders_from_rows(&self, rows: Vec<MySqlRow>) -> Result<Vec<Order>, RepositoryError> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::from)?;
        let mut line_items = self.load_line_items(&ids).await?;

        rows.iter()
            .zip(ids.iter())
            .map(|(row, id)| Self::build_order(row, line_items.remove(id).unwrap_or_default()))
            .collect()
    }
}

#[async_trait]
impl OrderRepository for MySqlOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            DatabaseError::ConnectionError(format!("トランザクション開始に失敗しました: {}", e))
        })?;

        let coupon_codes = serde_json::to_string(order.coupon_codes()).map_err(|e| {
            RepositoryError::OperationFailed(format!("クーポンコードの変換に失敗しました: {}", e))
        })?;
        let discounts = order.discounts();

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, coupon_codes, subtotal,
                product_discount, order_level_discount, coupon_discount, tier_discount,
                final_amount, status, discount_status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                product_discount = VALUES(product_discount),
                order_level_discount = VALUES(order_level_discount),
                coupon_discount = VALUES(coupon_discount),
                tier_discount = VALUES(tier_discount),
                final_amount = VALUES(final_amount),
                status = VALUES(status),
                discount_status = VALUES(discount_status)
            "#,
        )
        .bind(order.id().to_string())
        .bind(order.user_id().to_string())
        .bind(coupon_codes)
        .bind(order.subtotal().amount())
        .bind(discounts.product_discount.amount())
        .bind(discounts.order_level_discount.amount())
        .bind(discounts.coupon_discount.amount())
        .bind(discounts.tier_discount.amount())
        .bind(order.final_amount().amount())
        .bind(order.status().to_string())
        .bind(order.discount_status().to_string())
        .bind(order.created_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("注文の保存に失敗しました: {}", e)))?;

        // 明細は注文作成後に変わらないが、保存のたびに置き換えて整合させる
        sqlx::query("DELETE FROM order_line_items WHERE order_id = ?")
            .bind(order.id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("注文明細の削除に失敗しました: {}", e)))?;

        for (line_number, item) in order.line_items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_line_items
                    (order_id, line_number, product_id, quantity, unit_price, per_item_discount)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(order.id().to_string())
            .bind(line_number as u32)
            .bind(item.product_id().to_string())
            .bind(item.quantity())
            .bind(item.unit_price().amount())
            .bind(item.per_item_discount().amount())
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("注文明細の保存に失敗しました: {}", e)))?;
        }

        tx.commit().await.map_err(|e| {
            DatabaseError::QueryError(format!("トランザクションのコミットに失敗しました: {}", e))
        })?;

        Ok(())
    }

    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("{} WHERE id = ?", SELECT_ORDERS);
        let row = sqlx::query(&sql)
            .bind(order_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("注文の取得に失敗しました: {}", e)))?;

        match row {
            Some(row) => Ok(self.build_orders_from_rows(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!("{} ORDER BY created_at DESC", SELECT_ORDERS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("注文一覧の取得に失敗しました: {}", e)))?;

        self.build_orders_from_rows(rows).await
    }

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!("{} WHERE status = ? ORDER BY created_at DESC", SELECT_ORDERS);
        let rows = sqlx::query(&sql)
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                DatabaseError::QueryError(format!("ステータス別注文一覧の取得に失敗しました: {}", e))
            })?;

        self.build_orders_from_rows(rows).await
    }

    fn next_identity(&self) -> OrderId {
        OrderId::new()
    }
}
