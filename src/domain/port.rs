// 出力ポート
// ドメイン層が外部に依存する機能をトレイトとして定義
// アダプター層でこれらのトレイトを実装する

use crate::domain::message::Envelope;
use crate::domain::model::{
    Coupon, CouponUsage, DiscountApplication, Membership, Order, OrderId, OrderStatus,
    ReservationOutcome, UserId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// ロガートレイト
/// ログ出力を抽象化するポート
pub trait Logger: Send + Sync {
    /// デバッグレベルのログを出力
    fn debug(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// 情報レベルのログを出力
    fn info(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// 警告レベルのログを出力
    fn warn(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// エラーレベルのログを出力
    fn error(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );
}

/// リポジトリエラー型
/// リポジトリ操作で発生するエラーを表現する
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::enum_variant_names)]
pub enum RepositoryError {
    /// データベース接続に失敗
    ConnectionFailed(String),
    /// 操作に失敗
    OperationFailed(String),
    /// データの取得に失敗
    FetchFailed(String),
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            RepositoryError::OperationFailed(msg) => write!(f, "Operation failed: {}", msg),
            RepositoryError::FetchFailed(msg) => write!(f, "Fetch failed: {}", msg),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// 注文リポジトリトレイト
/// 注文集約の永続化を抽象化する
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// 注文を保存する（存在すれば更新）
    ///
    /// # Returns
    /// * `Ok(())` - 保存成功
    /// * `Err(RepositoryError)` - 保存失敗
    async fn save(&self, order: &Order) -> Result<(), RepositoryError>;

    /// 注文IDで注文を検索する
    ///
    /// # Returns
    /// * `Ok(Some(Order))` - 注文が見つかった
    /// * `Ok(None)` - 注文が見つからなかった
    /// * `Err(RepositoryError)` - 検索失敗
    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// すべての注文を作成日時の降順で取得する
    async fn find_all(&self) -> Result<Vec<Order>, RepositoryError>;

    /// 指定されたステータスの注文を作成日時の降順で取得する
    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError>;

    /// 新しい一意の注文IDを生成する
    fn next_identity(&self) -> OrderId;
}

/// 割引適用記録のリポジトリ
#[async_trait]
pub trait DiscountApplicationRepository: Send + Sync {
    /// 注文の割引適用記録を置き換える
    /// 同じ注文の既存の記録は削除される
    async fn replace_for_order(
        &self,
        order_id: OrderId,
        applications: &[DiscountApplication],
    ) -> Result<(), RepositoryError>;

    /// 注文の割引適用記録を取得する
    async fn find_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<DiscountApplication>, RepositoryError>;
}

/// クーポンリポジトリ（ロイヤリティ側）
#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// 正規化済みのコードでクーポンを検索する
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, RepositoryError>;

    /// クーポンを保存する
    async fn save(&self, coupon: &Coupon) -> Result<(), RepositoryError>;

    /// クーポンの利用記録（予約を含む）をすべて取得する
    async fn find_usages(&self, code: &str) -> Result<Vec<CouponUsage>, RepositoryError>;

    /// 利用記録を保存する
    /// クーポンコードと相関IDの組が既にあれば更新する
    async fn save_usage(&self, usage: &CouponUsage) -> Result<(), RepositoryError>;

    /// 利用上限を確かめて予約を書き込む
    ///
    /// 判定（`Coupon::reservation_outcome`）と書き込みは不可分に行う。
    /// 同じクーポンに対する並行した予約が、両方とも上限の内側だと判定されてはならない。
    async fn try_reserve(
        &self,
        coupon: &Coupon,
        usage: &CouponUsage,
    ) -> Result<ReservationOutcome, RepositoryError>;
}

/// 会員リポジトリ（ロイヤリティ側）
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Membership>, RepositoryError>;

    async fn save(&self, membership: &Membership) -> Result<(), RepositoryError>;
}

/// メッセージチャネルエラー
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("Message publishing failed: {0}")]
    PublishingFailed(String),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
}

/// メッセージチャネルトレイト
/// トピックへのメッセージ発行を抽象化するポート
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// メッセージを発行する
    /// 同じキーのメッセージは発行順に配信される
    async fn publish(&self, envelope: Envelope) -> Result<(), ChannelError>;
}
