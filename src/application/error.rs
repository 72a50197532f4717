use crate::domain::error::DomainError;
use crate::domain::model::OrderId;
use crate::domain::port::RepositoryError;

/// 注文ユースケースのエラー
/// 割引サーガの失敗は注文作成を止めないため、ここには現れない
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationError {
    /// 注文が不正、または状態遷移が許されない
    DomainError(DomainError),
    /// 注文または割引適用記録の永続化に失敗
    RepositoryError(RepositoryError),
    /// 指定された注文が存在しない
    OrderNotFound(OrderId),
    /// 注文処理のタスクが完了しなかった
    TaskFailed(String),
}

impl std::fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationError::DomainError(err) => write!(f, "Domain error: {}", err),
            ApplicationError::RepositoryError(err) => write!(f, "Repository error: {}", err),
            ApplicationError::OrderNotFound(id) => write!(f, "Order not found: {}", id),
            ApplicationError::TaskFailed(msg) => write!(f, "Order processing failed: {}", msg),
        }
    }
}

impl std::error::Error for ApplicationError {}

impl From<DomainError> for ApplicationError {
    fn from(err: DomainError) -> Self {
        ApplicationError::DomainError(err)
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        ApplicationError::RepositoryError(err)
    }
}
