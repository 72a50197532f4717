/// ドメイン層のエラー型
/// ビジネスルール違反を表現する
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 無効な注文状態（例: キャンセル済みの注文を確定しようとした）
    InvalidOrderState(String),
    /// 無効な数量（例: 0以下の数量）
    InvalidQuantity,
    /// 無効な金額（例: 負の金額）
    InvalidAmount(String),
    /// 注文の検証失敗（例: 明細が空の注文を作成しようとした）
    OrderValidation(String),
    /// 割引結果が注文の不変条件を満たさない
    DiscountMismatch(String),
    /// 金額計算のオーバーフロー
    ArithmeticOverflow,
    /// 無効な値
    InvalidValue(String),
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainError::InvalidOrderState(msg) => write!(f, "Invalid order state: {}", msg),
            DomainError::InvalidQuantity => write!(f, "Invalid quantity"),
            DomainError::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),
            DomainError::OrderValidation(msg) => write!(f, "Order validation failed: {}", msg),
            DomainError::DiscountMismatch(msg) => write!(f, "Discount mismatch: {}", msg),
            DomainError::ArithmeticOverflow => write!(f, "Arithmetic overflow"),
            DomainError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
        }
    }
}

impl std::error::Error for DomainError {}
