// 割引計算サーガ
// 注文側の調整役とロイヤリティ側の応答ハンドラーから成る

pub mod orchestrator;
pub mod registry;
pub mod responder;
pub mod rules;
pub mod saga;

pub use orchestrator::{DiscountCall, DiscountOrchestrator};
pub use registry::{PendingCallRegistry, RegistryError};
pub use responder::{CouponUsageHandler, CouponValidationHandler, TierDiscountHandler};
pub use rules::{LocalDiscounts, OrderDiscountRule, OrderDiscountRules, RuleFailure};
pub use saga::{DiscountContext, SagaError, SagaState};
