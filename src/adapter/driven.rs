// 駆動される側アダプター（リポジトリ、メッセージチャネル、ロガーの実装）

mod coupon_repository;
mod discount_application_repository;
mod in_memory_channel;
mod membership_repository;
mod order_repository;
mod tracing_logger;

pub use coupon_repository::MySqlCouponRepository;
pub use discount_application_repository::MySqlDiscountApplicationRepository;
pub use in_memory_channel::{ChannelConfig, DeadLetterEntry, InMemoryMessageChannel};
pub use membership_repository::MySqlMembershipRepository;
pub use order_repository::MySqlOrderRepository;
pub use tracing_logger::TracingLogger;
