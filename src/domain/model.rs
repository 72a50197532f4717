// ドメインモデル（エンティティと値オブジェクト）

mod coupon;
mod discount_application;
mod membership;
mod order;
mod value_objects;

pub use value_objects::{
    CorrelationId, OrderId, ProductId, UserId,
    Money,
    LineItem,
    OrderStatus,
    DiscountStatus,
};

pub use coupon::{
    Coupon, CouponDiscountType, CouponRejection, CouponUsage, CouponUsageStatus,
    ReservationOutcome,
};
pub use discount_application::{DiscountApplication, DiscountType};
pub use membership::{Membership, MembershipTier};
pub use order::{Order, OrderDiscounts};
