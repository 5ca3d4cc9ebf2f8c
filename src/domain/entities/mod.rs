pub mod billing_method;
pub mod coupon;
pub mod goods;
pub mod renewal;
pub mod subscription;
pub mod transaction;
