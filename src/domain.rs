pub mod channel;
pub mod discount;
pub mod error;
pub mod message;
pub mod model;
pub mod port;
pub mod serialization;
