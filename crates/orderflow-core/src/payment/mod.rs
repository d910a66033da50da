//! Payment service: mock gateway and state machine

pub mod gateway;
pub mod service;

pub use gateway::{ChargeResult, MockGateway, PaymentGateway, RefundResult};
pub use service::{PaymentEventHandler, PaymentService};
