//! Inventory service: products, atomic reservations, expiry

pub mod handlers;
pub mod service;
pub mod sweeper;

pub use handlers::InventoryEventHandler;
pub use service::InventoryService;
pub use sweeper::ExpirySweeper;
