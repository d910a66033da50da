//! Domain entities and wire DTOs for the four services

pub mod order;
pub mod payment;
pub mod product;
pub mod reservation;
pub mod user;

pub use order::{CreateOrderItem, CreateOrderRequest, Order, OrderItem, OrderResponse, OrderStatus};
pub use payment::{
    CreatePaymentRequest, Payment, PaymentMethod, PaymentResponse, PaymentStatus, RefundRequest,
};
pub use product::{
    CreateProductRequest, Product, ProductResponse, StockOperation, StockUpdateRequest,
};
pub use reservation::{Reservation, ReservationStatus, ReserveOutcome};
pub use user::{LoginRequest, RegisterRequest, Token, User, UserResponse};
