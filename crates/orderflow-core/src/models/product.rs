use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Product / SKU entity (inventory-owned)
///
/// `available` is never stored; it is always `stock_quantity - reserved_quantity`
/// and must be >= 0 at every committed state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub reserved_quantity: i32,
    pub sold_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Units that can still be reserved
    pub fn available_quantity(&self) -> i32 {
        self.stock_quantity - self.reserved_quantity
    }
}

/// Create product request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    pub description: Option<String>,

    pub category: Option<String>,

    pub price: Decimal,

    #[serde(default)]
    pub stock_quantity: i32,
}

/// Admin stock adjustment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StockOperation {
    Set,
    Add,
    Subtract,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockUpdateRequest {
    pub quantity: i32,
    #[serde(default = "default_operation")]
    pub operation: StockOperation,
}

fn default_operation() -> StockOperation {
    StockOperation::Set
}

impl StockOperation {
    /// Apply the operation to a current stock level, rejecting underflow
    pub fn apply(self, current: i32, quantity: i32) -> Result<i32, crate::Error> {
        match self {
            StockOperation::Set => {
                if quantity < 0 {
                    return Err(crate::Error::validation("Stock cannot be negative"));
                }
                Ok(quantity)
            }
            StockOperation::Add => Ok(current + quantity),
            StockOperation::Subtract => {
                if current < quantity {
                    return Err(crate::Error::validation("Insufficient stock"));
                }
                Ok(current - quantity)
            }
        }
    }
}

/// Public product view with the derived availability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub reserved_quantity: i32,
    pub available_quantity: i32,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        let available_quantity = product.available_quantity();
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            category: product.category,
            price: product.price,
            stock_quantity: product.stock_quantity,
            reserved_quantity: product.reserved_quantity,
            available_quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(stock: i32, reserved: i32) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Widget".to_string(),
            description: None,
            category: Some("tools".to_string()),
            price: dec!(10.00),
            stock_quantity: stock,
            reserved_quantity: reserved,
            sold_quantity: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_available_quantity() {
        assert_eq!(product(100, 25).available_quantity(), 75);
        assert_eq!(product(10, 10).available_quantity(), 0);
    }

    #[test]
    fn test_stock_operation_apply() {
        assert_eq!(StockOperation::Set.apply(5, 42).unwrap(), 42);
        assert_eq!(StockOperation::Add.apply(5, 3).unwrap(), 8);
        assert_eq!(StockOperation::Subtract.apply(5, 3).unwrap(), 2);
    }

    #[test]
    fn test_stock_operation_underflow() {
        assert!(StockOperation::Subtract.apply(2, 3).is_err());
        assert!(StockOperation::Set.apply(0, -1).is_err());
    }

    #[test]
    fn test_stock_operation_wire_names() {
        assert_eq!(
            serde_json::from_str::<StockOperation>("\"subtract\"").unwrap(),
            StockOperation::Subtract
        );
    }
}
