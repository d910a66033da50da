//! Payment gateway abstraction
//!
//! The mock gateway stands in for a real processor behind the same interface:
//! a bounded-latency charge call with a configurable decline rate.

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

use crate::models::PaymentMethod;
use crate::Result;

/// Outcome of a charge attempt
#[derive(Debug, Clone)]
pub struct ChargeResult {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub message: String,
}

/// Outcome of a refund attempt
#[derive(Debug, Clone)]
pub struct RefundResult {
    pub success: bool,
    pub refund_id: Option<String>,
    pub message: String,
}

/// Payment gateway trait
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Charge an amount; a `success=false` result is a non-retryable decline
    async fn charge(&self, amount: Decimal, method: PaymentMethod) -> Result<ChargeResult>;

    /// Refund a previously completed transaction
    async fn refund(&self, transaction_id: &str, amount: Decimal) -> Result<RefundResult>;
}

/// Simulated external gateway
pub struct MockGateway {
    success_rate: f64,
    refund_success_rate: f64,
    latency_ms: (u64, u64),
    refund_latency_ms: (u64, u64),
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            success_rate: 0.95,
            refund_success_rate: 0.98,
            latency_ms: (500, 2000),
            refund_latency_ms: (300, 1000),
        }
    }

    /// Deterministic variant for tests
    pub fn with_success_rate(success_rate: f64) -> Self {
        Self {
            success_rate,
            refund_success_rate: success_rate,
            latency_ms: (0, 0),
            refund_latency_ms: (0, 0),
        }
    }

    async fn simulate_latency(span: (u64, u64)) {
        let (min, max) = span;
        let wait = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        if wait > 0 {
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
    }

    fn roll(rate: f64) -> bool {
        rand::thread_rng().gen_bool(rate.clamp(0.0, 1.0))
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

const DECLINE_MESSAGES: &[&str] = &[
    "Card declined",
    "Insufficient funds",
    "Payment gateway timeout",
    "Invalid card details",
];

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn charge(&self, _amount: Decimal, _method: PaymentMethod) -> Result<ChargeResult> {
        Self::simulate_latency(self.latency_ms).await;

        if Self::roll(self.success_rate) {
            Ok(ChargeResult {
                success: true,
                transaction_id: Some(format!(
                    "TXN-{}",
                    Uuid::new_v4().simple().to_string()[..12].to_uppercase()
                )),
                message: "Payment processed successfully".to_string(),
            })
        } else {
            let message = DECLINE_MESSAGES
                [rand::thread_rng().gen_range(0..DECLINE_MESSAGES.len())]
            .to_string();
            Ok(ChargeResult {
                success: false,
                transaction_id: None,
                message,
            })
        }
    }

    async fn refund(&self, _transaction_id: &str, _amount: Decimal) -> Result<RefundResult> {
        Self::simulate_latency(self.refund_latency_ms).await;

        if Self::roll(self.refund_success_rate) {
            Ok(RefundResult {
                success: true,
                refund_id: Some(format!(
                    "REF-{}",
                    Uuid::new_v4().simple().to_string()[..12].to_uppercase()
                )),
                message: "Refund processed successfully".to_string(),
            })
        } else {
            Ok(RefundResult {
                success: false,
                refund_id: None,
                message: "Refund processing failed".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_charge_always_succeeds_at_rate_one() {
        let gateway = MockGateway::with_success_rate(1.0);
        for _ in 0..20 {
            let result = gateway
                .charge(dec!(10.00), PaymentMethod::CreditCard)
                .await
                .unwrap();
            assert!(result.success);
            let txn = result.transaction_id.unwrap();
            assert!(txn.starts_with("TXN-"));
            assert_eq!(txn.len(), 16);
        }
    }

    #[tokio::test]
    async fn test_charge_always_declines_at_rate_zero() {
        let gateway = MockGateway::with_success_rate(0.0);
        for _ in 0..20 {
            let result = gateway
                .charge(dec!(10.00), PaymentMethod::CreditCard)
                .await
                .unwrap();
            assert!(!result.success);
            assert!(result.transaction_id.is_none());
            assert!(DECLINE_MESSAGES.contains(&result.message.as_str()));
        }
    }

    #[tokio::test]
    async fn test_refund_shape() {
        let gateway = MockGateway::with_success_rate(1.0);
        let result = gateway.refund("TXN-ABC", dec!(10.00)).await.unwrap();
        assert!(result.success);
        assert!(result.refund_id.unwrap().starts_with("REF-"));
    }
}
