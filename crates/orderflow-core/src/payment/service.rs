//! Payment service
//!
//! Owns the payment aggregate. The event path consumes `payment.initiated`
//! from the saga; the HTTP path offers a synchronous charge plus refunds.
//! Either way, the terminal event leaves through the outbox in the same
//! transaction as the status write.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::bus::consumer::EventHandler;
use crate::bus::envelope::{EventEnvelope, EventKind, PartitionKey, Topics};
use crate::bus::payloads::{
    PaymentCompletedPayload, PaymentFailedPayload, PaymentInitiatedPayload,
    PaymentRefundedPayload,
};
use crate::models::{CreatePaymentRequest, Payment, PaymentMethod, PaymentResponse, PaymentStatus};
use crate::outbox::{OutboxEvent, OutboxRepository};
use crate::payment::gateway::{ChargeResult, PaymentGateway};
use crate::repository::Database;
use crate::{Error, Result};

pub struct PaymentService {
    db: Database,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: Duration,
}

impl PaymentService {
    pub fn new(db: Database, gateway: Arc<dyn PaymentGateway>, gateway_timeout_seconds: u64) -> Self {
        Self {
            db,
            gateway,
            gateway_timeout: Duration::from_secs(gateway_timeout_seconds),
        }
    }

    /// Charge through the gateway under a deadline
    async fn charge_with_deadline(
        &self,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<ChargeResult> {
        tokio::time::timeout(self.gateway_timeout, self.gateway.charge(amount, method))
            .await
            .map_err(|_| Error::timeout("Payment gateway call exceeded deadline"))?
    }

    /// Synchronous HTTP charge; returns the payment or a decline error
    pub async fn create_payment(
        &self,
        user_id: Uuid,
        request: CreatePaymentRequest,
    ) -> Result<PaymentResponse> {
        if request.amount <= Decimal::ZERO {
            return Err(Error::validation("Amount must be positive"));
        }

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (id, order_id, user_id, amount, status, payment_method)
            VALUES ($1, $2, $3, $4, 'processing', $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.order_id)
        .bind(user_id)
        .bind(request.amount)
        .bind(request.payment_method)
        .fetch_one(self.db.pool())
        .await?;

        let charge = self
            .charge_with_deadline(request.amount, request.payment_method)
            .await?;

        let payment = self.settle(payment, &charge).await?;

        tracing::info!("Payment {}: {:?}", payment.id, payment.status);

        if payment.status == PaymentStatus::Failed {
            return Err(Error::PaymentDeclined(
                payment
                    .error_message
                    .unwrap_or_else(|| "Payment declined".to_string()),
            ));
        }

        Ok(PaymentResponse::from(payment))
    }

    /// Apply a gateway outcome and emit the terminal event
    async fn settle(&self, payment: Payment, charge: &ChargeResult) -> Result<Payment> {
        let mut tx = self.db.pool().begin().await?;

        let updated = if charge.success {
            sqlx::query_as::<_, Payment>(
                r#"
                UPDATE payments
                SET status = 'completed', transaction_id = $2, updated_at = NOW()
                WHERE id = $1 AND status = 'processing'
                RETURNING *
                "#,
            )
            .bind(payment.id)
            .bind(&charge.transaction_id)
            .fetch_optional(&mut *tx)
            .await?
        } else {
            sqlx::query_as::<_, Payment>(
                r#"
                UPDATE payments
                SET status = 'failed', error_message = $2, updated_at = NOW()
                WHERE id = $1 AND status = 'processing'
                RETURNING *
                "#,
            )
            .bind(payment.id)
            .bind(&charge.message)
            .fetch_optional(&mut *tx)
            .await?
        };

        let Some(updated) = updated else {
            // Already settled by a concurrent delivery
            tracing::info!("Payment {} already settled", payment.id);
            return Ok(payment);
        };

        let event = if charge.success {
            OutboxEvent::new(
                "payment",
                &updated.order_id.to_string(),
                EventKind::PaymentCompleted.as_str(),
                serde_json::to_value(PaymentCompletedPayload {
                    payment_id: updated.id,
                    order_id: updated.order_id,
                    user_id: updated.user_id,
                    amount: updated.amount,
                    transaction_id: updated
                        .transaction_id
                        .clone()
                        .unwrap_or_default(),
                })?,
                Topics::PAYMENTS,
                &PartitionKey::payment(updated.order_id),
            )
        } else {
            OutboxEvent::new(
                "payment",
                &updated.order_id.to_string(),
                EventKind::PaymentFailed.as_str(),
                serde_json::to_value(PaymentFailedPayload {
                    payment_id: Some(updated.id),
                    order_id: updated.order_id,
                    user_id: updated.user_id,
                    amount: updated.amount,
                    error: charge.message.clone(),
                })?,
                Topics::PAYMENTS,
                &PartitionKey::payment(updated.order_id),
            )
        };
        OutboxRepository::insert(&mut tx, &event).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Event path: handle a `payment.initiated` instruction from the saga
    pub async fn process_initiated(&self, payload: PaymentInitiatedPayload) -> Result<()> {
        // One completed payment per order; a duplicate instruction that lost
        // the race against settlement is a no-op
        let existing = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE order_id = $1 AND status IN ('processing', 'completed') ORDER BY created_at DESC LIMIT 1",
        )
        .bind(payload.order_id)
        .fetch_optional(self.db.pool())
        .await?;

        if let Some(existing) = existing {
            tracing::info!(
                "Payment for order {} already {:?}, skipping",
                payload.order_id,
                existing.status
            );
            return Ok(());
        }

        tracing::info!(
            "Processing payment for order {}, amount: {}",
            payload.order_id,
            payload.amount
        );

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (id, order_id, user_id, amount, status, payment_method)
            VALUES ($1, $2, $3, $4, 'processing', 'credit_card')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(payload.order_id)
        .bind(payload.user_id)
        .bind(payload.amount)
        .fetch_one(self.db.pool())
        .await?;

        let charge = self
            .charge_with_deadline(payload.amount, PaymentMethod::CreditCard)
            .await?;

        let settled = self.settle(payment, &charge).await?;

        if settled.status == PaymentStatus::Completed {
            tracing::info!("Payment completed for order {}", payload.order_id);
        } else {
            tracing::info!(
                "Payment failed for order {}: {}",
                payload.order_id,
                settled.error_message.as_deref().unwrap_or("unknown")
            );
        }

        Ok(())
    }

    /// Get payment details
    pub async fn get_payment(&self, user_id: Uuid, payment_id: Uuid) -> Result<PaymentResponse> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE id = $1 AND user_id = $2",
        )
        .bind(payment_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| Error::not_found("Payment not found"))?;

        Ok(PaymentResponse::from(payment))
    }

    /// Get the payment for an order
    pub async fn get_payment_by_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<PaymentResponse> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE order_id = $1 AND user_id = $2 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| Error::not_found("Payment not found"))?;

        Ok(PaymentResponse::from(payment))
    }

    /// Refund a completed payment
    pub async fn refund_payment(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
        reason: Option<String>,
    ) -> Result<PaymentResponse> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE id = $1 AND user_id = $2",
        )
        .bind(payment_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| Error::not_found("Payment not found"))?;

        if payment.status != PaymentStatus::Completed {
            return Err(Error::conflict(format!(
                "Cannot refund payment in {:?} status",
                payment.status
            )));
        }

        let transaction_id = payment
            .transaction_id
            .clone()
            .ok_or_else(|| Error::Other("Completed payment missing transaction id".to_string()))?;

        let refund = tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.refund(&transaction_id, payment.amount),
        )
        .await
        .map_err(|_| Error::timeout("Refund gateway call exceeded deadline"))??;

        if !refund.success {
            return Err(Error::Other("Refund processing failed".to_string()));
        }

        let mut tx = self.db.pool().begin().await?;

        let updated = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments SET status = 'refunded', updated_at = NOW()
            WHERE id = $1 AND status = 'completed'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::conflict("Payment status changed concurrently"))?;

        let event = OutboxEvent::new(
            "payment",
            &updated.order_id.to_string(),
            EventKind::PaymentRefunded.as_str(),
            serde_json::to_value(PaymentRefundedPayload {
                payment_id: updated.id,
                order_id: updated.order_id,
                user_id: updated.user_id,
                amount: updated.amount,
                refund_id: refund.refund_id.unwrap_or_default(),
                reason,
            })?,
            Topics::PAYMENTS,
            &PartitionKey::payment(updated.order_id),
        );
        OutboxRepository::insert(&mut tx, &event).await?;

        tx.commit().await?;

        tracing::info!("Payment {} refunded", payment_id);
        Ok(PaymentResponse::from(updated))
    }
}

/// Event-side adapter for the payments consumer
pub struct PaymentEventHandler {
    service: Arc<PaymentService>,
}

impl PaymentEventHandler {
    pub fn new(service: Arc<PaymentService>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl EventHandler for PaymentEventHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        match envelope.kind() {
            EventKind::PaymentInitiated => {
                let payload: PaymentInitiatedPayload =
                    serde_json::from_value(envelope.payload.clone())?;
                self.service.process_initiated(payload).await
            }
            other => Err(Error::Other(format!(
                "Payment handler received unexpected event: {}",
                other.as_str()
            ))),
        }
    }
}
