use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::FailedItem;

/// Soft, time-limited claim on inventory (inventory-owned)
///
/// Rows created by one reserve call share a `group_id`; it is the
/// `reservation_id` reported on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub group_id: Uuid,
    pub order_id: Uuid,
    pub sku_id: Uuid,
    pub quantity: i32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

/// Reservation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Released,
    Expired,
}

impl ReservationStatus {
    /// Terminal states are immutable
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Pending)
    }

    pub fn can_transition_to(&self, new_status: ReservationStatus) -> bool {
        use ReservationStatus::*;

        matches!(
            (self, new_status),
            (Pending, Confirmed) | (Pending, Released) | (Pending, Expired)
        )
    }
}

/// Result of a reserve-stock attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveOutcome {
    pub success: bool,
    pub reservation_id: Option<Uuid>,
    pub order_id: Uuid,
    pub failed_items: Vec<FailedItem>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ReserveOutcome {
    pub fn rejected(order_id: Uuid, failed_items: Vec<FailedItem>) -> Self {
        Self {
            success: false,
            reservation_id: None,
            order_id,
            failed_items,
            expires_at: None,
        }
    }

    pub fn reserved(order_id: Uuid, reservation_id: Uuid, expires_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            reservation_id: Some(reservation_id),
            order_id,
            failed_items: Vec::new(),
            expires_at: Some(expires_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use ReservationStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Released));
        assert!(Pending.can_transition_to(Expired));
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        use ReservationStatus::*;

        for terminal in [Confirmed, Released, Expired] {
            assert!(terminal.is_terminal());
            for target in [Pending, Confirmed, Released, Expired] {
                assert!(!terminal.can_transition_to(target));
            }
        }
        assert!(!Pending.is_terminal());
    }
}
