use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a reservation header.
///
/// Forward path: pending -> confirmed -> picked_up -> completed.
/// Terminal branches: rejected, cancelled_by_user, cancelled_by_admin, deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    PickedUp,
    Completed,
    Rejected,
    CancelledByUser,
    CancelledByAdmin,
    Deleted,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::PickedUp => "picked_up",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::CancelledByUser => "cancelled_by_user",
            ReservationStatus::CancelledByAdmin => "cancelled_by_admin",
            ReservationStatus::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReservationStatus::Pending),
            "confirmed" => Some(ReservationStatus::Confirmed),
            "picked_up" => Some(ReservationStatus::PickedUp),
            "completed" => Some(ReservationStatus::Completed),
            "rejected" => Some(ReservationStatus::Rejected),
            "cancelled_by_user" => Some(ReservationStatus::CancelledByUser),
            "cancelled_by_admin" => Some(ReservationStatus::CancelledByAdmin),
            "deleted" => Some(ReservationStatus::Deleted),
            _ => None,
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Completed
                | ReservationStatus::Rejected
                | ReservationStatus::CancelledByUser
                | ReservationStatus::CancelledByAdmin
                | ReservationStatus::Deleted
        )
    }

    /// States that occupy calendar availability.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Pending | ReservationStatus::Confirmed | ReservationStatus::PickedUp
        )
    }
}

/// Payment progress tracked alongside the lifecycle, not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    InvoiceSent,
    Paid,
    PaymentRejected,
    Overdue,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::InvoiceSent => "invoice-sent",
            PaymentStatus::Paid => "paid",
            PaymentStatus::PaymentRejected => "payment-rejected",
            PaymentStatus::Overdue => "overdue",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "invoice-sent" => Some(PaymentStatus::InvoiceSent),
            "paid" => Some(PaymentStatus::Paid),
            "payment-rejected" => Some(PaymentStatus::PaymentRejected),
            "overdue" => Some(PaymentStatus::Overdue),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub reservation_number: String,
    pub requester_id: Uuid,
    pub status: String, // Storing as string in DB, converted via ReservationStatus
    pub payment_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn status_enum(&self) -> Option<ReservationStatus> {
        ReservationStatus::from_str(&self.status)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::reservation_item::Entity")]
    ReservationItem,
}

impl Related<super::reservation_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReservationItem.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);

            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
        }

        active_model.updated_at = Set(Some(now));

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::PickedUp,
            ReservationStatus::Completed,
            ReservationStatus::Rejected,
            ReservationStatus::CancelledByUser,
            ReservationStatus::CancelledByAdmin,
            ReservationStatus::Deleted,
        ] {
            assert_eq!(ReservationStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::from_str("bogus"), None);
    }

    #[test]
    fn active_and_terminal_partition_statuses() {
        assert!(ReservationStatus::Pending.is_active());
        assert!(ReservationStatus::Confirmed.is_active());
        assert!(ReservationStatus::PickedUp.is_active());
        assert!(!ReservationStatus::Completed.is_active());

        assert!(ReservationStatus::Completed.is_terminal());
        assert!(ReservationStatus::Rejected.is_terminal());
        assert!(ReservationStatus::CancelledByUser.is_terminal());
        assert!(ReservationStatus::CancelledByAdmin.is_terminal());
        assert!(ReservationStatus::Deleted.is_terminal());
        assert!(!ReservationStatus::PickedUp.is_terminal());
    }
}
