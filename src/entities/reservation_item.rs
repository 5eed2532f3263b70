use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-line status. Lines carry their own lifecycle so a reservation can be
/// partially picked up or partially returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStatus {
    Pending,
    Confirmed,
    PickedUp,
    Returned,
    Cancelled,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Pending => "pending",
            LineStatus::Confirmed => "confirmed",
            LineStatus::PickedUp => "picked_up",
            LineStatus::Returned => "returned",
            LineStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LineStatus::Pending),
            "confirmed" => Some(LineStatus::Confirmed),
            "picked_up" => Some(LineStatus::PickedUp),
            "returned" => Some(LineStatus::Returned),
            "cancelled" => Some(LineStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses that consume calendar availability.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            LineStatus::Pending | LineStatus::Confirmed | LineStatus::PickedUp
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LineStatus::Returned | LineStatus::Cancelled)
    }
}

/// Statuses whose lines count against availability, as stored in the DB.
pub const ACTIVE_LINE_STATUSES: [&str; 3] = ["pending", "confirmed", "picked_up"];

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservation_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn status_enum(&self) -> Option<LineStatus> {
        LineStatus::from_str(&self.status)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::reservation::Entity",
        from = "Column::ReservationId",
        to = "super::reservation::Column::Id"
    )]
    Reservation,
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id"
    )]
    Item,
}

impl Related<super::reservation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reservation.def()
    }
}

impl Related<super::item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
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
    fn line_status_round_trips_through_strings() {
        for status in [
            LineStatus::Pending,
            LineStatus::Confirmed,
            LineStatus::PickedUp,
            LineStatus::Returned,
            LineStatus::Cancelled,
        ] {
            assert_eq!(LineStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn active_statuses_match_db_filter_list() {
        for s in ACTIVE_LINE_STATUSES {
            let status = LineStatus::from_str(s).unwrap();
            assert!(status.is_active());
        }
        assert!(!LineStatus::Returned.is_active());
        assert!(!LineStatus::Cancelled.is_active());
    }
}
