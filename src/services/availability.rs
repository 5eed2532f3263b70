use chrono::NaiveDate;
use metrics::counter;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, QueryFilter, QuerySelect,
    QueryTrait,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::entities::item;
use crate::entities::reservation_item::{self, ACTIVE_LINE_STATUSES};
use crate::errors::ServiceError;

/// Availability report for one item over a date window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub item_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_quantity: i32,
    pub already_booked: i32,
    pub available: i32,
}

/// Symmetric inclusive interval overlap test. Both windows are closed
/// date ranges; touching endpoints overlap.
pub fn windows_overlap(
    a_start: NaiveDate,
    a_end: NaiveDate,
    b_start: NaiveDate,
    b_end: NaiveDate,
) -> bool {
    a_start <= b_end && a_end >= b_start
}

#[derive(FromQueryResult)]
struct QuantitySum {
    total: Option<i64>,
}

/// Sums the quantities of every active line for `item_id` overlapping
/// `[start_date, end_date]`. `exclude_reservation` removes one
/// reservation's own lines from the count, which update validation uses
/// to release the caller's prior occupancy before re-checking.
pub async fn booked_quantity<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
    exclude_reservation: Option<Uuid>,
) -> Result<i64, ServiceError> {
    let sum = reservation_item::Entity::find()
        .select_only()
        .column_as(reservation_item::Column::Quantity.sum(), "total")
        .filter(reservation_item::Column::ItemId.eq(item_id))
        .filter(reservation_item::Column::Status.is_in(ACTIVE_LINE_STATUSES))
        .filter(reservation_item::Column::StartDate.lte(end_date))
        .filter(reservation_item::Column::EndDate.gte(start_date))
        .apply_if(exclude_reservation, |q, id| {
            q.filter(reservation_item::Column::ReservationId.ne(id))
        })
        .into_model::<QuantitySum>()
        .one(conn)
        .await?;

    Ok(sum.and_then(|s| s.total).unwrap_or(0))
}

/// Virtual quantity still reservable for the window:
/// `total_quantity` minus the overlapping active bookings.
///
/// The result is never negative. A negative intermediate value means a
/// race slipped past the locking discipline; it is clamped to zero,
/// logged at high severity, and counted for investigation.
pub async fn available_quantity<C: ConnectionTrait>(
    conn: &C,
    item: &item::Model,
    start_date: NaiveDate,
    end_date: NaiveDate,
    exclude_reservation: Option<Uuid>,
) -> Result<i32, ServiceError> {
    let booked = booked_quantity(conn, item.id, start_date, end_date, exclude_reservation).await?;
    Ok(clamped_available(item, booked))
}

fn clamped_available(item: &item::Model, booked: i64) -> i32 {
    let available = i64::from(item.total_quantity) - booked;

    if available < 0 {
        counter!("rentstock_availability.negative_results", 1);
        error!(
            item_id = %item.id,
            total_quantity = item.total_quantity,
            booked,
            "invariant violation: computed availability is negative"
        );
        return 0;
    }

    available as i32
}

/// Read-only availability report for display. Takes no lock; the number
/// is advisory and re-validated at submission time.
pub async fn check_availability<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<AvailabilityReport, ServiceError> {
    if start_date > end_date {
        return Err(ServiceError::ValidationError(
            "start_date must not be after end_date".to_string(),
        ));
    }

    let item = item::Entity::find_by_id(item_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))?;

    // One read feeds both fields so they always describe the same
    // snapshot.
    let booked = booked_quantity(conn, item_id, start_date, end_date, None).await?;

    Ok(AvailabilityReport {
        item_id,
        start_date,
        end_date,
        total_quantity: item.total_quantity,
        already_booked: booked.min(i64::from(i32::MAX)) as i32,
        available: clamped_available(&item, booked),
    })
}
