use chrono::{NaiveDate, Utc};
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::item,
    entities::reservation::{self, PaymentStatus, ReservationStatus},
    entities::reservation_item::{self, LineStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    identity::Actor,
    services::availability::{self, windows_overlap, AvailabilityReport},
    services::inventory,
    services::item_locks::ItemLockRegistry,
};

/// Inclusive rental duration bounds, in days.
const MIN_TOTAL_DAYS: i64 = 1;
const MAX_TOTAL_DAYS: i64 = 42;

/// A non-blocking warning is attached when a rental starts this soon.
const SHORT_NOTICE_DAYS: i64 = 2;

const RESERVATION_NUMBER_ATTEMPTS: usize = 5;

/// One requested rental line.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineRequest {
    pub item_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateReservationRequest {
    #[validate(length(min = 1, message = "At least one line is required"))]
    pub lines: Vec<LineRequest>,
}

/// Replaces a pending reservation's lines. An empty set is an implicit
/// cancellation by the caller.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateReservationRequest {
    pub lines: Vec<LineRequest>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineResponse {
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: i32,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationResponse {
    pub id: Uuid,
    pub reservation_number: String,
    pub requester_id: Uuid,
    pub status: String,
    pub payment_status: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: Option<chrono::DateTime<Utc>>,
    pub lines: Vec<LineResponse>,
    /// Non-blocking short-notice warning, surfaced on create/update only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReservationListResponse {
    pub reservations: Vec<ReservationResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Acknowledgement for lifecycle transitions.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionAck {
    pub reservation_id: Uuid,
    pub status: String,
}

/// Optional filters for reservation listings.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ReservationFilter {
    pub status: Option<String>,
    pub requester_id: Option<Uuid>,
}

/// Validated, enriched line ready for persistence.
#[derive(Debug, Clone)]
struct PreparedLine {
    item_id: Uuid,
    quantity: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    total_days: i32,
}

/// Orchestrates the reservation lifecycle: atomic multi-line booking,
/// lifecycle transitions, and the physical stock handover at pickup and
/// return. All check-then-write sequences run under per-item locks.
#[derive(Clone)]
pub struct ReservationService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    locks: Arc<ItemLockRegistry>,
}

impl ReservationService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        locks: Arc<ItemLockRegistry>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
        }
    }

    /// Creates a reservation with all its lines atomically. Any line
    /// failing validation or availability aborts the whole batch.
    #[instrument(skip(self, request), fields(requester_id = %actor.user_id))]
    pub async fn create_reservation(
        &self,
        actor: Actor,
        request: CreateReservationRequest,
    ) -> Result<ReservationResponse, ServiceError> {
        request.validate()?;

        let today = today();
        let prepared = prepare_lines(&request.lines, today)?;
        let warning = short_notice_warning(&prepared, today);

        let item_ids: Vec<Uuid> = prepared.iter().map(|l| l.item_id).collect();
        let _guard = self.locks.lock_items(&item_ids).await?;

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for reservation creation");
            ServiceError::DatabaseError(e)
        })?;

        let located = check_lines_bookable(&txn, &prepared, None).await?;

        let reservation_number = generate_reservation_number(&txn).await?;
        let reservation_id = Uuid::new_v4();
        let now = Utc::now();

        let reservation_model = reservation::ActiveModel {
            id: Set(reservation_id),
            reservation_number: Set(reservation_number.clone()),
            requester_id: Set(actor.user_id),
            status: Set(ReservationStatus::Pending.as_str().to_string()),
            payment_status: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert reservation");
            ServiceError::DatabaseError(e)
        })?;

        let mut line_models = Vec::with_capacity(located.len());
        for (line, location_id) in &located {
            let model = reservation_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                reservation_id: Set(reservation_id),
                item_id: Set(line.item_id),
                location_id: Set(*location_id),
                quantity: Set(line.quantity),
                start_date: Set(line.start_date),
                end_date: Set(line.end_date),
                total_days: Set(line.total_days),
                status: Set(LineStatus::Pending.as_str().to_string()),
                created_at: Set(now),
                updated_at: Set(Some(now)),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, reservation_id = %reservation_id, "Failed to insert reservation line");
                ServiceError::DatabaseError(e)
            })?;
            line_models.push(model);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, reservation_id = %reservation_id, "Failed to commit reservation creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            reservation_id = %reservation_id,
            reservation_number = %reservation_number,
            lines = line_models.len(),
            "Reservation created"
        );

        self.send_event(Event::ReservationCreated {
            reservation_id,
            reservation_number: reservation_number.clone(),
            requester_id: actor.user_id,
            short_notice: warning.is_some(),
        })
        .await;

        Ok(to_response(reservation_model, line_models, warning))
    }

    /// Replaces the lines of a still-pending reservation, re-validating
    /// availability as if the reservation's old lines did not exist. An
    /// empty replacement set cancels the reservation.
    #[instrument(skip(self, request), fields(reservation_id = %reservation_id, actor_id = %actor.user_id))]
    pub async fn update_reservation(
        &self,
        reservation_id: Uuid,
        actor: Actor,
        request: UpdateReservationRequest,
    ) -> Result<ReservationResponse, ServiceError> {
        request.validate()?;

        if request.lines.is_empty() {
            // An empty line set is the storefront's "remove everything"
            // gesture; treat it as a cancellation.
            self.cancel_reservation(reservation_id, actor).await?;
            return self.get_reservation(reservation_id, actor).await;
        }

        let today = today();
        let prepared = prepare_lines(&request.lines, today)?;
        let warning = short_notice_warning(&prepared, today);

        // Lock both the old and the new item sets; the old lines are
        // released inside the same critical section.
        let db = &*self.db_pool;
        let old_lines = reservation_item::Entity::find()
            .filter(reservation_item::Column::ReservationId.eq(reservation_id))
            .all(db)
            .await?;

        let mut item_ids: Vec<Uuid> = prepared.iter().map(|l| l.item_id).collect();
        item_ids.extend(old_lines.iter().map(|l| l.item_id));
        let _guard = self.locks.lock_items(&item_ids).await?;

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let reservation = load_reservation(&txn, reservation_id).await?;
        authorize_owner_or_admin(&reservation, &actor)?;

        let status = parse_status(&reservation)?;
        if status != ReservationStatus::Pending {
            return Err(ServiceError::AlreadyInState(format!(
                "reservation {} is {}; only pending reservations can be edited",
                reservation_id, reservation.status
            )));
        }

        let located =
            check_lines_bookable(&txn, &prepared, Some(reservation_id)).await?;

        // The pending draft lines are physically replaced; lifecycle
        // cancellations elsewhere stay soft.
        reservation_item::Entity::delete_many()
            .filter(reservation_item::Column::ReservationId.eq(reservation_id))
            .exec(&txn)
            .await?;

        let now = Utc::now();
        let mut line_models = Vec::with_capacity(located.len());
        for (line, location_id) in &located {
            let model = reservation_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                reservation_id: Set(reservation_id),
                item_id: Set(line.item_id),
                location_id: Set(*location_id),
                quantity: Set(line.quantity),
                start_date: Set(line.start_date),
                end_date: Set(line.end_date),
                total_days: Set(line.total_days),
                status: Set(LineStatus::Pending.as_str().to_string()),
                created_at: Set(now),
                updated_at: Set(Some(now)),
            }
            .insert(&txn)
            .await?;
            line_models.push(model);
        }

        let mut active: reservation::ActiveModel = reservation.into();
        active.updated_at = Set(Some(now));
        let reservation = active.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, reservation_id = %reservation_id, "Failed to commit reservation update");
            ServiceError::DatabaseError(e)
        })?;

        info!(reservation_id = %reservation_id, lines = line_models.len(), "Reservation updated");

        self.send_event(Event::ReservationUpdated {
            reservation_id,
            reservation_number: reservation.reservation_number.clone(),
            requester_id: reservation.requester_id,
        })
        .await;

        Ok(to_response(reservation, line_models, warning))
    }

    /// Confirms a pending reservation. Stock stays virtual; the guard is
    /// that every line could still be handed out today.
    #[instrument(skip(self), fields(reservation_id = %reservation_id, actor_id = %actor.user_id))]
    pub async fn confirm_reservation(
        &self,
        reservation_id: Uuid,
        actor: Actor,
    ) -> Result<TransitionAck, ServiceError> {
        require_admin(&actor)?;

        let db = &*self.db_pool;
        let lines = reservation_item::Entity::find()
            .filter(reservation_item::Column::ReservationId.eq(reservation_id))
            .all(db)
            .await?;
        let item_ids: Vec<Uuid> = lines.iter().map(|l| l.item_id).collect();
        let _guard = self.locks.lock_items(&item_ids).await?;

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let reservation = load_reservation(&txn, reservation_id).await?;
        let status = parse_status(&reservation)?;
        if status != ReservationStatus::Pending {
            return Err(ServiceError::AlreadyInState(format!(
                "reservation {} is already {}",
                reservation_id, reservation.status
            )));
        }

        let lines = load_lines(&txn, reservation_id).await?;
        for line in &lines {
            let item = load_item(&txn, line.item_id).await?;
            if item.quantity_in_storage < line.quantity {
                return Err(ServiceError::InsufficientPhysicalStock(format!(
                    "item {} has only {} in storage; line needs {}",
                    item.id, item.quantity_in_storage, line.quantity
                )));
            }
        }

        for line in lines {
            if line.status_enum() == Some(LineStatus::Pending) {
                set_line_status(&txn, line, LineStatus::Confirmed).await?;
            }
        }

        let reservation =
            set_reservation_status(&txn, reservation, ReservationStatus::Confirmed).await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(reservation_id = %reservation_id, "Reservation confirmed");

        self.send_event(Event::ReservationConfirmed {
            reservation_id,
            reservation_number: reservation.reservation_number,
            requester_id: reservation.requester_id,
        })
        .await;

        Ok(TransitionAck {
            reservation_id,
            status: ReservationStatus::Confirmed.as_str().to_string(),
        })
    }

    /// Rejects a pending reservation. Admin only; cancels every line.
    #[instrument(skip(self), fields(reservation_id = %reservation_id, actor_id = %actor.user_id))]
    pub async fn reject_reservation(
        &self,
        reservation_id: Uuid,
        actor: Actor,
    ) -> Result<TransitionAck, ServiceError> {
        require_admin(&actor)?;

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let reservation = load_reservation(&txn, reservation_id).await?;
        let status = parse_status(&reservation)?;
        if status != ReservationStatus::Pending {
            return Err(ServiceError::AlreadyInState(format!(
                "reservation {} is {}; only pending reservations can be rejected",
                reservation_id, reservation.status
            )));
        }

        cancel_open_lines(&txn, reservation_id).await?;
        let reservation =
            set_reservation_status(&txn, reservation, ReservationStatus::Rejected).await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(reservation_id = %reservation_id, "Reservation rejected");

        self.send_event(Event::ReservationRejected {
            reservation_id,
            reservation_number: reservation.reservation_number,
            requester_id: reservation.requester_id,
        })
        .await;

        Ok(TransitionAck {
            reservation_id,
            status: ReservationStatus::Rejected.as_str().to_string(),
        })
    }

    /// Cancels a reservation. Owners may cancel while it is still
    /// pending; admins may force-cancel at any stage, which also returns
    /// any already-picked-up stock to the ledger.
    #[instrument(skip(self), fields(reservation_id = %reservation_id, actor_id = %actor.user_id))]
    pub async fn cancel_reservation(
        &self,
        reservation_id: Uuid,
        actor: Actor,
    ) -> Result<TransitionAck, ServiceError> {
        let db = &*self.db_pool;
        let lines = reservation_item::Entity::find()
            .filter(reservation_item::Column::ReservationId.eq(reservation_id))
            .all(db)
            .await?;
        let item_ids: Vec<Uuid> = lines.iter().map(|l| l.item_id).collect();
        let _guard = self.locks.lock_items(&item_ids).await?;

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let reservation = load_reservation(&txn, reservation_id).await?;
        let status = parse_status(&reservation)?;
        if status.is_terminal() {
            return Err(ServiceError::AlreadyInState(format!(
                "reservation {} is already {}",
                reservation_id, reservation.status
            )));
        }

        let new_status = if actor.is_admin() {
            ReservationStatus::CancelledByAdmin
        } else {
            if reservation.requester_id != actor.user_id {
                return Err(ServiceError::Forbidden(
                    "only the requester or an admin may cancel a reservation".to_string(),
                ));
            }
            if status != ReservationStatus::Pending {
                return Err(ServiceError::Forbidden(format!(
                    "reservation {} is {}; only admins can cancel past pending",
                    reservation_id, reservation.status
                )));
            }
            ReservationStatus::CancelledByUser
        };

        // Picked-up stock has already left the ledger; put it back
        // before the reservation is marked terminal.
        let lines = load_lines(&txn, reservation_id).await?;
        for line in lines {
            match line.status_enum() {
                Some(LineStatus::PickedUp) => {
                    inventory::release_physical(&txn, line.item_id, line.quantity).await?;
                    set_line_status(&txn, line, LineStatus::Cancelled).await?;
                }
                Some(LineStatus::Pending) | Some(LineStatus::Confirmed) => {
                    set_line_status(&txn, line, LineStatus::Cancelled).await?;
                }
                _ => {}
            }
        }

        let by_admin = new_status == ReservationStatus::CancelledByAdmin;
        let reservation = set_reservation_status(&txn, reservation, new_status).await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(reservation_id = %reservation_id, by_admin, "Reservation cancelled");

        self.send_event(Event::ReservationCancelled {
            reservation_id,
            reservation_number: reservation.reservation_number,
            requester_id: reservation.requester_id,
            by_admin,
        })
        .await;

        Ok(TransitionAck {
            reservation_id,
            status: new_status.as_str().to_string(),
        })
    }

    /// Soft-deletes a reservation. Admin only; the record stays
    /// queryable by admins. Open lines are cancelled and picked-up stock
    /// is returned to the ledger.
    #[instrument(skip(self), fields(reservation_id = %reservation_id, actor_id = %actor.user_id))]
    pub async fn delete_reservation(
        &self,
        reservation_id: Uuid,
        actor: Actor,
    ) -> Result<TransitionAck, ServiceError> {
        require_admin(&actor)?;

        let db = &*self.db_pool;
        let lines = reservation_item::Entity::find()
            .filter(reservation_item::Column::ReservationId.eq(reservation_id))
            .all(db)
            .await?;
        let item_ids: Vec<Uuid> = lines.iter().map(|l| l.item_id).collect();
        let _guard = self.locks.lock_items(&item_ids).await?;

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let reservation = load_reservation(&txn, reservation_id).await?;
        let status = parse_status(&reservation)?;
        if status == ReservationStatus::Deleted {
            return Err(ServiceError::AlreadyInState(format!(
                "reservation {} is already deleted",
                reservation_id
            )));
        }

        let lines = load_lines(&txn, reservation_id).await?;
        for line in lines {
            match line.status_enum() {
                Some(LineStatus::PickedUp) => {
                    inventory::release_physical(&txn, line.item_id, line.quantity).await?;
                    set_line_status(&txn, line, LineStatus::Cancelled).await?;
                }
                Some(LineStatus::Pending) | Some(LineStatus::Confirmed) => {
                    set_line_status(&txn, line, LineStatus::Cancelled).await?;
                }
                _ => {}
            }
        }

        let reservation =
            set_reservation_status(&txn, reservation, ReservationStatus::Deleted).await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(reservation_id = %reservation_id, "Reservation soft-deleted");

        self.send_event(Event::ReservationDeleted {
            reservation_id,
            reservation_number: reservation.reservation_number,
            requester_id: reservation.requester_id,
        })
        .await;

        Ok(TransitionAck {
            reservation_id,
            status: ReservationStatus::Deleted.as_str().to_string(),
        })
    }

    /// Hands a confirmed line over the counter: marks it picked up and
    /// decrements the physical ledger in one transaction.
    #[instrument(skip(self), fields(line_item_id = %line_item_id, actor_id = %actor.user_id))]
    pub async fn confirm_pickup(
        &self,
        line_item_id: Uuid,
        actor: Actor,
    ) -> Result<TransitionAck, ServiceError> {
        let db = &*self.db_pool;
        let line = reservation_item::Entity::find_by_id(line_item_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Reservation line {} not found", line_item_id))
            })?;

        let _guard = self.locks.lock_items(&[line.item_id]).await?;

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let line = reservation_item::Entity::find_by_id(line_item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Reservation line {} not found", line_item_id))
            })?;

        let reservation = load_reservation(&txn, line.reservation_id).await?;
        authorize_owner_or_admin(&reservation, &actor)?;

        match line.status_enum() {
            Some(LineStatus::Confirmed) => {}
            Some(LineStatus::PickedUp) | Some(LineStatus::Returned) => {
                return Err(ServiceError::AlreadyInState(format!(
                    "line {} is already {}",
                    line_item_id, line.status
                )));
            }
            _ => {
                return Err(ServiceError::ValidationError(format!(
                    "line {} is {}; only confirmed lines can be picked up",
                    line_item_id, line.status
                )));
            }
        }

        let today = today();
        if today < line.start_date {
            return Err(ServiceError::ValidationError(format!(
                "rental starts {}; pickup is not yet possible",
                line.start_date
            )));
        }
        if today > line.end_date {
            return Err(ServiceError::ValidationError(format!(
                "rental ended {}; pickup window has passed",
                line.end_date
            )));
        }

        inventory::reserve_physical(&txn, line.item_id, line.quantity).await?;
        let reservation_id = line.reservation_id;
        set_line_status(&txn, line, LineStatus::PickedUp).await?;

        let lines = load_lines(&txn, reservation_id).await?;
        let reservation = apply_roll_up(&txn, reservation, &lines).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, line_item_id = %line_item_id, "Failed to commit pickup");
            ServiceError::DatabaseError(e)
        })?;

        info!(line_item_id = %line_item_id, reservation_id = %reservation_id, "Line picked up");

        self.send_event(Event::ItemsPickedUp {
            reservation_id,
            reservation_number: reservation.reservation_number,
            requester_id: reservation.requester_id,
            line_count: 1,
        })
        .await;

        Ok(TransitionAck {
            reservation_id,
            status: reservation.status,
        })
    }

    /// Returns every picked-up line of a reservation, restoring the
    /// physical ledger. Rolls the reservation up to `completed` once all
    /// lines are settled.
    #[instrument(skip(self), fields(reservation_id = %reservation_id, actor_id = %actor.user_id))]
    pub async fn return_items(
        &self,
        reservation_id: Uuid,
        actor: Actor,
    ) -> Result<TransitionAck, ServiceError> {
        require_admin(&actor)?;

        let db = &*self.db_pool;
        let lines = reservation_item::Entity::find()
            .filter(reservation_item::Column::ReservationId.eq(reservation_id))
            .all(db)
            .await?;
        let item_ids: Vec<Uuid> = lines.iter().map(|l| l.item_id).collect();
        let _guard = self.locks.lock_items(&item_ids).await?;

        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let reservation = load_reservation(&txn, reservation_id).await?;
        let lines = load_lines(&txn, reservation_id).await?;

        let picked_up: Vec<_> = lines
            .iter()
            .filter(|l| l.status_enum() == Some(LineStatus::PickedUp))
            .cloned()
            .collect();

        if picked_up.is_empty() {
            return Err(ServiceError::AlreadyInState(format!(
                "reservation {} has no picked-up lines to return",
                reservation_id
            )));
        }

        let returned_count = picked_up.len();
        for line in picked_up {
            inventory::release_physical(&txn, line.item_id, line.quantity).await?;
            set_line_status(&txn, line, LineStatus::Returned).await?;
        }

        let lines = load_lines(&txn, reservation_id).await?;
        let reservation = apply_roll_up(&txn, reservation, &lines).await?;
        let completed = reservation.status == ReservationStatus::Completed.as_str();

        txn.commit().await.map_err(|e| {
            error!(error = %e, reservation_id = %reservation_id, "Failed to commit return");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            reservation_id = %reservation_id,
            returned = returned_count,
            completed,
            "Items returned"
        );

        self.send_event(Event::ItemsReturned {
            reservation_id,
            reservation_number: reservation.reservation_number,
            requester_id: reservation.requester_id,
            line_count: returned_count,
            completed,
        })
        .await;

        Ok(TransitionAck {
            reservation_id,
            status: reservation.status,
        })
    }

    /// Sets the payment side channel. Independent of the lifecycle;
    /// `invoice-sent` additionally triggers an invoice notification.
    #[instrument(skip(self, request), fields(reservation_id = %reservation_id, actor_id = %actor.user_id))]
    pub async fn update_payment_status(
        &self,
        reservation_id: Uuid,
        actor: Actor,
        request: UpdatePaymentStatusRequest,
    ) -> Result<TransitionAck, ServiceError> {
        require_admin(&actor)?;

        let payment_status =
            PaymentStatus::from_str(&request.payment_status).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "unknown payment status '{}'",
                    request.payment_status
                ))
            })?;

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let reservation = load_reservation(&txn, reservation_id).await?;
        let mut active: reservation::ActiveModel = reservation.into();
        active.payment_status = Set(Some(payment_status.as_str().to_string()));
        active.updated_at = Set(Some(Utc::now()));
        let reservation = active.update(&txn).await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            reservation_id = %reservation_id,
            payment_status = payment_status.as_str(),
            "Payment status updated"
        );

        self.send_event(Event::PaymentStatusChanged {
            reservation_id,
            reservation_number: reservation.reservation_number,
            requester_id: reservation.requester_id,
            payment_status: payment_status.as_str().to_string(),
        })
        .await;

        Ok(TransitionAck {
            reservation_id,
            status: reservation.status,
        })
    }

    /// Fetches one reservation with its lines. Owners see their own;
    /// admins see everything, including soft-deleted records.
    #[instrument(skip(self), fields(reservation_id = %reservation_id, actor_id = %actor.user_id))]
    pub async fn get_reservation(
        &self,
        reservation_id: Uuid,
        actor: Actor,
    ) -> Result<ReservationResponse, ServiceError> {
        let db = &*self.db_pool;

        let reservation = load_reservation(db, reservation_id).await?;
        authorize_owner_or_admin(&reservation, &actor)?;

        if reservation.status == ReservationStatus::Deleted.as_str() && !actor.is_admin() {
            return Err(ServiceError::NotFound(format!(
                "Reservation {} not found",
                reservation_id
            )));
        }

        let lines = load_lines(db, reservation_id).await?;
        Ok(to_response(reservation, lines, None))
    }

    /// Paginated reservation listing. Members are always scoped to
    /// their own reservations and never see soft-deleted ones.
    #[instrument(skip(self), fields(actor_id = %actor.user_id))]
    pub async fn list_reservations(
        &self,
        actor: Actor,
        filter: ReservationFilter,
        page: u64,
        per_page: u64,
    ) -> Result<ReservationListResponse, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);

        let mut query = reservation::Entity::find();

        if let Some(status) = &filter.status {
            if ReservationStatus::from_str(status).is_none() {
                return Err(ServiceError::ValidationError(format!(
                    "unknown status '{}'",
                    status
                )));
            }
            query = query.filter(reservation::Column::Status.eq(status.as_str()));
        }

        if actor.is_admin() {
            if let Some(requester_id) = filter.requester_id {
                query = query.filter(reservation::Column::RequesterId.eq(requester_id));
            }
        } else {
            query = query
                .filter(reservation::Column::RequesterId.eq(actor.user_id))
                .filter(
                    reservation::Column::Status.ne(ReservationStatus::Deleted.as_str()),
                );
        }

        let paginator = query
            .order_by_desc(reservation::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count reservations");
            ServiceError::DatabaseError(e)
        })?;

        let reservations = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, per_page, "Failed to fetch reservations page");
            ServiceError::DatabaseError(e)
        })?;

        let mut responses = Vec::with_capacity(reservations.len());
        for model in reservations {
            let lines = load_lines(db, model.id).await?;
            responses.push(to_response(model, lines, None));
        }

        Ok(ReservationListResponse {
            reservations: responses,
            total,
            page,
            per_page,
        })
    }

    /// Advisory, lock-free availability report for display.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn check_availability(
        &self,
        item_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<AvailabilityReport, ServiceError> {
        availability::check_availability(&*self.db_pool, item_id, start_date, end_date).await
    }

    async fn send_event(&self, event: Event) {
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, "Failed to send event");
            }
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn require_admin(actor: &Actor) -> Result<(), ServiceError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "this operation requires an admin role".to_string(),
        ))
    }
}

fn authorize_owner_or_admin(
    reservation: &reservation::Model,
    actor: &Actor,
) -> Result<(), ServiceError> {
    if actor.is_admin() || reservation.requester_id == actor.user_id {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "reservation belongs to another requester".to_string(),
        ))
    }
}

fn parse_status(reservation: &reservation::Model) -> Result<ReservationStatus, ServiceError> {
    reservation.status_enum().ok_or_else(|| {
        ServiceError::InvariantViolation(format!(
            "reservation {} has unknown status '{}'",
            reservation.id, reservation.status
        ))
    })
}

/// Validates and enriches the requested lines: date ordering, duration
/// bounds, and the one-day lead time.
fn prepare_lines(lines: &[LineRequest], today: NaiveDate) -> Result<Vec<PreparedLine>, ServiceError> {
    let mut prepared = Vec::with_capacity(lines.len());

    for line in lines {
        if line.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "quantity for item {} must be at least 1",
                line.item_id
            )));
        }
        if line.start_date > line.end_date {
            return Err(ServiceError::ValidationError(format!(
                "item {}: start date {} is after end date {}",
                line.item_id, line.start_date, line.end_date
            )));
        }

        let total_days = (line.end_date - line.start_date).num_days();
        if !(MIN_TOTAL_DAYS..=MAX_TOTAL_DAYS).contains(&total_days) {
            return Err(ServiceError::ValidationError(format!(
                "item {}: rental must span between {} and {} days, got {}",
                line.item_id, MIN_TOTAL_DAYS, MAX_TOTAL_DAYS, total_days
            )));
        }

        if line.start_date <= today {
            return Err(ServiceError::LeadTimeViolation(format!(
                "item {}: rentals must start at least one day ahead; {} is not after {}",
                line.item_id, line.start_date, today
            )));
        }

        prepared.push(PreparedLine {
            item_id: line.item_id,
            quantity: line.quantity,
            start_date: line.start_date,
            end_date: line.end_date,
            total_days: total_days as i32,
        });
    }

    Ok(prepared)
}

/// Non-blocking warning when any line starts within the short-notice
/// window. Acceptance is unaffected.
fn short_notice_warning(lines: &[PreparedLine], today: NaiveDate) -> Option<String> {
    lines
        .iter()
        .filter(|l| (l.start_date - today).num_days() <= SHORT_NOTICE_DAYS)
        .map(|l| {
            format!(
                "rental starting {} is less than {} days away; availability at the counter is not guaranteed",
                l.start_date, SHORT_NOTICE_DAYS
            )
        })
        .next()
}

/// Verifies virtual and physical stock for every line, resolving each
/// item's current location. Sibling lines in the same request for the
/// same item are counted against each other so a single batch cannot
/// oversubscribe on its own.
async fn check_lines_bookable<C: ConnectionTrait>(
    conn: &C,
    prepared: &[PreparedLine],
    exclude_reservation: Option<Uuid>,
) -> Result<Vec<(PreparedLine, Uuid)>, ServiceError> {
    let mut located = Vec::with_capacity(prepared.len());

    for (idx, line) in prepared.iter().enumerate() {
        let item = load_item(conn, line.item_id).await?;
        if !item.is_active {
            return Err(ServiceError::ValidationError(format!(
                "item {} is not rentable",
                item.id
            )));
        }

        let sibling_overlap: i32 = prepared
            .iter()
            .enumerate()
            .filter(|(j, other)| {
                *j != idx
                    && other.item_id == line.item_id
                    && windows_overlap(
                        other.start_date,
                        other.end_date,
                        line.start_date,
                        line.end_date,
                    )
            })
            .map(|(_, other)| other.quantity)
            .sum();

        let available = availability::available_quantity(
            conn,
            &item,
            line.start_date,
            line.end_date,
            exclude_reservation,
        )
        .await?;

        if available < line.quantity + sibling_overlap {
            return Err(ServiceError::InsufficientVirtualStock(format!(
                "item {} has {} available for {} to {}, requested {}",
                item.id,
                available.saturating_sub(sibling_overlap),
                line.start_date,
                line.end_date,
                line.quantity
            )));
        }

        // Physical stock only matters for units that could be out at the
        // same time, so the same overlap filter applies.
        if item.quantity_in_storage < line.quantity + sibling_overlap {
            return Err(ServiceError::InsufficientPhysicalStock(format!(
                "item {} has only {} in storage, requested {}",
                item.id, item.quantity_in_storage, line.quantity
            )));
        }

        located.push((line.clone(), item.location_id));
    }

    Ok(located)
}

/// Allocates a unique BK-YYYYMMDD-NNNN number, retrying on collision.
async fn generate_reservation_number<C: ConnectionTrait>(
    conn: &C,
) -> Result<String, ServiceError> {
    let date = Utc::now().format("%Y%m%d");

    for _ in 0..RESERVATION_NUMBER_ATTEMPTS {
        let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
        let candidate = format!("BK-{}-{:04}", date, suffix);

        let taken = reservation::Entity::find()
            .filter(reservation::Column::ReservationNumber.eq(&candidate))
            .count(conn)
            .await?
            > 0;

        if !taken {
            return Ok(candidate);
        }
    }

    Err(ServiceError::InternalError(
        "could not allocate a unique reservation number".to_string(),
    ))
}

async fn load_reservation<C: ConnectionTrait>(
    conn: &C,
    reservation_id: Uuid,
) -> Result<reservation::Model, ServiceError> {
    reservation::Entity::find_by_id(reservation_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Reservation {} not found", reservation_id)))
}

async fn load_lines<C: ConnectionTrait>(
    conn: &C,
    reservation_id: Uuid,
) -> Result<Vec<reservation_item::Model>, ServiceError> {
    Ok(reservation_item::Entity::find()
        .filter(reservation_item::Column::ReservationId.eq(reservation_id))
        .order_by_asc(reservation_item::Column::CreatedAt)
        .all(conn)
        .await?)
}

async fn load_item<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
) -> Result<item::Model, ServiceError> {
    item::Entity::find_by_id(item_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))
}

async fn set_line_status<C: ConnectionTrait>(
    conn: &C,
    line: reservation_item::Model,
    status: LineStatus,
) -> Result<reservation_item::Model, ServiceError> {
    let mut active: reservation_item::ActiveModel = line.into();
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(Some(Utc::now()));
    Ok(active.update(conn).await?)
}

async fn set_reservation_status<C: ConnectionTrait>(
    conn: &C,
    reservation: reservation::Model,
    status: ReservationStatus,
) -> Result<reservation::Model, ServiceError> {
    let mut active: reservation::ActiveModel = reservation.into();
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(Some(Utc::now()));
    Ok(active.update(conn).await?)
}

/// Marks every still-open line cancelled (soft; rows are kept).
async fn cancel_open_lines<C: ConnectionTrait>(
    conn: &C,
    reservation_id: Uuid,
) -> Result<(), ServiceError> {
    let lines = load_lines(conn, reservation_id).await?;
    for line in lines {
        if matches!(
            line.status_enum(),
            Some(LineStatus::Pending) | Some(LineStatus::Confirmed)
        ) {
            set_line_status(conn, line, LineStatus::Cancelled).await?;
        }
    }
    Ok(())
}

/// Derives the reservation-level status from its lines after a pickup
/// or return and persists it when it changed.
async fn apply_roll_up<C: ConnectionTrait>(
    conn: &C,
    reservation: reservation::Model,
    lines: &[reservation_item::Model],
) -> Result<reservation::Model, ServiceError> {
    match rolled_up_status(lines) {
        Some(status) if reservation.status != status.as_str() => {
            set_reservation_status(conn, reservation, status).await
        }
        _ => Ok(reservation),
    }
}

fn rolled_up_status(lines: &[reservation_item::Model]) -> Option<ReservationStatus> {
    let statuses: Vec<LineStatus> = lines.iter().filter_map(|l| l.status_enum()).collect();
    if statuses.is_empty() {
        return None;
    }

    let any_returned = statuses.iter().any(|s| *s == LineStatus::Returned);
    let all_terminal = statuses.iter().all(|s| s.is_terminal());
    if all_terminal && any_returned {
        return Some(ReservationStatus::Completed);
    }

    let any_picked_up = statuses.iter().any(|s| *s == LineStatus::PickedUp);
    let any_pending = statuses.iter().any(|s| *s == LineStatus::Pending);
    if any_picked_up && !any_pending {
        return Some(ReservationStatus::PickedUp);
    }

    None
}

fn to_response(
    reservation: reservation::Model,
    lines: Vec<reservation_item::Model>,
    warning: Option<String>,
) -> ReservationResponse {
    ReservationResponse {
        id: reservation.id,
        reservation_number: reservation.reservation_number,
        requester_id: reservation.requester_id,
        status: reservation.status,
        payment_status: reservation.payment_status,
        created_at: reservation.created_at,
        updated_at: reservation.updated_at,
        lines: lines
            .into_iter()
            .map(|l| LineResponse {
                id: l.id,
                item_id: l.item_id,
                location_id: l.location_id,
                quantity: l.quantity,
                start_date: l.start_date,
                end_date: l.end_date,
                total_days: l.total_days,
                status: l.status,
            })
            .collect(),
        warning,
    }
}
