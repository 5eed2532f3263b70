mod common;

use assert_matches::assert_matches;
use common::{admin, days_from_now, line, manager, member, TestApp};
use rentstock_api::errors::ServiceError;
use rentstock_api::services::reservations::{
    CreateReservationRequest, ReservationFilter, UpdatePaymentStatusRequest,
    UpdateReservationRequest,
};
use uuid::Uuid;

#[tokio::test]
async fn full_rental_cycle_moves_stock_through_the_ledger() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;
    let requester = member();

    let reservation = app
        .service
        .create_reservation(
            requester,
            CreateReservationRequest {
                lines: vec![line(item, 2, 10, 12)],
            },
        )
        .await
        .expect("create");
    assert_eq!(reservation.status, "pending");
    assert_eq!(reservation.lines.len(), 1);
    assert_eq!(reservation.lines[0].total_days, 2);
    assert!(reservation.warning.is_none());
    // BK-YYYYMMDD-NNNN
    assert_eq!(reservation.reservation_number.len(), 16);
    assert!(reservation.reservation_number.starts_with("BK-"));

    let ack = app
        .service
        .confirm_reservation(reservation.id, admin())
        .await
        .expect("confirm");
    assert_eq!(ack.status, "confirmed");

    // Confirmation alone does not touch physical stock.
    assert_eq!(app.in_storage(item).await, 5);

    // Open the pickup window and hand the gear over.
    let line_id = reservation.lines[0].id;
    app.backdate_line(line_id, 10).await;
    let ack = app
        .service
        .confirm_pickup(line_id, requester)
        .await
        .expect("pickup");
    assert_eq!(ack.status, "picked_up");
    assert_eq!(app.in_storage(item).await, 3);

    let ack = app
        .service
        .return_items(reservation.id, admin())
        .await
        .expect("return");
    assert_eq!(ack.status, "completed");
    assert_eq!(app.in_storage(item).await, 5);

    let fetched = app
        .service
        .get_reservation(reservation.id, requester)
        .await
        .expect("get");
    assert_eq!(fetched.status, "completed");
    assert_eq!(fetched.lines[0].status, "returned");
}

#[tokio::test]
async fn create_rejects_bad_windows_and_lead_time() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;

    // Starting today violates the one-day lead time.
    let err = app
        .service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 1, 0, 2)],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::LeadTimeViolation(_));

    // End before start.
    let err = app
        .service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 1, 12, 10)],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // Same-day start and end is a zero-day rental.
    let err = app
        .service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 1, 10, 10)],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // Six weeks is the ceiling; one day past it is refused.
    app.service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 1, 1, 43)],
            },
        )
        .await
        .expect("42-day rental fits");
    let err = app
        .service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 1, 1, 44)],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn short_notice_start_carries_a_warning() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;

    let reservation = app
        .service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 1, 1, 3)],
            },
        )
        .await
        .expect("create");
    assert!(reservation.warning.is_some());
}

#[tokio::test]
async fn lifecycle_transitions_reject_wrong_states() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;
    let requester = member();

    let reservation = app
        .service
        .create_reservation(
            requester,
            CreateReservationRequest {
                lines: vec![line(item, 1, 10, 12)],
            },
        )
        .await
        .expect("create");

    app.service
        .confirm_reservation(reservation.id, admin())
        .await
        .expect("confirm");

    // Confirming twice.
    let err = app
        .service
        .confirm_reservation(reservation.id, admin())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyInState(_));

    // Rejecting past pending.
    let err = app
        .service
        .reject_reservation(reservation.id, admin())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyInState(_));

    // Returning with nothing picked up.
    let err = app
        .service
        .return_items(reservation.id, admin())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyInState(_));

    // Picking up the same line twice.
    let line_id = reservation.lines[0].id;
    app.backdate_line(line_id, 10).await;
    app.service
        .confirm_pickup(line_id, requester)
        .await
        .expect("pickup");
    let err = app
        .service
        .confirm_pickup(line_id, requester)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyInState(_));

    // Cancelling a completed reservation.
    app.service
        .return_items(reservation.id, admin())
        .await
        .expect("return");
    let err = app
        .service
        .cancel_reservation(reservation.id, admin())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyInState(_));
}

#[tokio::test]
async fn pickup_requires_a_confirmed_line_inside_its_window() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;
    let requester = member();

    let reservation = app
        .service
        .create_reservation(
            requester,
            CreateReservationRequest {
                lines: vec![line(item, 1, 10, 12)],
            },
        )
        .await
        .expect("create");
    let line_id = reservation.lines[0].id;

    // Still pending: no handover before staff confirmation.
    let err = app
        .service
        .confirm_pickup(line_id, requester)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    app.service
        .confirm_reservation(reservation.id, admin())
        .await
        .expect("confirm");

    // Confirmed, but the rental has not started yet.
    let err = app
        .service
        .confirm_pickup(line_id, requester)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(app.in_storage(item).await, 5);

    // Shift the window so far back that it already ended.
    app.backdate_line(line_id, 40).await;
    let err = app
        .service
        .confirm_pickup(line_id, requester)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn owners_cancel_only_while_pending() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;
    let requester = member();

    let reservation = app
        .service
        .create_reservation(
            requester,
            CreateReservationRequest {
                lines: vec![line(item, 1, 10, 12)],
            },
        )
        .await
        .expect("create");

    // A stranger cannot cancel someone else's reservation.
    let err = app
        .service
        .cancel_reservation(reservation.id, member())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    app.service
        .confirm_reservation(reservation.id, admin())
        .await
        .expect("confirm");

    // Once confirmed, the owner must go through staff.
    let err = app
        .service
        .cancel_reservation(reservation.id, requester)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    // Staff can still cancel it.
    let ack = app
        .service
        .cancel_reservation(reservation.id, admin())
        .await
        .expect("admin cancel");
    assert_eq!(ack.status, "cancelled_by_admin");
}

#[tokio::test]
async fn admin_cancel_after_pickup_restores_the_ledger() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;
    let requester = member();

    let reservation = app
        .service
        .create_reservation(
            requester,
            CreateReservationRequest {
                lines: vec![line(item, 3, 10, 12)],
            },
        )
        .await
        .expect("create");
    app.service
        .confirm_reservation(reservation.id, admin())
        .await
        .expect("confirm");

    let line_id = reservation.lines[0].id;
    app.backdate_line(line_id, 10).await;
    app.service
        .confirm_pickup(line_id, requester)
        .await
        .expect("pickup");
    assert_eq!(app.in_storage(item).await, 2);

    app.service
        .cancel_reservation(reservation.id, admin())
        .await
        .expect("force cancel");
    assert_eq!(app.in_storage(item).await, 5);

    let fetched = app
        .service
        .get_reservation(reservation.id, admin())
        .await
        .expect("get");
    assert_eq!(fetched.status, "cancelled_by_admin");
    assert_eq!(fetched.lines[0].status, "cancelled");
}

#[tokio::test]
async fn staff_only_operations_refuse_members_and_managers() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;
    let requester = member();

    let reservation = app
        .service
        .create_reservation(
            requester,
            CreateReservationRequest {
                lines: vec![line(item, 1, 10, 12)],
            },
        )
        .await
        .expect("create");

    let err = app
        .service
        .confirm_reservation(reservation.id, requester)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let err = app
        .service
        .delete_reservation(reservation.id, requester)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let err = app
        .service
        .return_items(reservation.id, requester)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let err = app
        .service
        .update_payment_status(
            reservation.id,
            requester,
            UpdatePaymentStatusRequest {
                payment_status: "paid".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    // Managers count as staff.
    let ack = app
        .service
        .confirm_reservation(reservation.id, manager())
        .await
        .expect("manager confirm");
    assert_eq!(ack.status, "confirmed");
}

#[tokio::test]
async fn reject_only_applies_to_pending_reservations() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;

    let reservation = app
        .service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 1, 10, 12)],
            },
        )
        .await
        .expect("create");

    let ack = app
        .service
        .reject_reservation(reservation.id, admin())
        .await
        .expect("reject");
    assert_eq!(ack.status, "rejected");

    let fetched = app
        .service
        .get_reservation(reservation.id, admin())
        .await
        .expect("get");
    assert_eq!(fetched.lines[0].status, "cancelled");
}

#[tokio::test]
async fn update_replaces_lines_while_pending_only() {
    let app = TestApp::new().await;
    let item_a = app.seed_item(5).await;
    let item_b = app.seed_item(5).await;
    let requester = member();

    let reservation = app
        .service
        .create_reservation(
            requester,
            CreateReservationRequest {
                lines: vec![line(item_a, 5, 10, 12)],
            },
        )
        .await
        .expect("create");

    // Re-planning may reuse the capacity held by the old lines.
    let updated = app
        .service
        .update_reservation(
            reservation.id,
            requester,
            UpdateReservationRequest {
                lines: vec![line(item_a, 4, 10, 12), line(item_b, 2, 10, 12)],
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.lines.len(), 2);

    let report = app
        .service
        .check_availability(item_a, days_from_now(10), days_from_now(12))
        .await
        .expect("availability");
    assert_eq!(report.available, 1);

    // Strangers cannot re-plan it.
    let err = app
        .service
        .update_reservation(
            reservation.id,
            member(),
            UpdateReservationRequest {
                lines: vec![line(item_a, 1, 10, 12)],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    // Once confirmed, the line set is frozen.
    app.service
        .confirm_reservation(reservation.id, admin())
        .await
        .expect("confirm");
    let err = app
        .service
        .update_reservation(
            reservation.id,
            requester,
            UpdateReservationRequest {
                lines: vec![line(item_a, 1, 10, 12)],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyInState(_));
}

#[tokio::test]
async fn updating_with_no_lines_cancels_the_reservation() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;
    let requester = member();

    let reservation = app
        .service
        .create_reservation(
            requester,
            CreateReservationRequest {
                lines: vec![line(item, 2, 10, 12)],
            },
        )
        .await
        .expect("create");

    let updated = app
        .service
        .update_reservation(
            reservation.id,
            requester,
            UpdateReservationRequest { lines: vec![] },
        )
        .await
        .expect("empty update");
    assert_eq!(updated.status, "cancelled_by_user");
}

#[tokio::test]
async fn deleted_reservations_stay_visible_to_admins_only() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;
    let requester = member();

    let reservation = app
        .service
        .create_reservation(
            requester,
            CreateReservationRequest {
                lines: vec![line(item, 1, 10, 12)],
            },
        )
        .await
        .expect("create");

    app.service
        .delete_reservation(reservation.id, admin())
        .await
        .expect("delete");

    let err = app
        .service
        .get_reservation(reservation.id, requester)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let fetched = app
        .service
        .get_reservation(reservation.id, admin())
        .await
        .expect("admin get");
    assert_eq!(fetched.status, "deleted");

    let err = app
        .service
        .delete_reservation(reservation.id, admin())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyInState(_));
}

#[tokio::test]
async fn payment_status_validates_its_vocabulary() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;

    let reservation = app
        .service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 1, 10, 12)],
            },
        )
        .await
        .expect("create");

    app.service
        .update_payment_status(
            reservation.id,
            admin(),
            UpdatePaymentStatusRequest {
                payment_status: "invoice-sent".to_string(),
            },
        )
        .await
        .expect("invoice-sent");

    let fetched = app
        .service
        .get_reservation(reservation.id, admin())
        .await
        .expect("get");
    assert_eq!(fetched.payment_status.as_deref(), Some("invoice-sent"));

    let err = app
        .service
        .update_payment_status(
            reservation.id,
            admin(),
            UpdatePaymentStatusRequest {
                payment_status: "definitely-not-a-status".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn listing_scopes_members_to_their_own_reservations() {
    let app = TestApp::new().await;
    let item = app.seed_item(20).await;
    let alice = member();
    let bob = member();

    for requester in [alice, alice, bob] {
        app.service
            .create_reservation(
                requester,
                CreateReservationRequest {
                    lines: vec![line(item, 1, 10, 12)],
                },
            )
            .await
            .expect("create");
    }

    let mine = app
        .service
        .list_reservations(alice, ReservationFilter::default(), 1, 20)
        .await
        .expect("list");
    assert_eq!(mine.total, 2);
    assert!(mine
        .reservations
        .iter()
        .all(|r| r.requester_id == alice.user_id));

    let everything = app
        .service
        .list_reservations(admin(), ReservationFilter::default(), 1, 20)
        .await
        .expect("admin list");
    assert_eq!(everything.total, 3);

    let bobs = app
        .service
        .list_reservations(
            admin(),
            ReservationFilter {
                requester_id: Some(bob.user_id),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .expect("filtered list");
    assert_eq!(bobs.total, 1);

    let err = app
        .service
        .list_reservations(
            admin(),
            ReservationFilter {
                status: Some("no-such-status".to_string()),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn unknown_reservation_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .service
        .get_reservation(Uuid::new_v4(), admin())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
