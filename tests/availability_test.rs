mod common;

use assert_matches::assert_matches;
use common::{admin, days_from_now, line, member, TestApp};
use rentstock_api::errors::ServiceError;
use rentstock_api::services::reservations::CreateReservationRequest;
use uuid::Uuid;

#[tokio::test]
async fn availability_decreases_with_bookings_and_rejects_oversubscription() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;
    let requester_a = member();
    let requester_b = member();

    // A books 3 units for a ten-day-out window.
    app.service
        .create_reservation(
            requester_a,
            CreateReservationRequest {
                lines: vec![line(item, 3, 10, 12)],
            },
        )
        .await
        .expect("first booking fits");

    let report = app
        .service
        .check_availability(item, days_from_now(10), days_from_now(12))
        .await
        .expect("availability query");
    assert_eq!(report.total_quantity, 5);
    assert_eq!(report.already_booked, 3);
    assert_eq!(report.available, 2);

    // B wants 3 for the same window: only 2 left.
    let err = app
        .service
        .create_reservation(
            requester_b,
            CreateReservationRequest {
                lines: vec![line(item, 3, 10, 12)],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientVirtualStock(_));

    // B scales down to 2: fits exactly.
    app.service
        .create_reservation(
            requester_b,
            CreateReservationRequest {
                lines: vec![line(item, 2, 10, 12)],
            },
        )
        .await
        .expect("second booking fits");

    // Nothing left for any overlapping request.
    let err = app
        .service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 1, 11, 13)],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientVirtualStock(_));

    let report = app
        .service
        .check_availability(item, days_from_now(10), days_from_now(12))
        .await
        .expect("availability query");
    assert_eq!(report.available, 0);
}

#[tokio::test]
async fn touching_windows_overlap_but_disjoint_windows_do_not() {
    let app = TestApp::new().await;
    let item = app.seed_item(1).await;

    app.service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 1, 10, 12)],
            },
        )
        .await
        .expect("booking fits");

    // Shares the boundary day: still an overlap.
    let touching = app
        .service
        .check_availability(item, days_from_now(12), days_from_now(14))
        .await
        .expect("availability query");
    assert_eq!(touching.available, 0);

    // Starts the day after the booking ends: fully free.
    let disjoint = app
        .service
        .check_availability(item, days_from_now(13), days_from_now(15))
        .await
        .expect("availability query");
    assert_eq!(disjoint.available, 1);
}

#[tokio::test]
async fn cancelling_restores_availability_by_the_booked_amount() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;
    let requester = member();

    let reservation = app
        .service
        .create_reservation(
            requester,
            CreateReservationRequest {
                lines: vec![line(item, 4, 10, 12)],
            },
        )
        .await
        .expect("booking fits");

    let before = app
        .service
        .check_availability(item, days_from_now(10), days_from_now(12))
        .await
        .expect("availability query");
    assert_eq!(before.available, 1);

    app.service
        .cancel_reservation(reservation.id, requester)
        .await
        .expect("owner cancels pending");

    let after = app
        .service
        .check_availability(item, days_from_now(10), days_from_now(12))
        .await
        .expect("availability query");
    assert_eq!(after.available, 5);
}

#[tokio::test]
async fn rejection_restores_availability() {
    let app = TestApp::new().await;
    let item = app.seed_item(2).await;

    let reservation = app
        .service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 2, 10, 12)],
            },
        )
        .await
        .expect("booking fits");

    app.service
        .reject_reservation(reservation.id, admin())
        .await
        .expect("admin rejects");

    let report = app
        .service
        .check_availability(item, days_from_now(10), days_from_now(12))
        .await
        .expect("availability query");
    assert_eq!(report.available, 2);
}

#[tokio::test]
async fn one_batch_cannot_oversubscribe_an_item_across_its_own_lines() {
    let app = TestApp::new().await;
    let item = app.seed_item(5).await;

    let err = app
        .service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 3, 10, 12), line(item, 3, 11, 13)],
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientVirtualStock(_));

    // Non-overlapping windows for the same item are fine.
    app.service
        .create_reservation(
            member(),
            CreateReservationRequest {
                lines: vec![line(item, 3, 10, 12), line(item, 3, 20, 22)],
            },
        )
        .await
        .expect("disjoint windows fit");
}

#[tokio::test]
async fn availability_query_validates_input() {
    let app = TestApp::new().await;
    let item = app.seed_item(1).await;

    let err = app
        .service
        .check_availability(item, days_from_now(12), days_from_now(10))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = app
        .service
        .check_availability(Uuid::new_v4(), days_from_now(10), days_from_now(12))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
