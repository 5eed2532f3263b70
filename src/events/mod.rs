use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::identity::IdentityProvider;
use crate::notifications::{Notifier, TemplateKind};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Events emitted after a booking operation commits. Emission is strictly
/// post-commit; a rolled-back transaction must never produce an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation_id: Uuid,
        reservation_number: String,
        requester_id: Uuid,
        short_notice: bool,
    },
    ReservationConfirmed {
        reservation_id: Uuid,
        reservation_number: String,
        requester_id: Uuid,
    },
    ReservationRejected {
        reservation_id: Uuid,
        reservation_number: String,
        requester_id: Uuid,
    },
    ReservationCancelled {
        reservation_id: Uuid,
        reservation_number: String,
        requester_id: Uuid,
        by_admin: bool,
    },
    ReservationUpdated {
        reservation_id: Uuid,
        reservation_number: String,
        requester_id: Uuid,
    },
    ReservationDeleted {
        reservation_id: Uuid,
        reservation_number: String,
        requester_id: Uuid,
    },
    ItemsPickedUp {
        reservation_id: Uuid,
        reservation_number: String,
        requester_id: Uuid,
        line_count: usize,
    },
    ItemsReturned {
        reservation_id: Uuid,
        reservation_number: String,
        requester_id: Uuid,
        line_count: usize,
        completed: bool,
    },
    PaymentStatusChanged {
        reservation_id: Uuid,
        reservation_number: String,
        requester_id: Uuid,
        payment_status: String,
    },
}

impl Event {
    /// The notification template a given event maps to, if any.
    fn template(&self) -> Option<TemplateKind> {
        match self {
            Event::ReservationCreated { .. } => Some(TemplateKind::ReservationCreated),
            Event::ReservationConfirmed { .. } => Some(TemplateKind::ReservationConfirmed),
            Event::ReservationRejected { .. } => Some(TemplateKind::ReservationRejected),
            Event::ReservationCancelled { .. } => Some(TemplateKind::ReservationCancelled),
            Event::ReservationUpdated { .. } => Some(TemplateKind::ReservationUpdated),
            Event::ItemsPickedUp { .. } => Some(TemplateKind::ItemsPickedUp),
            Event::ItemsReturned { .. } => Some(TemplateKind::ItemsReturned),
            Event::PaymentStatusChanged { payment_status, .. } => {
                if payment_status == "invoice-sent" {
                    Some(TemplateKind::InvoiceSent)
                } else {
                    None
                }
            }
            Event::ReservationDeleted { .. } => None,
        }
    }

    fn recipient(&self) -> Uuid {
        match self {
            Event::ReservationCreated { requester_id, .. }
            | Event::ReservationConfirmed { requester_id, .. }
            | Event::ReservationRejected { requester_id, .. }
            | Event::ReservationCancelled { requester_id, .. }
            | Event::ReservationUpdated { requester_id, .. }
            | Event::ReservationDeleted { requester_id, .. }
            | Event::ItemsPickedUp { requester_id, .. }
            | Event::ItemsReturned { requester_id, .. }
            | Event::PaymentStatusChanged { requester_id, .. } => *requester_id,
        }
    }

    fn reservation_number(&self) -> &str {
        match self {
            Event::ReservationCreated { reservation_number, .. }
            | Event::ReservationConfirmed { reservation_number, .. }
            | Event::ReservationRejected { reservation_number, .. }
            | Event::ReservationCancelled { reservation_number, .. }
            | Event::ReservationUpdated { reservation_number, .. }
            | Event::ReservationDeleted { reservation_number, .. }
            | Event::ItemsPickedUp { reservation_number, .. }
            | Event::ItemsReturned { reservation_number, .. }
            | Event::PaymentStatusChanged { reservation_number, .. } => reservation_number,
        }
    }
}

/// Drains the event channel, resolving each event's recipient through
/// the identity provider and forwarding the notification. A failed
/// resolution or delivery is logged and dropped; it never propagates
/// back into the booking path.
pub async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn Notifier>,
) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!("Received event: {:?}", event);

        let Some(template) = event.template() else {
            continue;
        };

        let profile = match identity.resolve(event.recipient()).await {
            Ok(profile) => profile,
            Err(e) => {
                error!(
                    "Failed to resolve notification recipient: user_id={}, error={}",
                    event.recipient(),
                    e
                );
                continue;
            }
        };

        if let Err(e) = notifier
            .notify(&profile.email, template, event.reservation_number())
            .await
        {
            error!(
                "Failed to deliver notification: template={}, reservation_number={}, error={}",
                template.as_str(),
                event.reservation_number(),
                e
            );
        }
    }

    warn!("Event channel closed; stopping event processing loop");
}
