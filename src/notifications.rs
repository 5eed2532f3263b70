use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// The message templates the booking engine can ask to have delivered.
/// Rendering and transport live entirely behind the [`Notifier`] seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateKind {
    ReservationCreated,
    ReservationConfirmed,
    ReservationRejected,
    ReservationCancelled,
    ReservationUpdated,
    ItemsPickedUp,
    ItemsReturned,
    InvoiceSent,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::ReservationCreated => "reservation_created",
            TemplateKind::ReservationConfirmed => "reservation_confirmed",
            TemplateKind::ReservationRejected => "reservation_rejected",
            TemplateKind::ReservationCancelled => "reservation_cancelled",
            TemplateKind::ReservationUpdated => "reservation_updated",
            TemplateKind::ItemsPickedUp => "items_picked_up",
            TemplateKind::ItemsReturned => "items_returned",
            TemplateKind::InvoiceSent => "invoice_sent",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notification seam. Recipients are addressed by the email the
/// identity provider resolved; delivery failures must never fail the
/// booking operation that triggered them, so callers log and move on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient_email: &str,
        template: TemplateKind,
        reservation_number: &str,
    ) -> Result<(), NotificationError>;
}

/// Notifier that records deliveries in the structured log. Stands in for
/// a mail or push transport in development and tests.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient_email: &str,
        template: TemplateKind,
        reservation_number: &str,
    ) -> Result<(), NotificationError> {
        info!(
            recipient_email,
            template = template.as_str(),
            reservation_number,
            "notification dispatched"
        );
        Ok(())
    }
}
