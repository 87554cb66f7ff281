//! # Webhook de Stripe
//!
//! `POST /webhook` recibe el cuerpo crudo (sin parsear) para verificar la firma
//! HMAC. Una vez verificado y clasificado el evento, siempre responde 200: los
//! fallos al actualizar NocoDB solo se registran, para que Stripe no reintente
//! en bucle mientras el almacén está caído.

use actix_web::{post, web, HttpRequest, HttpResponse};
use serde_json::json;
use thiserror::Error;

use super::middleware::ErrorLogExt;
use super::{AppError, AppResult};
use crate::db::{BookingPatch, PaymentStatus, RecordId, RecordStore};
use crate::payments::stripe::{self, SIGNATURE_HEADER};
use crate::payments::{metadata, WebhookEvent};
use crate::state::AppState;
use crate::upstream::UpstreamError;

/// Cómo encontrar la reserva a partir de los metadatos de la sesión
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// Id del registro en NocoDB (preferido)
    RecordId(RecordId),
    /// Referencia generada al registrar, buscada con filtro
    BookingReference(String),
}

impl Correlation {
    pub fn from_event(event: &WebhookEvent) -> Option<Self> {
        event
            .metadata(metadata::RECORD_ID)
            .map(|id| Correlation::RecordId(RecordId(id.to_string())))
            .or_else(|| {
                event
                    .metadata(metadata::BOOKING_REFERENCE)
                    .map(|r| Correlation::BookingReference(r.to_string()))
            })
    }
}

impl std::fmt::Display for Correlation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RecordId(id) => write!(f, "Id={}", id),
            Self::BookingReference(r) => write!(f, "BookingReference={}", r),
        }
    }
}

/// Resultado de conciliar una reserva
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Se marcó la reserva como `Succeeded`
    Updated(RecordId),
    /// La reserva ya estaba pagada; reentrega del mismo evento
    AlreadySettled(RecordId),
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("No existe la reserva con {0}")]
    RecordNotFound(Correlation),

    #[error("Error del almacén de reservas: {0}")]
    Store(#[from] UpstreamError),
}

/// Marca la reserva como pagada
///
/// El estado solo avanza a `Succeeded` y `PaymentReference` solo se escribe si
/// estaba vacío, por lo que reentregar el mismo evento no cambia nada.
pub async fn reconcile(
    store: &dyn RecordStore,
    correlation: &Correlation,
    payment_reference: Option<&str>,
) -> Result<ReconcileOutcome, ReconcileError> {
    let record = match correlation {
        Correlation::RecordId(id) => store.get_booking(id).await?,
        Correlation::BookingReference(reference) => store.find_by_booking_reference(reference).await?,
    }
    .ok_or_else(|| ReconcileError::RecordNotFound(correlation.clone()))?;

    tracing::debug!(
        record_id = %record.id,
        booking_reference = ?record.booking_reference,
        status = ?record.payment_status,
        "Reserva encontrada para conciliar"
    );

    if record.is_settled() {
        return Ok(ReconcileOutcome::AlreadySettled(record.id));
    }

    let has_reference = record.payment_reference.as_deref().is_some_and(|r| !r.is_empty());
    let patch = BookingPatch {
        id: record.id.clone(),
        payment_status: PaymentStatus::Succeeded,
        payment_reference: if has_reference {
            None
        } else {
            payment_reference.map(String::from)
        },
    };
    store.patch_booking(&patch).await?;

    Ok(ReconcileOutcome::Updated(record.id))
}

fn received() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "received": true }))
}

/// Procesa un evento de Stripe
///
/// # Respuesta
/// - `200 {"received": true}`: evento verificado y clasificado
/// - `400 Webhook Error: <motivo>`: firma ausente, inválida o cuerpo ilegible
/// - `400 {"error": ...}`: evento de pago sin referencia a la reserva
#[post("/webhook")]
async fn stripe_webhook(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> AppResult<HttpResponse> {
    let sig_header = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Signature("Missing Stripe-Signature header".to_string()))?;

    let stripe_config = &state.config.stripe;
    stripe::verify_signature(
        &body,
        sig_header,
        &stripe_config.webhook_secret,
        stripe_config.webhook_tolerance,
        chrono::Utc::now().timestamp(),
    )
    .map_err(|e| AppError::Signature(e.to_string()))?;

    let event: WebhookEvent =
        serde_json::from_slice(&body).map_err(|e| AppError::MalformedEvent(e.to_string()))?;

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Webhook de Stripe recibido");

    if !event.is_completion() {
        tracing::debug!(event_type = %event.event_type, "Evento ignorado");
        return Ok(received());
    }

    let correlation = Correlation::from_event(&event).ok_or_else(|| AppError::CorrelationMissing {
        event_id: event.id.clone(),
    })?;
    let session_id = event.data.object.id.as_deref();

    let outcome = reconcile(state.records.as_ref(), &correlation, session_id)
        .await
        .log_and_discard("reconcile_booking");

    match outcome {
        Some(ReconcileOutcome::Updated(record_id)) => {
            tracing::info!(record_id = %record_id, session_id = ?session_id, "Reserva marcada como pagada");
        }
        Some(ReconcileOutcome::AlreadySettled(record_id)) => {
            tracing::info!(record_id = %record_id, event_id = %event.id, "Reserva ya pagada, evento repetido");
        }
        None => {
            tracing::warn!(correlation = %correlation, event_id = %event.id, "Conciliación pendiente de revisión manual");
        }
    }

    Ok(received())
}

/// Configura la ruta del webhook
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(stripe_webhook);
}
