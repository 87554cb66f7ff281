//! # Manejo de errores de la API
//!
//! Jerarquía de errores con thiserror. Cada variante decide su código HTTP y
//! registra el detalle interno; al cliente solo le llega un mensaje estable.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::error::Error;
use thiserror::Error;

use crate::upstream::UpstreamError;

/// Etapa del registro en la que falló una llamada externa
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStage {
    /// Creación del registro en NocoDB
    CreateRecord,
    /// Creación de la sesión de pago en Stripe
    CreatePaymentSession,
}

impl std::fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateRecord => f.write_str("create_record"),
            Self::CreatePaymentSession => f.write_str("create_payment_session"),
        }
    }
}

/// Tipos de error de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    /// Campo de la solicitud ausente o inválido
    #[error("Error de validación en campo '{field}': {message}")]
    Validation {
        field: String,
        message: String,
    },

    /// Petición sin cuerpo
    #[error("La petición no tiene cuerpo")]
    MissingBody,

    /// Falló una escritura en NocoDB o Stripe durante el registro
    #[error("Registro fallido en '{stage}': {source}")]
    RegistrationFailed {
        stage: RegistrationStage,
        #[source]
        source: UpstreamError,
    },

    /// Firma del webhook inválida
    #[error("Webhook Error: {0}")]
    Signature(String),

    /// Cuerpo firmado pero ilegible como evento
    #[error("Webhook Error: {0}")]
    MalformedEvent(String),

    /// El evento no permite encontrar su reserva
    #[error("El evento '{event_id}' no contiene referencia a la reserva")]
    CorrelationMissing {
        event_id: String,
    },

    /// No hay datos para lo solicitado
    #[error("No encontrado: {0}")]
    NotFound(String),

    /// Fallo al leer de un servicio externo
    #[error("Error leyendo de un servicio externo: {0}")]
    Upstream(#[from] UpstreamError),

    /// Error interno con código de rastreo
    #[error("Error interno (trace: {trace_id}): {message}")]
    InternalWithTrace {
        trace_id: String,
        message: String,
    },
}

impl AppError {
    /// Crea un error de validación para un campo concreto
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn registration(stage: RegistrationStage, source: UpstreamError) -> Self {
        Self::RegistrationFailed { stage, source }
    }

    /// Crea un error interno con trace ID
    pub fn internal_trace(message: &str, trace_id: Option<String>) -> Self {
        Self::InternalWithTrace {
            trace_id: trace_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            message: message.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. }
            | Self::MissingBody
            | Self::Signature(_)
            | Self::MalformedEvent(_)
            | Self::CorrelationMissing { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RegistrationFailed { .. } | Self::Upstream(_) | Self::InternalWithTrace { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Log detallado del error antes de responder
        match self {
            Self::Validation { field, message } => {
                tracing::warn!(field = %field, message = %message, "Validation error");
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: format!("Invalid field '{}': {}", field, message),
                })
            }
            Self::MissingBody => {
                tracing::warn!("Request without body");
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Missing request body".to_string(),
                })
            }
            Self::RegistrationFailed { stage, source } => {
                tracing::error!(
                    stage = %stage,
                    error = %source,
                    error_chain = ?source.source(),
                    "Registration failed"
                );
                HttpResponse::InternalServerError().json(ErrorResponse {
                    error: "Registration failed".to_string(),
                })
            }
            Self::Signature(reason) => {
                tracing::warn!(reason = %reason, "Webhook signature rejected");
                HttpResponse::BadRequest()
                    .content_type("text/plain; charset=utf-8")
                    .body(format!("Webhook Error: {}", reason))
            }
            Self::MalformedEvent(reason) => {
                tracing::warn!(reason = %reason, "Webhook payload is not a valid event");
                HttpResponse::BadRequest()
                    .content_type("text/plain; charset=utf-8")
                    .body(format!("Webhook Error: {}", reason))
            }
            Self::CorrelationMissing { event_id } => {
                tracing::error!(event_id = %event_id, "Webhook event without booking correlation");
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Missing booking reference in payment metadata".to_string(),
                })
            }
            Self::NotFound(what) => {
                tracing::info!(what = %what, "Resource not found");
                HttpResponse::NotFound().json(ErrorResponse { error: what.clone() })
            }
            Self::Upstream(source) => {
                tracing::error!(error = %source, error_chain = ?source.source(), "Upstream error");
                HttpResponse::InternalServerError().json(ErrorResponse {
                    error: "Internal server error".to_string(),
                })
            }
            Self::InternalWithTrace { trace_id, message } => {
                tracing::error!(trace_id = %trace_id, message = %message, "Internal error with trace");
                HttpResponse::InternalServerError().json(ErrorResponse {
                    error: format!("Internal server error (trace: {})", trace_id),
                })
            }
        }
    }
}

#[derive(serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type AppResult<T> = Result<T, AppError>;
