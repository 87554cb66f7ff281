//! # Pagos
//!
//! Abstracción del procesador de pagos usada por el registro, más la
//! verificación de webhooks de Stripe.

pub mod stripe;

pub use stripe::{StripeClient, WebhookEvent};

use crate::upstream::UpstreamResult;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Claves de metadatos adjuntas a cada sesión de pago
pub mod metadata {
    pub const RECORD_ID: &str = "nocodb_record_id";
    pub const BOOKING_REFERENCE: &str = "booking_reference";
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const PHONE: &str = "phone";
}

/// Datos necesarios para crear una sesión de pago
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    /// Importe en la unidad principal de la moneda (ej. 45.00)
    pub amount: Decimal,
    pub description: String,
    pub customer_email: String,
    /// Pares clave/valor adjuntos a la sesión
    pub metadata: Vec<(String, String)>,
}

impl PaymentRequest {
    /// Importe en unidades menores (centavos), redondeado al entero más cercano
    pub fn minor_units(&self) -> Option<i64> {
        use rust_decimal::prelude::ToPrimitive;
        use rust_decimal::RoundingStrategy;
        (self.amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Punto de entrada al pago que se devuelve al formulario
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEntry {
    /// URL de Stripe Checkout
    RedirectUrl(String),
    /// `client_secret` de un PaymentIntent
    ClientSecret(String),
}

/// Sesión de pago creada en el procesador
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub id: String,
    pub entry: PaymentEntry,
}

/// Procesador de pagos externo
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Crea exactamente una sesión de pago para el importe indicado
    async fn create_session(&self, request: &PaymentRequest) -> UpstreamResult<PaymentSession>;
}
