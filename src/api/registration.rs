//! # API de Registro
//!
//! Recibe el formulario de reserva, crea el registro `Pending` en NocoDB y la
//! sesión de pago en Stripe, y devuelve al formulario el punto de entrada al
//! pago (`{url}` o `{clientSecret}`).
//!
//! La secuencia registro → sesión no es atómica: si Stripe falla después de
//! crear el registro, este queda en `Pending` sin referencia de pago y se
//! limpia manualmente.

use std::collections::HashMap;
use std::str::FromStr;

use actix_web::{post, web, HttpResponse};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use super::errors::RegistrationStage;
use super::{AppError, AppResult};
use crate::db::{NewBooking, PaymentStatus, RecordId};
use crate::payments::{metadata, PaymentEntry, PaymentRequest};
use crate::sheets::attendance::normalize_date;
use crate::state::AppState;

/// Reserva enviada por el formulario, ya validada y tipada
///
/// El importe (`amount`) lo calcula el formulario y es la base del cobro; el
/// servidor no lo recalcula a partir de adultos, niños, descuento y donación.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub date: NaiveDate,
    pub meal: String,
    pub adults: u32,
    pub kids: u32,
    pub discount: bool,
    pub discount_amount: Decimal,
    pub donation: Decimal,
    pub comments: String,
    pub amount: Decimal,
}

/// Campos del formulario como texto, con los nombres en minúsculas
struct FormFields(HashMap<String, String>);

impl FormFields {
    /// Acepta `{fields: {name: {value: ..}}}` o un objeto plano
    fn from_body(body: &Value) -> AppResult<Self> {
        let object = match body.get("fields") {
            Some(Value::Object(fields)) => fields,
            Some(_) => return Err(AppError::validation("fields", "must be an object")),
            None => body
                .as_object()
                .ok_or_else(|| AppError::validation("body", "must be a JSON object"))?,
        };

        let fields = object
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::Object(inner) => inner.get("value").map(value_text).unwrap_or_default(),
                    other => value_text(other),
                };
                (key.trim().to_lowercase(), value.trim().to_string())
            })
            .collect();

        Ok(FormFields(fields))
    }

    fn text(&self, name: &str) -> String {
        self.0.get(name).cloned().unwrap_or_default()
    }

    fn required(&self, name: &str) -> AppResult<String> {
        let value = self.text(name);
        if value.is_empty() {
            return Err(AppError::validation(name, "is required"));
        }
        Ok(value)
    }

    /// Entero ≥ 0 tomado de los dígitos iniciales ("2.0" y "2 adults" son 2);
    /// vacío o sin dígitos cuenta como 0
    fn count(&self, name: &str) -> AppResult<u32> {
        let raw = self.text(name);
        let trimmed = raw.trim();
        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let end = unsigned
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(unsigned.len());
        let digits = &unsigned[..end];

        if digits.is_empty() {
            return Ok(0);
        }
        if negative && digits.bytes().any(|b| b != b'0') {
            return Err(AppError::validation(name, "must not be negative"));
        }
        digits
            .parse::<u32>()
            .map_err(|_| AppError::validation(name, "is too large"))
    }

    /// Decimal ≥ 0; vacío o no numérico cuenta como 0
    fn money(&self, name: &str) -> AppResult<Decimal> {
        match Decimal::from_str(&self.text(name)) {
            Ok(n) if n.is_sign_negative() && !n.is_zero() => Err(AppError::validation(name, "must not be negative")),
            Ok(n) => Ok(n),
            Err(_) => Ok(Decimal::ZERO),
        }
    }

    fn flag(&self, name: &str) -> bool {
        let raw = self.text(name).to_lowercase();
        !matches!(raw.as_str(), "" | "false" | "0" | "no" | "off")
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        Value::Null | Value::Object(_) => String::new(),
    }
}

/// Valida un email de forma básica
fn validate_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

impl ReservationSubmission {
    /// Convierte el cuerpo de la petición en una reserva tipada
    ///
    /// # Errores
    /// - `Validation`: si falta `name`, `email`, `date` o `amount`, o alguno es inválido
    pub fn parse(body: &Value) -> AppResult<Self> {
        let fields = FormFields::from_body(body)?;

        let name = fields.required("name")?;

        let email = fields.required("email")?;
        if !validate_email(&email) {
            return Err(AppError::validation("email", "is not a valid email address"));
        }

        let date = normalize_date(&fields.required("date")?)
            .ok_or_else(|| AppError::validation("date", "is not a recognizable date"))?;

        let amount = Decimal::from_str(&fields.required("amount")?)
            .map_err(|_| AppError::validation("amount", "must be a decimal number"))?;
        if amount <= Decimal::ZERO {
            return Err(AppError::validation("amount", "must be greater than zero"));
        }
        if amount.normalize().scale() > 2 {
            return Err(AppError::validation("amount", "must have at most two decimals"));
        }

        Ok(ReservationSubmission {
            name,
            email,
            phone: fields.text("phone"),
            date,
            meal: fields.text("meal"),
            adults: fields.count("adults")?,
            kids: fields.count("kids")?,
            discount: fields.flag("discount"),
            discount_amount: fields.money("discount_amount")?,
            donation: fields.money("donation")?,
            comments: fields.text("comments"),
            amount,
        })
    }

    pub fn to_new_booking(&self, booking_reference: &str) -> NewBooking {
        NewBooking {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            date: self.date.format("%Y-%m-%d").to_string(),
            meal: self.meal.clone(),
            adults: self.adults,
            kids: self.kids,
            discount: self.discount,
            donation: self.donation,
            discount_amount: self.discount_amount,
            comments: self.comments.clone(),
            amount: self.amount,
            payment_status: PaymentStatus::Pending,
            booking_reference: booking_reference.to_string(),
        }
    }

    pub fn payment_request(&self, record_id: &RecordId, booking_reference: &str) -> PaymentRequest {
        let description = if self.meal.is_empty() {
            format!("Shabbat Reservation ({})", self.name)
        } else {
            format!("Shabbat Reservation - {} ({})", self.meal, self.name)
        };

        PaymentRequest {
            amount: self.amount,
            description,
            customer_email: self.email.clone(),
            metadata: vec![
                (metadata::RECORD_ID.to_string(), record_id.to_string()),
                (metadata::BOOKING_REFERENCE.to_string(), booking_reference.to_string()),
                (metadata::NAME.to_string(), self.name.clone()),
                (metadata::EMAIL.to_string(), self.email.clone()),
                (metadata::PHONE.to_string(), self.phone.clone()),
            ],
        }
    }
}

fn new_booking_reference() -> String {
    format!("bk_{}", uuid::Uuid::new_v4().simple())
}

/// Registra una reserva y abre su sesión de pago
///
/// # Respuesta
/// ```json
/// { "url": "https://checkout.stripe.com/c/pay/cs_..." }
/// ```
/// o, con `PAYMENT_FLOW=payment_intent`:
/// ```json
/// { "clientSecret": "pi_..._secret_..." }
/// ```
///
/// # Errores
/// - `400 Bad Request`: cuerpo ausente o campos inválidos (sin llamadas externas)
/// - `500 Internal Server Error`: falló NocoDB o Stripe
#[post("/register")]
async fn register(state: web::Data<AppState>, body: web::Bytes) -> AppResult<HttpResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::MissingBody);
    }

    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::validation("body", &format!("is not valid JSON ({})", e)))?;
    let submission = ReservationSubmission::parse(&value)?;

    let booking_reference = new_booking_reference();
    let record_id = state
        .records
        .create_booking(&submission.to_new_booking(&booking_reference))
        .await
        .map_err(|e| AppError::registration(RegistrationStage::CreateRecord, e))?;

    tracing::info!(
        record_id = %record_id,
        booking_reference = %booking_reference,
        amount = %submission.amount,
        "Reserva creada en estado Pending"
    );

    let request = submission.payment_request(&record_id, &booking_reference);
    let session = state.payments.create_session(&request).await.map_err(|e| {
        tracing::warn!(
            record_id = %record_id,
            booking_reference = %booking_reference,
            "Reserva queda en Pending sin sesión de pago"
        );
        AppError::registration(RegistrationStage::CreatePaymentSession, e)
    })?;

    tracing::info!(record_id = %record_id, session_id = %session.id, "Sesión de pago creada");

    let response = match session.entry {
        PaymentEntry::RedirectUrl(url) => json!({ "url": url }),
        PaymentEntry::ClientSecret(secret) => json!({ "clientSecret": secret }),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Configura las rutas de registro
///
/// # Rutas disponibles
/// - `POST /register` - Crear reserva y sesión de pago
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(register);
}
