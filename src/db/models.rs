use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Estado de pago de una reserva
///
/// Solo avanza: `Pending` → `Succeeded`. Nunca se vuelve a `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Succeeded,
}

/// Identificador opaco asignado por NocoDB al crear el registro
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// NocoDB espera el Id numérico en los PATCH
impl Serialize for RecordId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<u64>() {
            Ok(n) => serializer.serialize_u64(n),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

// NocoDB devuelve el Id como número, pero los metadatos de Stripe lo traen como texto
impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) if !s.is_empty() => Ok(RecordId(s)),
            serde_json::Value::Number(n) => Ok(RecordId(n.to_string())),
            other => Err(serde::de::Error::custom(format!("Id inválido: {}", other))),
        }
    }
}

/// Registro de reserva nuevo, tal como se envía a NocoDB
///
/// Los nombres de columna son los títulos de la tabla (incluida la errata
/// histórica "Childern/Students").
#[derive(Debug, Clone, Serialize)]
pub struct NewBooking {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Phone Number")]
    pub phone: String,
    #[serde(rename = "Shabbat Date")]
    pub date: String,
    #[serde(rename = "Meals")]
    pub meal: String,
    #[serde(rename = "Adults")]
    pub adults: u32,
    #[serde(rename = "Childern/Students")]
    pub kids: u32,
    #[serde(rename = "Discount")]
    pub discount: bool,
    #[serde(rename = "Donation", with = "rust_decimal::serde::float")]
    pub donation: Decimal,
    #[serde(rename = "Discounted Price", with = "rust_decimal::serde::float")]
    pub discount_amount: Decimal,
    #[serde(rename = "Comments")]
    pub comments: String,
    #[serde(rename = "Total Amount", with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "PaymentStatus")]
    pub payment_status: PaymentStatus,
    #[serde(rename = "BookingReference")]
    pub booking_reference: String,
}

/// Vista de un registro existente con los campos que gestiona el servicio
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRecord {
    #[serde(rename = "Id", alias = "id")]
    pub id: RecordId,
    #[serde(rename = "PaymentStatus", default, deserialize_with = "lenient_status")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(rename = "PaymentReference", default)]
    pub payment_reference: Option<String>,
    #[serde(rename = "BookingReference", default)]
    pub booking_reference: Option<String>,
}

// Valores desconocidos o editados a mano en la tabla se tratan como ausentes
fn lenient_status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PaymentStatus>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}

impl BookingRecord {
    pub fn is_settled(&self) -> bool {
        self.payment_status == Some(PaymentStatus::Succeeded)
            && self.payment_reference.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// Actualización parcial de un registro
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingPatch {
    #[serde(rename = "Id")]
    pub id: RecordId,
    #[serde(rename = "PaymentStatus")]
    pub payment_status: PaymentStatus,
    #[serde(rename = "PaymentReference", skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
}
