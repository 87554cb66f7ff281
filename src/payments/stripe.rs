//! Integración con Stripe vía API REST (sin SDK)
//!
//! - Creación de sesiones de Checkout o PaymentIntents
//! - Verificación de la cabecera `Stripe-Signature` (HMAC-SHA256)
//! - Lectura tipada de los eventos de webhook

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use super::{PaymentEntry, PaymentGateway, PaymentRequest, PaymentSession};
use crate::config::{PaymentFlow, StripeConfig};
use crate::upstream::{check_status, read_json, Service, UpstreamError, UpstreamResult};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Cliente de la API de Stripe
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

#[derive(Deserialize)]
struct CheckoutSessionResponse {
    id: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct PaymentIntentResponse {
    id: Option<String>,
    client_secret: Option<String>,
}

impl StripeClient {
    pub fn new(client: Client, config: StripeConfig) -> Self {
        StripeClient { client, config }
    }

    fn checkout_form(&self, request: &PaymentRequest, unit_amount: i64) -> Vec<(String, String)> {
        let mut form = vec![
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("mode".to_string(), "payment".to_string()),
            ("customer_email".to_string(), request.customer_email.clone()),
            (
                "line_items[0][price_data][currency]".to_string(),
                self.config.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.description.clone(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.config.success_url.clone()),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
        ];
        form.extend(metadata_fields(request));
        form
    }

    fn payment_intent_form(&self, request: &PaymentRequest, amount: i64) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), self.config.currency.clone()),
            ("description".to_string(), request.description.clone()),
            ("receipt_email".to_string(), request.customer_email.clone()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        form.extend(metadata_fields(request));
        form
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        form: &[(String, String)],
    ) -> UpstreamResult<T> {
        let url = format!("{}/v1/{}", self.config.api_base.trim_end_matches('/'), endpoint);
        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| UpstreamError::http(Service::Stripe, e))?;

        read_json(Service::Stripe, check_status(Service::Stripe, response).await?).await
    }
}

/// Longitud máxima (en caracteres) que Stripe acepta para un valor de metadata
const METADATA_VALUE_MAX: usize = 500;

// Stripe ignora los valores vacíos de metadata; no se envían
fn metadata_fields(request: &PaymentRequest) -> impl Iterator<Item = (String, String)> + '_ {
    request
        .metadata
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (format!("metadata[{}]", key), value.chars().take(METADATA_VALUE_MAX).collect()))
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_session(&self, request: &PaymentRequest) -> UpstreamResult<PaymentSession> {
        let amount = request
            .minor_units()
            .filter(|a| *a > 0)
            .ok_or_else(|| UpstreamError::InvalidRequest {
                service: Service::Stripe,
                message: format!("importe fuera de rango: {}", request.amount),
            })?;

        tracing::debug!(
            flow = ?self.config.flow,
            amount,
            record_id = ?request.metadata_value(super::metadata::RECORD_ID),
            "Creando sesión de pago en Stripe"
        );

        match self.config.flow {
            PaymentFlow::Checkout => {
                let form = self.checkout_form(request, amount);
                let session: CheckoutSessionResponse = self.post_form("checkout/sessions", &form).await?;
                Ok(PaymentSession {
                    id: session.id.ok_or_else(|| UpstreamError::missing(Service::Stripe, "id"))?,
                    entry: PaymentEntry::RedirectUrl(
                        session.url.ok_or_else(|| UpstreamError::missing(Service::Stripe, "url"))?,
                    ),
                })
            }
            PaymentFlow::PaymentIntent => {
                let form = self.payment_intent_form(request, amount);
                let intent: PaymentIntentResponse = self.post_form("payment_intents", &form).await?;
                Ok(PaymentSession {
                    id: intent.id.ok_or_else(|| UpstreamError::missing(Service::Stripe, "id"))?,
                    entry: PaymentEntry::ClientSecret(
                        intent
                            .client_secret
                            .ok_or_else(|| UpstreamError::missing(Service::Stripe, "client_secret"))?,
                    ),
                })
            }
        }
    }
}

/// Motivo por el que una firma de webhook no es válida
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("No signatures found matching the expected signature for payload")]
    Mismatch,

    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,

    #[error("Timestamp outside the tolerance zone")]
    Expired,

    #[error("Invalid webhook signing secret")]
    InvalidSecret,
}

/// Verifica la cabecera `Stripe-Signature` sobre los bytes crudos del cuerpo
///
/// La cabecera tiene la forma `t=<unix>,v1=<hex>[,v1=<hex>...]`. Se acepta si
/// alguna firma `v1` coincide con `HMAC-SHA256(secret, "<t>." + payload)` y la
/// marca de tiempo está dentro de `tolerance` respecto a `now`.
pub fn verify_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    let ts: i64 = timestamp.parse().map_err(|_| SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err(SignatureError::Mismatch);
    }

    if now.abs_diff(ts) > tolerance.as_secs() {
        return Err(SignatureError::Expired);
    }

    Ok(())
}

/// Evento de webhook de Stripe, con los campos que usa la conciliación
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: EventObject,
}

/// Objeto del evento: una Checkout Session o un PaymentIntent
#[derive(Debug, Clone, Deserialize)]
pub struct EventObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl WebhookEvent {
    /// `true` para los eventos que indican un pago completado
    pub fn is_completion(&self) -> bool {
        matches!(self.event_type.as_str(), CHECKOUT_COMPLETED | PAYMENT_INTENT_SUCCEEDED)
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.data
            .object
            .metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Genera una cabecera `Stripe-Signature` válida para pruebas
#[cfg(test)]
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::metadata;
    use rust_decimal::Decimal;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "whsec_test123secret456";
    const TOLERANCE: Duration = Duration::from_secs(300);
    const NOW: i64 = 1_710_000_000;

    #[test]
    fn valid_signature_is_accepted() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_payload(payload, SECRET, NOW);

        assert_eq!(verify_signature(payload, &header, SECRET, TOLERANCE, NOW), Ok(()));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_payload(payload, "wrong_secret", NOW);

        assert_eq!(
            verify_signature(payload, &header, SECRET, TOLERANCE, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn reserialized_payload_is_rejected() {
        let original = b"{\"type\": \"checkout.session.completed\"}";
        let header = sign_payload(original, SECRET, NOW);
        let compacted = b"{\"type\":\"checkout.session.completed\"}";

        assert_eq!(
            verify_signature(compacted, &header, SECRET, TOLERANCE, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn any_matching_v1_signature_is_enough() {
        let payload = b"{}";
        let valid = sign_payload(payload, SECRET, NOW);
        let valid_sig = valid.split_once("v1=").unwrap().1;
        let header = format!("t={},v1={},v1={}", NOW, "00".repeat(32), valid_sig);

        assert_eq!(verify_signature(payload, &header, SECRET, TOLERANCE, NOW), Ok(()));
    }

    #[test]
    fn extreme_timestamp_is_expired_not_overflowing() {
        let payload = b"{}";
        let header = sign_payload(payload, SECRET, i64::MIN);

        assert_eq!(
            verify_signature(payload, &header, SECRET, TOLERANCE, i64::MAX),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn long_metadata_values_are_clipped() {
        let mut req = request();
        req.metadata.push((metadata::NAME.into(), "é".repeat(700)));

        let fields: Vec<(String, String)> = metadata_fields(&req).collect();
        let name = fields
            .iter()
            .find(|(k, _)| k == "metadata[name]")
            .map(|(_, v)| v)
            .unwrap();

        assert_eq!(name.chars().count(), 500);
        assert!(fields.iter().any(|(k, v)| k == "metadata[nocodb_record_id]" && v == "12"));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = b"{}";
        let header = sign_payload(payload, SECRET, NOW - 600);

        assert_eq!(
            verify_signature(payload, &header, SECRET, TOLERANCE, NOW),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for header in ["", "v1=abcd", "t=abc,v1=abcd", "t=1710000000"] {
            assert_eq!(
                verify_signature(b"{}", header, SECRET, TOLERANCE, NOW),
                Err(SignatureError::MalformedHeader),
                "cabecera: {header}"
            );
        }
    }

    #[test]
    fn event_exposes_metadata_and_classification() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_test_1", "metadata": {"nocodb_record_id": "12", "phone": " "}}}
        }))
        .unwrap();

        assert!(event.is_completion());
        assert_eq!(event.metadata(metadata::RECORD_ID), Some("12"));
        assert_eq!(event.metadata(metadata::PHONE), None);
    }

    #[test]
    fn unrelated_events_are_not_completions() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_1"}}
        }))
        .unwrap();

        assert!(!event.is_completion());
    }

    fn config(server: &MockServer, flow: PaymentFlow) -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_123".into(),
            webhook_secret: SECRET.into(),
            api_base: server.uri(),
            currency: "usd".into(),
            flow,
            success_url: "https://example.org/ok".into(),
            cancel_url: "https://example.org/cancel".into(),
            webhook_tolerance: TOLERANCE,
        }
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            amount: Decimal::new(4500, 2),
            description: "Shabbat Reservation - Friday Night (Dana)".into(),
            customer_email: "d@x.com".into(),
            metadata: vec![
                (metadata::RECORD_ID.into(), "12".into()),
                (metadata::PHONE.into(), String::new()),
            ],
        }
    }

    #[tokio::test]
    async fn checkout_session_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header_exists("authorization"))
            .and(body_string_contains("unit_amount%5D=4500"))
            .and(body_string_contains("metadata%5Bnocodb_record_id%5D=12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::new(Client::new(), config(&server, PaymentFlow::Checkout));
        let session = client.create_session(&request()).await.unwrap();

        assert_eq!(session.id, "cs_test_1");
        assert_eq!(
            session.entry,
            PaymentEntry::RedirectUrl("https://checkout.stripe.com/c/pay/cs_test_1".into())
        );
    }

    #[tokio::test]
    async fn empty_metadata_values_are_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(body_string_contains("metadata%5Bphone%5D"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "cs_1", "url": "https://x"})))
            .mount(&server)
            .await;

        let client = StripeClient::new(Client::new(), config(&server, PaymentFlow::Checkout));
        assert!(client.create_session(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn payment_intent_returns_client_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(body_string_contains("amount=4500"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_1",
                "client_secret": "pi_1_secret_abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::new(Client::new(), config(&server, PaymentFlow::PaymentIntent));
        let session = client.create_session(&request()).await.unwrap();

        assert_eq!(session.id, "pi_1");
        assert_eq!(session.entry, PaymentEntry::ClientSecret("pi_1_secret_abc".into()));
    }

    #[tokio::test]
    async fn stripe_errors_carry_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "Invalid email address", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let client = StripeClient::new(Client::new(), config(&server, PaymentFlow::Checkout));
        match client.create_session(&request()).await.unwrap_err() {
            UpstreamError::Status { status, message, .. } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid email address");
            }
            other => panic!("error inesperado: {other}"),
        }
    }
}
