//! # Configuración del servidor
//!
//! Toda la configuración se lee una sola vez del entorno al arrancar y se
//! comparte como valor inmutable con cada componente. Ningún handler lee
//! variables de entorno durante una petición.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Error al construir la configuración
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Variable obligatoria ausente o vacía
    #[error("La variable de entorno '{0}' es obligatoria")]
    Missing(&'static str),

    /// Variable con un valor que no se puede interpretar
    #[error("Valor inválido para '{name}': {message}")]
    Invalid {
        name: &'static str,
        message: String,
    },
}

/// Flujo de pago usado por el formulario
///
/// - `Checkout`: Stripe Checkout, el cliente recibe `{url}` y se redirige.
/// - `PaymentIntent`: pago embebido, el cliente recibe `{clientSecret}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFlow {
    Checkout,
    PaymentIntent,
}

impl std::str::FromStr for PaymentFlow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "checkout" | "checkout_session" => Ok(Self::Checkout),
            "payment_intent" | "intent" | "elements" => Ok(Self::PaymentIntent),
            other => Err(format!("flujo de pago desconocido '{}'", other)),
        }
    }
}

/// Configuración de Stripe
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// URL base de la API (sobrescribible para pruebas)
    pub api_base: String,
    pub currency: String,
    pub flow: PaymentFlow,
    pub success_url: String,
    pub cancel_url: String,
    /// Antigüedad máxima aceptada para la marca de tiempo de la firma
    pub webhook_tolerance: Duration,
}

/// Configuración de la tabla de reservas en NocoDB
#[derive(Debug, Clone)]
pub struct NocoConfig {
    /// URL del endpoint de registros de la tabla
    pub table_url: String,
    pub api_token: String,
}

/// Configuración de la hoja de asistencia en Google Sheets
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub range: String,
    /// JSON completo de la cuenta de servicio
    pub service_account_json: String,
    pub api_base: String,
}

/// Configuración completa del servicio
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub http_timeout: Duration,
    pub stripe: StripeConfig,
    pub noco: NocoConfig,
    /// `None` si falta el id de la hoja o las credenciales
    pub sheets: Option<SheetsConfig>,
}

impl Config {
    /// Construye la configuración a partir de las variables de entorno
    ///
    /// # Variables de entorno
    ///
    /// - `BIND_ADDRESS` o `PORT`: dirección de escucha (default: 0.0.0.0:3000)
    /// - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`: obligatorias
    /// - `NOCO_API_URL`, `NOCO_API_TOKEN`: obligatorias
    /// - `GOOGLE_SHEET_ID`, `GOOGLE_SERVICE_ACCOUNT`: opcionales, habilitan `/attendance`
    ///
    /// # Errores
    ///
    /// `ConfigError` si falta una variable obligatoria o un valor es inválido.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Igual que [`Config::from_env`] pero con una fuente de variables arbitraria
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let bind_address = match (get("BIND_ADDRESS"), get("PORT")) {
            (Some(addr), _) => addr,
            (None, Some(port)) => format!("0.0.0.0:{}", port),
            (None, None) => "0.0.0.0:3000".to_string(),
        };

        let http_timeout = Duration::from_secs(parse_or(get("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS", 30)?);

        let flow = match get("PAYMENT_FLOW") {
            Some(raw) => raw.parse().map_err(|message| ConfigError::Invalid {
                name: "PAYMENT_FLOW",
                message,
            })?,
            None => PaymentFlow::Checkout,
        };

        let stripe = StripeConfig {
            secret_key: require("STRIPE_SECRET_KEY")?,
            webhook_secret: require("STRIPE_WEBHOOK_SECRET")?,
            api_base: get("STRIPE_API_BASE").unwrap_or_else(|| "https://api.stripe.com".to_string()),
            currency: get("PAYMENT_CURRENCY")
                .unwrap_or_else(|| "usd".to_string())
                .to_ascii_lowercase(),
            flow,
            success_url: get("CHECKOUT_SUCCESS_URL").unwrap_or_else(|| {
                "https://chabadjapan.org/thank-you?session_id={CHECKOUT_SESSION_ID}".to_string()
            }),
            cancel_url: get("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|| "https://chabadjapan.org/shabbat-form?canceled=1".to_string()),
            webhook_tolerance: Duration::from_secs(parse_or(
                get("WEBHOOK_TOLERANCE_SECS"),
                "WEBHOOK_TOLERANCE_SECS",
                300,
            )?),
        };

        let noco = NocoConfig {
            table_url: require("NOCO_API_URL")?.trim_end_matches('/').to_string(),
            api_token: require("NOCO_API_TOKEN")?,
        };

        let sheets = match (get("GOOGLE_SHEET_ID"), get("GOOGLE_SERVICE_ACCOUNT")) {
            (Some(spreadsheet_id), Some(service_account_json)) => Some(SheetsConfig {
                spreadsheet_id,
                range: get("GOOGLE_SHEET_RANGE").unwrap_or_else(|| "Sheet1".to_string()),
                service_account_json,
                api_base: get("GOOGLE_SHEETS_API_BASE")
                    .unwrap_or_else(|| "https://sheets.googleapis.com".to_string()),
            }),
            _ => None,
        };

        Ok(Config {
            bind_address,
            http_timeout,
            stripe,
            noco,
            sheets,
        })
    }
}

fn parse_or(raw: Option<String>, name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|e| ConfigError::Invalid {
            name,
            message: format!("{}", e),
        }),
        None => Ok(default),
    }
}
