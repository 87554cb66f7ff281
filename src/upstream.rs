//! Errores de los servicios externos (Stripe, NocoDB, Google Sheets)

use thiserror::Error;

/// Servicio externo que originó un error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Stripe,
    NocoDb,
    GoogleSheets,
    GoogleAuth,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stripe => "stripe",
            Self::NocoDb => "nocodb",
            Self::GoogleSheets => "google_sheets",
            Self::GoogleAuth => "google_auth",
        };
        f.write_str(name)
    }
}

/// Error de una llamada a un servicio externo
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Fallo de transporte (conexión, timeout, TLS)
    #[error("Error de red llamando a {service}: {source}")]
    Http {
        service: Service,
        #[source]
        source: reqwest::Error,
    },

    /// El servicio respondió con un estado no exitoso
    #[error("{service} respondió {status}: {message}")]
    Status {
        service: Service,
        status: u16,
        message: String,
    },

    /// La respuesta no contiene un campo esperado
    #[error("Respuesta de {service} sin el campo '{field}'")]
    MissingField {
        service: Service,
        field: &'static str,
    },

    /// Credenciales inválidas o imposibles de usar
    #[error("Error de autenticación con {service}: {message}")]
    Auth {
        service: Service,
        message: String,
    },

    /// La petición no se envió porque sus datos no son aceptables
    #[error("Petición inválida para {service}: {message}")]
    InvalidRequest {
        service: Service,
        message: String,
    },

    /// Cuerpo de respuesta que no se pudo interpretar
    #[error("Respuesta inválida de {service}: {source}")]
    Decode {
        service: Service,
        #[source]
        source: serde_json::Error,
    },
}

impl UpstreamError {
    pub fn http(service: Service, source: reqwest::Error) -> Self {
        Self::Http { service, source }
    }

    pub fn missing(service: Service, field: &'static str) -> Self {
        Self::MissingField { service, field }
    }

    pub fn auth(service: Service, message: impl Into<String>) -> Self {
        Self::Auth {
            service,
            message: message.into(),
        }
    }

    /// `true` si el servicio respondió 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Convierte una respuesta no exitosa en `UpstreamError::Status`
///
/// Extrae `error.message` (Stripe), `msg`/`message` (NocoDB) o
/// `error.message` (Google) cuando el cuerpo es JSON; si no, usa el texto crudo.
pub async fn check_status(service: Service, response: reqwest::Response) -> UpstreamResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("msg"))
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or(body);

    Err(UpstreamError::Status {
        service,
        status: status.as_u16(),
        message,
    })
}

/// Lee el cuerpo JSON de una respuesta ya validada
pub async fn read_json<T: serde::de::DeserializeOwned>(
    service: Service,
    response: reqwest::Response,
) -> UpstreamResult<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| UpstreamError::http(service, e))?;
    serde_json::from_slice(&bytes).map_err(|source| UpstreamError::Decode { service, source })
}
