use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use super::{Row, SheetSource};
use crate::config::SheetsConfig;
use crate::upstream::{check_status, read_json, Service, UpstreamError, UpstreamResult};

const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Campos usados del JSON de la cuenta de servicio
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Cliente de lectura de Google Sheets autenticado con cuenta de servicio
///
/// Obtiene un token de acceso nuevo en cada lectura (JWT RS256 firmado con
/// la clave de la cuenta de servicio, intercambiado en `token_uri`).
#[derive(Clone)]
pub struct GoogleSheetsClient {
    client: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    values_url: Url,
}

impl std::fmt::Debug for GoogleSheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetsClient")
            .field("client_email", &self.key.client_email)
            .field("values_url", &self.values_url.as_str())
            .finish()
    }
}

impl GoogleSheetsClient {
    /// Valida las credenciales y construye la URL de lectura
    ///
    /// # Errores
    ///
    /// `UpstreamError::Auth` si el JSON o la clave privada no son válidos.
    pub fn new(client: Client, config: &SheetsConfig) -> UpstreamResult<Self> {
        let key: ServiceAccountKey = serde_json::from_str(&config.service_account_json)
            .map_err(|e| UpstreamError::auth(Service::GoogleAuth, format!("credenciales inválidas: {}", e)))?;

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| UpstreamError::auth(Service::GoogleAuth, format!("clave privada inválida: {}", e)))?;

        let mut values_url = Url::parse(config.api_base.trim_end_matches('/'))
            .map_err(|e| UpstreamError::auth(Service::GoogleSheets, format!("URL base inválida: {}", e)))?;
        values_url
            .path_segments_mut()
            .map_err(|_| UpstreamError::auth(Service::GoogleSheets, "URL base sin ruta"))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", config.spreadsheet_id.as_str(), "values", config.range.as_str()]);

        Ok(GoogleSheetsClient {
            client,
            key,
            encoding_key,
            values_url,
        })
    }

    fn signed_assertion(&self, now: i64) -> UpstreamResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let claims = Claims {
            iss: &self.key.client_email,
            scope: READONLY_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| UpstreamError::auth(Service::GoogleAuth, format!("no se pudo firmar el JWT: {}", e)))
    }

    async fn access_token(&self) -> UpstreamResult<String> {
        let assertion = self.signed_assertion(chrono::Utc::now().timestamp())?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| UpstreamError::http(Service::GoogleAuth, e))?;

        let token: TokenResponse = read_json(Service::GoogleAuth, check_status(Service::GoogleAuth, response).await?).await?;
        token
            .access_token
            .ok_or_else(|| UpstreamError::missing(Service::GoogleAuth, "access_token"))
    }
}

#[async_trait]
impl SheetSource for GoogleSheetsClient {
    async fn fetch_rows(&self) -> UpstreamResult<Vec<Row>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.values_url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| UpstreamError::http(Service::GoogleSheets, e))?;

        let range: ValueRange = read_json(Service::GoogleSheets, check_status(Service::GoogleSheets, response).await?).await?;
        let rows = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        Ok(rows)
    }
}

fn cell_text(cell: serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
