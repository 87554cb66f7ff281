//! Estado compartido de la aplicación
//!
//! Todo es inmutable: configuración y clientes HTTP detrás de `Arc`. Las
//! peticiones no comparten estado mutable entre sí.

use std::sync::Arc;

use crate::config::Config;
use crate::db::{NocoRepo, RecordStore};
use crate::payments::{PaymentGateway, StripeClient};
use crate::sheets::{GoogleSheetsClient, SheetSource};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub records: Arc<dyn RecordStore>,
    pub payments: Arc<dyn PaymentGateway>,
    /// `None` si la hoja de asistencia no está configurada
    pub sheets: Option<Arc<dyn SheetSource>>,
}

impl AppState {
    /// Construye los clientes reales a partir de la configuración
    ///
    /// # Errores
    ///
    /// Falla si no se puede crear el cliente HTTP o las credenciales de
    /// Google no son válidas.
    pub fn new(config: Config) -> Result<Self, BoxError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let records = NocoRepo::new(http.clone(), &config.noco);
        let payments = StripeClient::new(http.clone(), config.stripe.clone());
        let sheets = match &config.sheets {
            Some(sheets_config) => {
                let client = GoogleSheetsClient::new(http, sheets_config)?;
                Some(Arc::new(client) as Arc<dyn SheetSource>)
            }
            None => None,
        };

        Ok(Self::with_services(config, Arc::new(records), Arc::new(payments), sheets))
    }

    pub fn with_services(
        config: Config,
        records: Arc<dyn RecordStore>,
        payments: Arc<dyn PaymentGateway>,
        sheets: Option<Arc<dyn SheetSource>>,
    ) -> Self {
        AppState {
            config: Arc::new(config),
            records,
            payments,
            sheets,
        }
    }
}
