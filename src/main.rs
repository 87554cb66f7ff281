//! # Shabbat Reservation Server
//!
//! Backend de reservas para las comidas de Shabbat construido con Rust y Actix Web.
//! Las reservas viven en una tabla de NocoDB, los pagos en Stripe y el resumen
//! de asistencia se calcula a partir de una hoja de Google Sheets.
//!
//! ## Características principales
//!
//! - **Registro**: valida el formulario, crea la reserva en estado `Pending` y
//!   abre una sesión de pago
//! - **Webhook**: verifica la firma de Stripe y marca la reserva como pagada
//! - **Asistencia**: suma adultos y niños por comida para una fecha
//!
//! ## Configuración
//!
//! El servidor se configura mediante variables de entorno (archivo `.env`):
//!
//! ```env
//! STRIPE_SECRET_KEY=sk_live_...
//! STRIPE_WEBHOOK_SECRET=whsec_...
//! NOCO_API_URL=https://app.nocodb.com/api/v2/tables/<tabla>/records
//! NOCO_API_TOKEN=...
//!
//! # Opcionales
//! GOOGLE_SHEET_ID=...
//! GOOGLE_SERVICE_ACCOUNT={"type":"service_account",...}
//! PORT=3000
//! RUST_LOG=debug,reqwest=info
//! ```
//!
//! ## Arquitectura
//!
//! ```text
//! Formulario web / Stripe / panel de asistencia
//!     ↓ HTTP/JSON
//! API REST (Actix Web)
//!     ↓ reqwest
//! NocoDB · Stripe · Google Sheets
//! ```

use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod db;
mod payments;
mod sheets;
mod state;
mod upstream;

#[cfg(test)]
mod testing;

use config::Config;
use state::AppState;

fn env_filter() -> EnvFilter {
    ["shabbat_reservation=debug", "reqwest=info"]
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(EnvFilter::from_default_env(), |filter, directive| filter.add_directive(directive))
}

/// Función principal que inicia el servidor web
///
/// # Funcionalidad
///
/// 1. Carga variables de entorno desde `.env`
/// 2. Configura el sistema de logging con tracing
/// 3. Lee y valida la configuración
/// 4. Crea los clientes de NocoDB, Stripe y Google Sheets
/// 5. Inicia el servidor HTTP con middleware de logging y las rutas de la API
///
/// # Errores
///
/// Retorna `std::io::Error` si falta configuración obligatoria, si no se pueden
/// crear los clientes o si no se puede bindear al puerto.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt().with_env_filter(env_filter()).init();

    tracing::info!("Iniciando Shabbat Reservation Server...");

    let config = Config::from_env().map_err(|e| {
        tracing::error!("Configuración inválida: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    if config.sheets.is_none() {
        tracing::warn!("Google Sheets no configurado, /attendance responderá 500");
    }

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config).map_err(|e| {
        tracing::error!("Error inicializando clientes externos: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    tracing::info!("Servidor iniciando en {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .configure(api::init_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
