//! # Módulo API
//!
//! Rutas HTTP del servicio de reservas.
//!
//! ## Módulos principales
//!
//! - [`registration`] - Alta de reservas y creación de la sesión de pago
//! - [`webhook`] - Conciliación de pagos notificados por Stripe
//! - [`attendance`] - Resumen de asistentes por fecha desde Google Sheets
//! - [`health`] - Comprobación de vida
//! - [`errors`] - Manejo de errores de la aplicación

pub mod attendance;
pub mod errors;
pub mod health;
mod middleware;
pub mod registration;
pub mod webhook;

pub use errors::{AppError, AppResult};

use actix_web::web;

/// Configura todas las rutas de la API
///
/// ## Rutas configuradas
///
/// - `POST /register` - Ver [`registration::routes`]
/// - `POST /webhook` - Ver [`webhook::routes`]
/// - `GET /attendance` - Ver [`attendance::routes`]
/// - `GET /health` - Ver [`health::routes`]
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    registration::routes(cfg);
    webhook::routes(cfg);
    attendance::routes(cfg);
    health::routes(cfg);
}
