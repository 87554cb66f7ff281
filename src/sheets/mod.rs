//! # Hoja de asistencia
//!
//! Lectura de la hoja de cálculo de reservas y agregación de asistentes por fecha.

pub mod attendance;
pub mod google;

pub use attendance::summarize;
pub use google::GoogleSheetsClient;

use crate::upstream::UpstreamResult;
use async_trait::async_trait;

/// Fila de la hoja, con cada celda como texto
pub type Row = Vec<String>;

/// Fuente de filas de la hoja de asistencia
///
/// Cada llamada es una lectura nueva; no hay caché entre peticiones.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Devuelve todas las filas, incluida la cabecera
    async fn fetch_rows(&self) -> UpstreamResult<Vec<Row>>;
}
