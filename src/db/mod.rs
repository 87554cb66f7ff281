// src/db/mod.rs
pub mod models;
pub mod nocodb;

pub use models::{BookingPatch, BookingRecord, NewBooking, PaymentStatus, RecordId};
pub use nocodb::NocoRepo;

use crate::upstream::UpstreamResult;
use async_trait::async_trait;

/// Almacén externo de reservas
///
/// Cada llamada es atómica en el almacén; la secuencia crear-reserva →
/// crear-sesión de pago no lo es.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Crea un registro y devuelve el Id asignado por el almacén
    async fn create_booking(&self, booking: &NewBooking) -> UpstreamResult<RecordId>;

    /// Lee un registro por Id; `None` si no existe
    async fn get_booking(&self, id: &RecordId) -> UpstreamResult<Option<BookingRecord>>;

    /// Busca un registro por la referencia de reserva generada al crearlo
    async fn find_by_booking_reference(&self, reference: &str) -> UpstreamResult<Option<BookingRecord>>;

    /// Aplica una actualización parcial
    async fn patch_booking(&self, patch: &BookingPatch) -> UpstreamResult<()>;
}
