//! # Resumen de asistencia
//!
//! `GET /attendance?date=YYYY-MM-DD` lee la hoja completa en cada petición y
//! devuelve los asistentes de esa fecha agrupados por comida.

use actix_web::{get, web, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;

use super::{AppError, AppResult};
use crate::sheets::summarize;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AttendanceQuery {
    pub date: Option<String>,
}

fn parse_query_date(raw: Option<&str>) -> AppResult<NaiveDate> {
    let raw = raw
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::validation("date", "required, expected YYYY-MM-DD"))?;

    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| AppError::validation("date", "expected YYYY-MM-DD"))
}

/// Suma los asistentes de una fecha
///
/// # Respuesta
/// - `200`: resumen con `night`, `day`, `cannotPay` y totales
/// - `400`: fecha ausente o con formato inválido
/// - `404`: hoja vacía o sin filas para esa fecha
/// - `500`: hoja no configurada o error leyendo de Google
#[get("/attendance")]
async fn get_attendance(state: web::Data<AppState>, query: web::Query<AttendanceQuery>) -> AppResult<HttpResponse> {
    let date = parse_query_date(query.date.as_deref())?;

    let sheet = state
        .sheets
        .as_ref()
        .ok_or_else(|| AppError::internal_trace("Attendance is not configured", None))?;

    let rows = sheet.fetch_rows().await?;
    tracing::debug!(date = %date, rows = rows.len(), "Hoja de asistencia leída");

    let summary = summarize(&rows, date)
        .map_err(|e| AppError::internal_trace(&e.to_string(), None))?
        .ok_or_else(|| AppError::NotFound(format!("No attendance data for {}", date)))?;

    tracing::info!(
        date = %date,
        rows_matched = summary.rows_matched,
        total_all = summary.total_all,
        "Resumen de asistencia calculado"
    );

    Ok(HttpResponse::Ok().json(summary))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_attendance);
}
