//! Agregación de asistentes por fecha a partir de las filas de la hoja

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use super::Row;

const DATE_HEADERS: &[&str] = &["shabbat date", "date"];
const SESSION_HEADERS: &[&str] = &["meals", "meal", "session"];
const ADULT_HEADERS: &[&str] = &["adults"];
const KID_HEADERS: &[&str] = &["childern/students", "children/students", "kids", "children"];
const CANNOT_PAY_ADULT_HEADERS: &[&str] = &["cannot pay adults"];
const CANNOT_PAY_KID_HEADERS: &[&str] = &["cannot pay kids", "cannot pay children"];

/// La cabecera de la hoja no tiene la columna de fecha
#[derive(Error, Debug, PartialEq, Eq)]
#[error("La hoja no tiene columna de fecha (se esperaba una de: {expected})")]
pub struct SheetLayoutError {
    pub expected: String,
}

/// Adultos y niños de un grupo
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Headcount {
    pub adults: u32,
    pub kids: u32,
}

impl Headcount {
    pub fn total(&self) -> u32 {
        self.adults.saturating_add(self.kids)
    }

    // Las celdas son texto libre; una cifra absurda satura en vez de desbordar
    fn add(&mut self, adults: u32, kids: u32) {
        self.adults = self.adults.saturating_add(adults);
        self.kids = self.kids.saturating_add(kids);
    }
}

/// Resumen de asistencia para una fecha
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub date: NaiveDate,
    pub night: Headcount,
    pub day: Headcount,
    pub cannot_pay: Headcount,
    pub total_night: u32,
    pub total_day: u32,
    pub total_cannot_pay: u32,
    pub total_all: u32,
    pub rows_matched: usize,
}

/// Tipo de comida de una fila
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Night,
    Day,
    /// Ambas comidas: cuenta en noche y en día
    Both,
}

/// Clasifica el texto de la columna de comida
///
/// Se compara por palabras: "Friday Night" es noche, "Shabbat Lunch" es día y
/// "Both" o "Friday Night & Shabbat Day" son ambas. El nombre de la comida
/// manda sobre el día de la semana, así "Saturday Night" es solo noche.
pub fn classify_session(raw: &str) -> Option<SessionKind> {
    let lowered = raw.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

    if has(&["both", "either", "all"]) {
        return Some(SessionKind::Both);
    }

    match (has(&["night", "dinner"]), has(&["day", "lunch"])) {
        (true, true) => Some(SessionKind::Both),
        (true, false) => Some(SessionKind::Night),
        (false, true) => Some(SessionKind::Day),
        (false, false) if has(&["friday"]) => Some(SessionKind::Night),
        (false, false) if has(&["saturday"]) => Some(SessionKind::Day),
        (false, false) => None,
    }
}

/// Normaliza las distintas representaciones de fecha que aparecen en la hoja
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%m/%d/%Y",
        "%d.%m.%Y",
        "%B %d, %Y",
        "%b %d, %Y",
        "%A, %B %d, %Y",
    ];

    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(date) = FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
    {
        return Some(date);
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.date_naive());
    }

    // "2024-03-15 18:30:00", "2024-03-15T18:30" y similares
    raw.get(..10)
        .filter(|_| raw.len() > 10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

fn parse_count(raw: Option<&String>) -> u32 {
    let Some(raw) = raw.map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return 0;
    };
    raw.parse::<u32>().unwrap_or_else(|_| {
        raw.parse::<f64>()
            .ok()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n.trunc() as u32)
            .unwrap_or(0)
    })
}

struct Columns {
    date: usize,
    session: Option<usize>,
    adults: Option<usize>,
    kids: Option<usize>,
    cannot_pay_adults: Option<usize>,
    cannot_pay_kids: Option<usize>,
}

impl Columns {
    fn from_header(header: &Row) -> Result<Self, SheetLayoutError> {
        let find = |names: &[&str]| {
            header
                .iter()
                .position(|title| names.contains(&title.trim().to_lowercase().as_str()))
        };

        let date = find(DATE_HEADERS).ok_or_else(|| SheetLayoutError {
            expected: DATE_HEADERS.join(", "),
        })?;

        Ok(Columns {
            date,
            session: find(SESSION_HEADERS),
            adults: find(ADULT_HEADERS),
            kids: find(KID_HEADERS),
            cannot_pay_adults: find(CANNOT_PAY_ADULT_HEADERS),
            cannot_pay_kids: find(CANNOT_PAY_KID_HEADERS),
        })
    }
}

fn cell(row: &Row, column: Option<usize>) -> Option<&String> {
    column.and_then(|i| row.get(i))
}

/// Agrega las filas de la hoja para `date`
///
/// La primera fila es la cabecera. Devuelve `Ok(None)` si la hoja está vacía o
/// ninguna fila coincide con la fecha.
///
/// # Errores
///
/// `SheetLayoutError` si la cabecera no tiene columna de fecha.
pub fn summarize(rows: &[Row], date: NaiveDate) -> Result<Option<AttendanceSummary>, SheetLayoutError> {
    let Some((header, body)) = rows.split_first() else {
        return Ok(None);
    };
    let columns = Columns::from_header(header)?;

    let mut night = Headcount::default();
    let mut day = Headcount::default();
    let mut cannot_pay = Headcount::default();
    let mut rows_matched = 0;

    for row in body {
        let matches = row
            .get(columns.date)
            .and_then(|raw| normalize_date(raw))
            .is_some_and(|d| d == date);
        if !matches {
            continue;
        }
        rows_matched += 1;

        let adults = parse_count(cell(row, columns.adults));
        let kids = parse_count(cell(row, columns.kids));
        let session = cell(row, columns.session).and_then(|raw| classify_session(raw));

        match session {
            Some(SessionKind::Night) => night.add(adults, kids),
            Some(SessionKind::Day) => day.add(adults, kids),
            Some(SessionKind::Both) => {
                night.add(adults, kids);
                day.add(adults, kids);
            }
            None => {
                tracing::debug!(
                    row = rows_matched,
                    session = ?cell(row, columns.session),
                    "Fila sin tipo de comida reconocible"
                );
            }
        }

        cannot_pay.add(
            parse_count(cell(row, columns.cannot_pay_adults)),
            parse_count(cell(row, columns.cannot_pay_kids)),
        );
    }

    if rows_matched == 0 {
        return Ok(None);
    }

    Ok(Some(AttendanceSummary {
        date,
        night,
        day,
        cannot_pay,
        total_night: night.total(),
        total_day: day.total(),
        total_cannot_pay: cannot_pay.total(),
        total_all: night.total().saturating_add(day.total()).saturating_add(cannot_pay.total()),
        rows_matched,
    }))
}
