//! Dobles de prueba para los servicios externos

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::Config;
use crate::db::{BookingPatch, BookingRecord, NewBooking, PaymentStatus, RecordId, RecordStore};
use crate::payments::{PaymentEntry, PaymentGateway, PaymentRequest, PaymentSession};
use crate::sheets::{Row, SheetSource};
use crate::upstream::{Service, UpstreamError, UpstreamResult};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = [
        ("STRIPE_SECRET_KEY", "sk_test_123"),
        ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("NOCO_API_URL", "http://noco.invalid/api/v2/tables/t1/records"),
        ("NOCO_API_TOKEN", "noco_token"),
    ]
    .into_iter()
    .collect();

    Config::from_lookup(|name| vars.get(name).map(|v| v.to_string())).expect("test config")
}

fn unavailable(service: Service) -> UpstreamError {
    UpstreamError::Status {
        service,
        status: 503,
        message: "service unavailable".to_string(),
    }
}

#[derive(Default)]
struct StoreState {
    records: Vec<BookingRecord>,
    created: Vec<NewBooking>,
    patches: Vec<BookingPatch>,
    next_id: u64,
}

/// Almacén en memoria que imita la tabla de NocoDB
#[derive(Default)]
pub struct FakeRecordStore {
    state: Mutex<StoreState>,
    calls: AtomicUsize,
    failing: bool,
}

impl FakeRecordStore {
    /// Todas las operaciones fallan como si NocoDB estuviera caído
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    fn begin(&self) -> UpstreamResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            Err(unavailable(Service::NocoDb))
        } else {
            Ok(())
        }
    }

    fn push_record(state: &mut StoreState, booking_reference: &str) -> RecordId {
        state.next_id += 1;
        let id = RecordId(state.next_id.to_string());
        state.records.push(BookingRecord {
            id: id.clone(),
            payment_status: Some(PaymentStatus::Pending),
            payment_reference: None,
            booking_reference: Some(booking_reference.to_string()),
        });
        id
    }

    /// Inserta una reserva pendiente sin contar como llamada
    pub fn insert_pending(&self, booking_reference: &str) -> RecordId {
        let mut state = self.state.lock().unwrap();
        Self::push_record(&mut state, booking_reference)
    }

    pub fn set_payment_reference(&self, id: &RecordId, reference: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.records.iter_mut().find(|r| &r.id == id) {
            record.payment_reference = Some(reference.to_string());
        }
    }

    pub fn created(&self) -> Vec<NewBooking> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn patches(&self) -> Vec<BookingPatch> {
        self.state.lock().unwrap().patches.clone()
    }

    pub fn last_id(&self) -> Option<RecordId> {
        self.state.lock().unwrap().records.last().map(|r| r.id.clone())
    }

    pub fn record(&self, id: &RecordId) -> Option<BookingRecord> {
        self.state.lock().unwrap().records.iter().find(|r| &r.id == id).cloned()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FakeRecordStore {
    async fn create_booking(&self, booking: &NewBooking) -> UpstreamResult<RecordId> {
        self.begin()?;
        let mut state = self.state.lock().unwrap();
        state.created.push(booking.clone());
        Ok(Self::push_record(&mut state, &booking.booking_reference))
    }

    async fn get_booking(&self, id: &RecordId) -> UpstreamResult<Option<BookingRecord>> {
        self.begin()?;
        Ok(self.record(id))
    }

    async fn find_by_booking_reference(&self, reference: &str) -> UpstreamResult<Option<BookingRecord>> {
        self.begin()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .find(|r| r.booking_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn patch_booking(&self, patch: &BookingPatch) -> UpstreamResult<()> {
        self.begin()?;
        let mut state = self.state.lock().unwrap();
        state.patches.push(patch.clone());
        if let Some(record) = state.records.iter_mut().find(|r| r.id == patch.id) {
            record.payment_status = Some(patch.payment_status);
            if let Some(reference) = &patch.payment_reference {
                record.payment_reference = Some(reference.clone());
            }
        }
        Ok(())
    }
}

enum GatewayMode {
    Checkout,
    PaymentIntent,
    Failing,
}

/// Procesador de pagos que registra las peticiones recibidas
pub struct FakeGateway {
    mode: GatewayMode,
    requests: Mutex<Vec<PaymentRequest>>,
}

impl FakeGateway {
    fn with_mode(mode: GatewayMode) -> Self {
        Self {
            mode,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn checkout() -> Self {
        Self::with_mode(GatewayMode::Checkout)
    }

    pub fn payment_intent() -> Self {
        Self::with_mode(GatewayMode::PaymentIntent)
    }

    pub fn failing() -> Self {
        Self::with_mode(GatewayMode::Failing)
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_session(&self, request: &PaymentRequest) -> UpstreamResult<PaymentSession> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let n = requests.len();

        match self.mode {
            GatewayMode::Checkout => Ok(PaymentSession {
                id: format!("cs_test_{}", n),
                entry: PaymentEntry::RedirectUrl(format!("https://checkout.stripe.test/c/pay/cs_test_{}", n)),
            }),
            GatewayMode::PaymentIntent => Ok(PaymentSession {
                id: format!("pi_test_{}", n),
                entry: PaymentEntry::ClientSecret(format!("pi_test_{}_secret_abc", n)),
            }),
            GatewayMode::Failing => Err(unavailable(Service::Stripe)),
        }
    }
}

/// Hoja en memoria; cuenta cuántas veces se leyó
pub struct FakeSheet {
    rows: Option<Vec<Row>>,
    reads: AtomicUsize,
}

impl FakeSheet {
    pub fn with_rows(rows: &[&[&str]]) -> Self {
        Self {
            rows: Some(
                rows.iter()
                    .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                    .collect(),
            ),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            rows: None,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetSource for FakeSheet {
    async fn fetch_rows(&self) -> UpstreamResult<Vec<Row>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.rows.clone().ok_or_else(|| unavailable(Service::GoogleSheets))
    }
}
