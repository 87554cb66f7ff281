use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{BookingPatch, BookingRecord, NewBooking, RecordId, RecordStore};
use crate::config::NocoConfig;
use crate::upstream::{check_status, read_json, Service, UpstreamError, UpstreamResult};

const TOKEN_HEADER: &str = "xc-token";

/// Cliente de la tabla de reservas en NocoDB (API v2 de registros)
#[derive(Debug, Clone)]
pub struct NocoRepo {
    client: Client,
    table_url: String,
    api_token: String,
}

#[derive(Deserialize)]
struct CreatedRecord {
    #[serde(rename = "Id", alias = "id")]
    id: Option<RecordId>,
}

#[derive(Deserialize)]
struct RecordList {
    #[serde(default)]
    list: Vec<BookingRecord>,
}

impl NocoRepo {
    pub fn new(client: Client, config: &NocoConfig) -> Self {
        NocoRepo {
            client,
            table_url: config.table_url.clone(),
            api_token: config.api_token.clone(),
        }
    }

    fn record_url(&self, id: &RecordId) -> String {
        format!("{}/{}", self.table_url, id.as_str())
    }
}

#[async_trait]
impl RecordStore for NocoRepo {
    async fn create_booking(&self, booking: &NewBooking) -> UpstreamResult<RecordId> {
        let response = self
            .client
            .post(&self.table_url)
            .header(TOKEN_HEADER, &self.api_token)
            .json(booking)
            .send()
            .await
            .map_err(|e| UpstreamError::http(Service::NocoDb, e))?;

        let created: CreatedRecord = read_json(Service::NocoDb, check_status(Service::NocoDb, response).await?).await?;
        created.id.ok_or_else(|| UpstreamError::missing(Service::NocoDb, "Id"))
    }

    async fn get_booking(&self, id: &RecordId) -> UpstreamResult<Option<BookingRecord>> {
        let response = self
            .client
            .get(self.record_url(id))
            .header(TOKEN_HEADER, &self.api_token)
            .send()
            .await
            .map_err(|e| UpstreamError::http(Service::NocoDb, e))?;

        match check_status(Service::NocoDb, response).await {
            Ok(response) => {
                // NocoDB responde `{}` para Ids inexistentes en algunas versiones
                let value: serde_json::Value = read_json(Service::NocoDb, response).await?;
                if value.as_object().map_or(true, |o| o.is_empty()) {
                    return Ok(None);
                }
                serde_json::from_value(value)
                    .map(Some)
                    .map_err(|source| UpstreamError::Decode {
                        service: Service::NocoDb,
                        source,
                    })
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_by_booking_reference(&self, reference: &str) -> UpstreamResult<Option<BookingRecord>> {
        let filter = format!("(BookingReference,eq,{})", reference);
        let response = self
            .client
            .get(&self.table_url)
            .header(TOKEN_HEADER, &self.api_token)
            .query(&[("where", filter.as_str()), ("limit", "1")])
            .send()
            .await
            .map_err(|e| UpstreamError::http(Service::NocoDb, e))?;

        let page: RecordList = read_json(Service::NocoDb, check_status(Service::NocoDb, response).await?).await?;
        Ok(page.list.into_iter().next())
    }

    async fn patch_booking(&self, patch: &BookingPatch) -> UpstreamResult<()> {
        let response = self
            .client
            .patch(&self.table_url)
            .header(TOKEN_HEADER, &self.api_token)
            .json(patch)
            .send()
            .await
            .map_err(|e| UpstreamError::http(Service::NocoDb, e))?;

        check_status(Service::NocoDb, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PaymentStatus;
    use rust_decimal::Decimal;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TABLE_PATH: &str = "/api/v2/tables/bookings/records";

    fn repo(server: &MockServer) -> NocoRepo {
        NocoRepo::new(
            Client::new(),
            &NocoConfig {
                table_url: format!("{}{}", server.uri(), TABLE_PATH),
                api_token: "noco-token".into(),
            },
        )
    }

    fn booking() -> NewBooking {
        NewBooking {
            name: "Dana".into(),
            email: "d@x.com".into(),
            phone: "090".into(),
            date: "2024-03-15".into(),
            meal: "Friday Night".into(),
            adults: 2,
            kids: 1,
            discount: false,
            donation: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            comments: String::new(),
            amount: Decimal::new(4500, 2),
            payment_status: PaymentStatus::Pending,
            booking_reference: "bk_abc".into(),
        }
    }

    #[tokio::test]
    async fn create_sends_token_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TABLE_PATH))
            .and(header("xc-token", "noco-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Id": 17})))
            .expect(1)
            .mount(&server)
            .await;

        let id = repo(&server).create_booking(&booking()).await.unwrap();
        assert_eq!(id, RecordId("17".into()));
    }

    #[tokio::test]
    async fn create_without_id_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = repo(&server).create_booking(&booking()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::MissingField { field: "Id", .. }));
    }

    #[tokio::test]
    async fn create_surfaces_store_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"msg": "Invalid token"})))
            .mount(&server)
            .await;

        match repo(&server).create_booking(&booking()).await.unwrap_err() {
            UpstreamError::Status { status, message, .. } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid token");
            }
            other => panic!("error inesperado: {other}"),
        }
    }

    #[tokio::test]
    async fn get_maps_404_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/99", TABLE_PATH)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"msg": "Record not found"})))
            .mount(&server)
            .await;

        let found = repo(&server).get_booking(&RecordId("99".into())).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn get_reads_managed_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/5", TABLE_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Id": 5,
                "Name": "Dana",
                "PaymentStatus": "Pending",
                "BookingReference": "bk_abc"
            })))
            .mount(&server)
            .await;

        let record = repo(&server).get_booking(&RecordId("5".into())).await.unwrap().unwrap();
        assert_eq!(record.payment_status, Some(PaymentStatus::Pending));
        assert_eq!(record.booking_reference.as_deref(), Some("bk_abc"));
        assert!(record.payment_reference.is_none());
    }

    #[tokio::test]
    async fn find_uses_where_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TABLE_PATH))
            .and(query_param("where", "(BookingReference,eq,bk_abc)"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "list": [{"Id": 8, "PaymentStatus": "Pending", "BookingReference": "bk_abc"}],
                "pageInfo": {"totalRows": 1}
            })))
            .mount(&server)
            .await;

        let record = repo(&server).find_by_booking_reference("bk_abc").await.unwrap().unwrap();
        assert_eq!(record.id, RecordId("8".into()));
    }

    #[tokio::test]
    async fn patch_sends_partial_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(TABLE_PATH))
            .and(body_json(json!({
                "Id": 5,
                "PaymentStatus": "Succeeded",
                "PaymentReference": "cs_test_1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Id": 5})))
            .expect(1)
            .mount(&server)
            .await;

        repo(&server)
            .patch_booking(&BookingPatch {
                id: RecordId("5".into()),
                payment_status: PaymentStatus::Succeeded,
                payment_reference: Some("cs_test_1".into()),
            })
            .await
            .unwrap();
    }
}
