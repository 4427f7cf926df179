//! HTTP client for the ledger service

use super::{
    BookPackageRequest, CreatePackageRequest, CreateServiceRequest, LedgerClient,
    SubmitStageRequest,
};
use crate::{
    config::LedgerConfig,
    error::{BookingError, ErrorKind},
    models::{Actor, ActorRole, Booking, BookingQuery, BookingReceipt, Stage, StageDef},
    EngineResult,
};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Ledger error body: `{"error": {"kind": "...", "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreatedId {
    id: String,
}

#[derive(Serialize)]
struct ActorReason<'a> {
    actor_id: &'a str,
    actor_role: ActorRole,
    reason: &'a str,
}

#[derive(Serialize)]
struct ClientOnly<'a> {
    client_id: &'a str,
}

#[derive(Serialize)]
struct ClientReason<'a> {
    client_id: &'a str,
    reason: &'a str,
}

#[derive(Serialize)]
struct StageBatch<'a> {
    freelancer_id: &'a str,
    stages: &'a [StageDef],
}

/// Parse a service base URL that later receives path segments
pub(crate) fn parse_base_url(service: &str, raw: &str) -> EngineResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| BookingError::config(format!("invalid {service} base url {raw}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(BookingError::config(format!(
            "{service} base url {raw} cannot carry a path"
        )));
    }
    Ok(url)
}

/// `base` followed by `segments`, each percent-encoded as one path segment
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> EngineResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| BookingError::config(format!("base url {base} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// reqwest-backed [`LedgerClient`]
pub struct HttpLedgerClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerConfig) -> EngineResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        // No client-side timeout: a mutation that is slow must not be
        // reported as not having happened.
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| BookingError::config(format!("failed to build ledger client: {e}")))?;

        Ok(Self {
            client,
            base_url: parse_base_url("ledger", &config.base_url)?,
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> EngineResult<Url> {
        endpoint(&self.base_url, segments)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> EngineResult<T> {
        let response = self.authorize(request).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> EngineResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
            debug!(kind = ?envelope.error.kind, "ledger returned error");
            return Err(BookingError::from_kind(
                envelope.error.kind,
                envelope.error.message,
            ));
        }

        warn!(%status, "ledger returned an unstructured error");
        match status {
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                Err(BookingError::transport(format!("ledger unavailable ({status})")))
            }
            StatusCode::NOT_FOUND => Err(BookingError::not_found(body)),
            _ => Err(BookingError::ledger(format!("ledger responded {status}: {body}"))),
        }
    }

    fn list_query(query: BookingQuery) -> Vec<(&'static str, String)> {
        let query = query.normalized();
        let mut params = vec![
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(status) = query.status {
            params.push(("status", format!("{status:?}")));
        }
        params
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn book_package(&self, request: BookPackageRequest) -> EngineResult<BookingReceipt> {
        let builder = self
            .client
            .post(self.url(&["bookings"])?)
            .header(IDEMPOTENCY_HEADER, request.idempotency_key.as_str())
            .json(&request);
        self.send(builder).await
    }

    async fn get_booking_by_id(&self, booking_id: &str) -> EngineResult<Booking> {
        self.send(self.client.get(self.url(&["bookings", booking_id])?))
            .await
    }

    async fn list_bookings_for_client(
        &self,
        client_id: &str,
        query: BookingQuery,
    ) -> EngineResult<Vec<Booking>> {
        let builder = self
            .client
            .get(self.url(&["clients", client_id, "bookings"])?)
            .query(&Self::list_query(query));
        self.send(builder).await
    }

    async fn list_bookings_for_freelancer(
        &self,
        freelancer_id: &str,
        query: BookingQuery,
    ) -> EngineResult<Vec<Booking>> {
        let builder = self
            .client
            .get(self.url(&["freelancers", freelancer_id, "bookings"])?)
            .query(&Self::list_query(query));
        self.send(builder).await
    }

    async fn cancel_booking(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> EngineResult<Booking> {
        let builder = self
            .client
            .post(self.url(&["bookings", booking_id, "cancel"])?)
            .json(&ActorReason {
                actor_id: &actor.id,
                actor_role: actor.role,
                reason,
            });
        self.send(builder).await
    }

    async fn open_dispute(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> EngineResult<Booking> {
        let builder = self
            .client
            .post(self.url(&["bookings", booking_id, "dispute"])?)
            .json(&ActorReason {
                actor_id: &actor.id,
                actor_role: actor.role,
                reason,
            });
        self.send(builder).await
    }

    async fn complete_booking(&self, booking_id: &str) -> EngineResult<Booking> {
        self.send(
            self.client
                .post(self.url(&["bookings", booking_id, "complete"])?),
        )
        .await
    }

    async fn create_stages(
        &self,
        booking_id: &str,
        freelancer_id: &str,
        stages: &[StageDef],
    ) -> EngineResult<Vec<Stage>> {
        let builder = self
            .client
            .post(self.url(&["bookings", booking_id, "stages"])?)
            .json(&StageBatch {
                freelancer_id,
                stages,
            });
        self.send(builder).await
    }

    async fn get_stage_by_id(&self, stage_id: &str) -> EngineResult<Stage> {
        self.send(self.client.get(self.url(&["stages", stage_id])?))
            .await
    }

    async fn list_stages(&self, booking_id: &str) -> EngineResult<Vec<Stage>> {
        let mut stages: Vec<Stage> = self
            .send(
                self.client
                    .get(self.url(&["bookings", booking_id, "stages"])?),
            )
            .await?;
        stages.sort_by_key(|s| s.stage_number);
        Ok(stages)
    }

    async fn submit_stage(&self, request: SubmitStageRequest) -> EngineResult<Stage> {
        let builder = self
            .client
            .post(self.url(&["stages", request.stage_id.as_str(), "submit"])?)
            .json(&request);
        self.send(builder).await
    }

    async fn approve_stage(&self, stage_id: &str, client_id: &str) -> EngineResult<Stage> {
        let builder = self
            .client
            .post(self.url(&["stages", stage_id, "approve"])?)
            .json(&ClientOnly { client_id });
        self.send(builder).await
    }

    async fn release_stage(&self, stage_id: &str, client_id: &str) -> EngineResult<Stage> {
        let builder = self
            .client
            .post(self.url(&["stages", stage_id, "release"])?)
            .json(&ClientOnly { client_id });
        self.send(builder).await
    }

    async fn reject_stage(
        &self,
        stage_id: &str,
        client_id: &str,
        reason: &str,
    ) -> EngineResult<Stage> {
        let builder = self
            .client
            .post(self.url(&["stages", stage_id, "reject"])?)
            .json(&ClientReason { client_id, reason });
        self.send(builder).await
    }

    async fn create_service_for_booking(
        &self,
        request: CreateServiceRequest,
        idempotency_key: &str,
    ) -> EngineResult<String> {
        let builder = self
            .client
            .post(self.url(&["services"])?)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(&request);
        let created: CreatedId = self.send(builder).await?;
        Ok(created.id)
    }

    async fn create_package_for_booking(
        &self,
        request: CreatePackageRequest,
        idempotency_key: &str,
    ) -> EngineResult<String> {
        let builder = self
            .client
            .post(self.url(&["packages"])?)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(&request);
        let created: CreatedId = self.send(builder).await?;
        Ok(created.id)
    }
}
