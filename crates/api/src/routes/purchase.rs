//! Purchase submission and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{CorrelationId, ItemId};
use saga_store::SagaStore;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use trading::{
    BroadcastNotifier, BusMessage, GetPurchaseState, InMemoryBalances, InMemoryCatalog,
    InMemoryInventory, InMemoryMessageBus, PurchaseEvent, PurchaseOrchestrator,
    PurchaseRequested, PurchaseSaga, StoreView,
};

use crate::error::ApiError;
use crate::routes::user_id_from;

/// The orchestrator as wired by the server.
pub type Orchestrator<S> =
    PurchaseOrchestrator<S, InMemoryCatalog, InMemoryMessageBus, BroadcastNotifier>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: SagaStore> {
    pub orchestrator: Arc<Orchestrator<S>>,
    /// Inbound side of the message bus, consumed by the worker pool.
    pub publisher: mpsc::Sender<BusMessage>,
    pub catalog: InMemoryCatalog,
    pub inventory: InMemoryInventory,
    pub balances: InMemoryBalances,
    /// Outbound side of the message bus.
    pub bus: InMemoryMessageBus,
    pub notifier: BroadcastNotifier,
    pub store_view: StoreView<InMemoryCatalog, InMemoryInventory, InMemoryBalances>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct PurchaseRequest {
    pub item_id: String,
    pub quantity: i64,
    pub correlation_id: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct PurchaseAcceptedResponse {
    pub correlation_id: String,
}

#[derive(Serialize)]
pub struct PurchaseStatusResponse {
    pub correlation_id: String,
    pub user_id: String,
    pub item_id: String,
    pub quantity: u32,
    pub purchase_total: Option<String>,
    pub current_state: String,
    pub error_message: Option<String>,
    pub received: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl From<PurchaseSaga> for PurchaseStatusResponse {
    fn from(saga: PurchaseSaga) -> Self {
        Self {
            correlation_id: saga.correlation_id().to_string(),
            user_id: saga.user_id().to_string(),
            item_id: saga.item_id().to_string(),
            quantity: saga.quantity(),
            purchase_total: saga.purchase_total().map(|gil| gil.to_string()),
            current_state: saga.current_state().to_string(),
            error_message: saga.error_message().map(str::to_string),
            received: saga.received(),
            last_updated: saga.last_updated(),
        }
    }
}

// -- Handlers --

/// POST /purchase — publish a purchase request for the calling user.
#[tracing::instrument(skip(state, headers, req))]
pub async fn submit<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseAcceptedResponse>), ApiError> {
    let user_id = user_id_from(&headers)?;
    let item_id: ItemId = req
        .item_id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid item_id: {e}")))?;
    let quantity = u32::try_from(req.quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| ApiError::BadRequest("Quantity must be positive".to_string()))?;
    let correlation_id = match req.correlation_id {
        Some(id) => id
            .parse()
            .map_err(|e| ApiError::BadRequest(format!("Invalid correlation_id: {e}")))?,
        None => CorrelationId::new(),
    };

    let event = PurchaseEvent::PurchaseRequested(PurchaseRequested {
        user_id,
        item_id,
        quantity,
        correlation_id,
    });
    let message = BusMessage::from_event(&event)?;
    state
        .publisher
        .send(message)
        .await
        .map_err(|_| ApiError::Unavailable("Purchase queue is closed".to_string()))?;

    metrics::counter!("purchase_requests_submitted_total").increment(1);
    tracing::info!(%correlation_id, %user_id, %item_id, quantity, "purchase requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(PurchaseAcceptedResponse {
            correlation_id: correlation_id.to_string(),
        }),
    ))
}

/// GET /purchase/status/{correlation_id} — current saga snapshot.
#[tracing::instrument(skip(state))]
pub async fn status<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(correlation_id): Path<String>,
) -> Result<Json<PurchaseStatusResponse>, ApiError> {
    let correlation_id: CorrelationId = correlation_id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid correlation_id: {e}")))?;

    let saga = state
        .orchestrator
        .get_purchase_state(GetPurchaseState { correlation_id })
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Purchase {correlation_id} not found")))?;

    Ok(Json(saga.into()))
}
