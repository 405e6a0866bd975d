//! Store view endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use saga_store::SagaStore;
use trading::StoreSnapshot;

use crate::error::ApiError;
use crate::routes::purchase::AppState;
use crate::routes::user_id_from;

/// GET /store — every catalog item with the caller's owned quantity and gil.
#[tracing::instrument(skip(state, headers))]
pub async fn get<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<StoreSnapshot>, ApiError> {
    let user_id = user_id_from(&headers)?;
    Ok(Json(state.store_view.snapshot(user_id).await?))
}
