//! Customer engagement reads.

use axum::Json;
use axum::extract::{Path, State};

use super::{ApiError, ApiWorkspace, AppState};
use crate::hotscore::{OnDemandScore, recompute_on_demand};
use crate::types::CustomerId;

/// `GET /customers/{customer_id}/hot-score`. Recomputes at most once a day
/// per customer; otherwise answers the stored score.
pub async fn hot_score_handler(
    State(state): State<AppState>,
    ApiWorkspace(workspace_id): ApiWorkspace,
    Path(customer_id): Path<CustomerId>,
) -> Result<Json<OnDemandScore>, ApiError> {
    Ok(Json(
        recompute_on_demand(state.pipeline(), &workspace_id, &customer_id).await?,
    ))
}
