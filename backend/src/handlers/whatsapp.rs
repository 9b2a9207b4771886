//! HTTP handler for forwarding reports to the WhatsApp gateway

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::external::messaging::{GatewayReceipt, ReportMessage};
use crate::middleware::{require_permission, CurrentUser};
use crate::AppState;

/// Forward a rendered report body to the messaging gateway
pub async fn send_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<ReportMessage>,
) -> AppResult<Json<GatewayReceipt>> {
    require_permission(&state, &current_user.0, "report", "export").await?;

    let receipt = state.messaging.send_report(&body).await?;
    Ok(Json(receipt))
}
