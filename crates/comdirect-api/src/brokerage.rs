//! Order placement.

use serde::{Deserialize, Serialize};

use crate::client::{ComdirectClient, RequestContext, read_json};
use crate::error::ApiError;
use crate::models::AmountValue;

/// Unit used for piece quantities.
pub const PIECES_UNIT: &str = "XXX";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub depot_id: String,
    /// `BUY` or `SELL`.
    pub side: String,
    pub instrument_id: String,
    /// `MARKET` or `LIMIT`.
    pub order_type: String,
    pub quantity: AmountValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<AmountValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: String,
    #[serde(default)]
    pub order_status: Option<String>,
}

pub async fn place_order(
    client: &ComdirectClient,
    ctx: RequestContext<'_>,
    order: &OrderRequest,
) -> Result<OrderResponse, ApiError> {
    let url = client.endpoint("brokerage/v3/orders")?;
    let response = client
        .authorized(client.http().post(url), ctx)
        .json(order)
        .send()
        .await?;
    read_json(response).await
}
