//! Sales listing.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use domain::sale::clamp_limit;
use domain::{DEFAULT_LIST_LIMIT, Sale};

use super::purchase_plans::ListResponse;
use crate::AppState;
use crate::error::ApiError;

/// Reads `limit` leniently: anything unparsable falls back to the default.
fn parse_limit(params: &HashMap<String, String>) -> u32 {
    let limit = params
        .get("limit")
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(|n| n.clamp(0, i64::from(u32::MAX)) as u32)
        .unwrap_or(DEFAULT_LIST_LIMIT);
    clamp_limit(limit)
}

/// GET /sales?limit=N — newest first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ListResponse<Sale>>, ApiError> {
    let sales = state.sales.list(parse_limit(&params)).await?;
    Ok(Json(sales.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(limit: &str) -> HashMap<String, String> {
        HashMap::from([("limit".to_string(), limit.to_string())])
    }

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(parse_limit(&HashMap::new()), DEFAULT_LIST_LIMIT);
        assert_eq!(parse_limit(&params("abc")), DEFAULT_LIST_LIMIT);
        assert_eq!(parse_limit(&params("10")), 10);
        assert_eq!(parse_limit(&params("0")), 1);
        assert_eq!(parse_limit(&params("-5")), 1);
        assert_eq!(parse_limit(&params("10000")), 200);
    }
}
