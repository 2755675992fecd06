use super::AppState;
use super::error::ApiError;
use crate::core::dataset::{ConvertedSeries, Dataset};
use crate::core::fx::USD;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path as FsPath;

#[derive(Debug, Deserialize, Default)]
pub struct SeriesQuery {
    pub countries: Option<String>,
    pub base: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryInfo {
    pub code: String,
    pub name: String,
    pub currency: String,
    pub gdp_rank: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct M2Response {
    pub base: String,
    pub unit_policy: String,
    pub series: Vec<ConvertedSeries>,
    /// Source of every FX series used, keyed by currency.
    pub fx_sources: BTreeMap<String, String>,
}

async fn read_file(path: &FsPath, what: &str) -> Result<String, ApiError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ApiError::NotFound(format!(
            "{what} not built yet: {}",
            path.display()
        ))),
        Err(e) => Err(ApiError::Internal(format!(
            "Failed to read {}: {e}",
            path.display()
        ))),
    }
}

async fn load_dataset(state: &AppState) -> Result<Dataset, ApiError> {
    let text = read_file(&state.dataset_path, "Dataset").await?;
    serde_json::from_str(&text)
        .map_err(|e| ApiError::Internal(format!("Failed to parse dataset: {e}")))
}

fn base_currency(dataset: &Dataset, base: Option<&str>) -> Result<String, ApiError> {
    let base = base
        .map(|b| b.trim().to_uppercase())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| USD.to_string());
    if !dataset.supports_base(&base) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported base currency: {base}"
        )));
    }
    Ok(base)
}

fn m2_response(dataset: &Dataset, base: String, codes: &[String]) -> Result<M2Response, ApiError> {
    let series = codes
        .iter()
        .map(|code| dataset.converted_series(code, &base))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let fx_sources = series
        .iter()
        .map(|s| s.currency.as_str())
        .chain([base.as_str()])
        .filter_map(|ccy| {
            dataset
                .fx
                .sources
                .get(ccy)
                .map(|source| (ccy.to_string(), source.clone()))
        })
        .collect();

    Ok(M2Response {
        base,
        unit_policy: dataset.meta.unit_policy.clone(),
        series,
        fx_sources,
    })
}

/// GET /health
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /api/dataset
pub async fn dataset_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let text = read_file(&state.dataset_path, "Dataset").await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], text))
}

/// GET /api/analysis
pub async fn analysis_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let text = read_file(&state.analysis_path, "Analysis").await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], text))
}

/// GET /api/countries, ordered by GDP rank
pub async fn countries_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<CountryInfo>>, ApiError> {
    let dataset = load_dataset(&state).await?;
    let mut countries: Vec<CountryInfo> = dataset
        .countries
        .into_iter()
        .map(|(code, c)| CountryInfo {
            code,
            name: c.name,
            currency: c.currency,
            gdp_rank: c.gdp_rank,
        })
        .collect();
    countries.sort_by(|a, b| a.gdp_rank.cmp(&b.gdp_rank).then_with(|| a.code.cmp(&b.code)));
    Ok(Json(countries))
}

/// GET /api/m2?countries=US,CN&base=USD
pub async fn m2_handler(
    State(state): State<AppState>,
    Query(params): Query<SeriesQuery>,
) -> Result<Json<M2Response>, ApiError> {
    let dataset = load_dataset(&state).await?;
    let base = base_currency(&dataset, params.base.as_deref())?;
    let codes = dataset.select(params.countries.as_deref().unwrap_or_default());
    Ok(Json(m2_response(&dataset, base, &codes)?))
}

/// GET /api/m2/{code}?base=USD
pub async fn m2_country_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<SeriesQuery>,
) -> Result<Json<M2Response>, ApiError> {
    let dataset = load_dataset(&state).await?;
    let code = code.trim().to_uppercase();
    if !dataset.countries.contains_key(&code) {
        return Err(ApiError::NotFound(format!("Unknown country: {code}")));
    }
    let base = base_currency(&dataset, params.base.as_deref())?;
    Ok(Json(m2_response(&dataset, base, &[code])?))
}
