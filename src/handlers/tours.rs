use axum::extract::{Path, RawQuery, State};
use serde_json::{json, Value};

use super::factory;
use crate::database::models::{parse_id, Document, Role, Tour};
use crate::filter::QueryString;
use crate::middleware::{ApiJson, ApiResponse, ApiResult, CurrentUser};
use crate::services::tour_service::{parse_distance, year_bounds, LatLng, TourService, Unit};
use crate::state::AppState;

const TOUR_EDITORS: [Role; 2] = [Role::Admin, Role::LeadGuide];
const TOUR_STAFF: [Role; 3] = [Role::Admin, Role::LeadGuide, Role::Guide];

/// Query applied by `GET /tours/top-5-cheap`
pub fn top_tours_query(raw: Option<&str>) -> QueryString {
    let mut query = QueryString::parse(raw);
    query
        .set("limit", "5")
        .set("sort", "-ratingsAverage,price")
        .set("fields", "name,price,ratingsAverage,summary,difficulty");
    query
}

pub async fn get_all_tours(State(state): State<AppState>, RawQuery(raw): RawQuery) -> ApiResult<Value> {
    factory::get_all::<Tour>(&state.pool, &QueryString::parse(raw.as_deref()), None).await
}

pub async fn alias_top_tours(State(state): State<AppState>, RawQuery(raw): RawQuery) -> ApiResult<Value> {
    factory::get_all::<Tour>(&state.pool, &top_tours_query(raw.as_deref()), None).await
}

pub async fn get_tour(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    factory::get_one::<Tour>(&state.pool, parse_id(&id)?).await
}

pub async fn create_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<Document>,
) -> ApiResult<Value> {
    user.restrict_to(&TOUR_EDITORS)?;
    factory::create_one::<Tour>(&state.pool, &body).await
}

pub async fn update_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Document>,
) -> ApiResult<Value> {
    user.restrict_to(&TOUR_EDITORS)?;
    factory::update_one::<Tour>(&state.pool, parse_id(&id)?, &body, &factory::unguarded).await
}

pub async fn delete_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    user.restrict_to(&TOUR_EDITORS)?;
    factory::delete_one::<Tour>(&state.pool, parse_id(&id)?, &factory::unguarded).await
}

pub async fn get_tour_stats(State(state): State<AppState>) -> ApiResult<Value> {
    let stats = TourService::new(state.pool.clone()).stats().await?;
    Ok(ApiResponse::success(json!({ "stats": stats })))
}

pub async fn get_monthly_plan(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(year): Path<String>,
) -> ApiResult<Value> {
    user.restrict_to(&TOUR_STAFF)?;
    let (start, end) = year_bounds(&year)?;
    let plan = TourService::new(state.pool.clone()).monthly_plan(start, end).await?;
    Ok(ApiResponse::success(json!({ "plan": plan })))
}

/// `/tours-within/:distance/center/:latlng/unit/:unit`
pub async fn get_tours_within(
    State(state): State<AppState>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
) -> ApiResult<Value> {
    let distance = parse_distance(&distance)?;
    let center = LatLng::parse(&latlng)?;
    let unit = Unit::parse(&unit)?;

    let tours = TourService::new(state.pool.clone()).within(distance, center, unit).await?;
    let count = tours.len();
    Ok(ApiResponse::success(json!({ "tours": tours })).results(count))
}

/// `/distances/:latlng/unit/:unit`
pub async fn get_distances(
    State(state): State<AppState>,
    Path((latlng, unit)): Path<(String, String)>,
) -> ApiResult<Value> {
    let center = LatLng::parse(&latlng)?;
    let unit = Unit::parse(&unit)?;

    let distances = TourService::new(state.pool.clone()).distances(center, unit).await?;
    Ok(ApiResponse::success(json!({ "distances": distances })))
}
