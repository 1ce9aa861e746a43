//! Aggregations over tours: rating statistics, monthly start plan and
//! great-circle search around a point.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::database::manager::DatabaseError;
use crate::database::models::{Model, Tour};
use crate::error::ApiError;
use crate::filter::filter::json_row;

/// Earth radius used for distances in metres
const EARTH_RADIUS_METRES: f64 = 6_378_100.0;

/// Months returned by the monthly plan
const MONTHLY_PLAN_LIMIT: i64 = 6;

/// Minimum average rating for a tour to count in the statistics
const STATS_MIN_RATING: f64 = 4.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Mi,
    Km,
}

impl Unit {
    pub fn parse(value: &str) -> Result<Self, ApiError> {
        match value {
            "mi" => Ok(Unit::Mi),
            "km" => Ok(Unit::Km),
            _ => Err(ApiError::bad_request("Please provide the unit as mi or km")),
        }
    }

    /// Earth radius in this unit
    pub fn earth_radius(&self) -> f64 {
        match self {
            Unit::Mi => 3963.2,
            Unit::Km => 6378.1,
        }
    }

    /// Factor converting metres into this unit
    pub fn multiplier(&self) -> f64 {
        match self {
            Unit::Mi => 0.000621371192,
            Unit::Km => 0.001,
        }
    }

    /// Angular radius in radians of a spherical cap `distance` wide
    pub fn radius_radians(&self, distance: f64) -> f64 {
        distance / self.earth_radius()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Parse `lat,lng`
    pub fn parse(value: &str) -> Result<Self, ApiError> {
        let invalid = || ApiError::bad_request("Please provide the latitude and longitude in the format lat,lng");
        let (lat, lng) = value.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(invalid());
        }
        Ok(Self { lat, lng })
    }
}

pub fn parse_distance(value: &str) -> Result<f64, ApiError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid distance: {}", value)))
}

/// `[year-01-01, year+1-01-01)` in UTC
pub fn year_bounds(value: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
    let invalid = || ApiError::bad_request(format!("Invalid year: {}", value));
    let year: i32 = value.trim().parse().map_err(|_| invalid())?;
    if !(1..=9998).contains(&year) {
        return Err(invalid());
    }
    let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single().ok_or_else(invalid)?;
    let end = Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single().ok_or_else(invalid)?;
    Ok((start, end))
}

/// Central angle in radians between a tour's start location and ($1 lat, $2 lng)
fn central_angle_sql() -> &'static str {
    "2 * asin(LEAST(1.0, sqrt(\
        power(sin(radians(((start_location->'coordinates'->>1)::double precision) - $1) / 2), 2) \
        + cos(radians($1)) * cos(radians((start_location->'coordinates'->>1)::double precision)) \
        * power(sin(radians(((start_location->'coordinates'->>0)::double precision) - $2) / 2), 2))))"
}

const PUBLIC_TOURS: &str = "secret_tour IS DISTINCT FROM true";

pub struct TourService {
    pool: PgPool,
}

impl TourService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Per-difficulty statistics of well-rated tours, cheapest group first
    pub async fn stats(&self) -> Result<Vec<Value>, DatabaseError> {
        let rows = sqlx::query_scalar::<_, Value>(&format!(
            "SELECT json_build_object(\
                'difficulty', difficulty, \
                'numTours', COUNT(*), \
                'numRatings', SUM(ratings_quantity), \
                'avgRating', AVG(ratings_average), \
                'avgPrice', AVG(price), \
                'minPrice', MIN(price), \
                'maxPrice', MAX(price)) AS row \
             FROM tours WHERE {} AND ratings_average >= $1 \
             GROUP BY difficulty ORDER BY AVG(price) ASC",
            PUBLIC_TOURS
        ))
        .bind(STATS_MIN_RATING)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Tours starting in each month of the year, busiest months first
    pub async fn monthly_plan(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Value>, DatabaseError> {
        let rows = sqlx::query_scalar::<_, Value>(&format!(
            "SELECT json_build_object('month', month, 'numToursStart', num_tours_start, 'tours', tours) AS row \
             FROM (SELECT EXTRACT(MONTH FROM start_date AT TIME ZONE 'UTC')::integer AS month, \
                          COUNT(*)::integer AS num_tours_start, \
                          array_agg(name ORDER BY start_date) AS tours \
                   FROM tours, unnest(start_dates) AS start_date \
                   WHERE {} AND start_date >= $1 AND start_date < $2 \
                   GROUP BY month) AS plan \
             ORDER BY num_tours_start DESC, month ASC LIMIT $3",
            PUBLIC_TOURS
        ))
        .bind(start)
        .bind(end)
        .bind(MONTHLY_PLAN_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Tours whose start location lies within `distance` of `center`
    pub async fn within(&self, distance: f64, center: LatLng, unit: Unit) -> Result<Vec<Value>, DatabaseError> {
        let mut rows = sqlx::query_scalar::<_, Value>(&format!(
            "SELECT {} AS row FROM tours \
             WHERE {} AND start_location IS NOT NULL AND {} <= $3 \
             ORDER BY id",
            json_row(Tour::schema().visible()),
            PUBLIC_TOURS,
            central_angle_sql()
        ))
        .bind(center.lat)
        .bind(center.lng)
        .bind(unit.radius_radians(distance))
        .fetch_all(&self.pool)
        .await?;

        rows.iter_mut().for_each(Tour::present);
        Tour::populate(&self.pool, &mut rows, false).await?;
        Ok(rows)
    }

    /// Distance from `center` to every tour start, nearest first
    pub async fn distances(&self, center: LatLng, unit: Unit) -> Result<Vec<Value>, DatabaseError> {
        let rows = sqlx::query_scalar::<_, Value>(&format!(
            "SELECT json_build_object('id', id, 'name', name, 'distance', distance) AS row \
             FROM (SELECT id, name, {} * $3 * $4 AS distance FROM tours \
                   WHERE {} AND start_location IS NOT NULL) AS d \
             ORDER BY distance ASC, id ASC",
            central_angle_sql(),
            PUBLIC_TOURS
        ))
        .bind(center.lat)
        .bind(center.lng)
        .bind(EARTH_RADIUS_METRES)
        .bind(unit.multiplier())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
