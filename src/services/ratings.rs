//! Tour rating summary maintained from its reviews.

use sqlx::PgConnection;
use uuid::Uuid;

/// Rating shown for a tour that has no reviews
pub const DEFAULT_RATING: f64 = 4.5;

/// Recompute `ratings_average` and `ratings_quantity` of one tour from all of its reviews.
///
/// The tour row is locked first so the aggregate runs on a snapshot taken after
/// every concurrent review write on the same tour has committed. `NO KEY UPDATE`
/// leaves the key-share lock taken by review inserts compatible.
pub async fn recompute(conn: &mut PgConnection, tour_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1 FROM tours WHERE id = $1 FOR NO KEY UPDATE")
        .bind(tour_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "UPDATE tours SET ratings_quantity = stats.quantity, ratings_average = stats.average \
         FROM (SELECT COUNT(*)::integer AS quantity, \
                      COALESCE(AVG(rating), $2)::double precision AS average \
               FROM reviews WHERE tour_id = $1) AS stats \
         WHERE tours.id = $1",
    )
    .bind(tour_id)
    .bind(DEFAULT_RATING)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(%tour_id, "recomputed tour ratings");
    Ok(())
}

/// Bring every tour whose stored summary is stale back in line with its reviews.
/// Tours are locked in id order, the same order single-tour recomputes use.
pub async fn recompute_all(conn: &mut PgConnection) -> Result<u64, sqlx::Error> {
    sqlx::query("SELECT 1 FROM tours ORDER BY id FOR NO KEY UPDATE")
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query(
        "UPDATE tours SET ratings_quantity = stats.quantity, ratings_average = stats.average \
         FROM (SELECT t.id, COUNT(r.id)::integer AS quantity, \
                      COALESCE(AVG(r.rating), $1)::double precision AS average \
               FROM tours t LEFT JOIN reviews r ON r.tour_id = t.id \
               GROUP BY t.id) AS stats \
         WHERE tours.id = stats.id \
           AND (tours.ratings_quantity <> stats.quantity OR tours.ratings_average <> stats.average)",
    )
    .bind(DEFAULT_RATING)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(tours = result.rows_affected(), "recomputed stale tour ratings");
    Ok(result.rows_affected())
}
