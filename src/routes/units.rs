use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult};
use crate::models::{LeaseStatus, Unit, UnitStatus};
use crate::schemas::{
    clamp_limit_in_range, validate_input, CreateUnitInput, UnitStatusInput, UnitsQuery,
    UpdateUnitInput,
};
use crate::services::ownership::{property_for_owner, unit_for_owner};
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/units", axum::routing::get(list_units).post(create_unit))
        .route(
            "/units/{unit_id}",
            axum::routing::get(get_unit)
                .patch(update_unit)
                .delete(delete_unit),
        )
        .route("/units/{unit_id}/restore", axum::routing::post(restore_unit))
        .route(
            "/units/{unit_id}/status",
            axum::routing::patch(change_unit_status),
        )
}

async fn list_units(
    State(state): State<AppState>,
    Query(query): Query<UnitsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let units = sqlx::query_as::<_, Unit>(
        "SELECT u.* FROM units u
         JOIN properties p ON p.id = u.property_id
         WHERE p.owner_user_id = $1 AND u.is_active AND p.is_active
           AND ($2::uuid IS NULL OR u.property_id = $2)
         ORDER BY u.unit_number ASC
         LIMIT $3",
    )
    .bind(user_id)
    .bind(query.property_id)
    .bind(clamp_limit_in_range(query.limit, 1, 1000))
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(Json(json!({ "data": units })))
}

async fn create_unit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateUnitInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    property_for_owner(pool, user_id, payload.property_id).await?;

    // (property_id, unit_number) uniqueness is a DB constraint; a
    // duplicate surfaces as Conflict.
    let unit = sqlx::query_as::<_, Unit>(
        "INSERT INTO units (property_id, unit_number, floor, bedrooms, area, market_rent, status, description)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING *",
    )
    .bind(payload.property_id)
    .bind(&payload.unit_number)
    .bind(payload.floor)
    .bind(payload.bedrooms)
    .bind(payload.area)
    .bind(payload.market_rent)
    .bind(UnitStatus::Vacant)
    .bind(&payload.description)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok((axum::http::StatusCode::CREATED, Json(unit)))
}

async fn get_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Unit>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;
    let unit = unit_for_owner(pool, user_id, unit_id).await?;
    Ok(Json(unit))
}

async fn update_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateUnitInput>,
) -> AppResult<Json<Unit>> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    unit_for_owner(pool, user_id, unit_id).await?;

    let updated = sqlx::query_as::<_, Unit>(
        "UPDATE units
         SET unit_number = COALESCE($1, unit_number),
             floor = COALESCE($2, floor),
             bedrooms = COALESCE($3, bedrooms),
             area = COALESCE($4, area),
             market_rent = COALESCE($5, market_rent),
             description = COALESCE($6, description),
             updated_at = now()
         WHERE id = $7
         RETURNING *",
    )
    .bind(&payload.unit_number)
    .bind(payload.floor)
    .bind(payload.bedrooms)
    .bind(payload.area)
    .bind(payload.market_rent)
    .bind(&payload.description)
    .bind(unit_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(Json(updated))
}

async fn delete_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;
    unit_for_owner(pool, user_id, unit_id).await?;

    sqlx::query("UPDATE units SET is_active = false, updated_at = now() WHERE id = $1")
        .bind(unit_id)
        .execute(pool)
        .await
        .map_err(AppError::from_db)?;

    Ok(Json(json!({ "message": "Unit archived." })))
}

async fn restore_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Unit>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    // unit_for_owner only sees active units; archived ones need their own
    // lookup.
    let archived = sqlx::query_as::<_, Unit>(
        "SELECT u.* FROM units u
         JOIN properties p ON p.id = u.property_id
         WHERE u.id = $1 AND NOT u.is_active AND p.owner_user_id = $2",
    )
    .bind(unit_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from_db)?
    .ok_or_else(|| AppError::NotFound("Unit not found.".to_string()))?;

    let restored = sqlx::query_as::<_, Unit>(
        "UPDATE units SET is_active = true, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(archived.id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(Json(restored))
}

/// Manual status change, restricted to the vacant ↔ maintenance toggle.
/// Occupancy itself is derived from leases and never set by hand.
async fn change_unit_status(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UnitStatusInput>,
) -> AppResult<Json<Unit>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;
    unit_for_owner(pool, user_id, unit_id).await?;

    if payload.status == UnitStatus::Occupied {
        return Err(AppError::BadRequest(
            "Occupancy is derived from leases and cannot be set directly.".to_string(),
        ));
    }

    let active_leases: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM leases WHERE unit_id = $1 AND status = $2",
    )
    .bind(unit_id)
    .bind(LeaseStatus::Active)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    if active_leases > 0 {
        return Err(AppError::Conflict(
            "The unit has an active lease; its status is managed by the lease lifecycle."
                .to_string(),
        ));
    }

    let updated = sqlx::query_as::<_, Unit>(
        "UPDATE units SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(payload.status)
    .bind(unit_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(Json(updated))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
