use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult};
use crate::models::Property;
use crate::schemas::{clamp_limit_in_range, validate_input, CreatePropertyInput, UpdatePropertyInput};
use crate::services::ownership::property_for_owner;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/properties",
            axum::routing::get(list_properties).post(create_property),
        )
        .route(
            "/properties/{property_id}",
            axum::routing::get(get_property)
                .patch(update_property)
                .delete(delete_property),
        )
}

#[derive(Debug, Clone, serde::Deserialize)]
struct PropertiesQuery {
    limit: Option<i64>,
}

async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<PropertiesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let properties = sqlx::query_as::<_, Property>(
        "SELECT * FROM properties
         WHERE owner_user_id = $1 AND is_active
         ORDER BY created_at DESC
         LIMIT $2",
    )
    .bind(user_id)
    .bind(clamp_limit_in_range(query.limit, 1, 500))
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(Json(json!({ "data": properties })))
}

async fn create_property(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePropertyInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let property = sqlx::query_as::<_, Property>(
        "INSERT INTO properties (owner_user_id, name, address, city, notes)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(user_id)
    .bind(&payload.name)
    .bind(&payload.address)
    .bind(&payload.city)
    .bind(&payload.notes)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok((axum::http::StatusCode::CREATED, Json(property)))
}

async fn get_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Property>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;
    let property = property_for_owner(pool, user_id, property_id).await?;
    Ok(Json(property))
}

async fn update_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdatePropertyInput>,
) -> AppResult<Json<Property>> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    property_for_owner(pool, user_id, property_id).await?;

    let updated = sqlx::query_as::<_, Property>(
        "UPDATE properties
         SET name = COALESCE($1, name),
             address = COALESCE($2, address),
             city = COALESCE($3, city),
             notes = COALESCE($4, notes),
             is_active = COALESCE($5, is_active),
             updated_at = now()
         WHERE id = $6
         RETURNING *",
    )
    .bind(&payload.name)
    .bind(&payload.address)
    .bind(&payload.city)
    .bind(&payload.notes)
    .bind(payload.is_active)
    .bind(property_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(Json(updated))
}

async fn delete_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;
    property_for_owner(pool, user_id, property_id).await?;

    sqlx::query("UPDATE properties SET is_active = false, updated_at = now() WHERE id = $1")
        .bind(property_id)
        .execute(pool)
        .await
        .map_err(AppError::from_db)?;

    Ok(Json(json!({ "message": "Property archived." })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
