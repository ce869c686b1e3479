use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult};
use crate::models::Tenant;
use crate::schemas::{clamp_limit_in_range, validate_input, CreateTenantInput, UpdateTenantInput};
use crate::services::ownership::tenant_for_owner;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/tenants",
            axum::routing::get(list_tenants).post(create_tenant),
        )
        .route(
            "/tenants/{tenant_id}",
            axum::routing::get(get_tenant)
                .patch(update_tenant)
                .delete(delete_tenant),
        )
}

#[derive(Debug, Clone, serde::Deserialize)]
struct TenantsQuery {
    limit: Option<i64>,
}

async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<TenantsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let tenants = sqlx::query_as::<_, Tenant>(
        "SELECT * FROM tenants
         WHERE owner_user_id = $1 AND is_active
         ORDER BY full_name ASC
         LIMIT $2",
    )
    .bind(user_id)
    .bind(clamp_limit_in_range(query.limit, 1, 500))
    .fetch_all(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(Json(json!({ "data": tenants })))
}

async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTenantInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let tenant = sqlx::query_as::<_, Tenant>(
        "INSERT INTO tenants (owner_user_id, full_name, phone, email, national_id, notes)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING *",
    )
    .bind(user_id)
    .bind(&payload.full_name)
    .bind(&payload.phone)
    .bind(&payload.email)
    .bind(&payload.national_id)
    .bind(&payload.notes)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok((axum::http::StatusCode::CREATED, Json(tenant)))
}

async fn get_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Tenant>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;
    let tenant = tenant_for_owner(pool, user_id, tenant_id).await?;
    Ok(Json(tenant))
}

async fn update_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateTenantInput>,
) -> AppResult<Json<Tenant>> {
    let user_id = require_user_id(&state, &headers)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    tenant_for_owner(pool, user_id, tenant_id).await?;

    let updated = sqlx::query_as::<_, Tenant>(
        "UPDATE tenants
         SET full_name = COALESCE($1, full_name),
             phone = COALESCE($2, phone),
             email = COALESCE($3, email),
             national_id = COALESCE($4, national_id),
             notes = COALESCE($5, notes),
             is_active = COALESCE($6, is_active),
             updated_at = now()
         WHERE id = $7
         RETURNING *",
    )
    .bind(&payload.full_name)
    .bind(&payload.phone)
    .bind(&payload.email)
    .bind(&payload.national_id)
    .bind(&payload.notes)
    .bind(payload.is_active)
    .bind(tenant_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::from_db)?;

    Ok(Json(updated))
}

async fn delete_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;
    tenant_for_owner(pool, user_id, tenant_id).await?;

    sqlx::query("UPDATE tenants SET is_active = false, updated_at = now() WHERE id = $1")
        .bind(tenant_id)
        .execute(pool)
        .await
        .map_err(AppError::from_db)?;

    Ok(Json(json!({ "message": "Tenant archived." })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
