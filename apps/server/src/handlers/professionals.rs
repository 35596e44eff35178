use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::{error::AppError, models::*, AppState};

/// GET /api/professionals — staff directory, alphabetical.
pub async fn list_professionals(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Professional>>>, AppError> {
    let professionals = sqlx::query_as::<_, Professional>(
        "SELECT id, name, phone, specialty FROM professionals ORDER BY name ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(professionals)))
}

/// POST /api/professionals — register a professional.
pub async fn create_professional(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProfessionalForm>,
) -> Result<Json<ApiResponse<Professional>>, AppError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("professional name is required".into()));
    }

    let id = sqlx::query("INSERT INTO professionals (name, phone, specialty) VALUES (?, ?, ?)")
        .bind(name)
        .bind(body.phone.as_deref().unwrap_or(""))
        .bind(body.specialty.as_deref().unwrap_or(""))
        .execute(&state.db)
        .await?
        .last_insert_rowid();

    fetch_professional(&state, id)
        .await
        .map(|p| Json(ApiResponse::success(p)))
}

/// PUT /api/professionals/:id — partial update.
pub async fn update_professional(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ProfessionalUpdate>,
) -> Result<Json<ApiResponse<Professional>>, AppError> {
    fetch_professional(&state, id).await?;

    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return Err(AppError::Validation("professional name is required".into()));
        }
        sqlx::query("UPDATE professionals SET name = ? WHERE id = ?")
            .bind(name.trim())
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(phone) = &body.phone {
        sqlx::query("UPDATE professionals SET phone = ? WHERE id = ?")
            .bind(phone)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(specialty) = &body.specialty {
        sqlx::query("UPDATE professionals SET specialty = ? WHERE id = ?")
            .bind(specialty)
            .bind(id)
            .execute(&state.db)
            .await?;
    }

    fetch_professional(&state, id)
        .await
        .map(|p| Json(ApiResponse::success(p)))
}

/// DELETE /api/professionals/:id — refuse while appointments reference it,
/// so the schedule is never silently orphaned.
pub async fn delete_professional(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    let referencing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE professional_id = ?")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    if referencing > 0 {
        return Err(AppError::Referenced {
            entity: "professional",
            count: referencing,
        });
    }

    let result = sqlx::query("DELETE FROM professionals WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("professional"));
    }

    Ok(Json(ApiResponse::success("professional deleted")))
}

async fn fetch_professional(state: &AppState, id: i64) -> Result<Professional, AppError> {
    sqlx::query_as::<_, Professional>(
        "SELECT id, name, phone, specialty FROM professionals WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("professional"))
}
