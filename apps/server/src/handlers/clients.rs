use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::{error::AppError, models::*, AppState};

/// GET /api/clients — full client directory, alphabetical.
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Client>>>, AppError> {
    let clients = sqlx::query_as::<_, Client>(
        "SELECT id, name, phone, email, notes FROM clients ORDER BY name ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(clients)))
}

/// POST /api/clients — register a client.
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClientForm>,
) -> Result<Json<ApiResponse<Client>>, AppError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("client name is required".into()));
    }

    let id = sqlx::query("INSERT INTO clients (name, phone, email, notes) VALUES (?, ?, ?, ?)")
        .bind(name)
        .bind(body.phone.as_deref().unwrap_or(""))
        .bind(body.email.as_deref().unwrap_or(""))
        .bind(body.notes.as_deref().unwrap_or(""))
        .execute(&state.db)
        .await?
        .last_insert_rowid();

    fetch_client(&state, id).await.map(|c| Json(ApiResponse::success(c)))
}

/// PUT /api/clients/:id — partial update.
pub async fn update_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ClientUpdate>,
) -> Result<Json<ApiResponse<Client>>, AppError> {
    // Confirm the record exists before applying field updates.
    fetch_client(&state, id).await?;

    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return Err(AppError::Validation("client name is required".into()));
        }
        sqlx::query("UPDATE clients SET name = ? WHERE id = ?")
            .bind(name.trim())
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(phone) = &body.phone {
        sqlx::query("UPDATE clients SET phone = ? WHERE id = ?")
            .bind(phone)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(email) = &body.email {
        sqlx::query("UPDATE clients SET email = ? WHERE id = ?")
            .bind(email)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(notes) = &body.notes {
        sqlx::query("UPDATE clients SET notes = ? WHERE id = ?")
            .bind(notes)
            .bind(id)
            .execute(&state.db)
            .await?;
    }

    fetch_client(&state, id).await.map(|c| Json(ApiResponse::success(c)))
}

/// DELETE /api/clients/:id — refuse when appointments still reference it.
pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    let referencing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE client_id = ?")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    if referencing > 0 {
        return Err(AppError::Referenced {
            entity: "client",
            count: referencing,
        });
    }

    let result = sqlx::query("DELETE FROM clients WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("client"));
    }

    Ok(Json(ApiResponse::success("client deleted")))
}

async fn fetch_client(state: &AppState, id: i64) -> Result<Client, AppError> {
    sqlx::query_as::<_, Client>("SELECT id, name, phone, email, notes FROM clients WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("client"))
}
