use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::scheduler::interval::MAX_DURATION_MIN;
use crate::{error::AppError, models::*, AppState};

/// GET /api/services — service catalog.
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Service>>>, AppError> {
    let services = sqlx::query_as::<_, Service>(
        "SELECT id, name, price, duration_min FROM services ORDER BY name ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(services)))
}

/// POST /api/services — add a catalog entry. Price must be non-negative
/// and duration at least one minute; the scheduler relies on both.
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ServiceForm>,
) -> Result<Json<ApiResponse<Service>>, AppError> {
    validate_service_fields(&body.name, Some(body.price), Some(body.duration_min))?;

    let id = sqlx::query("INSERT INTO services (name, price, duration_min) VALUES (?, ?, ?)")
        .bind(body.name.trim())
        .bind(body.price)
        .bind(body.duration_min)
        .execute(&state.db)
        .await?
        .last_insert_rowid();

    fetch_service(&state, id)
        .await
        .map(|s| Json(ApiResponse::success(s)))
}

/// PUT /api/services/:id — partial update. Duration changes apply only
/// to appointments scheduled afterwards; stored intervals keep the
/// duration that was in effect when they were booked.
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ServiceUpdate>,
) -> Result<Json<ApiResponse<Service>>, AppError> {
    fetch_service(&state, id).await?;
    validate_service_fields(
        body.name.as_deref().unwrap_or("valid"),
        body.price,
        body.duration_min,
    )?;

    if let Some(name) = &body.name {
        sqlx::query("UPDATE services SET name = ? WHERE id = ?")
            .bind(name.trim())
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(price) = body.price {
        sqlx::query("UPDATE services SET price = ? WHERE id = ?")
            .bind(price)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(duration) = body.duration_min {
        sqlx::query("UPDATE services SET duration_min = ? WHERE id = ?")
            .bind(duration)
            .bind(id)
            .execute(&state.db)
            .await?;
    }

    fetch_service(&state, id)
        .await
        .map(|s| Json(ApiResponse::success(s)))
}

/// DELETE /api/services/:id — refuse when appointments still reference it.
pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    let referencing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE service_id = ?")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    if referencing > 0 {
        return Err(AppError::Referenced {
            entity: "service",
            count: referencing,
        });
    }

    let result = sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("service"));
    }

    Ok(Json(ApiResponse::success("service deleted")))
}

fn validate_service_fields(
    name: &str,
    price: Option<f64>,
    duration_min: Option<i64>,
) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("service name is required".into()));
    }
    if let Some(price) = price {
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::Validation(
                "service price must be non-negative".into(),
            ));
        }
    }
    if let Some(duration) = duration_min {
        if !(1..=MAX_DURATION_MIN).contains(&duration) {
            return Err(AppError::Validation(format!(
                "service duration must be between 1 and {} minutes",
                MAX_DURATION_MIN
            )));
        }
    }
    Ok(())
}

async fn fetch_service(state: &AppState, id: i64) -> Result<Service, AppError> {
    sqlx::query_as::<_, Service>("SELECT id, name, price, duration_min FROM services WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("service"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_negative_price() {
        assert!(validate_service_fields("Corte", Some(-1.0), Some(30)).is_err());
    }

    #[test]
    fn test_rejects_nan_price() {
        assert!(validate_service_fields("Corte", Some(f64::NAN), Some(30)).is_err());
    }

    #[test]
    fn test_rejects_zero_duration() {
        assert!(validate_service_fields("Corte", Some(10.0), Some(0)).is_err());
    }

    #[test]
    fn test_rejects_absurd_duration() {
        assert!(validate_service_fields("Corte", Some(10.0), Some(i64::MAX)).is_err());
        assert!(validate_service_fields("Corte", Some(10.0), Some(1441)).is_err());
        assert!(validate_service_fields("Dia de noiva", Some(500.0), Some(1440)).is_ok());
    }

    #[test]
    fn test_rejects_blank_name() {
        assert!(validate_service_fields("   ", Some(10.0), Some(30)).is_err());
    }

    #[test]
    fn test_accepts_free_service() {
        assert!(validate_service_fields("Avaliação", Some(0.0), Some(15)).is_ok());
    }
}
