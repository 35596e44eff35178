use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{error::AppError, models::*, AppState};

/// GET /api/inventory — stock listing, alphabetical.
pub async fn list_inventory(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<InventoryItem>>>, AppError> {
    let items = sqlx::query_as::<_, InventoryItem>(
        "SELECT id, name, category, quantity, unit_price FROM inventory ORDER BY name ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(items)))
}

/// POST /api/inventory — add a stock item. Names are unique; a duplicate
/// is a validation error, the bulk import is the upsert path.
pub async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(body): Json<InventoryForm>,
) -> Result<Json<ApiResponse<InventoryItem>>, AppError> {
    validate_item_fields(&body.name, Some(body.quantity), Some(body.unit_price))?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventory WHERE name = ?")
        .bind(body.name.trim())
        .fetch_one(&state.db)
        .await?;
    if existing > 0 {
        return Err(AppError::Validation(format!(
            "inventory item '{}' already exists",
            body.name.trim()
        )));
    }

    let id = sqlx::query(
        "INSERT INTO inventory (name, category, quantity, unit_price) VALUES (?, ?, ?, ?)",
    )
    .bind(body.name.trim())
    .bind(body.category.as_deref().unwrap_or(""))
    .bind(body.quantity)
    .bind(body.unit_price)
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    fetch_item(&state, id).await.map(|i| Json(ApiResponse::success(i)))
}

/// PUT /api/inventory/:id — partial update.
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<InventoryUpdate>,
) -> Result<Json<ApiResponse<InventoryItem>>, AppError> {
    fetch_item(&state, id).await?;
    validate_item_fields(
        body.name.as_deref().unwrap_or("valid"),
        body.quantity,
        body.unit_price,
    )?;

    if let Some(name) = &body.name {
        sqlx::query("UPDATE inventory SET name = ? WHERE id = ?")
            .bind(name.trim())
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(category) = &body.category {
        sqlx::query("UPDATE inventory SET category = ? WHERE id = ?")
            .bind(category)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(quantity) = body.quantity {
        sqlx::query("UPDATE inventory SET quantity = ? WHERE id = ?")
            .bind(quantity)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(unit_price) = body.unit_price {
        sqlx::query("UPDATE inventory SET unit_price = ? WHERE id = ?")
            .bind(unit_price)
            .bind(id)
            .execute(&state.db)
            .await?;
    }

    fetch_item(&state, id).await.map(|i| Json(ApiResponse::success(i)))
}

/// DELETE /api/inventory/:id.
pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    let result = sqlx::query("DELETE FROM inventory WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("inventory item"));
    }

    Ok(Json(ApiResponse::success("inventory item deleted")))
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
}

/// POST /api/inventory/import — bulk upsert keyed by name: an existing
/// item gets its category, quantity and price replaced, a new name is
/// inserted. All rows are validated before anything is written, and the
/// batch is applied in one transaction.
pub async fn import_items(
    State(state): State<Arc<AppState>>,
    Json(rows): Json<Vec<InventoryForm>>,
) -> Result<Json<ApiResponse<ImportSummary>>, AppError> {
    for (i, row) in rows.iter().enumerate() {
        validate_item_fields(&row.name, Some(row.quantity), Some(row.unit_price))
            .map_err(|e| AppError::Validation(format!("row {}: {}", i + 1, e)))?;
    }

    let mut tx = state.db.begin().await?;
    for row in &rows {
        sqlx::query(
            "INSERT INTO inventory (name, category, quantity, unit_price)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                category = excluded.category,
                quantity = excluded.quantity,
                unit_price = excluded.unit_price",
        )
        .bind(row.name.trim())
        .bind(row.category.as_deref().unwrap_or(""))
        .bind(row.quantity)
        .bind(row.unit_price)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!("imported {} inventory rows", rows.len());
    Ok(Json(ApiResponse::success(ImportSummary {
        imported: rows.len(),
    })))
}

fn validate_item_fields(
    name: &str,
    quantity: Option<i64>,
    unit_price: Option<f64>,
) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("item name is required".into()));
    }
    if let Some(quantity) = quantity {
        if quantity < 0 {
            return Err(AppError::Validation(
                "item quantity must be non-negative".into(),
            ));
        }
    }
    if let Some(price) = unit_price {
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::Validation(
                "item unit price must be non-negative".into(),
            ));
        }
    }
    Ok(())
}

async fn fetch_item(state: &AppState, id: i64) -> Result<InventoryItem, AppError> {
    sqlx::query_as::<_, InventoryItem>(
        "SELECT id, name, category, quantity, unit_price FROM inventory WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("inventory item"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use axum::extract::{Path, State};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Instant;

    async fn test_state() -> Arc<AppState> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        crate::db::run_migrations(&pool).await.expect("migrations");
        Arc::new(AppState {
            db: pool.clone(),
            scheduler: Scheduler::new(pool),
            mp_access_token: String::new(),
            started_at: Instant::now(),
        })
    }

    fn form(name: &str, quantity: i64, unit_price: f64) -> InventoryForm {
        InventoryForm {
            name: name.to_string(),
            category: Some("consumível".to_string()),
            quantity,
            unit_price,
        }
    }

    #[test]
    fn test_rejects_blank_name() {
        assert!(validate_item_fields("  ", Some(1), Some(1.0)).is_err());
    }

    #[test]
    fn test_rejects_negative_quantity_and_price() {
        assert!(validate_item_fields("Esmalte", Some(-1), Some(1.0)).is_err());
        assert!(validate_item_fields("Esmalte", Some(1), Some(-0.5)).is_err());
        assert!(validate_item_fields("Esmalte", Some(1), Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_accepts_zero_stock() {
        assert!(validate_item_fields("Esmalte", Some(0), Some(0.0)).is_ok());
    }

    #[tokio::test]
    async fn test_create_list_delete_round_trip() {
        let state = test_state().await;

        let created = create_item(State(state.clone()), Json(form("Esmalte azul", 12, 9.5)))
            .await
            .unwrap();
        let created = created.0.data.unwrap();
        assert_eq!(created.name, "Esmalte azul");
        assert_eq!(created.quantity, 12);

        let listed = list_inventory(State(state.clone())).await.unwrap();
        assert_eq!(listed.0.data.unwrap().len(), 1);

        delete_item(State(state.clone()), Path(created.id))
            .await
            .unwrap();
        let err = delete_item(State(state), Path(created.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("inventory item")));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let state = test_state().await;

        create_item(State(state.clone()), Json(form("Algodão", 5, 2.0)))
            .await
            .unwrap();
        let err = create_item(State(state), Json(form("Algodão", 9, 3.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_import_upserts_by_name() {
        let state = test_state().await;

        create_item(State(state.clone()), Json(form("Acetona", 3, 7.0)))
            .await
            .unwrap();

        let summary = import_items(
            State(state.clone()),
            Json(vec![form("Acetona", 10, 8.0), form("Lixa", 40, 1.5)]),
        )
        .await
        .unwrap();
        assert_eq!(summary.0.data.unwrap().imported, 2);

        let items = list_inventory(State(state)).await.unwrap().0.data.unwrap();
        assert_eq!(items.len(), 2);
        let acetona = items.iter().find(|i| i.name == "Acetona").unwrap();
        assert_eq!(acetona.quantity, 10);
        assert!((acetona.unit_price - 8.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_import_rejects_bad_row_without_writing() {
        let state = test_state().await;

        let err = import_items(
            State(state.clone()),
            Json(vec![form("Lixa", 40, 1.5), form("", 1, 1.0)]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let items = list_inventory(State(state)).await.unwrap().0.data.unwrap();
        assert!(items.is_empty());
    }
}
