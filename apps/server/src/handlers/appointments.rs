use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use std::sync::Arc;

use crate::scheduler::{AppointmentFilter, ScheduleRequest};
use crate::{error::AppError, models::*, AppState};

/// GET /api/appointments?professional_id=&from=&to= — ascending by start.
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<ApiResponse<Vec<AppointmentDetail>>>, AppError> {
    let filter = AppointmentFilter {
        professional_id: query.professional_id,
        from: parse_bound(query.from.as_deref())?,
        to: parse_bound(query.to.as_deref())?,
    };

    let appointments = state.scheduler.list(filter).await?;
    Ok(Json(ApiResponse::success(appointments)))
}

/// GET /api/appointments/:id — one appointment with joined names.
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<AppointmentDetail>>, AppError> {
    let appointment = state.scheduler.detail(id).await?;
    Ok(Json(ApiResponse::success(appointment)))
}

/// POST /api/appointments — schedule, rejecting overlaps.
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AppointmentForm>,
) -> Result<Json<ApiResponse<AppointmentDetail>>, AppError> {
    let request = ScheduleRequest::from_form(body)?;
    let appointment = state.scheduler.create(request).await?;
    Ok(Json(ApiResponse::success(appointment)))
}

/// PUT /api/appointments/:id — reschedule; re-validates the overlap
/// invariant against the new professional and interval, excluding the
/// appointment itself.
pub async fn update_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<AppointmentForm>,
) -> Result<Json<ApiResponse<AppointmentDetail>>, AppError> {
    let request = ScheduleRequest::from_form(body)?;
    let appointment = state.scheduler.edit(id, request).await?;
    Ok(Json(ApiResponse::success(appointment)))
}

/// DELETE /api/appointments/:id.
pub async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, AppError> {
    state.scheduler.delete(id).await?;
    Ok(Json(ApiResponse::success("appointment deleted")))
}

/// Parse an optional YYYY-MM-DD filter bound. Shared with the finance
/// report, which takes the same date-range parameters.
pub(crate) fn parse_bound(raw: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match raw {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                AppError::Validation(format!("bad date filter '{}': expected YYYY-MM-DD", s))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bound_accepts_date() {
        let parsed = parse_bound(Some("2026-03-01")).unwrap();
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2026, 3, 1));
    }

    #[test]
    fn test_parse_bound_none_passes_through() {
        assert_eq!(parse_bound(None).unwrap(), None);
    }

    #[test]
    fn test_parse_bound_rejects_garbage() {
        assert!(parse_bound(Some("March 1st")).is_err());
        assert!(parse_bound(Some("2026-13-40")).is_err());
    }
}
