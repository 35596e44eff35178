use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::handlers::appointments::parse_bound;
use crate::scheduler::interval;
use crate::{error::AppError, models::*, AppState};

#[derive(Debug, Clone, sqlx::FromRow)]
struct FinanceRow {
    start_at: String,
    price: Option<f64>,
    professional_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Totals {
    pub count: u64,
    pub revenue: f64,
}

#[derive(Debug, Serialize)]
pub struct ProfessionalTotals {
    pub name: String,
    pub count: u64,
    pub revenue: f64,
}

#[derive(Debug, Serialize)]
pub struct FinanceReport {
    pub total: Totals,
    pub by_professional: Vec<ProfessionalTotals>,
    pub today: Totals,
    pub this_week: Totals,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// GET /api/reports/finance?from=&to= — revenue over appointments that
/// have already happened (start ≤ now), optionally narrowed to an
/// inclusive date range. Revenue uses the catalog price via JOIN; an
/// appointment whose service was deleted counts with zero revenue.
pub async fn finance_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FinanceQuery>,
) -> Result<Json<ApiResponse<FinanceReport>>, AppError> {
    let now = Utc::now().naive_utc();
    // Malformed bounds are a 400, same as the appointment listing.
    let from = parse_bound(query.from.as_deref())?;
    let to = parse_bound(query.to.as_deref())?;

    let mut sql = String::from(
        "SELECT a.start_at, s.price AS price, p.name AS professional_name
         FROM appointments a
         LEFT JOIN services s ON s.id = a.service_id
         LEFT JOIN professionals p ON p.id = a.professional_id
         WHERE a.start_at <= ?",
    );
    if from.is_some() {
        sql.push_str(" AND substr(a.start_at, 1, 10) >= ?");
    }
    if to.is_some() {
        sql.push_str(" AND substr(a.start_at, 1, 10) <= ?");
    }

    let mut q = sqlx::query_as::<_, FinanceRow>(&sql).bind(interval::format_stored(now));
    if let Some(from) = from {
        q = q.bind(from.format("%Y-%m-%d").to_string());
    }
    if let Some(to) = to {
        q = q.bind(to.format("%Y-%m-%d").to_string());
    }

    let rows = q.fetch_all(&state.db).await?;
    let mut report = summarize(&rows, now.date());
    report.from = from.map(|d| d.format("%Y-%m-%d").to_string());
    report.to = to.map(|d| d.format("%Y-%m-%d").to_string());

    Ok(Json(ApiResponse::success(report)))
}

/// Aggregate fetched rows into overall, per-professional, daily and
/// weekly (Monday-based) summaries.
fn summarize(rows: &[FinanceRow], today: NaiveDate) -> FinanceReport {
    let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);

    let mut total = Totals::default();
    let mut today_totals = Totals::default();
    let mut week_totals = Totals::default();
    let mut per_professional: BTreeMap<String, Totals> = BTreeMap::new();

    for row in rows {
        let revenue = row.price.unwrap_or(0.0);
        total.count += 1;
        total.revenue += revenue;

        let name = row
            .professional_name
            .clone()
            .unwrap_or_else(|| "(unknown)".to_string());
        let entry = per_professional.entry(name).or_default();
        entry.count += 1;
        entry.revenue += revenue;

        let Some(date) = interval::parse_stored(&row.start_at).map(|dt| dt.date()) else {
            continue;
        };
        if date == today {
            today_totals.count += 1;
            today_totals.revenue += revenue;
        }
        if date >= week_start && date <= today {
            week_totals.count += 1;
            week_totals.revenue += revenue;
        }
    }

    FinanceReport {
        total,
        by_professional: per_professional
            .into_iter()
            .map(|(name, totals)| ProfessionalTotals {
                name,
                count: totals.count,
                revenue: totals.revenue,
            })
            .collect(),
        today: today_totals,
        this_week: week_totals,
        from: None,
        to: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(start: &str, price: f64, professional: &str) -> FinanceRow {
        FinanceRow {
            start_at: start.to_string(),
            price: Some(price),
            professional_name: Some(professional.to_string()),
        }
    }

    // 2026-03-04 is a Wednesday; its week starts Monday 2026-03-02.
    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 4).unwrap()
    }

    #[test]
    fn test_empty_rows_zero_report() {
        let report = summarize(&[], today());
        assert_eq!(report.total, Totals::default());
        assert!(report.by_professional.is_empty());
    }

    #[test]
    fn test_overall_and_per_professional_totals() {
        let rows = vec![
            row("2026-03-04 10:00", 50.0, "Carla"),
            row("2026-03-04 11:00", 80.0, "Carla"),
            row("2026-03-03 09:00", 40.0, "Duda"),
        ];
        let report = summarize(&rows, today());

        assert_eq!(report.total.count, 3);
        assert!((report.total.revenue - 170.0).abs() < 1e-9);

        assert_eq!(report.by_professional.len(), 2);
        let carla = &report.by_professional[0];
        assert_eq!(carla.name, "Carla");
        assert_eq!(carla.count, 2);
        assert!((carla.revenue - 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_counts_only_today() {
        let rows = vec![
            row("2026-03-04 10:00", 50.0, "Carla"),
            row("2026-03-03 10:00", 80.0, "Carla"),
        ];
        let report = summarize(&rows, today());
        assert_eq!(report.today.count, 1);
        assert!((report.today.revenue - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_weekly_starts_monday() {
        let rows = vec![
            row("2026-03-02 10:00", 50.0, "Carla"), // Monday — in week
            row("2026-03-01 10:00", 80.0, "Carla"), // Sunday — previous week
            row("2026-03-04 10:00", 40.0, "Duda"),  // today — in week
        ];
        let report = summarize(&rows, today());
        assert_eq!(report.this_week.count, 2);
        assert!((report.this_week.revenue - 90.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_malformed_date_filter_is_rejected() {
        use crate::scheduler::Scheduler;
        use axum::extract::{Query, State};
        use sqlx::sqlite::SqlitePoolOptions;
        use std::sync::Arc;
        use std::time::Instant;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        crate::db::run_migrations(&pool).await.expect("migrations");
        let state = Arc::new(crate::AppState {
            db: pool.clone(),
            scheduler: Scheduler::new(pool),
            mp_access_token: String::new(),
            started_at: Instant::now(),
        });

        let result = finance_summary(
            State(state),
            Query(FinanceQuery {
                from: Some("March 1st".into()),
                to: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_dangling_service_counts_zero_revenue() {
        let rows = vec![FinanceRow {
            start_at: "2026-03-04 10:00".into(),
            price: None,
            professional_name: None,
        }];
        let report = summarize(&rows, today());
        assert_eq!(report.total.count, 1);
        assert_eq!(report.total.revenue, 0.0);
        assert_eq!(report.by_professional[0].name, "(unknown)");
    }
}
