//! Appointment scheduling core: interval computation, conflict detection
//! and the only mutation path into the appointments table.

pub mod interval;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use dashmap::DashMap;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::{AppointmentDetail, AppointmentForm};
use interval::Interval;

/// Shared SELECT for appointment detail rows. LEFT JOINs so a dangling
/// reference shows up as a null name instead of dropping the row.
const DETAIL_SELECT: &str = "SELECT a.id, a.client_id, c.name AS client_name,
            a.professional_id, p.name AS professional_name,
            a.service_id, s.name AS service_name, s.price AS service_price,
            a.start_at, a.end_at, a.notes, a.created_at
     FROM appointments a
     LEFT JOIN clients c ON c.id = a.client_id
     LEFT JOIN professionals p ON p.id = a.professional_id
     LEFT JOIN services s ON s.id = a.service_id";

/// A scheduling request after boundary validation: ids resolved to
/// integers and the instant parsed to minute precision.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub client_id: i64,
    pub professional_id: i64,
    pub service_id: i64,
    pub start: NaiveDateTime,
    pub notes: String,
}

impl ScheduleRequest {
    /// Validate a raw form once at the boundary. Bad date/time formats
    /// are rejected here so the scheduler only ever sees decoded values.
    pub fn from_form(form: AppointmentForm) -> Result<Self, AppError> {
        let date = NaiveDate::parse_from_str(form.date.trim(), "%Y-%m-%d");
        let time = NaiveTime::parse_from_str(form.time.trim(), "%H:%M");
        let (date, time) = match (date, time) {
            (Ok(d), Ok(t)) => (d, t),
            _ => {
                return Err(AppError::Validation(
                    "bad date/time format: expected date YYYY-MM-DD and time HH:MM".into(),
                ))
            }
        };

        Ok(Self {
            client_id: form.client_id,
            professional_id: form.professional_id,
            service_id: form.service_id,
            start: NaiveDateTime::new(date, time),
            notes: form.notes.unwrap_or_default(),
        })
    }
}

/// Optional filters for `list`.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub professional_id: Option<i64>,
    /// Inclusive date bounds (YYYY-MM-DD) on the start instant.
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// The scheduler owns all appointment mutations. Conflict check and
/// write happen under a per-professional async lock plus a transaction,
/// so two concurrent creates for the same professional serialize and
/// readers never observe a half-committed appointment. Different
/// professionals proceed in parallel.
pub struct Scheduler {
    db: SqlitePool,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl Scheduler {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            locks: DashMap::new(),
        }
    }

    fn professional_lock(&self, professional_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(professional_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a new appointment, rejecting any overlap with the same
    /// professional's existing appointments.
    pub async fn create(&self, req: ScheduleRequest) -> Result<AppointmentDetail, AppError> {
        let lock = self.professional_lock(req.professional_id);
        let _guard = lock.lock().await;

        let mut tx = self.db.begin().await?;
        let window = self.validate_and_check(&mut tx, &req, None).await?;

        let id = sqlx::query(
            "INSERT INTO appointments
                (client_id, professional_id, service_id, start_at, end_at, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(req.client_id)
        .bind(req.professional_id)
        .bind(req.service_id)
        .bind(interval::format_stored(window.start))
        .bind(interval::format_stored(window.end))
        .bind(&req.notes)
        .bind(now_stamp())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        // Read the joined row back inside the transaction; once the lock
        // is released a concurrent delete could remove it.
        let detail = detail_in_tx(&mut tx, id).await?;
        tx.commit().await?;
        drop(_guard);

        tracing::info!(
            "created appointment {} for professional {} at {}",
            id,
            req.professional_id,
            req.start
        );
        Ok(detail)
    }

    /// Edit an existing appointment. The conflict scan excludes the
    /// appointment itself and runs against the *new* professional and
    /// interval, since any of client, professional, service and start
    /// may change in one edit.
    pub async fn edit(
        &self,
        id: i64,
        req: ScheduleRequest,
    ) -> Result<AppointmentDetail, AppError> {
        // Only the target professional's schedule can gain an interval;
        // the old professional's set only shrinks, which cannot break
        // the invariant, so locking the target is enough.
        let lock = self.professional_lock(req.professional_id);
        let _guard = lock.lock().await;

        let mut tx = self.db.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM appointments WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(AppError::NotFound("appointment"));
        }

        let window = self.validate_and_check(&mut tx, &req, Some(id)).await?;

        sqlx::query(
            "UPDATE appointments
             SET client_id = ?, professional_id = ?, service_id = ?,
                 start_at = ?, end_at = ?, notes = ?
             WHERE id = ?",
        )
        .bind(req.client_id)
        .bind(req.professional_id)
        .bind(req.service_id)
        .bind(interval::format_stored(window.start))
        .bind(interval::format_stored(window.end))
        .bind(&req.notes)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let detail = detail_in_tx(&mut tx, id).await?;
        tx.commit().await?;
        drop(_guard);

        Ok(detail)
    }

    /// Unconditional removal; no invariant to re-check.
    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("appointment"));
        }
        Ok(())
    }

    /// List appointments ascending by start instant, optionally filtered
    /// by professional and an inclusive date range. Re-queries current
    /// state on every call.
    pub async fn list(
        &self,
        filter: AppointmentFilter,
    ) -> Result<Vec<AppointmentDetail>, AppError> {
        let mut sql = String::from(DETAIL_SELECT);
        let mut conditions: Vec<&str> = Vec::new();
        if filter.professional_id.is_some() {
            conditions.push("a.professional_id = ?");
        }
        if filter.from.is_some() {
            // The stored format sorts lexicographically; the first ten
            // chars are the date.
            conditions.push("substr(a.start_at, 1, 10) >= ?");
        }
        if filter.to.is_some() {
            conditions.push("substr(a.start_at, 1, 10) <= ?");
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY a.start_at ASC");

        let mut query = sqlx::query_as::<_, AppointmentDetail>(&sql);
        if let Some(pid) = filter.professional_id {
            query = query.bind(pid);
        }
        if let Some(from) = filter.from {
            query = query.bind(from.format("%Y-%m-%d").to_string());
        }
        if let Some(to) = filter.to {
            query = query.bind(to.format("%Y-%m-%d").to_string());
        }

        Ok(query.fetch_all(&self.db).await?)
    }

    /// Fetch one appointment with joined names.
    pub async fn detail(&self, id: i64) -> Result<AppointmentDetail, AppError> {
        let sql = format!("{} WHERE a.id = ?", DETAIL_SELECT);
        sqlx::query_as::<_, AppointmentDetail>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound("appointment"))
    }

    /// Resolve references, compute the requested interval from the
    /// service duration in effect right now, and scan the professional's
    /// other appointments for overlap. `exclude` skips the appointment
    /// being edited so it cannot conflict with itself.
    async fn validate_and_check(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        req: &ScheduleRequest,
        exclude: Option<i64>,
    ) -> Result<Interval, AppError> {
        let duration_min: i64 =
            sqlx::query_scalar("SELECT duration_min FROM services WHERE id = ?")
                .bind(req.service_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| {
                    AppError::Validation(format!("unknown service reference: {}", req.service_id))
                })?;

        // The schema only enforces a lower bound, so clamp here too:
        // interval arithmetic must never see an out-of-range duration.
        if !(1..=interval::MAX_DURATION_MIN).contains(&duration_min) {
            return Err(AppError::Validation(format!(
                "service {} has an out-of-range duration ({} min)",
                req.service_id, duration_min
            )));
        }

        let client_ok: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM clients WHERE id = ?")
            .bind(req.client_id)
            .fetch_one(&mut **tx)
            .await?;
        if !client_ok {
            return Err(AppError::Validation(format!(
                "unknown client reference: {}",
                req.client_id
            )));
        }

        let professional_ok: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM professionals WHERE id = ?")
                .bind(req.professional_id)
                .fetch_one(&mut **tx)
                .await?;
        if !professional_ok {
            return Err(AppError::Validation(format!(
                "unknown professional reference: {}",
                req.professional_id
            )));
        }

        let requested = Interval::from_start(req.start, duration_min);

        // Appointment ids start at 1, so -1 never matches.
        let existing: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT id, start_at, end_at FROM appointments
             WHERE professional_id = ? AND id != ?",
        )
        .bind(req.professional_id)
        .bind(exclude.unwrap_or(-1))
        .fetch_all(&mut **tx)
        .await?;

        for (other_id, start_at, end_at) in existing {
            let (Some(start), Some(end)) =
                (interval::parse_stored(&start_at), interval::parse_stored(&end_at))
            else {
                tracing::warn!("appointment {} has unparsable stored times", other_id);
                continue;
            };
            let other = Interval { start, end };
            if requested.overlaps(&other) {
                return Err(AppError::Conflict {
                    id: other_id,
                    professional_id: req.professional_id,
                    start: start_at,
                    end: end_at,
                });
            }
        }

        Ok(requested)
    }
}

async fn detail_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
) -> Result<AppointmentDetail, AppError> {
    let sql = format!("{} WHERE a.id = ?", DETAIL_SELECT);
    sqlx::query_as::<_, AppointmentDetail>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::NotFound("appointment"))
}

fn now_stamp() -> String {
    Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Tests ──
