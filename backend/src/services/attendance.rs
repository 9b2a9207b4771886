//! Attendance state machine
//!
//! One record per (employee, logical date). Transitions:
//! `Absent → PunchedIn → Completed`, with a carry-forward that lets a
//! punch-out close the previous day's still-open record after a night
//! shift. Row creation relies on the `(emp_id, att_date)` unique key; the
//! conditional UPDATEs serialise concurrent punches without an application
//! lock.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{AttendanceRow, AttendanceState, EmployeeRow, ATTENDANCE_COLUMNS};

/// The calendar date an instant is attributed to.
///
/// The instant is read in the attendance timezone; local hours strictly
/// before the rollover hour belong to the previous day, so a punch-out at
/// 03:45 still closes the night shift that started the evening before.
pub fn logical_date(now: DateTime<Utc>, tz: Tz, rollover_hour: u32) -> NaiveDate {
    let local = now.with_timezone(&tz);
    let date = local.date_naive();
    if local.hour() < rollover_hour {
        date.pred_opt().unwrap_or(date)
    } else {
        date
    }
}

/// Geo, image, and audit details stamped onto a punch
#[derive(Debug, Default, Clone)]
pub struct PunchContext {
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub address: Option<String>,
    pub image_ref: Option<String>,
    /// Requesting user id; stored only when it resolves to a user row
    pub actor: Option<i64>,
}

/// Attendance state machine service
#[derive(Clone)]
pub struct AttendanceService {
    db: PgPool,
    tz: Tz,
    rollover_hour: u32,
}

impl AttendanceService {
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            tz: config.attendance.tz(),
            rollover_hour: config.attendance.rollover_hour,
        }
    }

    /// Today's logical date
    pub fn today(&self) -> NaiveDate {
        logical_date(Utc::now(), self.tz, self.rollover_hour)
    }

    pub async fn find_employee(&self, emp_id: i64) -> AppResult<EmployeeRow> {
        sqlx::query_as::<_, EmployeeRow>(
            r#"
            SELECT emp_id, emp_code, name, phone, ward_id, designation_id,
                   face_image_ref, face_id, face_confidence
            FROM employees
            WHERE emp_id = $1
            "#,
        )
        .bind(emp_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee".to_string()))
    }

    pub async fn find_employee_by_code(&self, emp_code: &str) -> AppResult<EmployeeRow> {
        sqlx::query_as::<_, EmployeeRow>(
            r#"
            SELECT emp_id, emp_code, name, phone, ward_id, designation_id,
                   face_image_ref, face_id, face_confidence
            FROM employees
            WHERE emp_code = $1
            "#,
        )
        .bind(emp_code)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee".to_string()))
    }

    pub async fn find_employee_by_face_id(&self, face_id: &str) -> AppResult<Option<EmployeeRow>> {
        let row = sqlx::query_as::<_, EmployeeRow>(
            r#"
            SELECT emp_id, emp_code, name, phone, ward_id, designation_id,
                   face_image_ref, face_id, face_confidence
            FROM employees
            WHERE face_id = $1
            "#,
        )
        .bind(face_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    pub async fn get_record(&self, attendance_id: i64) -> AppResult<AttendanceRow> {
        let sql = format!(
            "SELECT {} FROM attendance WHERE attendance_id = $1",
            ATTENDANCE_COLUMNS
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(attendance_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Attendance record".to_string()))
    }

    async fn record_for_date(
        &self,
        emp_id: i64,
        date: NaiveDate,
    ) -> AppResult<Option<AttendanceRow>> {
        let sql = format!(
            "SELECT {} FROM attendance WHERE emp_id = $1 AND att_date = $2",
            ATTENDANCE_COLUMNS
        );
        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(emp_id)
            .bind(date)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    /// Most recent still-open record in `[date - 1, date]`, for the
    /// carry-forward punch-out path
    async fn open_record_near(
        &self,
        emp_id: i64,
        date: NaiveDate,
    ) -> AppResult<Option<AttendanceRow>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM attendance
            WHERE emp_id = $1
              AND att_date BETWEEN $2 AND $3
              AND punch_in_time IS NOT NULL
              AND punch_out_time IS NULL
            ORDER BY att_date DESC
            LIMIT 1
            "#,
            ATTENDANCE_COLUMNS
        );
        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(emp_id)
            .bind(date - Duration::days(1))
            .bind(date)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    /// Idempotently create today's record, stamping the employee's current
    /// ward for reporting lineage. Returns `(row, created)`.
    pub async fn get_or_create(&self, employee: &EmployeeRow) -> AppResult<(AttendanceRow, bool)> {
        let date = self.today();

        let sql = format!(
            r#"
            INSERT INTO attendance (emp_id, att_date, ward_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (emp_id, att_date) DO NOTHING
            RETURNING {}
            "#,
            ATTENDANCE_COLUMNS
        );
        let inserted = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(employee.emp_id)
            .bind(date)
            .bind(employee.ward_id)
            .fetch_optional(&self.db)
            .await?;

        match inserted {
            Some(row) => Ok((row, true)),
            None => {
                let existing = self
                    .record_for_date(employee.emp_id, date)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal("attendance row vanished after conflict".to_string())
                    })?;
                Ok((existing, false))
            }
        }
    }

    /// Validate that a punch is currently possible without mutating anything.
    /// Group mode uses this to mark ineligible faces as skipped.
    pub async fn precheck(&self, emp_id: i64, punch_type: shared::PunchType) -> AppResult<()> {
        let date = self.today();
        let row = self.record_for_date(emp_id, date).await?;

        match punch_type {
            shared::PunchType::In => match row.as_ref().map(AttendanceRow::state) {
                None | Some(AttendanceState::Absent) => Ok(()),
                Some(AttendanceState::PunchedIn) | Some(AttendanceState::Completed) => Err(
                    AppError::InvalidTransition("Already punched in".to_string()),
                ),
            },
            shared::PunchType::Out => {
                let open = match row {
                    Some(ref r) if r.state() == AttendanceState::PunchedIn => Some(r.clone()),
                    Some(ref r) if r.state() == AttendanceState::Completed => {
                        return Err(AppError::InvalidTransition(
                            "Already punched out".to_string(),
                        ))
                    }
                    _ => self.open_record_near(emp_id, date).await?,
                };
                open.map(|_| ()).ok_or_else(|| {
                    AppError::InvalidTransition("Must punch in first".to_string())
                })
            }
        }
    }

    /// Execute a punch transition and return the updated row
    pub async fn punch(
        &self,
        employee: &EmployeeRow,
        punch_type: shared::PunchType,
        ctx: PunchContext,
    ) -> AppResult<AttendanceRow> {
        match punch_type {
            shared::PunchType::In => self.punch_in(employee, ctx).await,
            shared::PunchType::Out => self.punch_out(employee, ctx).await,
        }
    }

    async fn punch_in(&self, employee: &EmployeeRow, ctx: PunchContext) -> AppResult<AttendanceRow> {
        let date = self.today();

        if let Some(existing) = self.record_for_date(employee.emp_id, date).await? {
            if existing.state() != AttendanceState::Absent {
                return Err(AppError::InvalidTransition(
                    "Already punched in".to_string(),
                ));
            }
        }

        let (row, _) = self.get_or_create(employee).await?;
        let actor = self.resolve_actor(ctx.actor).await?;

        let sql = format!(
            r#"
            UPDATE attendance
            SET punch_in_time = NOW(),
                latitude_in = $1,
                longitude_in = $2,
                in_address = $3,
                punch_in_image_ref = $4,
                punched_in_by = $5
            WHERE attendance_id = $6 AND punch_in_time IS NULL
            RETURNING {}
            "#,
            ATTENDANCE_COLUMNS
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(ctx.latitude)
            .bind(ctx.longitude)
            .bind(&ctx.address)
            .bind(&ctx.image_ref)
            .bind(actor)
            .bind(row.attendance_id)
            .fetch_optional(&self.db)
            .await?
            // A concurrent punch claimed the row between the read and the update
            .ok_or_else(|| AppError::InvalidTransition("Already punched in".to_string()))
    }

    async fn punch_out(&self, employee: &EmployeeRow, ctx: PunchContext) -> AppResult<AttendanceRow> {
        let date = self.today();

        let target = match self.record_for_date(employee.emp_id, date).await? {
            Some(row) if row.state() == AttendanceState::PunchedIn => row,
            Some(row) if row.state() == AttendanceState::Completed => {
                return Err(AppError::InvalidTransition(
                    "Already punched out".to_string(),
                ))
            }
            _ => self
                .open_record_near(employee.emp_id, date)
                .await?
                .ok_or_else(|| {
                    AppError::InvalidTransition("Must punch in first".to_string())
                })?,
        };

        let actor = self.resolve_actor(ctx.actor).await?;

        let sql = format!(
            r#"
            UPDATE attendance
            SET punch_out_time = NOW(),
                latitude_out = $1,
                longitude_out = $2,
                out_address = $3,
                punch_out_image_ref = $4,
                punched_out_by = $5,
                duration_minutes = (EXTRACT(EPOCH FROM (NOW() - punch_in_time)) / 60)::BIGINT
            WHERE attendance_id = $6
              AND punch_in_time IS NOT NULL
              AND punch_out_time IS NULL
            RETURNING {}
            "#,
            ATTENDANCE_COLUMNS
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(ctx.latitude)
            .bind(ctx.longitude)
            .bind(&ctx.address)
            .bind(&ctx.image_ref)
            .bind(actor)
            .bind(target.attendance_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::InvalidTransition("Already punched out".to_string()))
    }

    /// Audit actors are stored only when the id resolves to a user row;
    /// a dangling id is logged so supervisor misconfiguration is visible.
    async fn resolve_actor(&self, actor: Option<i64>) -> AppResult<Option<i64>> {
        let Some(actor_id) = actor else {
            return Ok(None);
        };

        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = $1")
            .bind(actor_id)
            .fetch_one(&self.db)
            .await?;

        if exists == 0 {
            tracing::warn!(actor_id, "punch actor does not resolve to a user, storing NULL");
            return Ok(None);
        }
        Ok(Some(actor_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const KOLKATA: Tz = chrono_tz::Asia::Kolkata;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        KOLKATA
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_daytime_punch_keeps_calendar_date() {
        let date = logical_date(at(2023, 6, 15, 9, 30), KOLKATA, 4);
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
    }

    #[test]
    fn test_before_rollover_attributes_previous_day() {
        let date = logical_date(at(2023, 6, 15, 3, 45), KOLKATA, 4);
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 6, 14).unwrap());
    }

    #[test]
    fn test_exact_rollover_hour_is_new_day() {
        let date = logical_date(at(2023, 6, 15, 4, 0), KOLKATA, 4);
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
    }

    #[test]
    fn test_second_before_rollover_is_previous_day() {
        let instant = KOLKATA
            .with_ymd_and_hms(2023, 6, 15, 3, 59, 59)
            .unwrap()
            .with_timezone(&Utc);
        let date = logical_date(instant, KOLKATA, 4);
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 6, 14).unwrap());
    }

    #[test]
    fn test_zero_rollover_disables_lookback() {
        let date = logical_date(at(2023, 6, 15, 0, 1), KOLKATA, 0);
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
    }

    #[test]
    fn test_logical_date_is_timezone_sensitive() {
        // 23:30 UTC on the 14th is 05:00 IST on the 15th
        let instant = Utc.with_ymd_and_hms(2023, 6, 14, 23, 30, 0).unwrap();
        let date = logical_date(instant, KOLKATA, 4);
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
    }

    #[test]
    fn test_logical_date_idempotent_at_instant() {
        let instant = at(2023, 6, 15, 3, 59);
        assert_eq!(
            logical_date(instant, KOLKATA, 4),
            logical_date(instant, KOLKATA, 4)
        );
    }
}
