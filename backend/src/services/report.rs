//! Attendance report engine
//!
//! Composes a grouping projection, a parameterised filter clause, the
//! location expression, and the caller's city-scope injection into one
//! query, then renders rows as JSON or RFC-4180 CSV. Every filter value is
//! a bound parameter; the only interpolated fragments are the static
//! grouping templates below.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::models::CityScope;
use shared::types::LocationType;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::{AppError, AppResult};

/// Base FROM for attendance-rooted groupings
const BASE_FROM: &str = "FROM attendance a
JOIN employees e ON e.emp_id = a.emp_id
LEFT JOIN wards w ON w.id = a.ward_id
LEFT JOIN zones z ON z.id = w.zone_id
LEFT JOIN cities c ON c.id = z.city_id";

/// FROM with supervisor edges for the supervisor grouping
const SUPERVISOR_FROM: &str = "FROM attendance a
JOIN employees e ON e.emp_id = a.emp_id
LEFT JOIN wards w ON w.id = a.ward_id
LEFT JOIN zones z ON z.id = w.zone_id
LEFT JOIN cities c ON c.id = z.city_id
LEFT JOIN supervisor_wards sw ON sw.ward_id = w.id
LEFT JOIN users s ON s.id = sw.supervisor_id";

/// Ward-rooted FROM for the per-ward roll-up
const WARD_SUMMARY_FROM: &str = "FROM wards w
JOIN zones z ON z.id = w.zone_id
JOIN cities c ON c.id = z.city_id
LEFT JOIN employees e ON e.ward_id = w.id
LEFT JOIN attendance a ON a.emp_id = e.emp_id";

/// Supervisor-rooted FROM; attendance is pinned to yesterday in DB time
const SUPERVISOR_SUMMARY_FROM: &str = "FROM supervisor_wards sw
JOIN users s ON s.id = sw.supervisor_id
JOIN wards w ON w.id = sw.ward_id
JOIN zones z ON z.id = w.zone_id
JOIN cities c ON c.id = z.city_id
LEFT JOIN employees e ON e.ward_id = w.id
LEFT JOIN attendance a ON a.emp_id = e.emp_id AND a.att_date = CURRENT_DATE - 1";

/// Report grouping variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Detail,
    Zone,
    Ward,
    City,
    Supervisor,
    Location,
    WardSummary,
    SupervisorSummary,
}

impl GroupBy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "detail" => Some(GroupBy::Detail),
            "zone" => Some(GroupBy::Zone),
            "ward" => Some(GroupBy::Ward),
            "city" => Some(GroupBy::City),
            "supervisor" => Some(GroupBy::Supervisor),
            "location" => Some(GroupBy::Location),
            "ward_summary" => Some(GroupBy::WardSummary),
            "supervisor_summary" => Some(GroupBy::SupervisorSummary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Detail => "detail",
            GroupBy::Zone => "zone",
            GroupBy::Ward => "ward",
            GroupBy::City => "city",
            GroupBy::Supervisor => "supervisor",
            GroupBy::Location => "location",
            GroupBy::WardSummary => "ward_summary",
            GroupBy::SupervisorSummary => "supervisor_summary",
        }
    }
}

/// How a projected column decodes and renders
#[derive(Debug, Clone, Copy)]
pub enum ColKind {
    BigInt,
    Text,
    Date,
    Timestamp,
}

/// One projected column: CSV header, SQL alias, decode kind
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub header: &'static str,
    pub field: &'static str,
    pub kind: ColKind,
}

const fn col(header: &'static str, field: &'static str, kind: ColKind) -> ColumnSpec {
    ColumnSpec {
        header,
        field,
        kind,
    }
}

/// Static description of one grouping. `{loc}` in the select/group
/// templates is replaced with the location expression.
struct GroupingSpec {
    select: &'static str,
    from: &'static str,
    group_by: Option<&'static str>,
    order_by: &'static str,
    columns: &'static [ColumnSpec],
    /// Whether the supervisor alias `s` is available for direct filters
    has_supervisor_alias: bool,
    supports_absentees: bool,
}

const DETAIL_COLUMNS: &[ColumnSpec] = &[
    col("Attendance ID", "attendance_id", ColKind::BigInt),
    col("Employee Code", "emp_code", ColKind::Text),
    col("Employee Name", "employee_name", ColKind::Text),
    col("Ward", "ward_name", ColKind::Text),
    col("Zone", "zone_name", ColKind::Text),
    col("City", "city_name", ColKind::Text),
    col("City ID", "city_id", ColKind::BigInt),
    col("Date", "att_date", ColKind::Date),
    col("Punch In", "punch_in_time", ColKind::Timestamp),
    col("Punch Out", "punch_out_time", ColKind::Timestamp),
    col("Duration (min)", "duration_minutes", ColKind::BigInt),
    col("Location", "location", ColKind::Text),
];

const ZONE_COLUMNS: &[ColumnSpec] = &[
    col("Zone ID", "zone_id", ColKind::BigInt),
    col("Zone", "zone_name", ColKind::Text),
    col("City ID", "city_id", ColKind::BigInt),
    col("City", "city_name", ColKind::Text),
    col("Present", "present", ColKind::BigInt),
    col("Completed", "completed", ColKind::BigInt),
    col("Records", "total_records", ColKind::BigInt),
];

const WARD_COLUMNS: &[ColumnSpec] = &[
    col("Ward ID", "ward_id", ColKind::BigInt),
    col("Ward", "ward_name", ColKind::Text),
    col("Zone", "zone_name", ColKind::Text),
    col("City ID", "city_id", ColKind::BigInt),
    col("City", "city_name", ColKind::Text),
    col("Present", "present", ColKind::BigInt),
    col("Completed", "completed", ColKind::BigInt),
    col("Records", "total_records", ColKind::BigInt),
];

const CITY_COLUMNS: &[ColumnSpec] = &[
    col("City ID", "city_id", ColKind::BigInt),
    col("City", "city_name", ColKind::Text),
    col("Present", "present", ColKind::BigInt),
    col("Completed", "completed", ColKind::BigInt),
    col("Records", "total_records", ColKind::BigInt),
];

const SUPERVISOR_COLUMNS: &[ColumnSpec] = &[
    col("Supervisor ID", "supervisor_id", ColKind::BigInt),
    col("Supervisor", "supervisor_name", ColKind::Text),
    col("City ID", "city_id", ColKind::BigInt),
    col("City", "city_name", ColKind::Text),
    col("Wards Covered", "wards_covered", ColKind::BigInt),
    col("Present", "present", ColKind::BigInt),
    col("Completed", "completed", ColKind::BigInt),
];

const LOCATION_COLUMNS: &[ColumnSpec] = &[
    col("Location", "location", ColKind::Text),
    col("Present", "present", ColKind::BigInt),
    col("Completed", "completed", ColKind::BigInt),
    col("Records", "total_records", ColKind::BigInt),
];

const WARD_SUMMARY_COLUMNS: &[ColumnSpec] = &[
    col("Ward ID", "ward_id", ColKind::BigInt),
    col("Ward", "ward_name", ColKind::Text),
    col("Zone", "zone_name", ColKind::Text),
    col("City ID", "city_id", ColKind::BigInt),
    col("City", "city_name", ColKind::Text),
    col("Registered", "total_employees", ColKind::BigInt),
    col("Present", "present", ColKind::BigInt),
];

const SUPERVISOR_SUMMARY_COLUMNS: &[ColumnSpec] = &[
    col("Supervisor ID", "supervisor_id", ColKind::BigInt),
    col("Supervisor", "supervisor_name", ColKind::Text),
    col("Wards Assigned", "wards_assigned", ColKind::BigInt),
    col("Registered", "total_employees", ColKind::BigInt),
    col("Present Yesterday", "present_yesterday", ColKind::BigInt),
];

fn grouping_spec(group_by: GroupBy) -> GroupingSpec {
    match group_by {
        GroupBy::Detail => GroupingSpec {
            select: "SELECT a.attendance_id, e.emp_code, e.name AS employee_name, \
                w.name AS ward_name, z.name AS zone_name, c.name AS city_name, \
                c.id AS city_id, a.att_date, a.punch_in_time, a.punch_out_time, \
                a.duration_minutes, {loc} AS location",
            from: BASE_FROM,
            group_by: None,
            order_by: "ORDER BY a.att_date DESC, e.emp_code ASC",
            columns: DETAIL_COLUMNS,
            has_supervisor_alias: false,
            supports_absentees: false,
        },
        GroupBy::Zone => GroupingSpec {
            select: "SELECT z.id AS zone_id, z.name AS zone_name, c.id AS city_id, \
                c.name AS city_name, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_in_time IS NOT NULL) AS present, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_out_time IS NOT NULL) AS completed, \
                COUNT(*) AS total_records",
            from: BASE_FROM,
            group_by: Some("GROUP BY z.id, z.name, c.id, c.name"),
            order_by: "ORDER BY c.name, z.name",
            columns: ZONE_COLUMNS,
            has_supervisor_alias: false,
            supports_absentees: false,
        },
        GroupBy::Ward => GroupingSpec {
            select: "SELECT w.id AS ward_id, w.name AS ward_name, z.name AS zone_name, \
                c.id AS city_id, c.name AS city_name, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_in_time IS NOT NULL) AS present, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_out_time IS NOT NULL) AS completed, \
                COUNT(*) AS total_records",
            from: BASE_FROM,
            group_by: Some("GROUP BY w.id, w.name, z.name, c.id, c.name"),
            order_by: "ORDER BY c.name, z.name, w.name",
            columns: WARD_COLUMNS,
            has_supervisor_alias: false,
            supports_absentees: false,
        },
        GroupBy::City => GroupingSpec {
            select: "SELECT c.id AS city_id, c.name AS city_name, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_in_time IS NOT NULL) AS present, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_out_time IS NOT NULL) AS completed, \
                COUNT(*) AS total_records",
            from: BASE_FROM,
            group_by: Some("GROUP BY c.id, c.name"),
            order_by: "ORDER BY c.name",
            columns: CITY_COLUMNS,
            has_supervisor_alias: false,
            supports_absentees: false,
        },
        GroupBy::Supervisor => GroupingSpec {
            select: "SELECT s.id AS supervisor_id, s.name AS supervisor_name, \
                c.id AS city_id, c.name AS city_name, \
                COUNT(DISTINCT w.id) AS wards_covered, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_in_time IS NOT NULL) AS present, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_out_time IS NOT NULL) AS completed",
            from: SUPERVISOR_FROM,
            group_by: Some("GROUP BY s.id, s.name, c.id, c.name"),
            order_by: "ORDER BY s.name NULLS LAST, c.name",
            columns: SUPERVISOR_COLUMNS,
            has_supervisor_alias: true,
            supports_absentees: false,
        },
        GroupBy::Location => GroupingSpec {
            select: "SELECT {loc} AS location, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_in_time IS NOT NULL) AS present, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_out_time IS NOT NULL) AS completed, \
                COUNT(*) AS total_records",
            from: BASE_FROM,
            group_by: Some("GROUP BY {loc}"),
            order_by: "ORDER BY total_records DESC",
            columns: LOCATION_COLUMNS,
            has_supervisor_alias: false,
            supports_absentees: false,
        },
        GroupBy::WardSummary => GroupingSpec {
            select: "SELECT w.id AS ward_id, w.name AS ward_name, z.name AS zone_name, \
                c.id AS city_id, c.name AS city_name, \
                COUNT(DISTINCT e.emp_id) AS total_employees, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_in_time IS NOT NULL) AS present",
            from: WARD_SUMMARY_FROM,
            group_by: Some("GROUP BY w.id, w.name, z.name, c.id, c.name"),
            order_by: "ORDER BY c.name, z.name, w.name",
            columns: WARD_SUMMARY_COLUMNS,
            has_supervisor_alias: false,
            supports_absentees: false,
        },
        GroupBy::SupervisorSummary => GroupingSpec {
            select: "SELECT s.id AS supervisor_id, s.name AS supervisor_name, \
                COUNT(DISTINCT w.id) AS wards_assigned, \
                COUNT(DISTINCT e.emp_id) AS total_employees, \
                COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_in_time IS NOT NULL) AS present_yesterday",
            from: SUPERVISOR_SUMMARY_FROM,
            group_by: Some("GROUP BY s.id, s.name"),
            order_by: "ORDER BY s.name",
            columns: SUPERVISOR_SUMMARY_COLUMNS,
            has_supervisor_alias: true,
            supports_absentees: true,
        },
    }
}

/// Location expression for the requested address side; whitespace-only
/// values read as NULL
pub fn location_expr(location_type: LocationType) -> &'static str {
    match location_type {
        LocationType::In => "NULLIF(TRIM(a.in_address), '')",
        LocationType::Out => "NULLIF(TRIM(a.out_address), '')",
        LocationType::Both => {
            "COALESCE(NULLIF(TRIM(a.in_address), ''), NULLIF(TRIM(a.out_address), ''), 'Unknown Location')"
        }
    }
}

/// Report filter parameters; all optional, all bound
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ReportFilters {
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub zone_id: Option<i64>,
    pub ward_id: Option<i64>,
    pub city_id: Option<i64>,
    pub supervisor_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub emp_code: Option<String>,
    pub zone_name: Option<String>,
    pub ward_name: Option<String>,
    pub city_name: Option<String>,
    pub supervisor_name: Option<String>,
    pub search: Option<String>,
    pub location: Option<String>,
    pub has_punch_in: Option<bool>,
    pub has_punch_out: Option<bool>,
}

/// A value bound into the report query
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Int(i64),
    Text(String),
    Date(NaiveDate),
    IntArray(Vec<i64>),
}

/// WHERE clause assembled from filters and scope
#[derive(Debug, Default)]
pub struct WhereClause {
    pub clauses: Vec<String>,
    pub binds: Vec<BindValue>,
}

impl WhereClause {
    fn push(&mut self, template: &str, value: BindValue) {
        self.binds.push(value);
        let placeholder = format!("${}", self.binds.len());
        self.clauses.push(template.replace("{}", &placeholder));
    }

    fn push_static(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    pub fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Build the WHERE clause for a report run. `loc` is the location
/// expression in effect, used by the location contains-filter.
pub fn build_where(
    filters: &ReportFilters,
    scope: &CityScope,
    loc: &str,
    has_supervisor_alias: bool,
) -> WhereClause {
    let mut out = WhereClause::default();

    if let Some(date) = filters.date {
        out.push("a.att_date = {}", BindValue::Date(date));
    }
    if let Some(start) = filters.start_date {
        out.push("a.att_date >= {}", BindValue::Date(start));
    }
    if let Some(end) = filters.end_date {
        out.push("a.att_date <= {}", BindValue::Date(end));
    }
    if let Some(zone_id) = filters.zone_id {
        out.push("z.id = {}", BindValue::Int(zone_id));
    }
    if let Some(ward_id) = filters.ward_id {
        out.push("w.id = {}", BindValue::Int(ward_id));
    }
    if let Some(city_id) = filters.city_id {
        out.push("c.id = {}", BindValue::Int(city_id));
    }
    if let Some(employee_id) = filters.employee_id {
        out.push("e.emp_id = {}", BindValue::Int(employee_id));
    }
    if let Some(ref emp_code) = filters.emp_code {
        out.push("e.emp_code = {}", BindValue::Text(emp_code.clone()));
    }

    if let Some(supervisor_id) = filters.supervisor_id {
        if has_supervisor_alias {
            out.push("s.id = {}", BindValue::Int(supervisor_id));
        } else {
            out.push(
                "EXISTS (SELECT 1 FROM supervisor_wards sx WHERE sx.ward_id = w.id AND sx.supervisor_id = {})",
                BindValue::Int(supervisor_id),
            );
        }
    }
    if let Some(ref name) = filters.supervisor_name {
        if has_supervisor_alias {
            out.push("s.name ILIKE '%' || {} || '%'", BindValue::Text(name.clone()));
        } else {
            out.push(
                "EXISTS (SELECT 1 FROM supervisor_wards sx JOIN users sux ON sux.id = sx.supervisor_id \
                 WHERE sx.ward_id = w.id AND sux.name ILIKE '%' || {} || '%')",
                BindValue::Text(name.clone()),
            );
        }
    }

    if let Some(ref name) = filters.zone_name {
        out.push("z.name ILIKE '%' || {} || '%'", BindValue::Text(name.clone()));
    }
    if let Some(ref name) = filters.ward_name {
        out.push("w.name ILIKE '%' || {} || '%'", BindValue::Text(name.clone()));
    }
    if let Some(ref name) = filters.city_name {
        out.push("c.name ILIKE '%' || {} || '%'", BindValue::Text(name.clone()));
    }
    if let Some(ref search) = filters.search {
        // The same bound value feeds both arms of the OR
        out.push(
            "(e.name ILIKE '%' || {} || '%' OR e.emp_code ILIKE '%' || {} || '%')",
            BindValue::Text(search.clone()),
        );
    }
    if let Some(ref location) = filters.location {
        out.push(
            &format!("{} ILIKE '%' || {{}} || '%'", loc),
            BindValue::Text(location.clone()),
        );
    }
    if let Some(has_punch_in) = filters.has_punch_in {
        out.push_static(if has_punch_in {
            "a.punch_in_time IS NOT NULL"
        } else {
            "a.punch_in_time IS NULL"
        });
    }
    if let Some(has_punch_out) = filters.has_punch_out {
        out.push_static(if has_punch_out {
            "a.punch_out_time IS NOT NULL"
        } else {
            "a.punch_out_time IS NULL"
        });
    }

    // Scope injection: an empty scope yields no rows rather than an error
    if !scope.all {
        if scope.cities.is_empty() {
            out.push_static("1 = 0");
        } else {
            out.push("c.id = ANY({})", BindValue::IntArray(scope.cities.clone()));
        }
    }

    out
}

/// A report run request
#[derive(Debug)]
pub struct ReportRequest {
    pub group_by: GroupBy,
    pub location_type: LocationType,
    pub filters: ReportFilters,
    pub absentees_only: bool,
}

/// Rendered report: echo of the request plus decoded rows
#[derive(Debug, Serialize)]
pub struct ReportOutput {
    pub group_by: GroupBy,
    pub location_type: LocationType,
    pub filters: ReportFilters,
    pub count: usize,
    pub data: Vec<Value>,
    #[serde(skip)]
    pub columns: &'static [ColumnSpec],
}

/// Per-ward tally row for the short report
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ShortReportRow {
    pub ward_id: i64,
    pub ward_name: String,
    pub zone_name: String,
    pub city_name: String,
    pub registered: i64,
    pub present: i64,
}

/// Report engine service
#[derive(Clone)]
pub struct ReportService {
    db: PgPool,
}

impl ReportService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Assemble the SQL and binds for a run; kept separate for testability
    pub fn compose(request: &ReportRequest, scope: &CityScope) -> (String, Vec<BindValue>) {
        let spec = grouping_spec(request.group_by);
        let loc = location_expr(request.location_type);

        let where_clause = build_where(
            &request.filters,
            scope,
            loc,
            spec.has_supervisor_alias,
        );

        let mut sql = String::new();
        sql.push_str(&spec.select.replace("{loc}", loc));
        sql.push('\n');
        sql.push_str(spec.from);
        sql.push('\n');
        sql.push_str(&where_clause.sql());
        if let Some(group_by) = spec.group_by {
            sql.push('\n');
            sql.push_str(&group_by.replace("{loc}", loc));
        }
        if request.absentees_only && spec.supports_absentees {
            sql.push('\n');
            sql.push_str(
                "HAVING COUNT(DISTINCT e.emp_id) - \
                 COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_in_time IS NOT NULL) > 0",
            );
        }
        sql.push('\n');
        sql.push_str(spec.order_by);

        (sql, where_clause.binds)
    }

    /// Run a report under the caller's city scope
    pub async fn run(&self, request: ReportRequest, scope: &CityScope) -> AppResult<ReportOutput> {
        let spec = grouping_spec(request.group_by);
        let (sql, binds) = Self::compose(&request, scope);

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = match bind {
                BindValue::Int(v) => query.bind(*v),
                BindValue::Text(v) => query.bind(v.clone()),
                BindValue::Date(v) => query.bind(*v),
                BindValue::IntArray(v) => query.bind(v.clone()),
            };
        }

        let rows = query.fetch_all(&self.db).await?;
        let data: Vec<Value> = rows
            .iter()
            .map(|row| decode_row(row, spec.columns))
            .collect::<AppResult<_>>()?;

        Ok(ReportOutput {
            group_by: request.group_by,
            location_type: request.location_type,
            filters: request.filters,
            count: data.len(),
            data,
            columns: spec.columns,
        })
    }

    /// Per-ward present/registered tallies for a city/zone/date
    pub async fn short_report(
        &self,
        date: NaiveDate,
        city_name: Option<&str>,
        zone_name: Option<&str>,
        scope: &CityScope,
    ) -> AppResult<Vec<ShortReportRow>> {
        if !scope.all && scope.cities.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT w.id AS ward_id, w.name AS ward_name, z.name AS zone_name, \
             c.name AS city_name, \
             COUNT(DISTINCT e.emp_id) AS registered, \
             COUNT(DISTINCT a.emp_id) FILTER (WHERE a.punch_in_time IS NOT NULL) AS present
             FROM wards w
             JOIN zones z ON z.id = w.zone_id
             JOIN cities c ON c.id = z.city_id
             LEFT JOIN employees e ON e.ward_id = w.id
             LEFT JOIN attendance a ON a.emp_id = e.emp_id AND a.att_date = $1
             WHERE 1 = 1",
        );

        let mut bind_index = 1;
        if city_name.is_some() {
            bind_index += 1;
            sql.push_str(&format!(" AND c.name ILIKE '%' || ${} || '%'", bind_index));
        }
        if zone_name.is_some() {
            bind_index += 1;
            sql.push_str(&format!(" AND z.name ILIKE '%' || ${} || '%'", bind_index));
        }
        if !scope.all {
            bind_index += 1;
            sql.push_str(&format!(" AND c.id = ANY(${})", bind_index));
        }
        sql.push_str(
            " GROUP BY w.id, w.name, z.name, c.name ORDER BY c.name, z.name, w.name",
        );

        let mut query = sqlx::query_as::<_, ShortReportRow>(&sql).bind(date);
        if let Some(city_name) = city_name {
            query = query.bind(city_name.to_string());
        }
        if let Some(zone_name) = zone_name {
            query = query.bind(zone_name.to_string());
        }
        if !scope.all {
            query = query.bind(scope.cities.clone());
        }

        Ok(query.fetch_all(&self.db).await?)
    }
}

/// Decode one result row through the grouping's column descriptors
fn decode_row(row: &PgRow, columns: &[ColumnSpec]) -> AppResult<Value> {
    let mut object = serde_json::Map::with_capacity(columns.len());

    for column in columns {
        let value = match column.kind {
            ColKind::BigInt => row
                .try_get::<Option<i64>, _>(column.field)
                .map(|v| v.map(Value::from).unwrap_or(Value::Null)),
            ColKind::Text => row
                .try_get::<Option<String>, _>(column.field)
                .map(|v| v.map(Value::from).unwrap_or(Value::Null)),
            ColKind::Date => row
                .try_get::<Option<NaiveDate>, _>(column.field)
                .map(|v| {
                    v.map(|d| Value::from(d.format("%Y-%m-%d").to_string()))
                        .unwrap_or(Value::Null)
                }),
            ColKind::Timestamp => row
                .try_get::<Option<chrono::DateTime<Utc>>, _>(column.field)
                .map(|v| v.map(|t| Value::from(t.to_rfc3339())).unwrap_or(Value::Null)),
        }
        .map_err(|e| AppError::Internal(format!("column {} decode failed: {}", column.field, e)))?;

        object.insert(column.field.to_string(), value);
    }

    Ok(Value::Object(object))
}

/// Render report rows as RFC-4180 CSV: every field quoted, embedded quotes
/// doubled, nulls as empty strings
pub fn render_csv(columns: &[ColumnSpec], data: &[Value]) -> AppResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(vec![]);

    writer
        .write_record(columns.iter().map(|c| c.header))
        .map_err(|e| AppError::Internal(format!("CSV header error: {}", e)))?;

    for row in data {
        let record: Vec<String> = columns
            .iter()
            .map(|c| cell_text(row.get(c.field).unwrap_or(&Value::Null)))
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| AppError::Internal(format!("CSV row error: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV encoding error: {}", e)))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Download filename for a rendered report
pub fn csv_filename(suffix: &str, now: chrono::DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        .replace([':', '.'], "-");
    format!("attendance-{}-report-{}.csv", suffix, stamp)
}

/// JSON envelope for `format=json`
pub fn json_envelope(output: &ReportOutput) -> Value {
    json!({
        "group_by": output.group_by,
        "location_type": output.location_type,
        "filters": output.filters,
        "count": output.count,
        "data": output.data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope_all() -> CityScope {
        CityScope::all_cities()
    }

    #[test]
    fn test_group_by_parse() {
        assert_eq!(GroupBy::parse("ward"), Some(GroupBy::Ward));
        assert_eq!(GroupBy::parse("Ward_Summary"), Some(GroupBy::WardSummary));
        assert_eq!(
            GroupBy::parse("supervisor_summary"),
            Some(GroupBy::SupervisorSummary)
        );
        assert_eq!(GroupBy::parse("bogus"), None);
    }

    #[test]
    fn test_filters_bind_everything() {
        let filters = ReportFilters {
            city_id: Some(7),
            zone_name: Some("North".to_string()),
            has_punch_in: Some(true),
            ..Default::default()
        };
        let clause = build_where(&filters, &scope_all(), location_expr(LocationType::Both), false);

        assert_eq!(
            clause.binds,
            vec![BindValue::Int(7), BindValue::Text("North".to_string())]
        );
        let sql = clause.sql();
        assert!(sql.contains("c.id = $1"));
        assert!(sql.contains("z.name ILIKE '%' || $2 || '%'"));
        assert!(sql.contains("a.punch_in_time IS NOT NULL"));
        // No raw values leak into the SQL text
        assert!(!sql.contains("North"));
        assert!(!sql.contains('7'));
    }

    #[test]
    fn test_search_filter_reuses_one_bind() {
        let filters = ReportFilters {
            search: Some("ravi".to_string()),
            ..Default::default()
        };
        let clause = build_where(&filters, &scope_all(), location_expr(LocationType::Both), false);
        assert_eq!(clause.binds.len(), 1);
        let sql = clause.sql();
        assert_eq!(sql.matches("$1").count(), 2);
        assert!(!sql.contains("{}"));
    }

    #[test]
    fn test_scope_injection_appends_any_clause() {
        let scope = CityScope {
            all: false,
            cities: vec![2, 5],
        };
        let clause = build_where(
            &ReportFilters::default(),
            &scope,
            location_expr(LocationType::Both),
            false,
        );
        assert!(clause.sql().contains("c.id = ANY($1)"));
        assert_eq!(clause.binds, vec![BindValue::IntArray(vec![2, 5])]);
    }

    #[test]
    fn test_empty_scope_short_circuits() {
        let clause = build_where(
            &ReportFilters::default(),
            &CityScope::default(),
            location_expr(LocationType::Both),
            false,
        );
        assert!(clause.sql().contains("1 = 0"));
        assert!(clause.binds.is_empty());
    }

    #[test]
    fn test_supervisor_filter_uses_exists_without_alias() {
        let filters = ReportFilters {
            supervisor_id: Some(3),
            ..Default::default()
        };
        let without = build_where(&filters, &scope_all(), location_expr(LocationType::Both), false);
        assert!(without.sql().contains("EXISTS"));

        let with = build_where(&filters, &scope_all(), location_expr(LocationType::Both), true);
        assert!(with.sql().contains("s.id = $1"));
        assert!(!with.sql().contains("EXISTS"));
    }

    #[test]
    fn test_compose_detail_inlines_location_expr() {
        let request = ReportRequest {
            group_by: GroupBy::Detail,
            location_type: LocationType::In,
            filters: ReportFilters::default(),
            absentees_only: false,
        };
        let (sql, binds) = ReportService::compose(&request, &scope_all());
        assert!(sql.contains("NULLIF(TRIM(a.in_address), '') AS location"));
        assert!(sql.contains("ORDER BY a.att_date DESC"));
        assert!(!sql.contains("{loc}"));
        assert!(binds.is_empty());
    }

    #[test]
    fn test_compose_location_groups_by_expression() {
        let request = ReportRequest {
            group_by: GroupBy::Location,
            location_type: LocationType::Both,
            filters: ReportFilters::default(),
            absentees_only: false,
        };
        let (sql, _) = ReportService::compose(&request, &scope_all());
        assert!(sql.contains("GROUP BY COALESCE"));
        assert!(sql.contains("'Unknown Location'"));
    }

    #[test]
    fn test_absentees_having_only_on_supervisor_summary() {
        let request = ReportRequest {
            group_by: GroupBy::SupervisorSummary,
            location_type: LocationType::Both,
            filters: ReportFilters::default(),
            absentees_only: true,
        };
        let (sql, _) = ReportService::compose(&request, &scope_all());
        assert!(sql.contains("HAVING"));
        assert!(sql.contains("CURRENT_DATE - 1"));

        let request = ReportRequest {
            group_by: GroupBy::Ward,
            location_type: LocationType::Both,
            filters: ReportFilters::default(),
            absentees_only: true,
        };
        let (sql, _) = ReportService::compose(&request, &scope_all());
        assert!(!sql.contains("HAVING"));
    }

    #[test]
    fn test_csv_rendering_quotes_everything() {
        let columns: &[ColumnSpec] = &[
            col("City", "city_name", ColKind::Text),
            col("Present", "present", ColKind::BigInt),
        ];
        let data = vec![
            json!({"city_name": "Pune", "present": 12}),
            json!({"city_name": "Navi \"New\" Mumbai", "present": Value::Null}),
        ];

        let rendered = render_csv(columns, &data).unwrap();
        let mut lines = rendered.lines();
        assert_eq!(lines.next().unwrap(), "\"City\",\"Present\"");
        assert_eq!(lines.next().unwrap(), "\"Pune\",\"12\"");
        assert_eq!(lines.next().unwrap(), "\"Navi \"\"New\"\" Mumbai\",\"\"");
    }

    #[test]
    fn test_csv_roundtrip_ascii() {
        let columns: &[ColumnSpec] = &[
            col("A", "a", ColKind::Text),
            col("B", "b", ColKind::Text),
        ];
        let data = vec![json!({"a": "x,y", "b": "line\nbreak"})];

        let rendered = render_csv(columns, &data).unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(rendered.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[0], "x,y");
        assert_eq!(&record[1], "line\nbreak");
    }

    #[test]
    fn test_csv_filename_replaces_reserved_chars() {
        let now = chrono::DateTime::parse_from_rfc3339("2023-06-14T09:15:02Z")
            .unwrap()
            .with_timezone(&Utc);
        let name = csv_filename("ward", now);
        assert_eq!(name, "attendance-ward-report-2023-06-14T09-15-02Z.csv");
        assert!(!name[name.len() - 30..].contains(':'));
    }
}
