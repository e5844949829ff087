//! SQLite persistence for concrete visits.

use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::debug;

use crate::domain::models::schedule_event::{
    ScheduleEvent, ScheduleEventCursor, ScheduleEventFilter, ScheduleEventStatus,
};

pub struct ScheduleEventRepository;

impl ScheduleEventRepository {
    pub async fn insert(conn: &mut SqliteConnection, event: &ScheduleEvent) -> Result<(), sqlx::Error> {
        debug!(
            "Inserting visit {} for patient {} on {}",
            event.id, event.patient_id, event.event_date
        );
        sqlx::query(
            r#"
            INSERT INTO schedule_events
                (id, patient_id, template_id, event_date, start_at, end_at, status,
                 staff_id, authorization_id, event_code, planned_units, actual_units,
                 comment, check_in_at, check_out_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.patient_id)
        .bind(&event.template_id)
        .bind(event.event_date)
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(event.status.as_str())
        .bind(&event.staff_id)
        .bind(&event.authorization_id)
        .bind(&event.event_code)
        .bind(event.planned_units)
        .bind(event.actual_units)
        .bind(&event.comment)
        .bind(event.check_in_at)
        .bind(event.check_out_at)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get(conn: &mut SqliteConnection, event_id: &str) -> Result<Option<ScheduleEvent>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM schedule_events WHERE id = ?")
            .bind(event_id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(Self::row_to_event).transpose()
    }

    /// Overwrite every mutable column of an existing visit
    pub async fn update(conn: &mut SqliteConnection, event: &ScheduleEvent) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE schedule_events
            SET event_date = ?, start_at = ?, end_at = ?, status = ?, staff_id = ?,
                authorization_id = ?, event_code = ?, planned_units = ?, actual_units = ?,
                comment = ?, check_in_at = ?, check_out_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(event.event_date)
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(event.status.as_str())
        .bind(&event.staff_id)
        .bind(&event.authorization_id)
        .bind(&event.event_code)
        .bind(event.planned_units)
        .bind(event.actual_units)
        .bind(&event.comment)
        .bind(event.check_in_at)
        .bind(event.check_out_at)
        .bind(event.updated_at)
        .bind(&event.id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Non-cancelled visits in a date range that involve the patient or any
    /// of the given staff members. These are the only visits that can
    /// conflict with new visits for that patient and staff.
    pub async fn list_overlap_candidates(
        conn: &mut SqliteConnection,
        date_from: NaiveDate,
        date_to: NaiveDate,
        patient_id: &str,
        staff_ids: &[String],
    ) -> Result<Vec<ScheduleEvent>, sqlx::Error> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM schedule_events WHERE status <> 'CANCELLED' AND event_date >= ");
        builder.push_bind(date_from);
        builder.push(" AND event_date <= ");
        builder.push_bind(date_to);
        builder.push(" AND (patient_id = ");
        builder.push_bind(patient_id);
        if !staff_ids.is_empty() {
            builder.push(" OR staff_id IN (");
            let mut separated = builder.separated(", ");
            for staff_id in staff_ids {
                separated.push_bind(staff_id);
            }
            separated.push_unseparated(")");
        }
        builder.push(") ORDER BY start_at, id");

        let rows = builder.build().fetch_all(conn).await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    /// One page of visits matching `filter`, ordered by (start_at, id).
    /// `limit` rows at most are returned; callers ask for one more than the
    /// page size to learn whether another page exists.
    pub async fn list(
        conn: &mut SqliteConnection,
        filter: &ScheduleEventFilter,
        after: Option<&ScheduleEventCursor>,
        limit: u32,
    ) -> Result<Vec<ScheduleEvent>, sqlx::Error> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM schedule_events WHERE 1 = 1");

        if let Some(patient_id) = &filter.patient_id {
            builder.push(" AND patient_id = ").push_bind(patient_id);
        }
        if let Some(staff_id) = &filter.staff_id {
            builder.push(" AND staff_id = ").push_bind(staff_id);
        }
        if let Some(date_from) = filter.date_from {
            builder.push(" AND event_date >= ").push_bind(date_from);
        }
        if let Some(date_to) = filter.date_to {
            builder.push(" AND event_date <= ").push_bind(date_to);
        }
        if !filter.statuses.is_empty() {
            builder.push(" AND status IN (");
            let mut separated = builder.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            builder
                .push(" AND (LOWER(COALESCE(event_code, '')) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR LOWER(COALESCE(comment, '')) LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(cursor) = after {
            builder
                .push(" AND (start_at > ")
                .push_bind(cursor.start_at)
                .push(" OR (start_at = ")
                .push_bind(cursor.start_at)
                .push(" AND id > ")
                .push_bind(&cursor.id)
                .push("))");
        }
        builder.push(" ORDER BY start_at, id LIMIT ").push_bind(limit);

        let rows = builder.build().fetch_all(conn).await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    fn row_to_event(row: &SqliteRow) -> Result<ScheduleEvent, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(ScheduleEvent {
            id: row.try_get("id")?,
            patient_id: row.try_get("patient_id")?,
            template_id: row.try_get("template_id")?,
            event_date: row.try_get("event_date")?,
            start_at: row.try_get("start_at")?,
            end_at: row.try_get("end_at")?,
            status: status
                .parse::<ScheduleEventStatus>()
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            staff_id: row.try_get("staff_id")?,
            authorization_id: row.try_get("authorization_id")?,
            event_code: row.try_get("event_code")?,
            planned_units: row.try_get("planned_units")?,
            actual_units: row.try_get("actual_units")?,
            comment: row.try_get("comment")?,
            check_in_at: row.try_get("check_in_at")?,
            check_out_at: row.try_get("check_out_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Search text is matched literally; `%` and `_` are not wildcards
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
