//! SQLite persistence for templates, their weeks and their events.
//!
//! Every function takes the connection to run on, so the same query works on
//! a pooled read connection and inside a [`WriteTx`](super::WriteTx).

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::domain::models::template::{
    Template, TemplateDetail, TemplateEvent, TemplateStatus, TemplateWeek,
};

pub struct TemplateRepository;

impl TemplateRepository {
    pub async fn insert_template(
        conn: &mut SqliteConnection,
        template: &Template,
    ) -> Result<(), sqlx::Error> {
        debug!("Inserting template {} for patient {}", template.id, template.patient_id);
        sqlx::query(
            r#"
            INSERT INTO templates
                (id, patient_id, office_id, name, status, anchor_date,
                 generated_through, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&template.id)
        .bind(&template.patient_id)
        .bind(&template.office_id)
        .bind(&template.name)
        .bind(template.status.as_str())
        .bind(template.anchor_date)
        .bind(template.generated_through)
        .bind(template.version)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get_template(
        conn: &mut SqliteConnection,
        template_id: &str,
    ) -> Result<Option<Template>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM templates WHERE id = ?")
            .bind(template_id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(Self::row_to_template).transpose()
    }

    pub async fn find_active_for_patient(
        conn: &mut SqliteConnection,
        patient_id: &str,
    ) -> Result<Option<Template>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM templates WHERE patient_id = ? AND status = 'ACTIVE'")
            .bind(patient_id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(Self::row_to_template).transpose()
    }

    pub async fn update_status(
        conn: &mut SqliteConnection,
        template_id: &str,
        status: TemplateStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE templates SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(updated_at)
            .bind(template_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move the watermark only if nobody else has since the template was read.
    /// Returns false when the version no longer matches.
    pub async fn advance_watermark(
        conn: &mut SqliteConnection,
        template_id: &str,
        expected_version: i64,
        generated_through: NaiveDate,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE templates
            SET generated_through = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(generated_through)
        .bind(updated_at)
        .bind(template_id)
        .bind(expected_version)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Weeks and events go with the template through ON DELETE CASCADE
    pub async fn delete_template(
        conn: &mut SqliteConnection,
        template_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM templates WHERE id = ?")
            .bind(template_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_week(
        conn: &mut SqliteConnection,
        template_id: &str,
        week_index: u32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO template_weeks (template_id, week_index) VALUES (?, ?)")
            .bind(template_id)
            .bind(week_index)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn week_exists(
        conn: &mut SqliteConnection,
        template_id: &str,
        week_index: u32,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM template_weeks WHERE template_id = ? AND week_index = ?")
            .bind(template_id)
            .bind(week_index)
            .fetch_optional(conn)
            .await?;
        Ok(row.is_some())
    }

    pub async fn delete_week(
        conn: &mut SqliteConnection,
        template_id: &str,
        week_index: u32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM template_weeks WHERE template_id = ? AND week_index = ?")
            .bind(template_id)
            .bind(week_index)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_week_indices(
        conn: &mut SqliteConnection,
        template_id: &str,
    ) -> Result<Vec<u32>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT week_index FROM template_weeks WHERE template_id = ? ORDER BY week_index",
        )
        .bind(template_id)
        .fetch_all(conn)
        .await?;
        rows.iter().map(|row| row.try_get("week_index")).collect()
    }

    pub async fn insert_event(
        conn: &mut SqliteConnection,
        event: &TemplateEvent,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO template_events
                (id, template_id, week_index, day_of_week, start_time, end_time,
                 authorization_id, staff_id, event_code, planned_units, comment)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.template_id)
        .bind(event.week_index)
        .bind(event.day_of_week)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(&event.authorization_id)
        .bind(&event.staff_id)
        .bind(&event.event_code)
        .bind(event.planned_units)
        .bind(&event.comment)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get_event(
        conn: &mut SqliteConnection,
        template_id: &str,
        event_id: &str,
    ) -> Result<Option<TemplateEvent>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM template_events WHERE template_id = ? AND id = ?")
            .bind(template_id)
            .bind(event_id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(Self::row_to_event).transpose()
    }

    pub async fn delete_event(
        conn: &mut SqliteConnection,
        event_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM template_events WHERE id = ?")
            .bind(event_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Events of one week ordered by weekday then start time
    pub async fn list_week_events(
        conn: &mut SqliteConnection,
        template_id: &str,
        week_index: u32,
    ) -> Result<Vec<TemplateEvent>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM template_events
            WHERE template_id = ? AND week_index = ?
            ORDER BY day_of_week, start_time, id
            "#,
        )
        .bind(template_id)
        .bind(week_index)
        .fetch_all(conn)
        .await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    /// The template with all of its weeks in week-index order, each week's
    /// events ordered by weekday then start time. Empty weeks are included.
    pub async fn load_detail(
        conn: &mut SqliteConnection,
        template: Template,
    ) -> Result<TemplateDetail, sqlx::Error> {
        let week_indices = Self::list_week_indices(&mut *conn, &template.id).await?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM template_events
            WHERE template_id = ?
            ORDER BY week_index, day_of_week, start_time, id
            "#,
        )
        .bind(&template.id)
        .fetch_all(&mut *conn)
        .await?;
        let events = rows
            .iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>, _>>()?;

        let weeks = week_indices
            .into_iter()
            .map(|week_index| TemplateWeek {
                week_index,
                events: events
                    .iter()
                    .filter(|event| event.week_index == week_index)
                    .cloned()
                    .collect(),
            })
            .collect();

        Ok(TemplateDetail { template, weeks })
    }

    fn row_to_template(row: &SqliteRow) -> Result<Template, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Template {
            id: row.try_get("id")?,
            patient_id: row.try_get("patient_id")?,
            office_id: row.try_get("office_id")?,
            name: row.try_get("name")?,
            status: status.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            anchor_date: row.try_get("anchor_date")?,
            generated_through: row.try_get("generated_through")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_event(row: &SqliteRow) -> Result<TemplateEvent, sqlx::Error> {
        Ok(TemplateEvent {
            id: row.try_get("id")?,
            template_id: row.try_get("template_id")?,
            week_index: row.try_get("week_index")?,
            day_of_week: row.try_get("day_of_week")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            authorization_id: row.try_get("authorization_id")?,
            staff_id: row.try_get("staff_id")?,
            event_code: row.try_get("event_code")?,
            planned_units: row.try_get("planned_units")?,
            comment: row.try_get("comment")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DbConnection;
    use chrono::NaiveTime;

    fn template(patient_id: &str) -> Template {
        Template {
            id: Template::generate_id(),
            patient_id: patient_id.to_string(),
            office_id: Some("office-1".to_string()),
            name: "Weekday care".to_string(),
            status: TemplateStatus::Active,
            anchor_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            generated_through: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn event(template_id: &str, week_index: u32, day_of_week: u8, hour: u32) -> TemplateEvent {
        TemplateEvent {
            id: TemplateEvent::generate_id(),
            template_id: template_id.to_string(),
            week_index,
            day_of_week,
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
            authorization_id: Some("auth-1".to_string()),
            staff_id: Some("staff-1".to_string()),
            event_code: Some("PCA".to_string()),
            planned_units: 4,
            comment: None,
        }
    }

    #[tokio::test]
    async fn test_template_round_trip() {
        let db = DbConnection::init_test().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let template = template("patient-1");

        TemplateRepository::insert_template(&mut conn, &template).await.unwrap();

        let loaded = TemplateRepository::get_template(&mut conn, &template.id)
            .await
            .unwrap()
            .expect("template should exist");
        assert_eq!(loaded.patient_id, "patient-1");
        assert_eq!(loaded.status, TemplateStatus::Active);
        assert_eq!(loaded.anchor_date, template.anchor_date);
        assert!(loaded.generated_through.is_none());

        let active = TemplateRepository::find_active_for_patient(&mut conn, "patient-1")
            .await
            .unwrap();
        assert_eq!(active.map(|t| t.id), Some(template.id));
    }

    #[tokio::test]
    async fn test_detail_orders_weeks_and_events() {
        let db = DbConnection::init_test().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let template = template("patient-1");
        TemplateRepository::insert_template(&mut conn, &template).await.unwrap();

        for week_index in [3, 0, 1] {
            TemplateRepository::insert_week(&mut conn, &template.id, week_index).await.unwrap();
        }
        TemplateRepository::insert_event(&mut conn, &event(&template.id, 0, 3, 9)).await.unwrap();
        TemplateRepository::insert_event(&mut conn, &event(&template.id, 0, 1, 14)).await.unwrap();
        TemplateRepository::insert_event(&mut conn, &event(&template.id, 0, 1, 8)).await.unwrap();
        TemplateRepository::insert_event(&mut conn, &event(&template.id, 3, 5, 9)).await.unwrap();

        let detail = TemplateRepository::load_detail(&mut conn, template).await.unwrap();

        let indices: Vec<u32> = detail.weeks.iter().map(|w| w.week_index).collect();
        assert_eq!(indices, vec![0, 1, 3]);

        let week0: Vec<(u8, u32)> = detail.weeks[0]
            .events
            .iter()
            .map(|e| (e.day_of_week, chrono::Timelike::hour(&e.start_time)))
            .collect();
        assert_eq!(week0, vec![(1, 8), (1, 14), (3, 9)]);
        assert!(detail.weeks[1].events.is_empty());
        assert_eq!(detail.weeks[2].events.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let db = DbConnection::init_test().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let template = template("patient-1");
        TemplateRepository::insert_template(&mut conn, &template).await.unwrap();
        TemplateRepository::insert_week(&mut conn, &template.id, 0).await.unwrap();
        TemplateRepository::insert_week(&mut conn, &template.id, 1).await.unwrap();
        let kept = event(&template.id, 1, 2, 9);
        TemplateRepository::insert_event(&mut conn, &event(&template.id, 0, 1, 9)).await.unwrap();
        TemplateRepository::insert_event(&mut conn, &kept).await.unwrap();

        assert!(TemplateRepository::delete_week(&mut conn, &template.id, 0).await.unwrap());
        assert!(TemplateRepository::list_week_events(&mut conn, &template.id, 0).await.unwrap().is_empty());
        assert_eq!(
            TemplateRepository::list_week_events(&mut conn, &template.id, 1).await.unwrap(),
            vec![kept.clone()]
        );

        assert!(TemplateRepository::delete_template(&mut conn, &template.id).await.unwrap());
        assert!(TemplateRepository::get_event(&mut conn, &template.id, &kept.id).await.unwrap().is_none());
        assert!(!TemplateRepository::week_exists(&mut conn, &template.id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_event_requires_existing_week() {
        let db = DbConnection::init_test().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let template = template("patient-1");
        TemplateRepository::insert_template(&mut conn, &template).await.unwrap();

        let result = TemplateRepository::insert_event(&mut conn, &event(&template.id, 5, 1, 9)).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_watermark_advance_checks_version() {
        let db = DbConnection::init_test().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let template = template("patient-1");
        TemplateRepository::insert_template(&mut conn, &template).await.unwrap();
        let through = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();

        assert!(TemplateRepository::advance_watermark(&mut conn, &template.id, 0, through, Utc::now())
            .await
            .unwrap());
        // Stale version loses
        assert!(!TemplateRepository::advance_watermark(&mut conn, &template.id, 0, through, Utc::now())
            .await
            .unwrap());

        let loaded = TemplateRepository::get_template(&mut conn, &template.id).await.unwrap().unwrap();
        assert_eq!(loaded.generated_through, Some(through));
        assert_eq!(loaded.version, 1);
    }
}
