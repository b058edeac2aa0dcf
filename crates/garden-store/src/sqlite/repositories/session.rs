//! Session repository: session header rows.

use chrono::{DateTime, Utc};
use garden_core::Identifier;
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::model::Classification;
use crate::sqlite::row_types::{SessionRow, time_to_millis};

const SELECT_COLUMNS: &str =
    "SELECT id, classification, is_waste, title, model, topic, update_time, access_time
     FROM sessions";

/// A single-column change to a session row.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionPatch {
    /// Move between Home and Archive.
    Classification(Classification),
    /// Enter or leave the Waste bin.
    Waste(bool),
    /// New title.
    Title(Option<String>),
    /// New default model.
    Model(Option<String>),
    /// New topic tag.
    Topic(Option<String>),
    /// New last-update time.
    UpdateTime(DateTime<Utc>),
    /// New last-access time.
    AccessTime(DateTime<Utc>),
}

/// Session repository, stateless; every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session row.
    pub fn insert(conn: &Connection, row: &SessionRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO sessions (id, classification, is_waste, title, model, topic,
             update_time, access_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.id,
                row.classification,
                row.is_waste,
                row.title,
                row.model,
                row.topic,
                row.update_time,
                row.access_time,
            ],
        )?;
        Ok(())
    }

    /// Every session row, oldest identifier first.
    pub fn list_all(conn: &Connection) -> Result<Vec<SessionRow>> {
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id ASC"))?;
        let rows = stmt
            .query_map([], SessionRow::map)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Get a session row by ID.
    pub fn get(conn: &Connection, id: Identifier) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                SessionRow::map,
            )
            .optional()?;
        Ok(row)
    }

    /// Apply one column change. Returns `false` if the row does not exist.
    pub fn apply(conn: &Connection, id: Identifier, patch: &SessionPatch) -> Result<bool> {
        let changed = match patch {
            SessionPatch::Classification(value) => conn.execute(
                "UPDATE sessions SET classification = ?1 WHERE id = ?2",
                params![value.as_str(), id],
            )?,
            SessionPatch::Waste(value) => conn.execute(
                "UPDATE sessions SET is_waste = ?1 WHERE id = ?2",
                params![value, id],
            )?,
            SessionPatch::Title(value) => conn.execute(
                "UPDATE sessions SET title = ?1 WHERE id = ?2",
                params![value, id],
            )?,
            SessionPatch::Model(value) => conn.execute(
                "UPDATE sessions SET model = ?1 WHERE id = ?2",
                params![value, id],
            )?,
            SessionPatch::Topic(value) => conn.execute(
                "UPDATE sessions SET topic = ?1 WHERE id = ?2",
                params![value, id],
            )?,
            SessionPatch::UpdateTime(value) => conn.execute(
                "UPDATE sessions SET update_time = ?1 WHERE id = ?2",
                params![time_to_millis(*value), id],
            )?,
            SessionPatch::AccessTime(value) => conn.execute(
                "UPDATE sessions SET access_time = ?1 WHERE id = ?2",
                params![time_to_millis(*value), id],
            )?,
        };
        Ok(changed > 0)
    }

    /// Delete a session row. Its leaves cascade.
    pub fn delete(conn: &Connection, id: Identifier) -> Result<bool> {
        let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Delete every session row. Returns the number of rows removed.
    pub fn delete_all(conn: &Connection) -> Result<usize> {
        let changed = conn.execute("DELETE FROM sessions", [])?;
        Ok(changed)
    }

    /// Count session rows.
    #[cfg(test)]
    pub(crate) fn count(conn: &Connection) -> Result<i64> {
        let count = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::catalogue;
    use crate::sqlite::row_types::time_from_millis;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let _ = catalogue::initialize(&conn).unwrap();
        conn
    }

    fn row(id: u64) -> SessionRow {
        SessionRow {
            id: Identifier::from_raw(id),
            classification: "home".into(),
            is_waste: false,
            title: Some("Hello".into()),
            model: None,
            topic: Some("rust".into()),
            update_time: 1_000,
            access_time: 2_000,
        }
    }

    #[test]
    fn insert_and_get() {
        let conn = setup();
        SessionRepo::insert(&conn, &row(7)).unwrap();
        let fetched = SessionRepo::get(&conn, Identifier::from_raw(7)).unwrap().unwrap();
        assert_eq!(fetched, row(7));
    }

    #[test]
    fn get_missing_is_none() {
        let conn = setup();
        assert!(SessionRepo::get(&conn, Identifier::from_raw(1)).unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_fails() {
        let conn = setup();
        SessionRepo::insert(&conn, &row(1)).unwrap();
        assert!(SessionRepo::insert(&conn, &row(1)).is_err());
    }

    #[test]
    fn list_all_orders_by_id() {
        let conn = setup();
        for id in [3, 1, 2] {
            SessionRepo::insert(&conn, &row(id)).unwrap();
        }
        let ids: Vec<u64> = SessionRepo::list_all(&conn)
            .unwrap()
            .iter()
            .map(|r| r.id.as_u64())
            .collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn apply_each_column() {
        let conn = setup();
        let id = Identifier::from_raw(5);
        SessionRepo::insert(&conn, &row(5)).unwrap();

        let patches = [
            SessionPatch::Classification(Classification::Archive),
            SessionPatch::Waste(true),
            SessionPatch::Title(None),
            SessionPatch::Model(Some("gpt".into())),
            SessionPatch::Topic(Some("go".into())),
            SessionPatch::UpdateTime(time_from_millis(3_000)),
            SessionPatch::AccessTime(time_from_millis(4_000)),
        ];
        for patch in &patches {
            assert!(SessionRepo::apply(&conn, id, patch).unwrap());
        }

        let fetched = SessionRepo::get(&conn, id).unwrap().unwrap();
        assert_eq!(fetched.classification, "archive");
        assert!(fetched.is_waste);
        assert_eq!(fetched.title, None);
        assert_eq!(fetched.model.as_deref(), Some("gpt"));
        assert_eq!(fetched.topic.as_deref(), Some("go"));
        assert_eq!(fetched.update_time, 3_000);
        assert_eq!(fetched.access_time, 4_000);
    }

    #[test]
    fn apply_missing_row_returns_false() {
        let conn = setup();
        let changed =
            SessionRepo::apply(&conn, Identifier::from_raw(9), &SessionPatch::Waste(true)).unwrap();
        assert!(!changed);
    }

    #[test]
    fn delete_and_delete_all() {
        let conn = setup();
        for id in 1..=3 {
            SessionRepo::insert(&conn, &row(id)).unwrap();
        }
        assert!(SessionRepo::delete(&conn, Identifier::from_raw(2)).unwrap());
        assert!(!SessionRepo::delete(&conn, Identifier::from_raw(2)).unwrap());
        assert_eq!(SessionRepo::count(&conn).unwrap(), 2);
        assert_eq!(SessionRepo::delete_all(&conn).unwrap(), 2);
        assert_eq!(SessionRepo::count(&conn).unwrap(), 0);
    }
}
