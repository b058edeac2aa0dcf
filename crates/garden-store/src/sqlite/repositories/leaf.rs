//! Leaf repository: message rows belonging to a session.

use garden_core::Identifier;
use rusqlite::{Connection, params};

use crate::errors::Result;
use crate::sqlite::row_types::LeafRow;

/// Borrowed values for a first durable write of a leaf.
#[derive(Clone, Copy, Debug)]
pub struct NewLeaf<'a> {
    /// Leaf ID.
    pub id: Identifier,
    /// Owning session ID.
    pub parent_id: Identifier,
    /// Leaf kind text.
    pub kind: &'a str,
    /// Model, lowercase.
    pub model: Option<&'a str>,
    /// Message content.
    pub content: &'a str,
}

/// A single-column change to a leaf row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafPatch<'a> {
    /// New model.
    Model(Option<&'a str>),
    /// New content.
    Content(&'a str),
}

/// Leaf repository, stateless; every method takes `&Connection`.
pub struct LeafRepo;

impl LeafRepo {
    /// Insert a leaf row.
    pub fn insert(conn: &Connection, leaf: &NewLeaf<'_>) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO leaves (id, parent_id, kind, model, content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![leaf.id, leaf.parent_id, leaf.kind, leaf.model, leaf.content],
        )?;
        Ok(())
    }

    /// Every leaf of a session, in creation order.
    pub fn list_for_session(conn: &Connection, parent_id: Identifier) -> Result<Vec<LeafRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, kind, model, content FROM leaves
             WHERE parent_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![parent_id], LeafRow::map)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Apply one column change. Returns `false` if the row does not exist.
    pub fn apply(conn: &Connection, id: Identifier, patch: &LeafPatch<'_>) -> Result<bool> {
        let changed = match patch {
            LeafPatch::Model(value) => conn.execute(
                "UPDATE leaves SET model = ?1 WHERE id = ?2",
                params![value, id],
            )?,
            LeafPatch::Content(value) => conn.execute(
                "UPDATE leaves SET content = ?1 WHERE id = ?2",
                params![value, id],
            )?,
        };
        Ok(changed > 0)
    }

    /// Count leaves of a session.
    #[cfg(test)]
    pub(crate) fn count_for_session(conn: &Connection, parent_id: Identifier) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM leaves WHERE parent_id = ?1",
            params![parent_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sqlite::catalogue;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        catalogue::initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO sessions (id, classification, is_waste, update_time, access_time)
             VALUES (100, 'home', 0, 0, 0)",
            [],
        )
        .unwrap();
        conn
    }

    fn new_leaf(id: u64, content: &str) -> NewLeaf<'_> {
        NewLeaf {
            id: Identifier::from_raw(id),
            parent_id: Identifier::from_raw(100),
            kind: "user",
            model: None,
            content,
        }
    }

    #[test]
    fn insert_and_list_in_order() {
        let conn = setup();
        LeafRepo::insert(&conn, &new_leaf(3, "third")).unwrap();
        LeafRepo::insert(&conn, &new_leaf(1, "first")).unwrap();
        let rows = LeafRepo::list_for_session(&conn, Identifier::from_raw(100)).unwrap();
        let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, ["first", "third"]);
        assert_eq!(rows[0].kind, "user");
    }

    #[test]
    fn insert_requires_parent() {
        let conn = setup();
        let orphan = NewLeaf {
            parent_id: Identifier::from_raw(999),
            ..new_leaf(1, "x")
        };
        assert!(LeafRepo::insert(&conn, &orphan).is_err());
    }

    #[test]
    fn apply_model_and_content() {
        let conn = setup();
        let id = Identifier::from_raw(1);
        LeafRepo::insert(&conn, &new_leaf(1, "draft")).unwrap();
        assert!(LeafRepo::apply(&conn, id, &LeafPatch::Content("final")).unwrap());
        assert!(LeafRepo::apply(&conn, id, &LeafPatch::Model(Some("opus"))).unwrap());

        let rows = LeafRepo::list_for_session(&conn, Identifier::from_raw(100)).unwrap();
        assert_eq!(rows[0].content, "final");
        assert_eq!(rows[0].model.as_deref(), Some("opus"));
    }

    #[test]
    fn apply_missing_returns_false() {
        let conn = setup();
        let changed =
            LeafRepo::apply(&conn, Identifier::from_raw(5), &LeafPatch::Content("x")).unwrap();
        assert!(!changed);
    }

    #[test]
    fn count_for_session() {
        let conn = setup();
        for id in 1..=4 {
            LeafRepo::insert(&conn, &new_leaf(id, "m")).unwrap();
        }
        assert_eq!(LeafRepo::count_for_session(&conn, Identifier::from_raw(100)).unwrap(), 4);
        assert_eq!(LeafRepo::count_for_session(&conn, Identifier::from_raw(1)).unwrap(), 0);
    }
}
