//! Resource normalization queries.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::model::Resource;
use crate::queries::repeat_vars;

/// Query trait for the `resources` table.
pub trait ResourceQueries {
    /// Loads all resources whose RRI appears in `rris`, in one query.
    ///
    /// RRIs with no matching row are simply absent from the result; the
    /// dependency loader creates those in memory.
    fn load_resources_by_rri(&self, rris: &[String]) -> Result<Vec<Resource>>;

    /// Inserts a resource and returns its assigned surrogate id.
    fn insert_resource(&self, resource: &Resource) -> Result<i64>;
}

impl ResourceQueries for Connection {
    fn load_resources_by_rri(&self, rris: &[String]) -> Result<Vec<Resource>> {
        if rris.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, rri, from_state_version FROM resources WHERE rri IN ({})",
            repeat_vars(rris.len())
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(rris.iter()), |row| {
            Ok(Resource {
                id: Some(row.get(0)?),
                rri: row.get(1)?,
                from_state_version: row.get::<_, i64>(2)? as u64,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn insert_resource(&self, resource: &Resource) -> Result<i64> {
        self.execute(
            "INSERT INTO resources (rri, from_state_version) VALUES (?1, ?2)",
            params![resource.rri, resource.from_state_version as i64],
        )?;
        Ok(self.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        migrations::initialize(&mut conn).unwrap();
        conn
    }

    #[test]
    fn batched_load_returns_only_known_resources() {
        let conn = test_conn();
        let xrd = Resource {
            id: None,
            rri: "xrd_rr1qy5wfsfh".into(),
            from_state_version: 1,
        };
        let id = conn.insert_resource(&xrd).unwrap();
        assert!(id > 0);

        let loaded = conn
            .load_resources_by_rri(&["xrd_rr1qy5wfsfh".into(), "gok_rr1unknown".into()])
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].rri, "xrd_rr1qy5wfsfh");
        assert_eq!(loaded[0].id, Some(id));
    }

    #[test]
    fn empty_request_issues_no_query() {
        let conn = test_conn();
        assert!(conn.load_resources_by_rri(&[]).unwrap().is_empty());
    }
}
