//! Substate lifecycle queries.

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Row};

use gateway_common::SubstateId;

use crate::error::{DbError, Result};
use crate::model::{OpLocation, Substate, SubstateKind};
use crate::queries::repeat_vars;

/// Query trait for the `substates` table.
pub trait SubstateQueries {
    /// Loads all substates of `kind` whose identifier appears in `ids`,
    /// in one query. Identifiers with no matching row are absent from
    /// the result.
    fn load_substates(&self, kind: SubstateKind, ids: &[SubstateId]) -> Result<Vec<Substate>>;

    /// Inserts a freshly upped (or virtually born-and-downed) substate.
    fn insert_substate(&self, substate: &Substate) -> Result<()>;

    /// Stamps the down location of an existing substate.
    fn apply_substate_down(&self, id: &SubstateId, down: &OpLocation) -> Result<()>;
}

impl SubstateQueries for Connection {
    fn load_substates(&self, kind: SubstateKind, ids: &[SubstateId]) -> Result<Vec<Substate>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT substate_id, kind, payload,
                    up_state_version, up_operation_group, up_operation_index,
                    down_state_version, down_operation_group, down_operation_index
             FROM substates
             WHERE kind = ?1 AND substate_id IN ({})",
            repeat_vars(ids.len())
        );
        let mut stmt = self.prepare(&sql)?;

        let kind_code = kind.as_str();
        // Bind the id slices so `&&[u8]` (a sized ToSql type) goes into
        // the parameter list; a bare `&[u8]` cannot become `&dyn ToSql`.
        let id_slices: Vec<&[u8]> = ids.iter().map(|id| id.as_slice()).collect();
        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(id_slices.len() + 1);
        params.push(&kind_code);
        for slice in &id_slices {
            params.push(slice);
        }

        let mut rows = stmt.query(params.as_slice())?;
        let mut substates = Vec::new();
        while let Some(row) = rows.next()? {
            substates.push(substate_from_row(row)?);
        }
        Ok(substates)
    }

    fn insert_substate(&self, substate: &Substate) -> Result<()> {
        let payload = serde_json::to_string(&substate.payload)?;
        self.execute(
            "INSERT INTO substates
             (substate_id, kind, payload,
              up_state_version, up_operation_group, up_operation_index,
              down_state_version, down_operation_group, down_operation_index)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                substate.id.as_slice(),
                substate.kind.as_str(),
                payload,
                substate.up.state_version as i64,
                substate.up.operation_group,
                substate.up.operation_index,
                substate.down.map(|d| d.state_version as i64),
                substate.down.map(|d| d.operation_group),
                substate.down.map(|d| d.operation_index),
            ],
        )?;
        Ok(())
    }

    fn apply_substate_down(&self, id: &SubstateId, down: &OpLocation) -> Result<()> {
        let updated = self.execute(
            "UPDATE substates
             SET down_state_version = ?2, down_operation_group = ?3, down_operation_index = ?4
             WHERE substate_id = ?1",
            params![
                id.as_slice(),
                down.state_version as i64,
                down.operation_group,
                down.operation_index,
            ],
        )?;
        if updated == 0 {
            return Err(DbError::Integrity(format!(
                "down of substate {id} hit no stored row"
            )));
        }
        Ok(())
    }
}

fn substate_from_row(row: &Row<'_>) -> Result<Substate> {
    let id: Vec<u8> = row.get(0)?;
    let kind_code: String = row.get(1)?;
    let payload_json: String = row.get(2)?;

    let down_state_version: Option<i64> = row.get(6)?;
    let down = match down_state_version {
        Some(version) => Some(OpLocation {
            state_version: version as u64,
            operation_group: row.get(7)?,
            operation_index: row.get(8)?,
        }),
        None => None,
    };

    Ok(Substate {
        id: SubstateId::new(id),
        kind: SubstateKind::parse(&kind_code)?,
        payload: serde_json::from_str(&payload_json)?,
        up: OpLocation {
            state_version: row.get::<_, i64>(3)? as u64,
            operation_group: row.get(4)?,
            operation_index: row.get(5)?,
        },
        down,
    })
}
