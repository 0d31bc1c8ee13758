//! Test doubles.

use std::collections::HashMap;
use std::sync::Arc;

use omkit_core::{Result, Value};
use omkit_query::{EntityType, Metamodel};

use crate::wrapper::SessionApi;

pub(crate) fn metamodel() -> Arc<Metamodel> {
    Arc::new(
        Metamodel::new()
            .entity(EntityType::new("Department", "id").basic("name"))
            .and_then(|m| {
                m.entity(
                    EntityType::new("Employee", "id")
                        .basic("name")
                        .reference("department", "Department", false),
                )
            })
            .unwrap(),
    )
}

/// Rows are `(entity, id)` pairs.
#[derive(Debug, Default)]
pub(crate) struct RecordingSession {
    pub rows: HashMap<String, Value>,
    pub executed: Vec<(String, Vec<(String, Value)>)>,
    pub flushes: usize,
}

impl RecordingSession {
    fn key(entity: &str, id: &Value) -> String {
        format!("{}#{:?}", entity, id)
    }
}

impl SessionApi for RecordingSession {
    type Row = (String, Value);

    fn find(&mut self, entity: &str, id: &Value) -> Result<Option<Self::Row>> {
        Ok(self
            .rows
            .get(&Self::key(entity, id))
            .map(|id| (entity.to_string(), id.clone())))
    }

    fn persist(&mut self, row: Self::Row) -> Result<()> {
        self.rows.insert(Self::key(&row.0, &row.1), row.1);
        Ok(())
    }

    fn remove(&mut self, entity: &str, id: &Value) -> Result<bool> {
        Ok(self.rows.remove(&Self::key(entity, id)).is_some())
    }

    fn execute_jpql(&mut self, jpql: &str, parameters: &[(String, Value)]) -> Result<Vec<Self::Row>> {
        self.executed.push((jpql.to_string(), parameters.to_vec()));
        Ok(Vec::new())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
