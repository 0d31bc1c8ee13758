//! A persistence runtime double for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use omkit::{EntityType, Metamodel, Result, SessionApi, Value};

/// A row: entity name, id and a display name.
pub type Row = (String, Value, String);

#[derive(Debug, Default)]
pub struct RecordingRuntime {
    pub rows: BTreeMap<(String, String), Row>,
    pub statements: Vec<String>,
    pub bindings: Vec<Vec<(String, Value)>>,
    pub flushes: usize,
}

impl RecordingRuntime {
    fn key(entity: &str, id: &Value) -> (String, String) {
        (entity.to_string(), format!("{:?}", id))
    }
}

impl SessionApi for RecordingRuntime {
    type Row = Row;

    fn find(&mut self, entity: &str, id: &Value) -> Result<Option<Row>> {
        Ok(self.rows.get(&Self::key(entity, id)).cloned())
    }

    fn persist(&mut self, row: Row) -> Result<()> {
        self.rows.insert(Self::key(&row.0, &row.1), row);
        Ok(())
    }

    fn remove(&mut self, entity: &str, id: &Value) -> Result<bool> {
        Ok(self.rows.remove(&Self::key(entity, id)).is_some())
    }

    /// Returns every stored row of the entity named after `from`.
    fn execute_jpql(&mut self, jpql: &str, parameters: &[(String, Value)]) -> Result<Vec<Row>> {
        self.statements.push(jpql.to_string());
        self.bindings.push(parameters.to_vec());
        let entity = jpql
            .split(" from ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or_default()
            .to_string();
        Ok(self
            .rows
            .values()
            .filter(|row| row.0 == entity)
            .cloned()
            .collect())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

pub fn company_metamodel() -> Arc<Metamodel> {
    Arc::new(
        Metamodel::new()
            .entity(
                EntityType::new("Department", "id")
                    .basic("name")
                    .collection("employees", "Employee"),
            )
            .and_then(|m| {
                m.entity(
                    EntityType::new("Employee", "id")
                        .basic("name")
                        .basic("salary")
                        .reference("department", "Department", false)
                        .reference("mentor", "Employee", true)
                        .collection("projects", "Project"),
                )
            })
            .and_then(|m| m.entity(EntityType::new("Project", "id").basic("title")))
            .unwrap(),
    )
}
