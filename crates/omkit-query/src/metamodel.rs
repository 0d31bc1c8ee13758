//! Entity shapes the compiler resolves paths against.

use std::collections::HashMap;
use std::sync::OnceLock;

use omkit_core::{Error, QueryErrorKind, Result};
use regex::Regex;

static IDENTIFIER: OnceLock<Regex> = OnceLock::new();

/// Whether `name` is usable as an entity or attribute name in JPQL.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern"))
        .is_match(name)
}

pub(crate) fn check_identifier(what: &str, name: &str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(Error::query(
            QueryErrorKind::InvalidPath,
            format!("'{}' is not a valid {} name", name, what),
        ))
    }
}

/// What an attribute holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// A scalar column.
    Basic,
    /// A single-valued association.
    Reference { target: String, nullable: bool },
    /// A collection-valued association.
    Collection { target: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn target(&self) -> Option<&str> {
        match &self.kind {
            AttributeKind::Basic => None,
            AttributeKind::Reference { target, .. } | AttributeKind::Collection { target } => {
                Some(target)
            }
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, AttributeKind::Reference { .. })
    }

    /// A reference the schema guarantees is set.
    pub fn is_non_null_reference(&self) -> bool {
        matches!(self.kind, AttributeKind::Reference { nullable: false, .. })
    }
}

/// One entity: its name, its id attribute and its other attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    name: String,
    id: String,
    attributes: Vec<Attribute>,
}

impl EntityType {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: name.into(),
            attributes: vec![Attribute {
                name: id.clone(),
                kind: AttributeKind::Basic,
            }],
            id,
        }
    }

    #[must_use]
    pub fn basic(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            kind: AttributeKind::Basic,
        });
        self
    }

    #[must_use]
    pub fn reference(mut self, name: impl Into<String>, target: impl Into<String>, nullable: bool) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            kind: AttributeKind::Reference {
                target: target.into(),
                nullable,
            },
        });
        self
    }

    #[must_use]
    pub fn collection(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            kind: AttributeKind::Collection {
                target: target.into(),
            },
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_attribute(&self) -> &str {
        &self.id
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
}

/// All entity types known to a compiler.
///
/// ```
/// use omkit_query::{EntityType, Metamodel};
///
/// let model = Metamodel::new()
///     .entity(EntityType::new("Department", "id").basic("name"))
///     .and_then(|m| m.entity(EntityType::new("Employee", "id").reference("department", "Department", true)))
///     .unwrap();
/// assert!(model.get("Employee").unwrap().attribute("department").unwrap().is_reference());
/// model.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct Metamodel {
    entities: HashMap<String, EntityType>,
}

impl Metamodel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity type. Names must be identifiers and unique.
    pub fn entity(mut self, entity: EntityType) -> Result<Self> {
        check_identifier("entity", &entity.name)?;
        for attribute in &entity.attributes {
            check_identifier("attribute", &attribute.name)?;
        }
        if self.entities.contains_key(&entity.name) {
            return Err(Error::invalid_argument(
                "entity",
                format!("'{}' is already declared", entity.name),
            ));
        }
        self.entities.insert(entity.name.clone(), entity);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&EntityType> {
        self.entities.get(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check that every association targets a declared entity.
    pub fn validate(&self) -> Result<()> {
        for entity in self.entities.values() {
            for attribute in &entity.attributes {
                if let Some(target) = attribute.target() {
                    if !self.entities.contains_key(target) {
                        return Err(Error::query(
                            QueryErrorKind::InvalidPath,
                            format!(
                                "'{}.{}' targets undeclared entity '{}'",
                                entity.name, attribute.name, target
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_pattern() {
        assert!(is_identifier("department"));
        assert!(is_identifier("_id2"));
        assert!(!is_identifier("2nd"));
        assert!(!is_identifier("name; drop"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_entity_rejects_bad_names() {
        let err = Metamodel::new()
            .entity(EntityType::new("Employee", "id").basic("first name"))
            .unwrap_err();
        assert!(err.to_string().contains("first name"));
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let model = Metamodel::new().entity(EntityType::new("A", "id")).unwrap();
        assert!(model.entity(EntityType::new("A", "id")).is_err());
    }

    #[test]
    fn test_validate_dangling_target() {
        let model = Metamodel::new()
            .entity(EntityType::new("Employee", "id").reference("department", "Department", true))
            .unwrap();
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_attribute_kinds() {
        let employee = EntityType::new("Employee", "id")
            .reference("department", "Department", false)
            .collection("projects", "Project");
        assert_eq!(employee.id_attribute(), "id");
        assert!(employee.attribute("department").unwrap().is_non_null_reference());
        assert_eq!(employee.attribute("projects").unwrap().target(), Some("Project"));
        assert!(employee.attribute("missing").is_none());
    }
}
