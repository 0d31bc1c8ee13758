//! Identity of path occurrences inside a compiled query.
//!
//! The same path can appear several times (`a0.name` selected and ordered
//! by). Fetch-plan construction downstream needs to tell those occurrences
//! apart, so every occurrence gets a [`PathId`]: the clause it sits in, the
//! chain of child positions leading to it, and how many structurally equal
//! paths came before it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The clause a path occurrence belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    Selection,
    /// A join's `on` condition.
    OnTree,
    Restriction,
    GroupList,
    GroupRestriction,
    OrderList,
}

impl Clause {
    pub const fn as_str(self) -> &'static str {
        match self {
            Clause::Selection => "selection",
            Clause::OnTree => "on_tree",
            Clause::Restriction => "restriction",
            Clause::GroupList => "group_list",
            Clause::GroupRestriction => "group_restriction",
            Clause::OrderList => "order_list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathId {
    clause: Clause,
    stack: Vec<u32>,
    position: u32,
}

impl PathId {
    pub fn clause(&self) -> Clause {
        self.clause
    }

    /// Child positions from the clause root down to the path. The first
    /// entry is the item index within the clause.
    pub fn stack(&self) -> &[u32] {
        &self.stack
    }

    /// Number of earlier occurrences of the same path in the query.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Whether the path is itself a selection item of the outermost query,
    /// rather than nested inside an expression.
    pub fn is_directly_referenced_by_topmost_selection(&self) -> bool {
        self.clause == Clause::Selection && self.stack.len() == 1
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clause.as_str())?;
        for ordinal in &self.stack {
            write!(f, "/{}", ordinal)?;
        }
        write!(f, "#{}", self.position)
    }
}

/// Hands out path ids while the compiler walks the criteria tree.
#[derive(Debug, Default)]
pub(crate) struct PathIdAllocator {
    clause: Option<Clause>,
    stack: Vec<u32>,
    repeats: HashMap<String, u32>,
}

impl PathIdAllocator {
    pub(crate) fn enter_clause(&mut self, clause: Clause) {
        self.clause = Some(clause);
        self.stack.clear();
    }

    pub(crate) fn push(&mut self, ordinal: usize) {
        self.stack.push(ordinal as u32);
    }

    pub(crate) fn pop(&mut self) {
        self.stack.pop();
    }

    /// Id for an occurrence of the path whose structural key is `key`.
    pub(crate) fn allocate(&mut self, key: String) -> PathId {
        let seen = self.repeats.entry(key).or_insert(0);
        let position = *seen;
        *seen += 1;
        PathId {
            clause: self.clause.unwrap_or(Clause::Selection),
            stack: self.stack.clone(),
            position,
        }
    }
}
