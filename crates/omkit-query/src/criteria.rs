//! The criteria query tree.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::expr::{Expr, Order};
use crate::path::QueryPath;

static NEXT_QUERY_ID: AtomicU32 = AtomicU32::new(1);

/// A root or join of one [`CriteriaQuery`].
///
/// Hashing ignores which query the node belongs to, so structurally equal
/// queries share a plan-cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId {
    query: u32,
    index: u32,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Path to `attribute` of this node.
    pub fn get(self, attribute: impl Into<String>) -> Expr {
        Expr::from(self).get(attribute)
    }
}

impl Hash for NodeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
}

impl JoinType {
    pub const fn as_str(self) -> &'static str {
        match self {
            JoinType::Inner => "inner join",
            JoinType::Left => "left join",
        }
    }
}

#[derive(Debug, Clone, Hash)]
pub enum FromNode {
    Root {
        entity: String,
    },
    Join {
        parent: NodeId,
        attribute: String,
        join_type: JoinType,
        fetch: bool,
        on: Option<Expr>,
    },
}

/// A select query under construction.
///
/// ```
/// use omkit_query::{CriteriaQuery, JoinType};
///
/// let mut q = CriteriaQuery::new();
/// let employee = q.from("Employee");
/// let department = q.join(employee, "department", JoinType::Left);
/// q.select(employee)
///     .filter(department.get("id").le(100_i64))
///     .order_by(employee.get("name").asc());
/// assert_eq!(q.nodes().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CriteriaQuery {
    id: u32,
    nodes: Vec<FromNode>,
    selection: Vec<Expr>,
    distinct: bool,
    restriction: Option<Expr>,
    group_by: Vec<Expr>,
    having: Option<Expr>,
    order_by: Vec<Order>,
    fetches: Vec<QueryPath>,
}

impl Default for CriteriaQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl CriteriaQuery {
    pub fn new() -> Self {
        Self {
            id: NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            selection: Vec::new(),
            distinct: false,
            restriction: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            fetches: Vec::new(),
        }
    }

    fn push(&mut self, node: FromNode) -> NodeId {
        self.nodes.push(node);
        NodeId {
            query: self.id,
            index: (self.nodes.len() - 1) as u32,
        }
    }

    // ========================================================================
    // From clause
    // ========================================================================

    /// Add a root over `entity`.
    pub fn from(&mut self, entity: impl Into<String>) -> NodeId {
        self.push(FromNode::Root {
            entity: entity.into(),
        })
    }

    pub fn join(&mut self, parent: NodeId, attribute: impl Into<String>, join_type: JoinType) -> NodeId {
        self.push(FromNode::Join {
            parent,
            attribute: attribute.into(),
            join_type,
            fetch: false,
            on: None,
        })
    }

    /// A join whose target is loaded along with the parent.
    pub fn join_fetch(
        &mut self,
        parent: NodeId,
        attribute: impl Into<String>,
        join_type: JoinType,
    ) -> NodeId {
        self.push(FromNode::Join {
            parent,
            attribute: attribute.into(),
            join_type,
            fetch: true,
            on: None,
        })
    }

    /// Attach an `on` condition to a join. Conditions on the same join are
    /// combined with `and`; a root ignores the call.
    pub fn on(&mut self, join: NodeId, condition: Expr) -> &mut Self {
        if join.query != self.id {
            tracing::warn!(node = join.index, "Ignoring on condition for a node of another query");
            return self;
        }
        if let Some(FromNode::Join { on, .. }) = self.nodes.get_mut(join.index()) {
            *on = Some(match on.take() {
                Some(existing) => existing.and(condition),
                None => condition,
            });
        }
        self
    }

    // ========================================================================
    // Clauses
    // ========================================================================

    pub fn select(&mut self, item: impl Into<Expr>) -> &mut Self {
        self.selection.push(item.into());
        self
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    /// Add a `where` predicate, `and`-ed with any existing one.
    pub fn filter(&mut self, predicate: Expr) -> &mut Self {
        self.restriction = Some(match self.restriction.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn group_by(&mut self, item: impl Into<Expr>) -> &mut Self {
        self.group_by.push(item.into());
        self
    }

    pub fn having(&mut self, predicate: Expr) -> &mut Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(&mut self, order: Order) -> &mut Self {
        self.order_by.push(order);
        self
    }

    /// Fetch an association chain of the first root along with it.
    pub fn fetch(&mut self, path: QueryPath) -> &mut Self {
        self.fetches.push(path);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Whether `node` was created by this query.
    pub fn owns(&self, node: NodeId) -> bool {
        node.query == self.id && node.index() < self.nodes.len()
    }

    pub fn nodes(&self) -> &[FromNode] {
        &self.nodes
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|index| NodeId {
            query: self.id,
            index: index as u32,
        })
    }

    pub fn selection(&self) -> &[Expr] {
        &self.selection
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn restriction(&self) -> Option<&Expr> {
        self.restriction.as_ref()
    }

    pub fn group_list(&self) -> &[Expr] {
        &self.group_by
    }

    pub fn group_restriction(&self) -> Option<&Expr> {
        self.having.as_ref()
    }

    pub fn order_list(&self) -> &[Order] {
        &self.order_by
    }

    pub fn fetches(&self) -> &[QueryPath] {
        &self.fetches
    }
}

impl Hash for CriteriaQuery {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nodes.hash(state);
        self.selection.hash(state);
        self.distinct.hash(state);
        self.restriction.hash(state);
        self.group_by.hash(state);
        self.having.hash(state);
        self.order_by.hash(state);
        self.fetches.hash(state);
    }
}
