//! Criteria → JPQL compilation.
//!
//! Compilation runs in three passes over a [`CriteriaQuery`]:
//!
//! 1. **Resolve**: every node and path is checked against the [`Metamodel`].
//! 2. **Plan**: joins that the query does not need are rewritten into plain
//!    navigation or dropped (when `optimize_joins` is on).
//! 3. **Render**: aliases are allocated in visit order, literals are lifted
//!    into named parameters, and every path occurrence gets a [`PathId`].

use std::sync::Arc;

use omkit_core::{Error, QueryErrorKind, Result, Value};

use crate::config::CompilerConfig;
use crate::criteria::{CriteriaQuery, FromNode, JoinType, NodeId};
use crate::expr::{BinaryOp, Expr, OrderDirection, UnaryOp};
use crate::metamodel::{Attribute, EntityType, Metamodel};
use crate::path::{FetchNode, FetchTree};
use crate::path_id::{Clause, PathId, PathIdAllocator};

/// The output of compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub jpql: String,
    /// Named parameters lifted out of literals, in order of appearance.
    pub literals: Vec<(String, Value)>,
    /// Every path occurrence and its rendered text.
    pub paths: Vec<(PathId, String)>,
}

impl CompiledQuery {
    pub fn literal(&self, name: &str) -> Option<&Value> {
        self.literals.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

// ============================================================================
// Plan
// ============================================================================

/// How a node appears in the rendered query.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NodePlan {
    /// Rendered in the from clause under an alias.
    Aliased,
    /// Replaced by navigation from its parent.
    Inlined,
    /// Not rendered at all.
    Dropped,
}

/// How one path occurrence uses a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Usage {
    /// `j.id`
    IdOnly,
    /// `j` as an operand of `=`, `<>`, `is null` or `in`.
    WholeComparison,
    Other,
}

struct Resolved<'m> {
    entities: Vec<&'m EntityType>,
    attributes: Vec<Option<&'m Attribute>>,
}

/// Compiles criteria queries against one metamodel.
#[derive(Debug, Clone)]
pub struct Compiler {
    metamodel: Arc<Metamodel>,
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(metamodel: Arc<Metamodel>, config: CompilerConfig) -> Self {
        Self { metamodel, config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn metamodel(&self) -> &Arc<Metamodel> {
        &self.metamodel
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub fn compile(&self, query: &CriteriaQuery) -> Result<CompiledQuery> {
        let resolved = self.resolve(query)?;
        let plans = self.plan(query, &resolved);
        let mut renderer = Renderer::new(query, &plans, &self.config);
        renderer.allocate_aliases();
        let jpql = renderer.render(&self.metamodel)?;
        tracing::debug!(
            aliases = renderer.aliases.iter().flatten().count(),
            literals = renderer.literals.len(),
            paths = renderer.paths.len(),
            "Compiled criteria query"
        );
        Ok(CompiledQuery {
            jpql,
            literals: renderer.literals,
            paths: renderer.paths,
        })
    }

    // ------------------------------------------------------------------------
    // Resolve
    // ------------------------------------------------------------------------

    fn resolve<'m>(&'m self, query: &CriteriaQuery) -> Result<Resolved<'m>> {
        if !query
            .nodes()
            .iter()
            .any(|n| matches!(n, FromNode::Root { .. }))
        {
            return Err(Error::query(
                QueryErrorKind::EmptySelection,
                "the query has no root to select from",
            ));
        }
        let mut resolved = Resolved {
            entities: Vec::with_capacity(query.nodes().len()),
            attributes: Vec::with_capacity(query.nodes().len()),
        };
        for (index, node) in query.nodes().iter().enumerate() {
            match node {
                FromNode::Root { entity } => {
                    let ty = self.metamodel.get(entity).ok_or_else(|| {
                        Error::query(
                            QueryErrorKind::InvalidPath,
                            format!("unknown entity '{}'", entity),
                        )
                    })?;
                    resolved.entities.push(ty);
                    resolved.attributes.push(None);
                }
                FromNode::Join {
                    parent, attribute, ..
                } => {
                    if !query.owns(*parent) || parent.index() >= index {
                        return Err(unknown_node(*parent));
                    }
                    let owner = resolved.entities[parent.index()];
                    let attr = owner.attribute(attribute).ok_or_else(|| {
                        no_attribute(owner, attribute)
                    })?;
                    let target = attr
                        .target()
                        .and_then(|t| self.metamodel.get(t))
                        .ok_or_else(|| {
                            Error::query(
                                QueryErrorKind::InvalidPath,
                                format!(
                                    "'{}.{}' is not an association and cannot be joined",
                                    owner.name(),
                                    attribute
                                ),
                            )
                        })?;
                    resolved.entities.push(target);
                    resolved.attributes.push(Some(attr));
                }
            }
        }
        for expr in all_expressions(query) {
            self.check_expr(query, &resolved, expr)?;
        }
        Ok(resolved)
    }

    fn check_expr(&self, query: &CriteriaQuery, resolved: &Resolved<'_>, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Node(_) | Expr::Get { .. } => {
                let (node, attributes) = expr.as_path().ok_or_else(|| {
                    Error::query(
                        QueryErrorKind::InvalidPath,
                        "attributes can only be navigated from query nodes",
                    )
                })?;
                if !query.owns(node) {
                    return Err(unknown_node(node));
                }
                self.walk_attributes(resolved.entities[node.index()], &attributes)
            }
            other => {
                for child in children(other) {
                    self.check_expr(query, resolved, child)?;
                }
                Ok(())
            }
        }
    }

    /// Check that `attributes` can be navigated from `entity`.
    fn walk_attributes<'a>(&'a self, mut entity: &'a EntityType, attributes: &[&str]) -> Result<()> {
        for (i, name) in attributes.iter().enumerate() {
            let attr = entity
                .attribute(name)
                .ok_or_else(|| no_attribute(entity, name))?;
            if i + 1 < attributes.len() {
                entity = attr.target().and_then(|t| self.metamodel.get(t)).ok_or_else(|| {
                    Error::query(
                        QueryErrorKind::InvalidPath,
                        format!(
                            "cannot navigate past basic attribute '{}.{}'",
                            entity.name(),
                            name
                        ),
                    )
                })?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Plan
    // ------------------------------------------------------------------------

    fn plan(&self, query: &CriteriaQuery, resolved: &Resolved<'_>) -> Vec<NodePlan> {
        let mut plans = vec![NodePlan::Aliased; query.nodes().len()];
        if !self.config.optimize_joins {
            return plans;
        }
        let mut usages: Vec<Vec<Usage>> = vec![Vec::new(); query.nodes().len()];
        for expr in all_expressions(query) {
            collect_usages(expr, resolved, false, &mut usages);
        }
        let mut has_children = vec![false; query.nodes().len()];
        for node in query.nodes() {
            if let FromNode::Join { parent, .. } = node {
                has_children[parent.index()] = true;
            }
        }
        for (index, node) in query.nodes().iter().enumerate() {
            let FromNode::Join {
                join_type,
                fetch,
                on,
                ..
            } = node
            else {
                continue;
            };
            let Some(attr) = resolved.attributes[index] else {
                continue;
            };
            let eligible = !fetch
                && on.is_none()
                && attr.is_reference()
                && !has_children[index]
                && usages[index].iter().all(|u| *u != Usage::Other)
                && match join_type {
                    JoinType::Left => true,
                    JoinType::Inner => self.config.strict_schema && attr.is_non_null_reference(),
                };
            if !eligible {
                continue;
            }
            plans[index] = if usages[index].is_empty() {
                NodePlan::Dropped
            } else {
                NodePlan::Inlined
            };
            tracing::trace!(node = index, plan = ?plans[index], "Optimized join");
        }
        plans
    }
}

fn unknown_node(node: NodeId) -> Error {
    Error::query(
        QueryErrorKind::UnknownNode,
        format!("node #{} does not belong to this query", node.index()),
    )
}

fn no_attribute(entity: &EntityType, name: &str) -> Error {
    Error::query(
        QueryErrorKind::InvalidPath,
        format!("'{}' has no attribute '{}'", entity.name(), name),
    )
}

/// Every top-level expression of the query, from clause conditions first.
fn all_expressions(query: &CriteriaQuery) -> Vec<&Expr> {
    let mut out = Vec::new();
    for node in query.nodes() {
        if let FromNode::Join { on: Some(on), .. } = node {
            out.push(on);
        }
    }
    out.extend(query.selection());
    out.extend(query.restriction());
    out.extend(query.group_list());
    out.extend(query.group_restriction());
    out.extend(query.order_list().iter().map(|o| &o.expr));
    out
}

/// Direct sub-expressions, in rendering order.
fn children(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::Node(_) | Expr::Literal(_) | Expr::Parameter(_) => Vec::new(),
        Expr::Get { base, .. } => vec![&**base],
        Expr::Binary { left, right, .. } => vec![&**left, &**right],
        Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } => vec![&**expr],
        Expr::Function { args, .. } => args.iter().collect(),
        Expr::In { expr, values, .. } => std::iter::once(&**expr).chain(values).collect(),
        Expr::Between {
            expr, low, high, ..
        } => vec![&**expr, &**low, &**high],
        Expr::Like { expr, pattern, .. } => vec![&**expr, &**pattern],
    }
}

fn collect_usages(expr: &Expr, resolved: &Resolved<'_>, compared: bool, usages: &mut [Vec<Usage>]) {
    if let Some((node, attributes)) = expr.as_path() {
        let index = node.index();
        if index >= usages.len() {
            return;
        }
        let usage = match attributes.as_slice() {
            [] if compared => Usage::WholeComparison,
            [id] if *id == resolved.entities[index].id_attribute() => Usage::IdOnly,
            _ => Usage::Other,
        };
        usages[index].push(usage);
        return;
    }
    let operands_compared = match expr {
        Expr::Binary { op, .. } => matches!(op, BinaryOp::Eq | BinaryOp::Ne),
        Expr::IsNull { .. } | Expr::In { .. } => true,
        _ => false,
    };
    for child in children(expr) {
        collect_usages(child, resolved, operands_compared, usages);
    }
}

// ============================================================================
// Render
// ============================================================================

struct Renderer<'q> {
    query: &'q CriteriaQuery,
    plans: &'q [NodePlan],
    config: &'q CompilerConfig,
    aliases: Vec<Option<String>>,
    next_alias: usize,
    literals: Vec<(String, Value)>,
    paths: Vec<(PathId, String)>,
    allocator: PathIdAllocator,
}

impl<'q> Renderer<'q> {
    fn new(query: &'q CriteriaQuery, plans: &'q [NodePlan], config: &'q CompilerConfig) -> Self {
        Self {
            query,
            plans,
            config,
            aliases: vec![None; plans.len()],
            next_alias: 0,
            literals: Vec::new(),
            paths: Vec::new(),
            allocator: PathIdAllocator::default(),
        }
    }

    fn fresh_alias(&mut self) -> String {
        let alias = format!("{}{}", self.config.alias_prefix, self.next_alias);
        self.next_alias += 1;
        alias
    }

    /// Aliases follow from-clause order: each root, then the joins beneath
    /// it in declaration order.
    fn allocate_aliases(&mut self) {
        for root in self.roots() {
            self.aliases[root] = Some(self.fresh_alias());
            for join in self.joins_under(root) {
                if self.plans[join] == NodePlan::Aliased {
                    self.aliases[join] = Some(self.fresh_alias());
                }
            }
        }
    }

    fn roots(&self) -> Vec<usize> {
        self.query
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, FromNode::Root { .. }))
            .map(|(i, _)| i)
            .collect()
    }

    /// Joins whose ancestry leads to `root`, in declaration order.
    fn joins_under(&self, root: usize) -> Vec<usize> {
        let nodes = self.query.nodes();
        let mut origin: Vec<usize> = (0..nodes.len()).collect();
        for (index, node) in nodes.iter().enumerate() {
            if let FromNode::Join { parent, .. } = node {
                origin[index] = origin[parent.index()];
            }
        }
        (0..nodes.len())
            .filter(|&i| i != root && origin[i] == root)
            .collect()
    }

    /// Text a reference to `node` renders as.
    fn node_text(&self, node: usize) -> String {
        if let Some(alias) = &self.aliases[node] {
            return alias.clone();
        }
        match &self.query.nodes()[node] {
            FromNode::Join {
                parent, attribute, ..
            } => format!("{}.{}", self.node_text(parent.index()), attribute),
            FromNode::Root { .. } => String::new(),
        }
    }

    fn render(&mut self, metamodel: &Metamodel) -> Result<String> {
        let query = self.query;
        let mut out = String::from("select ");
        if query.is_distinct() {
            out.push_str("distinct ");
        }
        self.allocator.enter_clause(Clause::Selection);
        if query.selection().is_empty() {
            let roots: Vec<String> = self
                .roots()
                .into_iter()
                .filter_map(|r| self.aliases[r].clone())
                .collect();
            out.push_str(&roots.join(", "));
        } else {
            self.render_list(query.selection(), &mut out);
        }

        out.push_str(" from ");
        let mut first_root = true;
        for root in self.roots() {
            if !first_root {
                out.push_str(", ");
            }
            if let FromNode::Root { entity } = &query.nodes()[root] {
                out.push_str(entity);
                out.push(' ');
                out.push_str(&self.node_text(root));
            }
            for join in self.joins_under(root) {
                self.render_join(join, &mut out);
            }
            if first_root && !query.fetches().is_empty() {
                self.render_fetches(root, metamodel, &mut out)?;
            }
            first_root = false;
        }

        if let Some(restriction) = query.restriction() {
            out.push_str(" where ");
            self.allocator.enter_clause(Clause::Restriction);
            self.render_item(0, restriction, &mut out);
        }
        if !query.group_list().is_empty() {
            out.push_str(" group by ");
            self.allocator.enter_clause(Clause::GroupList);
            self.render_list(query.group_list(), &mut out);
        }
        if let Some(having) = query.group_restriction() {
            out.push_str(" having ");
            self.allocator.enter_clause(Clause::GroupRestriction);
            self.render_item(0, having, &mut out);
        }
        if !query.order_list().is_empty() {
            out.push_str(" order by ");
            self.allocator.enter_clause(Clause::OrderList);
            for (i, order) in query.order_list().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                self.render_item(i, &order.expr, &mut out);
                out.push_str(match order.direction {
                    OrderDirection::Asc => " asc",
                    OrderDirection::Desc => " desc",
                });
            }
        }
        Ok(out)
    }

    fn render_join(&mut self, join: usize, out: &mut String) {
        let query = self.query;
        if self.plans[join] != NodePlan::Aliased {
            return;
        }
        let FromNode::Join {
            parent,
            attribute,
            join_type,
            fetch,
            on,
        } = &query.nodes()[join]
        else {
            return;
        };
        out.push(' ');
        out.push_str(join_type.as_str());
        if *fetch {
            out.push_str(" fetch");
        }
        out.push_str(&format!(
            " {}.{} {}",
            self.node_text(parent.index()),
            attribute,
            self.node_text(join)
        ));
        if let Some(on) = on {
            out.push_str(" on ");
            self.allocator.enter_clause(Clause::OnTree);
            self.render_item(join, on, out);
        }
    }

    fn render_fetches(&mut self, root: usize, metamodel: &Metamodel, out: &mut String) -> Result<()> {
        let FromNode::Root { entity } = &self.query.nodes()[root] else {
            return Ok(());
        };
        let tree: FetchTree = self.query.fetches().iter().cloned().collect();
        let handle = (self.node_text(root), entity.clone());
        tree.walk(handle, &mut |parent: &(String, String), node: &FetchNode| {
            let (alias, entity_name) = parent;
            let entity = metamodel.get(entity_name).ok_or_else(|| {
                Error::query(
                    QueryErrorKind::InvalidPath,
                    format!("unknown entity '{}'", entity_name),
                )
            })?;
            let attr = entity
                .attribute(&node.attribute)
                .ok_or_else(|| no_attribute(entity, &node.attribute))?;
            let target = attr.target().ok_or_else(|| {
                Error::query(
                    QueryErrorKind::InvalidPath,
                    format!("cannot fetch basic attribute '{}.{}'", entity.name(), node.attribute),
                )
            })?;
            let child = self.fresh_alias();
            out.push_str(&format!(" left join fetch {}.{} {}", alias, node.attribute, child));
            Ok((child, target.to_string()))
        })
    }

    fn render_list(&mut self, items: &[Expr], out: &mut String) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.render_item(i, item, out);
        }
    }

    fn render_item(&mut self, ordinal: usize, expr: &Expr, out: &mut String) {
        self.allocator.push(ordinal);
        self.render_expr(expr, out);
        self.allocator.pop();
    }

    fn render_child(&mut self, ordinal: usize, expr: &Expr, parenthesize: bool, out: &mut String) {
        self.allocator.push(ordinal);
        if parenthesize {
            out.push('(');
            self.render_expr(expr, out);
            out.push(')');
        } else {
            self.render_expr(expr, out);
        }
        self.allocator.pop();
    }

    fn render_expr(&mut self, expr: &Expr, out: &mut String) {
        if let Some((node, attributes)) = expr.as_path() {
            let mut text = self.node_text(node.index());
            for attribute in &attributes {
                text.push('.');
                text.push_str(attribute);
            }
            let mut key = node.index().to_string();
            for attribute in &attributes {
                key.push('.');
                key.push_str(attribute);
            }
            let id = self.allocator.allocate(key);
            out.push_str(&text);
            self.paths.push((id, text));
            return;
        }
        match expr {
            Expr::Node(_) | Expr::Get { .. } => {}
            Expr::Literal(Value::Null) => out.push_str("null"),
            Expr::Literal(value) => {
                let name = format!("{}{}", self.config.literal_prefix, self.literals.len());
                out.push(':');
                out.push_str(&name);
                self.literals.push((name, value.clone()));
            }
            Expr::Parameter(name) => {
                out.push(':');
                out.push_str(name);
            }
            Expr::Binary { left, op, right } => {
                let prec = op.precedence();
                let left_parens = left.precedence() < prec
                    || (left.precedence() == prec && op.is_comparison());
                let right_parens = right.precedence() < prec
                    || (right.precedence() == prec && !op.is_associative());
                self.render_child(0, left, left_parens, out);
                out.push(' ');
                out.push_str(op.as_str());
                out.push(' ');
                self.render_child(1, right, right_parens, out);
            }
            Expr::Unary { op, expr } => {
                let parens = expr.precedence() < op.precedence();
                out.push_str(match op {
                    UnaryOp::Not => "not ",
                    UnaryOp::Neg => "-",
                });
                self.render_child(0, expr, parens, out);
            }
            Expr::Function { name, args } => {
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render_child(i, arg, false, out);
                }
                out.push(')');
            }
            Expr::In {
                expr,
                values,
                negated,
            } => {
                self.render_operand(0, expr, out);
                out.push_str(if *negated { " not in (" } else { " in (" });
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render_child(i + 1, value, false, out);
                }
                out.push(')');
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                self.render_operand(0, expr, out);
                out.push_str(if *negated { " not between " } else { " between " });
                self.render_operand(1, low, out);
                out.push_str(" and ");
                self.render_operand(2, high, out);
            }
            Expr::IsNull { expr, negated } => {
                self.render_operand(0, expr, out);
                out.push_str(if *negated { " is not null" } else { " is null" });
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                self.render_operand(0, expr, out);
                out.push_str(if *negated { " not like " } else { " like " });
                self.render_operand(1, pattern, out);
            }
        }
    }

    /// Operands of `in`, `between`, `is null` and `like` bind tighter than
    /// any predicate.
    fn render_operand(&mut self, ordinal: usize, expr: &Expr, out: &mut String) {
        let parens = expr.precedence() <= BinaryOp::Eq.precedence();
        self.render_child(ordinal, expr, parens, out);
    }
}
