//! Textual fetch paths such as `this.department.employees`.
//!
//! A query path names an association chain starting at the query root.
//! Several paths merge into a [`FetchTree`], which the compiler renders as
//! `left join fetch` clauses so the whole chain is loaded with the root.

use std::fmt;
use std::sync::OnceLock;

use omkit_core::{Error, QueryErrorKind, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

static QUERY_PATH: OnceLock<Regex> = OnceLock::new();

fn query_path_regex() -> &'static Regex {
    QUERY_PATH.get_or_init(|| {
        Regex::new(r"^\s*this((?:\s*\.\s*[A-Za-z_$][A-Za-z0-9_$]*)+)\s*$").expect("query path pattern")
    })
}

/// A validated association chain rooted at `this`.
///
/// ```
/// use omkit_query::QueryPath;
///
/// let path = QueryPath::parse("this.department.employees").unwrap();
/// assert_eq!(path.segments(), ["department", "employees"]);
/// assert!(QueryPath::parse("department").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryPath {
    segments: Vec<String>,
}

impl QueryPath {
    pub fn parse(text: &str) -> Result<Self> {
        let captures = query_path_regex().captures(text).ok_or_else(|| {
            Error::query(
                QueryErrorKind::InvalidPath,
                format!("'{}' is not a query path of the form 'this.a.b'", text),
            )
        })?;
        let segments = captures
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self { segments })
    }

    /// Parse several comma-free paths at once.
    pub fn parse_all<'a>(texts: impl IntoIterator<Item = &'a str>) -> Result<Vec<Self>> {
        texts.into_iter().map(Self::parse).collect()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for QueryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("this")?;
        for segment in &self.segments {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

/// One attribute in a [`FetchTree`] and everything fetched below it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FetchNode {
    pub attribute: String,
    pub children: Vec<FetchNode>,
}

/// Merged query paths, with shared prefixes fetched once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FetchTree {
    roots: Vec<FetchNode>,
}

impl FetchTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: &QueryPath) {
        let mut level = &mut self.roots;
        for segment in path.segments() {
            let index = match level.iter().position(|n| &n.attribute == segment) {
                Some(index) => index,
                None => {
                    level.push(FetchNode {
                        attribute: segment.clone(),
                        children: Vec::new(),
                    });
                    level.len() - 1
                }
            };
            level = &mut level[index].children;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> &[FetchNode] {
        &self.roots
    }

    /// Visit nodes depth-first, parents before children.
    ///
    /// `visit` receives the parent's handle and the node, and returns the
    /// handle passed to the node's children.
    pub fn walk<H: Clone, E>(
        &self,
        root: H,
        visit: &mut impl FnMut(&H, &FetchNode) -> std::result::Result<H, E>,
    ) -> std::result::Result<(), E> {
        fn go<H: Clone, E>(
            parent: &H,
            nodes: &[FetchNode],
            visit: &mut impl FnMut(&H, &FetchNode) -> std::result::Result<H, E>,
        ) -> std::result::Result<(), E> {
            for node in nodes {
                let handle = visit(parent, node)?;
                go(&handle, &node.children, visit)?;
            }
            Ok(())
        }
        go(&root, &self.roots, visit)
    }
}

impl FromIterator<QueryPath> for FetchTree {
    fn from_iter<I: IntoIterator<Item = QueryPath>>(iter: I) -> Self {
        let mut tree = FetchTree::new();
        for path in iter {
            tree.add(&path);
        }
        tree
    }
}
