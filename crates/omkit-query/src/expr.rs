//! Criteria expressions.
//!
//! Expressions are plain trees. Paths start at a query node ([`NodeId`]) and
//! navigate attributes with [`Expr::get`]; the compiler resolves them against
//! the metamodel and assigns aliases.

use omkit_core::Value;

use crate::criteria::NodeId;

/// A criteria expression: path, literal, predicate or function call.
#[derive(Debug, Clone, Hash)]
pub enum Expr {
    /// A root or join of the query, as a whole.
    Node(NodeId),

    /// Attribute navigation.
    Get { base: Box<Expr>, attribute: String },

    /// A literal. Compiled into a named parameter.
    Literal(Value),

    /// A named parameter supplied by the caller at execution time.
    Parameter(String),

    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    Unary { op: UnaryOp, expr: Box<Expr> },

    /// Function call, e.g. `upper(a0.name)` or `count(a0)`.
    Function { name: String, args: Vec<Expr> },

    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },

    IsNull { expr: Box<Expr>, negated: bool },

    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    /// Binding strength; higher binds tighter.
    pub const fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div => 6,
        }
    }

    /// Whether `a op (b op c)` equals `(a op b) op c`.
    pub const fn is_associative(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Add | BinaryOp::Mul)
    }

    pub const fn is_comparison(self) -> bool {
        self.precedence() == 4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub const fn precedence(self) -> u8 {
        match self {
            UnaryOp::Not => 3,
            UnaryOp::Neg => 7,
        }
    }
}

/// Precedence of atoms: paths, literals, calls.
pub(crate) const ATOM: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// One `order by` item.
#[derive(Debug, Clone, Hash)]
pub struct Order {
    pub expr: Expr,
    pub direction: OrderDirection,
}

macro_rules! binary {
    ($($(#[$doc:meta])* $name:ident => $op:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(self, other: impl Into<Expr>) -> Self {
                Expr::Binary {
                    left: Box::new(self),
                    op: BinaryOp::$op,
                    right: Box::new(other.into()),
                }
            }
        )*
    };
}

impl Expr {
    // ========================================================================
    // Constructors
    // ========================================================================

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expr::Parameter(name.into())
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    /// Navigate to `attribute`.
    pub fn get(self, attribute: impl Into<String>) -> Self {
        Expr::Get {
            base: Box::new(self),
            attribute: attribute.into(),
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    binary! {
        eq => Eq,
        ne => Ne,
        lt => Lt,
        le => Le,
        gt => Gt,
        ge => Ge,
        and => And,
        or => Or,
        add => Add,
        sub => Sub,
        mul => Mul,
        div => Div,
    }

    pub fn not(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    pub fn neg(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(self),
        }
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Self {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
            negated: false,
        }
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern.into()),
            negated: false,
        }
    }

    pub fn not_like(self, pattern: impl Into<Expr>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern.into()),
            negated: true,
        }
    }

    // ========================================================================
    // Functions
    // ========================================================================

    pub fn count(self) -> Self {
        Expr::function("count", vec![self])
    }

    pub fn sum(self) -> Self {
        Expr::function("sum", vec![self])
    }

    pub fn avg(self) -> Self {
        Expr::function("avg", vec![self])
    }

    pub fn min(self) -> Self {
        Expr::function("min", vec![self])
    }

    pub fn max(self) -> Self {
        Expr::function("max", vec![self])
    }

    pub fn upper(self) -> Self {
        Expr::function("upper", vec![self])
    }

    pub fn lower(self) -> Self {
        Expr::function("lower", vec![self])
    }

    pub fn length(self) -> Self {
        Expr::function("length", vec![self])
    }

    pub fn concat(self, other: impl Into<Expr>) -> Self {
        Expr::function("concat", vec![self, other.into()])
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    pub fn asc(self) -> Order {
        Order {
            expr: self,
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(self) -> Order {
        Order {
            expr: self,
            direction: OrderDirection::Desc,
        }
    }

    /// Binding strength of the outermost operator.
    pub fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Unary { op, .. } => op.precedence(),
            Expr::In { .. } | Expr::Between { .. } | Expr::IsNull { .. } | Expr::Like { .. } => 4,
            _ => ATOM,
        }
    }

    /// The node and attribute chain of a path expression.
    pub fn as_path(&self) -> Option<(NodeId, Vec<&str>)> {
        match self {
            Expr::Node(node) => Some((*node, Vec::new())),
            Expr::Get { base, attribute } => {
                let (node, mut attributes) = base.as_path()?;
                attributes.push(attribute);
                Some((node, attributes))
            }
            _ => None,
        }
    }
}

impl From<NodeId> for Expr {
    fn from(node: NodeId) -> Self {
        Expr::Node(node)
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Literal(Value::Double(n))
    }
}
