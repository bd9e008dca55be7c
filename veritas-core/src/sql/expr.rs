//! Minimal SQL expression tree.
//!
//! Metric builders assemble aggregate expressions from these nodes; the batch
//! builder rewrites them for per-request filters and the rendering pass turns
//! them into dialect strings. The tree covers exactly what aggregate metrics
//! need: identifiers, literals, columns, function calls, binary and unary
//! operators, `CASE WHEN`, casts, aggregates, and a ratio node.

use super::Dialect;
use crate::error::Result;

/// A literal value in a SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Add,
    Sub,
    Mul,
}

impl BinOp {
    fn as_sql(&self) -> &'static str {
        match self {
            BinOp::Eq => "=",
            BinOp::NotEq => "<>",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::And => "AND",
            BinOp::Or => "OR",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    IsNull,
    IsNotNull,
}

/// Aggregate functions understood by the batch builder's rewrite pass.
#[derive(Debug, Clone, PartialEq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Stddev,
    /// Continuous percentile at the given quantile (0..=1). Rendering is
    /// dialect-specific.
    Percentile(f64),
}

impl AggFunc {
    fn as_sql(&self) -> &'static str {
        match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::Stddev => "STDDEV",
            AggFunc::Percentile(_) => "PERCENTILE_CONT",
        }
    }
}

/// A node in the SQL expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// A column reference.
    Column(String),
    /// The `*` projection, only valid as an aggregate argument.
    Star,
    /// A raw identifier (e.g. a SQL type name in casts).
    Ident(String),
    /// A literal value.
    Literal(Literal),
    /// A scalar function call.
    Func { name: String, args: Vec<SqlExpr> },
    /// A binary operation.
    Binary {
        op: BinOp,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    /// A unary operation (`NOT`, `IS NULL`, `IS NOT NULL`).
    Unary { op: UnaryOp, expr: Box<SqlExpr> },
    /// A `CASE WHEN … THEN … [ELSE …] END` expression.
    Case {
        whens: Vec<(SqlExpr, SqlExpr)>,
        else_expr: Option<Box<SqlExpr>>,
    },
    /// A `CAST(expr AS type)` expression.
    Cast { expr: Box<SqlExpr>, ty: String },
    /// An aggregate call. `distinct` turns `COUNT` into `COUNT(DISTINCT …)`.
    Agg {
        func: AggFunc,
        args: Vec<SqlExpr>,
        distinct: bool,
    },
    /// A ratio of two expressions. Rendered with a cast to DOUBLE so integer
    /// division never truncates.
    Div {
        num: Box<SqlExpr>,
        den: Box<SqlExpr>,
    },
    /// A validated SQL fragment supplied as text (filter predicates from
    /// configuration). Rendered parenthesized.
    Raw(String),
}

impl SqlExpr {
    /// A column reference.
    pub fn col(name: impl Into<String>) -> Self {
        SqlExpr::Column(name.into())
    }

    /// An integer literal.
    pub fn int(value: i64) -> Self {
        SqlExpr::Literal(Literal::Int(value))
    }

    /// A string literal.
    pub fn text(value: impl Into<String>) -> Self {
        SqlExpr::Literal(Literal::Str(value.into()))
    }

    /// The NULL literal.
    pub fn null() -> Self {
        SqlExpr::Literal(Literal::Null)
    }

    /// `COUNT(*)`.
    pub fn count_star() -> Self {
        SqlExpr::Agg {
            func: AggFunc::Count,
            args: vec![SqlExpr::Star],
            distinct: false,
        }
    }

    /// `COUNT(expr)`.
    pub fn count(expr: SqlExpr) -> Self {
        SqlExpr::Agg {
            func: AggFunc::Count,
            args: vec![expr],
            distinct: false,
        }
    }

    /// `COUNT(DISTINCT a, b, …)`.
    pub fn count_distinct(args: Vec<SqlExpr>) -> Self {
        SqlExpr::Agg {
            func: AggFunc::Count,
            args,
            distinct: true,
        }
    }

    /// `SUM(expr)`.
    pub fn sum(expr: SqlExpr) -> Self {
        SqlExpr::Agg {
            func: AggFunc::Sum,
            args: vec![expr],
            distinct: false,
        }
    }

    /// A single-argument aggregate of the given function.
    pub fn agg(func: AggFunc, expr: SqlExpr) -> Self {
        SqlExpr::Agg {
            func,
            args: vec![expr],
            distinct: false,
        }
    }

    /// `CASE WHEN cond THEN then [ELSE else] END`.
    pub fn case_when(cond: SqlExpr, then: SqlExpr, else_expr: Option<SqlExpr>) -> Self {
        SqlExpr::Case {
            whens: vec![(cond, then)],
            else_expr: else_expr.map(Box::new),
        }
    }

    /// A binary operation.
    pub fn binary(op: BinOp, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left AND right`.
    pub fn and(left: SqlExpr, right: SqlExpr) -> Self {
        Self::binary(BinOp::And, left, right)
    }

    /// `left OR right`.
    pub fn or(left: SqlExpr, right: SqlExpr) -> Self {
        Self::binary(BinOp::Or, left, right)
    }

    /// `expr IS NULL`.
    pub fn is_null(expr: SqlExpr) -> Self {
        SqlExpr::Unary {
            op: UnaryOp::IsNull,
            expr: Box::new(expr),
        }
    }

    /// `expr IS NOT NULL`.
    pub fn is_not_null(expr: SqlExpr) -> Self {
        SqlExpr::Unary {
            op: UnaryOp::IsNotNull,
            expr: Box::new(expr),
        }
    }

    /// A ratio node.
    pub fn div(num: SqlExpr, den: SqlExpr) -> Self {
        SqlExpr::Div {
            num: Box::new(num),
            den: Box::new(den),
        }
    }

    /// Returns true if any node in this subtree is an aggregate.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            SqlExpr::Agg { .. } => true,
            SqlExpr::Column(_)
            | SqlExpr::Star
            | SqlExpr::Ident(_)
            | SqlExpr::Literal(_)
            | SqlExpr::Raw(_) => false,
            SqlExpr::Func { args, .. } => args.iter().any(SqlExpr::contains_aggregate),
            SqlExpr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            SqlExpr::Unary { expr, .. } => expr.contains_aggregate(),
            SqlExpr::Case { whens, else_expr } => {
                whens
                    .iter()
                    .any(|(c, v)| c.contains_aggregate() || v.contains_aggregate())
                    || else_expr
                        .as_ref()
                        .map(|e| e.contains_aggregate())
                        .unwrap_or(false)
            }
            SqlExpr::Cast { expr, .. } => expr.contains_aggregate(),
            SqlExpr::Div { num, den } => num.contains_aggregate() || den.contains_aggregate(),
        }
    }

    /// Rewrites this tree top-down.
    ///
    /// `f` is called for every node. When it returns `Some(replacement)` the
    /// replacement is used verbatim and its subtree is not visited; when it
    /// returns `None` the node is kept and its children are visited.
    pub fn rewrite<F>(&self, f: &mut F) -> Result<SqlExpr>
    where
        F: FnMut(&SqlExpr) -> Option<Result<SqlExpr>>,
    {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        Ok(match self {
            SqlExpr::Column(_)
            | SqlExpr::Star
            | SqlExpr::Ident(_)
            | SqlExpr::Literal(_)
            | SqlExpr::Raw(_) => self.clone(),
            SqlExpr::Func { name, args } => SqlExpr::Func {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| a.rewrite(f))
                    .collect::<Result<Vec<_>>>()?,
            },
            SqlExpr::Binary { op, left, right } => SqlExpr::Binary {
                op: *op,
                left: Box::new(left.rewrite(f)?),
                right: Box::new(right.rewrite(f)?),
            },
            SqlExpr::Unary { op, expr } => SqlExpr::Unary {
                op: *op,
                expr: Box::new(expr.rewrite(f)?),
            },
            SqlExpr::Case { whens, else_expr } => SqlExpr::Case {
                whens: whens
                    .iter()
                    .map(|(c, v)| Ok((c.rewrite(f)?, v.rewrite(f)?)))
                    .collect::<Result<Vec<_>>>()?,
                else_expr: match else_expr {
                    Some(e) => Some(Box::new(e.rewrite(f)?)),
                    None => None,
                },
            },
            SqlExpr::Cast { expr, ty } => SqlExpr::Cast {
                expr: Box::new(expr.rewrite(f)?),
                ty: ty.clone(),
            },
            SqlExpr::Agg {
                func,
                args,
                distinct,
            } => SqlExpr::Agg {
                func: func.clone(),
                args: args
                    .iter()
                    .map(|a| a.rewrite(f))
                    .collect::<Result<Vec<_>>>()?,
                distinct: *distinct,
            },
            SqlExpr::Div { num, den } => SqlExpr::Div {
                num: Box::new(num.rewrite(f)?),
                den: Box::new(den.rewrite(f)?),
            },
        })
    }

    /// Renders this expression as a SQL string for the given dialect.
    pub fn render(&self, dialect: Dialect) -> String {
        match self {
            SqlExpr::Column(name) => name.clone(),
            SqlExpr::Star => "*".to_string(),
            SqlExpr::Ident(name) => name.clone(),
            SqlExpr::Literal(lit) => render_literal(lit),
            SqlExpr::Func { name, args } => {
                let rendered: Vec<String> = args.iter().map(|a| a.render(dialect)).collect();
                format!("{}({})", name, rendered.join(", "))
            }
            SqlExpr::Binary { op, left, right } => format!(
                "({} {} {})",
                left.render(dialect),
                op.as_sql(),
                right.render(dialect)
            ),
            SqlExpr::Unary { op, expr } => match op {
                UnaryOp::Not => format!("NOT ({})", expr.render(dialect)),
                UnaryOp::IsNull => format!("{} IS NULL", expr.render(dialect)),
                UnaryOp::IsNotNull => format!("{} IS NOT NULL", expr.render(dialect)),
            },
            SqlExpr::Case { whens, else_expr } => {
                let mut out = String::from("CASE");
                for (cond, value) in whens {
                    out.push_str(&format!(
                        " WHEN {} THEN {}",
                        cond.render(dialect),
                        value.render(dialect)
                    ));
                }
                if let Some(e) = else_expr {
                    out.push_str(&format!(" ELSE {}", e.render(dialect)));
                }
                out.push_str(" END");
                out
            }
            SqlExpr::Cast { expr, ty } => format!("CAST({} AS {})", expr.render(dialect), ty),
            SqlExpr::Agg {
                func,
                args,
                distinct,
            } => {
                if let AggFunc::Percentile(q) = func {
                    let arg = args
                        .first()
                        .map(|a| a.render(dialect))
                        .unwrap_or_else(|| "*".to_string());
                    return dialect.render_percentile(&arg, *q);
                }
                let rendered: Vec<String> = args.iter().map(|a| a.render(dialect)).collect();
                if *distinct {
                    format!("{}(DISTINCT {})", func.as_sql(), rendered.join(", "))
                } else {
                    format!("{}({})", func.as_sql(), rendered.join(", "))
                }
            }
            SqlExpr::Div { num, den } => format!(
                "(CAST({} AS DOUBLE) / {})",
                num.render(dialect),
                den.render(dialect)
            ),
            SqlExpr::Raw(sql) => format!("({sql})"),
        }
    }
}

fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::Int(v) => v.to_string(),
        Literal::Float(v) => {
            if v.fract() == 0.0 && v.is_finite() {
                format!("{v:.1}")
            } else {
                v.to_string()
            }
        }
        Literal::Str(v) => format!("'{}'", v.replace('\'', "''")),
        Literal::Bool(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
        Literal::Null => "NULL".to_string(),
    }
}

/// A single-table `SELECT` statement with aliased projections.
#[derive(Debug, Clone)]
pub struct SelectStatement {
    /// Projected expressions with their aliases, in output order.
    pub projections: Vec<(SqlExpr, String)>,
    /// The table scanned by the statement.
    pub table: String,
    /// Optional global `WHERE` predicate.
    pub where_clause: Option<SqlExpr>,
}

impl SelectStatement {
    /// Creates a statement over `table` with no projections yet.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            projections: Vec::new(),
            table: table.into(),
            where_clause: None,
        }
    }

    /// Adds an aliased projection.
    pub fn project(&mut self, expr: SqlExpr, alias: impl Into<String>) {
        self.projections.push((expr, alias.into()));
    }

    /// Renders the statement for the given dialect.
    pub fn render(&self, dialect: Dialect) -> String {
        let projections: Vec<String> = self
            .projections
            .iter()
            .map(|(expr, alias)| format!("{} AS {}", expr.render(dialect), alias))
            .collect();
        let mut sql = format!("SELECT {} FROM {}", projections.join(", "), self.table);
        if let Some(pred) = &self.where_clause {
            sql.push_str(&format!(" WHERE {}", pred.render(dialect)));
        }
        sql
    }
}
