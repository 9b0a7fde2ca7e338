//! Expression values used by defaults, check conditions, index filters and
//! view queries.
//!
//! The planner treats these as opaque values: it only needs structural
//! equality, the set of referenced columns, a determinism test and a way to
//! render them through a dialect-provided [`RenderContext`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::object::{ColumnId, ObjectId, TableId, ViewId};
use crate::types::{DataType, SqlValue};

/// Functions whose result differs between evaluations.
const VOLATILE_FUNCTIONS: &[&str] = &[
    "RANDOM",
    "RANDOMBLOB",
    "NOW",
    "CURRENT_TIMESTAMP",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "LOCALTIME",
    "LOCALTIMESTAMP",
    "UUID",
    "GEN_RANDOM_UUID",
    "NEWID",
    "CLOCK_TIMESTAMP",
    "STATEMENT_TIMESTAMP",
    "TIMEOFDAY",
    "NEXTVAL",
    "CHANGES",
    "LAST_INSERT_ROWID",
];

/// Dialect hooks needed to turn expressions into SQL text.
pub trait RenderContext {
    /// Quoted, unqualified name of a column.
    fn column_name(&self, column: ColumnId) -> String;

    /// Quoted name of a column qualified by its table.
    fn qualified_column_name(&self, column: ColumnId) -> String;

    /// Quoted, schema-qualified name of a table or view.
    fn relation_name(&self, relation: ObjectId) -> String;

    /// Dialect spelling of a data type.
    fn type_name(&self, data_type: &DataType) -> String;

    /// Dialect spelling of a literal.
    fn literal(&self, value: &SqlValue) -> String {
        value.to_sql_inline()
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Logical NOT.
    Not,
    /// Arithmetic negation.
    Neg,
    /// `IS NULL` test.
    IsNull,
    /// `IS NOT NULL` test.
    IsNotNull,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // Logical
    And,
    Or,

    // String
    Concat,
    Like,
}

impl BinaryOp {
    /// Returns the SQL representation of the operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Concat => "||",
            Self::Like => "LIKE",
        }
    }
}

/// A scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a column of the owning table.
    Column(ColumnId),
    /// Literal value.
    Literal(SqlValue),
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Function call.
    Function {
        /// Function name.
        name: String,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// Type cast.
    Cast {
        /// Expression being cast.
        expr: Box<Expr>,
        /// Target type.
        data_type: DataType,
    },
}

impl Expr {
    /// Column reference.
    #[must_use]
    pub const fn col(column: ColumnId) -> Self {
        Self::Column(column)
    }

    /// Literal value.
    #[must_use]
    pub fn lit(value: impl Into<SqlValue>) -> Self {
        Self::Literal(value.into())
    }

    /// NULL literal.
    #[must_use]
    pub const fn null() -> Self {
        Self::Literal(SqlValue::Null)
    }

    /// Function call.
    #[must_use]
    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Function {
            name: name.into(),
            args,
        }
    }

    /// Cast to another type.
    #[must_use]
    pub fn cast(self, data_type: DataType) -> Self {
        Self::Cast {
            expr: Box::new(self),
            data_type,
        }
    }

    fn binary(self, op: BinaryOp, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    fn unary(self, op: UnaryOp) -> Self {
        Self::Unary {
            op,
            operand: Box::new(self),
        }
    }

    /// `self = other`
    #[must_use]
    pub fn eq(self, other: Self) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// `self <> other`
    #[must_use]
    pub fn not_eq(self, other: Self) -> Self {
        self.binary(BinaryOp::NotEq, other)
    }

    /// `self < other`
    #[must_use]
    pub fn lt(self, other: Self) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// `self <= other`
    #[must_use]
    pub fn lt_eq(self, other: Self) -> Self {
        self.binary(BinaryOp::LtEq, other)
    }

    /// `self > other`
    #[must_use]
    pub fn gt(self, other: Self) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// `self >= other`
    #[must_use]
    pub fn gt_eq(self, other: Self) -> Self {
        self.binary(BinaryOp::GtEq, other)
    }

    /// `self AND other`
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// `self OR other`
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// `self LIKE pattern`
    #[must_use]
    pub fn like(self, pattern: Self) -> Self {
        self.binary(BinaryOp::Like, pattern)
    }

    /// `NOT self`
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        self.unary(UnaryOp::Not)
    }

    /// `self IS NULL`
    #[must_use]
    pub fn is_null(self) -> Self {
        self.unary(UnaryOp::IsNull)
    }

    /// `self IS NOT NULL`
    #[must_use]
    pub fn is_not_null(self) -> Self {
        self.unary(UnaryOp::IsNotNull)
    }

    /// Returns every column referenced anywhere in the expression.
    #[must_use]
    pub fn referenced_columns(&self) -> BTreeSet<ColumnId> {
        let mut columns = BTreeSet::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns(&self, out: &mut BTreeSet<ColumnId>) {
        match self {
            Self::Column(c) => {
                out.insert(*c);
            }
            Self::Literal(_) => {}
            Self::Unary { operand, .. } => operand.collect_columns(out),
            Self::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Self::Function { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
            Self::Cast { expr, .. } => expr.collect_columns(out),
        }
    }

    /// Returns the first volatile function used by the expression, if any.
    #[must_use]
    pub fn volatile_function(&self) -> Option<&str> {
        match self {
            Self::Column(_) | Self::Literal(_) => None,
            Self::Unary { operand, .. } => operand.volatile_function(),
            Self::Binary { left, right, .. } => left
                .volatile_function()
                .or_else(|| right.volatile_function()),
            Self::Function { name, args } => {
                if VOLATILE_FUNCTIONS
                    .iter()
                    .any(|f| f.eq_ignore_ascii_case(name))
                {
                    Some(name.as_str())
                } else {
                    args.iter().find_map(Self::volatile_function)
                }
            }
            Self::Cast { expr, .. } => expr.volatile_function(),
        }
    }

    /// Returns whether the expression always yields the same value for the same row.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.volatile_function().is_none()
    }

    /// Returns the literal value if the expression is a bare literal.
    #[must_use]
    pub const fn as_literal(&self) -> Option<&SqlValue> {
        match self {
            Self::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Renders the expression as SQL text.
    #[must_use]
    pub fn render(&self, ctx: &dyn RenderContext) -> String {
        match self {
            Self::Column(c) => ctx.column_name(*c),
            Self::Literal(v) => ctx.literal(v),
            Self::Unary { op, operand } => {
                let inner = operand.render_operand(ctx);
                match op {
                    UnaryOp::Not => format!("NOT {inner}"),
                    UnaryOp::Neg => format!("-{inner}"),
                    UnaryOp::IsNull => format!("{inner} IS NULL"),
                    UnaryOp::IsNotNull => format!("{inner} IS NOT NULL"),
                }
            }
            Self::Binary { op, left, right } => format!(
                "{} {} {}",
                left.render_operand(ctx),
                op.as_str(),
                right.render_operand(ctx)
            ),
            Self::Function { name, args } => {
                let args: Vec<String> = args.iter().map(|a| a.render(ctx)).collect();
                if args.is_empty() && is_niladic_keyword(name) {
                    name.to_uppercase()
                } else {
                    format!("{}({})", name.to_uppercase(), args.join(", "))
                }
            }
            Self::Cast { expr, data_type } => {
                format!("CAST({} AS {})", expr.render(ctx), ctx.type_name(data_type))
            }
        }
    }

    fn render_operand(&self, ctx: &dyn RenderContext) -> String {
        match self {
            Self::Binary { .. } | Self::Unary { .. } => format!("({})", self.render(ctx)),
            _ => self.render(ctx),
        }
    }
}

fn is_niladic_keyword(name: &str) -> bool {
    ["CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME", "LOCALTIME", "LOCALTIMESTAMP"]
        .iter()
        .any(|k| k.eq_ignore_ascii_case(name))
}

/// An object a view query can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryRef {
    /// A table.
    Table(TableId),
    /// Another view.
    View(ViewId),
    /// A table column.
    Column(ColumnId),
}

impl QueryRef {
    /// Returns the untyped id of the referenced object.
    #[must_use]
    pub fn id(self) -> ObjectId {
        match self {
            Self::Table(t) => t.into(),
            Self::View(v) => v.into(),
            Self::Column(c) => c.into(),
        }
    }
}

impl From<TableId> for QueryRef {
    fn from(id: TableId) -> Self {
        Self::Table(id)
    }
}

impl From<ViewId> for QueryRef {
    fn from(id: ViewId) -> Self {
        Self::View(id)
    }
}

impl From<ColumnId> for QueryRef {
    fn from(id: ColumnId) -> Self {
        Self::Column(id)
    }
}

/// The query behind a view.
///
/// The template is SQL text with positional placeholders (`{0}`, `{1}`, ...)
/// bound to objects. Placeholders render as the objects' current quoted
/// names, so renames flow into the view text. `{{` and `}}` are literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    template: String,
    bindings: Vec<QueryRef>,
}

enum Segment<'a> {
    Text(&'a str),
    Brace(char),
    Placeholder(usize),
}

impl ViewQuery {
    /// Creates a query from a template.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            bindings: Vec::new(),
        }
    }

    /// Binds the next placeholder.
    #[must_use]
    pub fn bind(mut self, target: impl Into<QueryRef>) -> Self {
        self.bindings.push(target.into());
        self
    }

    /// Returns the template text.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the bound objects.
    #[must_use]
    pub fn bindings(&self) -> &[QueryRef] {
        &self.bindings
    }

    /// Checks that every placeholder is well formed and bound.
    pub fn validate(&self) -> Result<()> {
        self.segments().map(|_| ())
    }

    fn segments(&self) -> Result<Vec<Segment<'_>>> {
        let bad = |msg: String| SchemaError::InvalidExpression(msg);
        let mut out = Vec::new();
        let text = self.template.as_str();
        let mut start = 0;
        let mut chars = text.char_indices().peekable();
        while let Some((i, ch)) = chars.next() {
            match ch {
                '{' | '}' => {
                    if start < i {
                        out.push(Segment::Text(&text[start..i]));
                    }
                    if chars.peek().map(|&(_, c)| c) == Some(ch) {
                        chars.next();
                        out.push(Segment::Brace(ch));
                        start = i + 2;
                        continue;
                    }
                    if ch == '}' {
                        return Err(bad(format!("unmatched '}}' at offset {i}")));
                    }
                    let close = text[i..]
                        .find('}')
                        .map(|off| i + off)
                        .ok_or_else(|| bad(format!("unclosed placeholder at offset {i}")))?;
                    let index: usize = text[i + 1..close].trim().parse().map_err(|_| {
                        bad(format!("placeholder '{}' is not a number", &text[i..=close]))
                    })?;
                    if index >= self.bindings.len() {
                        return Err(bad(format!(
                            "placeholder {{{index}}} has no binding ({} bound)",
                            self.bindings.len()
                        )));
                    }
                    out.push(Segment::Placeholder(index));
                    while chars.peek().is_some_and(|&(j, _)| j <= close) {
                        chars.next();
                    }
                    start = close + 1;
                }
                _ => {}
            }
        }
        if start < text.len() {
            out.push(Segment::Text(&text[start..]));
        }
        Ok(out)
    }

    /// Renders the query with current object names.
    pub fn render(&self, ctx: &dyn RenderContext) -> Result<String> {
        let mut sql = String::with_capacity(self.template.len());
        for segment in self.segments()? {
            match segment {
                Segment::Text(t) => sql.push_str(t),
                Segment::Brace(c) => sql.push(c),
                Segment::Placeholder(i) => match self.bindings[i] {
                    QueryRef::Table(t) => sql.push_str(&ctx.relation_name(t.into())),
                    QueryRef::View(v) => sql.push_str(&ctx.relation_name(v.into())),
                    QueryRef::Column(c) => sql.push_str(&ctx.qualified_column_name(c)),
                },
            }
        }
        Ok(sql)
    }
}
