use crate::catalog::types::Value;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// Maximum nesting depth for expressions to prevent stack overflow
const MAX_EXPR_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    Between(String, Value, Value),
    IsNull(String),
    IsNotNull(String),
    Like(String, String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn depth(&self) -> usize {
        match self {
            Expr::Eq(_, _)
            | Expr::Ne(_, _)
            | Expr::Lt(_, _)
            | Expr::Lte(_, _)
            | Expr::Gt(_, _)
            | Expr::Gte(_, _)
            | Expr::In(_, _)
            | Expr::Between(_, _, _)
            | Expr::IsNull(_)
            | Expr::IsNotNull(_)
            | Expr::Like(_, _) => 1,
            Expr::Not(inner) => 1 + inner.depth(),
            Expr::And(left, right) | Expr::Or(left, right) => 1 + left.depth().max(right.depth()),
        }
    }

    /// Rejects expressions nested past MAX_EXPR_DEPTH before any recursive
    /// compilation walks them.
    pub fn validate_depth(&self) -> Result<(), StoreError> {
        let depth = self.depth();
        if depth > MAX_EXPR_DEPTH {
            return Err(StoreError::Validation(format!(
                "expression depth {depth} exceeds maximum allowed depth of {MAX_EXPR_DEPTH}"
            )));
        }
        Ok(())
    }
}

/// A caller-defined query against one source table: which table, and which of
/// its rows. The walker treats it as opaque; it only resolves the backing
/// table's schema and projects key columns out of the matching rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    table: String,
    predicate: Option<Expr>,
}

impl Dataset {
    pub fn table(name: &str) -> Self {
        Self {
            table: name.to_string(),
            predicate: None,
        }
    }

    pub fn where_(mut self, expr: Expr) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn predicate(&self) -> Option<&Expr> {
        self.predicate.as_ref()
    }
}

pub struct ColumnRef(String);

pub fn col(name: &str) -> ColumnRef {
    ColumnRef(name.to_string())
}

pub trait IntoExprValue {
    fn into_expr_value(self) -> Value;
}

impl IntoExprValue for Value {
    fn into_expr_value(self) -> Value {
        self
    }
}

impl IntoExprValue for bool {
    fn into_expr_value(self) -> Value {
        Value::Boolean(self)
    }
}

impl IntoExprValue for i64 {
    fn into_expr_value(self) -> Value {
        Value::Integer(self)
    }
}

impl IntoExprValue for i32 {
    fn into_expr_value(self) -> Value {
        Value::Integer(self as i64)
    }
}

impl IntoExprValue for f64 {
    fn into_expr_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoExprValue for String {
    fn into_expr_value(self) -> Value {
        Value::Text(self.into())
    }
}

impl IntoExprValue for &str {
    fn into_expr_value(self) -> Value {
        Value::Text(self.to_string().into())
    }
}

pub fn lit<T: IntoExprValue>(value: T) -> Value {
    value.into_expr_value()
}

impl ColumnRef {
    pub fn eq(self, value: Value) -> Expr {
        Expr::Eq(self.0, value)
    }

    pub fn neq(self, value: Value) -> Expr {
        Expr::Ne(self.0, value)
    }

    pub fn gt(self, value: Value) -> Expr {
        Expr::Gt(self.0, value)
    }

    pub fn gte(self, value: Value) -> Expr {
        Expr::Gte(self.0, value)
    }

    pub fn lt(self, value: Value) -> Expr {
        Expr::Lt(self.0, value)
    }

    pub fn lte(self, value: Value) -> Expr {
        Expr::Lte(self.0, value)
    }

    pub fn between(self, low: Value, high: Value) -> Expr {
        Expr::Between(self.0, low, high)
    }

    pub fn in_(self, values: Vec<Value>) -> Expr {
        Expr::In(self.0, values)
    }

    pub fn like(self, pattern: &str) -> Expr {
        Expr::Like(self.0, pattern.to_string())
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(self.0)
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(self.0)
    }
}
