//! SQL restriction builder.
//!
//! A `Predicate` accumulates `AND`-joined clauses with positional `?`
//! parameters. It is a plain value built per call; nothing is shared.

use rusqlite::types::Value;

/// An `AND`-joined set of SQL clauses and their bound parameters.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`
    pub fn equals(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.clauses.push(format!("{column} = ?"));
        self.params.push(value.into());
        self
    }

    /// `column IN (values...)`. An empty list matches nothing.
    pub fn any_of<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let before = self.params.len();
        self.params.extend(values.into_iter().map(Into::into));
        let added = self.params.len() - before;

        if added == 0 {
            self.clauses.push("1 = 0".to_string());
        } else {
            let marks = vec!["?"; added].join(", ");
            self.clauses.push(format!("{column} IN ({marks})"));
        }
        self
    }

    /// `column IS NULL`
    pub fn is_null(&mut self, column: &str) -> &mut Self {
        self.clauses.push(format!("{column} IS NULL"));
        self
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(&mut self, column: &str) -> &mut Self {
        self.clauses.push(format!("{column} IS NOT NULL"));
        self
    }

    /// `column < value`
    pub fn less_than(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.clauses.push(format!("{column} < ?"));
        self.params.push(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// ` WHERE a AND b`, or an empty string when there are no clauses.
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Parameters in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Consume the predicate, returning its parameters with `extra` appended.
    pub fn into_params(self, extra: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut params = self.params;
        params.extend(extra);
        params
    }
}
