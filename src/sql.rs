//! The slice of a SQL client the MySQL lock backend needs.
//!
//! Implement these over whichever MySQL driver the application already uses.

/// A single SQL parameter or result cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Text(String),
}

impl SqlValue {
    /// Integer view of the value; numeric text is accepted since some
    /// drivers hand back every column as a string.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Null => None,
            SqlValue::Int(v) => Some(*v),
            SqlValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

pub type Row = Vec<SqlValue>;

/// A prepared statement that can be executed repeatedly.
pub trait PreparedStatement {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Execute with `params` bound in order and return every result row.
    fn bind(&mut self, params: &[SqlValue]) -> Result<Vec<Row>, Self::Error>;
}

/// An open database connection.
pub trait SqlConnection {
    type Error: std::error::Error + Send + Sync + 'static;
    type Statement: PreparedStatement;

    /// Name of the SQL dialect spoken, e.g. `"mysql"`
    fn dialect(&self) -> &str;

    /// Name of the currently selected database
    fn database(&self) -> Result<String, Self::Error>;

    fn prepare(&self, sql: &str) -> Result<Self::Statement, Self::Error>;
}
