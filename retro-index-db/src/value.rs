use rusqlite::types::{ToSql, ToSqlOutput};

/// A single bound value for a buffered row or a generated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Integer(i64),
    Text(String),
    NullableText(Option<String>),
    NullableInteger(Option<i64>),
}

impl SqlValue {
    /// A row id column: 0 binds NULL so SQLite assigns the next id.
    pub fn dbid(id: i64) -> Self {
        Self::NullableInteger((id != 0).then_some(id))
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Integer(v) => v.to_sql(),
            Self::Text(v) => v.to_sql(),
            Self::NullableText(v) => v.to_sql(),
            Self::NullableInteger(v) => v.to_sql(),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        Self::NullableText(v)
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(v: Option<i64>) -> Self {
        Self::NullableInteger(v)
    }
}
