// Parser module: statement assembly and INSERT decomposition into records.

pub mod insert;
pub mod statement;

/// Decoded form of a single SQL literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    String(String),
    // Original text, never re-formatted.
    Number(String),
}

impl Value {
    // Text written to the CSV field; NULL becomes an empty field.
    pub fn as_field(&self) -> &str {
        match self {
            Value::Null => "",
            Value::String(s) | Value::Number(s) => s,
        }
    }
}

/// One INSERT statement: target table, optional column list, value tuples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertRecord {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_renders_as_empty_field() {
        assert_eq!(Value::Null.as_field(), "");
        assert_eq!(Value::Number("-1.50".into()).as_field(), "-1.50");
        assert_eq!(Value::String("NULL".into()).as_field(), "NULL");
    }
}
