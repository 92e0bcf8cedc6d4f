//! SQL quoting helpers shared by the engine dialects.

/// Quote an identifier with double quotes (PostgreSQL, SQLite).
///
/// Embedded double quotes are escaped by doubling them.
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote an identifier with backticks (MySQL/MariaDB).
pub fn quote_backtick(s: &str) -> String {
    format!("`{}`", s.replace('`', "``"))
}

/// Quote a string literal with single quotes.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
