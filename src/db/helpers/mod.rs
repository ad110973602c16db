use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

/// Escapes `%`, `_` and `\` so `value` matches literally inside a
/// `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("notes_u1_"), "notes\\_u1\\_");
        assert_eq!(escape_like("50%"), "50\\%");
    }

    #[test]
    fn parse_datetime_reports_field() {
        let err = parse_datetime("yesterday", "updated_at").unwrap_err();
        assert!(err.to_string().contains("updated_at"));
    }
}
