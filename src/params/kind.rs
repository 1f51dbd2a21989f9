//! Parameter placement classification.

/// Where a parameter lands in the resolved URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Appended after `?`, joined with `&`.
    Query,
    /// Appended to the path as `;name=value`, before the query.
    Matrix,
    /// Substituted into a `{name}` placeholder of the path template.
    Path,
}

impl ParamKind {
    /// Classify a raw parameter name by its sigil, returning the bare name.
    ///
    /// `{id}` → `(Path, "id")`, `;v` → `(Matrix, "v")`, anything else is a
    /// query parameter named as given. A lone sigil stays a query name.
    pub fn classify(raw: &str) -> (ParamKind, &str) {
        if raw.len() > 2 && raw.starts_with('{') && raw.ends_with('}') {
            return (ParamKind::Path, &raw[1..raw.len() - 1]);
        }
        if raw.len() > 1 && raw.starts_with(';') {
            return (ParamKind::Matrix, &raw[1..]);
        }
        (ParamKind::Query, raw)
    }
}
