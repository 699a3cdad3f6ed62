// src/sanitize.rs
//
// Output sanitisation for the comma-separated, line-oriented files this
// tool writes (transformed app lists and reports).

/// Removes every comma; app names feed straight into `id, name` lines.
pub fn strip_commas(value: &str) -> String {
    value.replace(',', "")
}

/// Makes a free-text value safe to place in one column of one output line:
/// commas and control characters (including newlines) are dropped and
/// surrounding whitespace is trimmed.
pub fn sanitize_column(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != ',' && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}
