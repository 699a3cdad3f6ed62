//! Line-oriented input parsing and batch pre-flight checks
//!
//! Two file formats are read:
//! - app lists: one free-text app name or URL per line, optionally followed
//!   by `,value` (exactly one comma)
//! - resolved lists: `id, name[, value]` lines as written by the transform step
//!
//! Blank lines and lines starting with `#` are skipped in both.

use crate::error::{NudgeError, Result};

/// One line of an app list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppListEntry {
    pub term: String,
    pub value: Option<String>,
}

/// One line of a resolved list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecord {
    /// 1-based line number in the source file
    pub line: usize,
    pub app_id: String,
    pub name: Option<String>,
    pub value: Option<String>,
}

fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn split_columns(line: &str) -> Vec<String> {
    line.split(',').map(|c| c.trim().to_string()).collect()
}

/// Parses an app list. A line with more than one comma is rejected, since
/// the name/value split would be ambiguous.
pub fn parse_app_list(text: &str) -> Result<Vec<AppListEntry>> {
    content_lines(text)
        .map(|(line_no, line)| {
            let columns = split_columns(line);
            match columns.as_slice() {
                [term] => Ok(AppListEntry {
                    term: term.clone(),
                    value: None,
                }),
                [term, value] if !term.is_empty() && !value.is_empty() => Ok(AppListEntry {
                    term: term.clone(),
                    value: Some(value.clone()),
                }),
                _ => Err(NudgeError::validation(format!(
                    "line {line_no}: expected `name` or `name,value`, got {line:?}"
                ))),
            }
        })
        .collect()
}

/// True when a token cannot be an app identifier: ids start with a digit.
pub fn looks_like_free_text(token: &str) -> bool {
    !token.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Parses a resolved list without judging which columns are required;
/// that depends on the batch mode (see [`crate::bulk`]).
///
/// Fails when the first record does not start with an identifier, which
/// means the file is an unresolved app list.
pub fn parse_resolved_list(text: &str) -> Result<Vec<ResolvedRecord>> {
    let mut records = Vec::new();
    for (line_no, line) in content_lines(text) {
        let mut columns = split_columns(line).into_iter();
        let app_id = columns.next().unwrap_or_default();
        if records.is_empty() && looks_like_free_text(&app_id) {
            return Err(NudgeError::validation(format!(
                "line {line_no}: {app_id:?} is not an app id; run transform-app-list on this file first"
            )));
        }
        let name = columns.next().filter(|c| !c.is_empty());
        let value = columns.next().filter(|c| !c.is_empty());
        if columns.next().is_some() {
            return Err(NudgeError::validation(format!(
                "line {line_no}: expected at most `id, name, value`, got {line:?}"
            )));
        }
        records.push(ResolvedRecord {
            line: line_no,
            app_id,
            name,
            value,
        });
    }
    Ok(records)
}
