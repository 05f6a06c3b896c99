use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::OnceLock;

use crate::error::{LineageError, Result};

const DEFAULT_MAX_MEMO_ENTRIES: usize = 10_000;

/// A fully qualified, case-normalized object reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub column: Option<String>,
}

impl ObjectRef {
    /// Canonical id: `DB.SCHEMA.TABLE` or `DB.SCHEMA.TABLE.COLUMN`.
    ///
    /// Parts that are not plain identifiers are written back in double
    /// quotes, so the id resolves to this same reference.
    pub fn object_id(&self) -> String {
        match &self.column {
            Some(column) => format!("{}.{}", self.table_id(), render_part(column)),
            None => self.table_id(),
        }
    }

    /// Id of the owning relation (the object itself for relations).
    pub fn table_id(&self) -> String {
        format!(
            "{}.{}.{}",
            render_part(&self.database),
            render_part(&self.schema),
            render_part(&self.table)
        )
    }

    pub fn object_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.table)
    }

    pub fn is_column(&self) -> bool {
        self.column.is_some()
    }
}

struct RawPart {
    text: String,
    quoted: bool,
}

fn unquoted_identifier() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").unwrap_or_else(|err| {
            unreachable!("identifier pattern is a valid regex: {err}")
        })
    })
}

fn render_part(part: &str) -> Cow<'_, str> {
    if unquoted_identifier().is_match(part) {
        Cow::Borrowed(part)
    } else {
        Cow::Owned(format!("\"{}\"", part.replace('"', "\"\"")))
    }
}

/// Resolve a raw reference into its canonical form.
///
/// Parts are split on `.` outside double quotes, unquoted and uppercased.
/// Three parts name a relation, four name a column; anything shorter is
/// rejected rather than guessed.
pub fn resolve(raw: &str) -> Result<ObjectRef> {
    let mut parts = normalized_parts(raw)?.into_iter();
    match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(database), Some(schema), Some(table), column, None) => Ok(ObjectRef {
            database,
            schema,
            table,
            column,
        }),
        (_, _, _, _, Some(_)) => Err(LineageError::identity(
            raw,
            "too many parts; expected database.schema.object[.column]",
        )),
        _ => Err(LineageError::identity(
            raw,
            "reference must be qualified as database.schema.object",
        )),
    }
}

/// Resolve a `database` or `database.schema` scope with the same quoting
/// and case rules as object references.
pub fn resolve_scope(raw: &str) -> Result<(String, Option<String>)> {
    let mut parts = normalized_parts(raw)?.into_iter();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(database), schema, None) => Ok((database, schema)),
        _ => Err(LineageError::identity(
            raw,
            "scope must be database or database.schema",
        )),
    }
}

fn normalized_parts(raw: &str) -> Result<Vec<String>> {
    let parts = split_parts(raw)?;

    let mut normalized = Vec::with_capacity(parts.len());
    for part in parts {
        if part.text.is_empty() {
            return Err(LineageError::identity(raw, "empty identifier part"));
        }
        if !part.quoted && !unquoted_identifier().is_match(&part.text) {
            return Err(LineageError::identity(
                raw,
                format!("'{}' is not a valid unquoted identifier", part.text),
            ));
        }
        normalized.push(part.text.to_uppercase());
    }
    Ok(normalized)
}

/// Canonical object id of a raw reference.
pub fn resolve_id(raw: &str) -> Result<String> {
    resolve(raw).map(|object_ref| object_ref.object_id())
}

fn split_parts(raw: &str) -> Result<Vec<RawPart>> {
    let raw_trimmed = raw.trim();
    if raw_trimmed.is_empty() {
        return Err(LineageError::identity(raw, "empty reference"));
    }

    let mut parts = Vec::with_capacity(4);
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut closed = false;
    let mut chars = raw_trimmed.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                    closed = true;
                }
            }
            '"' => {
                if !current.trim().is_empty() || closed {
                    return Err(LineageError::identity(raw, "misplaced double quote"));
                }
                current.clear();
                in_quotes = true;
                quoted = true;
            }
            '.' if !in_quotes => {
                parts.push(finish_part(&mut current, quoted));
                quoted = false;
                closed = false;
            }
            c if closed => {
                if !c.is_whitespace() {
                    return Err(LineageError::identity(
                        raw,
                        "unexpected text after closing quote",
                    ));
                }
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(LineageError::identity(raw, "unterminated quoted identifier"));
    }
    parts.push(finish_part(&mut current, quoted));
    Ok(parts)
}

fn finish_part(current: &mut String, quoted: bool) -> RawPart {
    let text = if quoted {
        std::mem::take(current)
    } else {
        let trimmed = current.trim().to_string();
        current.clear();
        trimmed
    };
    RawPart { text, quoted }
}

/// Memoizing front for [`resolve`], safe to share across ingestion threads.
pub struct IdentityResolver {
    memo: DashMap<String, ObjectRef>,
    max_entries: usize,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_MEMO_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            memo: DashMap::with_capacity(max_entries.min(DEFAULT_MAX_MEMO_ENTRIES)),
            max_entries,
        }
    }

    pub fn resolve(&self, raw: &str) -> Result<ObjectRef> {
        if let Some(hit) = self.memo.get(raw) {
            return Ok(hit.clone());
        }

        let resolved = resolve(raw)?;

        if self.memo.len() >= self.max_entries {
            if let Some(entry) = self.memo.iter().next() {
                let key = entry.key().clone();
                drop(entry);
                self.memo.remove(&key);
            }
        }
        self.memo.insert(raw.to_string(), resolved.clone());
        Ok(resolved)
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}
