//! Client records - header-derived CSV rows
//!
//! Quoted fields may contain commas, doubled quotes and line breaks. A
//! quote left open at end of input rejects the whole file.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

const DEFAULT_SALUTATION: &str = "Valued Customer";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Client file is empty")]
    Empty,

    #[error("Client file is missing the {0:?} column")]
    MissingColumn(&'static str),

    #[error("Unterminated quoted field starting on line {line}")]
    Malformed { line: usize },
}

/// One client row. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientRecord {
    pub name: String,
    pub email: Option<String>,
    pub contact_name: Option<String>,
    pub logo_url: String,
}

impl ClientRecord {
    pub fn new(name: impl Into<String>, logo_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            contact_name: None,
            logo_url: logo_url.into(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact_name = Some(contact.into());
        self
    }

    /// Recipient address, if one was given.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    /// Contact name, or a generic salutation.
    pub fn salutation(&self) -> &str {
        self.contact_name
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_SALUTATION)
    }
}

pub fn load_clients(path: &Path) -> Result<Vec<ClientRecord>, RecordError> {
    let text = std::fs::read_to_string(path).map_err(|source| RecordError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_clients(&text)
}

/// Parse client rows in file order.
///
/// Rows with an empty `Name` are skipped with a warning.
pub fn parse_clients(text: &str) -> Result<Vec<ClientRecord>, RecordError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = split_records(text)?.into_iter().filter(|r| !is_blank(r));

    let headers: Vec<String> = rows
        .next()
        .ok_or(RecordError::Empty)?
        .iter()
        .map(|h| normalize_header(h))
        .collect();

    let column = |key: &str| headers.iter().position(|h| h == key);
    let name_col = column("name").ok_or(RecordError::MissingColumn("Name"))?;
    let logo_col = column("logourl").ok_or(RecordError::MissingColumn("Logo URL"))?;
    let email_col = column("email");
    let contact_col = column("contactname");

    let mut records = Vec::new();

    for (row, values) in rows.enumerate() {
        let field = |col: usize| values.get(col).map(|v| v.trim()).unwrap_or("");
        let optional = |col: Option<usize>| {
            col.map(field)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let name = field(name_col);
        if name.is_empty() {
            tracing::warn!(row = row + 1, "Skipping client row with empty Name");
            continue;
        }

        records.push(ClientRecord {
            name: name.to_string(),
            email: optional(email_col),
            contact_name: optional(contact_col),
            logo_url: field(logo_col).to_string(),
        });
    }

    Ok(records)
}

fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_blank(row: &[String]) -> bool {
    row.len() == 1 && row[0].trim().is_empty()
}

/// Split CSV text into rows of fields, honoring quotes across line breaks.
fn split_records(text: &str) -> Result<Vec<Vec<String>>, RecordError> {
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut quote_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    current.push(ch);
                }
                _ => current.push(ch),
            }
            continue;
        }

        match ch {
            '"' => {
                in_quotes = true;
                quote_line = line;
            }
            ',' => fields.push(std::mem::take(&mut current)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                line += 1;
                fields.push(std::mem::take(&mut current));
                rows.push(std::mem::take(&mut fields));
            }
            _ => current.push(ch),
        }
    }

    if in_quotes {
        return Err(RecordError::Malformed { line: quote_line });
    }
    if !current.is_empty() || !fields.is_empty() {
        fields.push(current);
        rows.push(fields);
    }
    Ok(rows)
}
