//! Valve KeyValues (VDF) parsing and decryption key extraction.
//!
//! Key files come in two shapes, both handled by looking for the
//! sub-structure that maps depot IDs to `DecryptionKey` entries:
//!
//! ```text
//! "depots"                      "InstallConfigStore"
//! {                             {
//!     "228990"                      "Software" { "Valve" { "Steam"
//!     {                             {
//!         "DecryptionKey" "..."         "depots"
//!     }                                 {
//! }                                         "228990" { "DecryptionKey" "..." }
//!                                       }
//!                                   } } }
//!                               }
//! ```

use std::fmt;

use crate::depot::{DepotId, KeySet};

const DECRYPTION_KEY: &str = "DecryptionKey";
const DEPOTS: &str = "depots";

/// A parsed VDF value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdfValue {
    Str(String),
    Map(Vec<(String, VdfValue)>),
}

impl VdfValue {
    /// First child with the given key, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&VdfValue> {
        match self {
            VdfValue::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v),
            VdfValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VdfValue::Str(s) => Some(s),
            VdfValue::Map(_) => None,
        }
    }
}

/// Parse failure with position information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdfError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for VdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for VdfError {}

/// Result of extracting keys from a key/config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The file parsed; the key set may be empty.
    Keys(KeySet),
    /// The file could not be parsed.
    ParseFailure { diagnostic: String },
}

/// Extract depot decryption keys from raw file bytes.
///
/// Never fails hard: unparsable content yields [`Extraction::ParseFailure`]
/// and unrecognized structure is ignored.
pub fn extract(bytes: &[u8]) -> Extraction {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}');

    let root = match parse(text) {
        Ok(root) => root,
        Err(e) => {
            log::debug!("VDF parse failed: {}", e);
            return Extraction::ParseFailure {
                diagnostic: e.to_string(),
            };
        }
    };

    let mut keys = KeySet::new();
    collect_depots_sections(&root, &mut keys);
    if keys.is_empty() {
        collect_key_maps(&root, &mut keys);
    }
    Extraction::Keys(keys)
}

/// Gather keys from every `depots` section, at any depth.
fn collect_depots_sections(value: &VdfValue, keys: &mut KeySet) {
    let VdfValue::Map(entries) = value else {
        return;
    };

    for (key, child) in entries {
        if key.eq_ignore_ascii_case(DEPOTS) {
            insert_keys(child, keys);
        } else {
            collect_depots_sections(child, keys);
        }
    }
}

/// Fallback: any map whose children carry `DecryptionKey`.
fn collect_key_maps(value: &VdfValue, keys: &mut KeySet) {
    let VdfValue::Map(entries) = value else {
        return;
    };

    insert_keys(value, keys);
    for (_, child) in entries {
        collect_key_maps(child, keys);
    }
}

fn insert_keys(section: &VdfValue, keys: &mut KeySet) {
    let VdfValue::Map(entries) = section else {
        return;
    };

    for (depot, info) in entries {
        let key = info
            .get(DECRYPTION_KEY)
            .and_then(VdfValue::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty());
        if let Some(key) = key {
            keys.insert(DepotId::new(depot.trim()), key.to_string());
        }
    }
}

/// Parse a KeyValues document into a root map.
pub fn parse(text: &str) -> Result<VdfValue, VdfError> {
    let mut parser = Parser::new(text);
    let entries = parser.entries(false)?;
    Ok(VdfValue::Map(entries))
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Str(String),
    Open,
    Close,
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> VdfError {
        VdfError {
            line: self.line,
            message: message.into(),
        }
    }

    /// Parse `key value` / `key { ... }` pairs until `}` or end of input.
    fn entries(&mut self, nested: bool) -> Result<Vec<(String, VdfValue)>, VdfError> {
        let mut entries = Vec::new();

        loop {
            let key = match self.next_token()? {
                None if nested => return Err(self.error("unexpected end of input, missing '}'")),
                None => return Ok(entries),
                Some(Token::Close) if nested => return Ok(entries),
                Some(Token::Close) => return Err(self.error("unmatched '}'")),
                Some(Token::Open) => return Err(self.error("expected key, found '{'")),
                Some(Token::Str(key)) => key,
            };

            // #include / #base directives reference other files
            if key.starts_with('#') {
                if let Some(Token::Str(_)) = self.next_token()? {
                    continue;
                }
                return Err(self.error(format!("malformed directive {}", key)));
            }

            let value = match self.next_token()? {
                Some(Token::Str(value)) => VdfValue::Str(value),
                Some(Token::Open) => VdfValue::Map(self.entries(true)?),
                Some(Token::Close) | None => {
                    return Err(self.error(format!("missing value for key \"{}\"", key)))
                }
            };

            self.skip_conditional();
            entries.push((key, value));
        }
    }

    /// Skip a platform conditional such as `[$WIN32]` following a value.
    fn skip_conditional(&mut self) {
        self.skip_trivia();
        if self.chars.peek() == Some(&'[') {
            for c in self.chars.by_ref() {
                if c == ']' {
                    break;
                }
                if c == '\n' {
                    self.line += 1;
                    break;
                }
            }
        }
    }

    /// Skip whitespace and `//` comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.chars.peek() {
                Some('\n') => {
                    self.line += 1;
                    self.chars.next();
                }
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('/') => {
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    if lookahead.peek() != Some(&'/') {
                        return;
                    }
                    for c in self.chars.by_ref() {
                        if c == '\n' {
                            self.line += 1;
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, VdfError> {
        self.skip_trivia();

        let Some(&c) = self.chars.peek() else {
            return Ok(None);
        };

        match c {
            '{' => {
                self.chars.next();
                Ok(Some(Token::Open))
            }
            '}' => {
                self.chars.next();
                Ok(Some(Token::Close))
            }
            '"' => {
                self.chars.next();
                self.quoted().map(|s| Some(Token::Str(s)))
            }
            _ => Ok(Some(Token::Str(self.bare()))),
        }
    }

    fn quoted(&mut self) -> Result<String, VdfError> {
        let mut out = String::new();

        loop {
            match self.chars.next() {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(out),
                Some('\\') => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    out.push(c);
                }
            }
        }
    }

    fn bare(&mut self) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | '"') {
                break;
            }
            out.push(c);
            self.chars.next();
        }
        out
    }
}
