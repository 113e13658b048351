//! Symbol helpers shared between client and server.
//!
//! Symbols travel as free-form strings on the wire; both sides normalize them
//! the same way (trimmed, upper-cased) so `aapl` and ` AAPL ` name one stream.

use std::collections::BTreeSet;
use std::io::BufRead;

use crate::error::QuoteError;

/// Longest symbol accepted (covers suffixed forms such as `BRK.B` or `^GSPC`).
pub const MAX_SYMBOL_LEN: usize = 15;

/// Trait providing file parsing for symbol lists.
pub trait SymbolParser {
    /// Parses symbols from a buffered reader.
    ///
    /// Symbols may be separated by commas, whitespace or new lines. Duplicates
    /// collapse into one entry. Returns an error on the first invalid symbol.
    fn parse_from_file<R: BufRead>(reader: R) -> Result<BTreeSet<String>, QuoteError>;
}

/// Marker type implementing [`SymbolParser`] for plain text lists.
pub struct SymbolList;

impl SymbolParser for SymbolList {
    fn parse_from_file<R: BufRead>(reader: R) -> Result<BTreeSet<String>, QuoteError> {
        let mut symbols = BTreeSet::new();

        for line_result in reader.lines() {
            let line = line_result.map_err(QuoteError::Io)?;
            let trimmed_line = line.trim();
            if trimmed_line.is_empty() || trimmed_line.starts_with('#') {
                continue;
            }

            for symbol in parse_symbol_list(trimmed_line)? {
                symbols.insert(symbol);
            }
        }
        Ok(symbols)
    }
}

/// Normalizes a raw symbol: trims whitespace and quotes, upper-cases it and
/// checks the character set.
pub fn normalize_symbol(raw: &str) -> Result<String, QuoteError> {
    let trimmed = raw.trim().trim_matches('"').trim();
    if trimmed.is_empty() || trimmed.len() > MAX_SYMBOL_LEN {
        return Err(QuoteError::InvalidSymbol(raw.to_string()));
    }
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=' | '/'));
    if !valid {
        return Err(QuoteError::InvalidSymbol(raw.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Parses a comma/whitespace separated list like `"aapl, MSFT tsla"`.
pub fn parse_symbol_list(text: &str) -> Result<Vec<String>, QuoteError> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            normalize_symbol(part).map_err(|e| QuoteError::ParseSymbols(e.to_string()))
        })
        .collect()
}
