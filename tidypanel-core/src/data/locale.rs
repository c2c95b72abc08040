//! Explicit number/date locale for the coercion engine.
//!
//! Nothing here reads the process environment: the same cell text and the
//! same `Locale` always produce the same result.

use serde::{Deserialize, Serialize};

/// Cell texts treated as a missing measurement.
const NULL_TOKENS: &[&str] = &["na", "n/a", "nan", "null", "none", "-", ".", ".."];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locale {
    pub decimal_separator: char,
    pub thousands_separator: Option<char>,
    /// Extra `chrono` date formats tried after ISO (e.g. `%d/%m/%Y`).
    pub date_formats: Vec<String>,
}

impl Default for Locale {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Outcome of parsing one value cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberCell {
    /// Blank or a null token.
    Empty,
    Value(f64),
    /// Non-empty text that is not a finite number.
    Invalid,
}

impl Locale {
    /// `.` decimals, no grouping, ISO dates only.
    pub fn canonical() -> Self {
        Self {
            decimal_separator: '.',
            thousands_separator: None,
            date_formats: Vec::new(),
        }
    }

    /// `1.234,5` numbers and day-first dates.
    pub fn day_first_comma() -> Self {
        Self {
            decimal_separator: ',',
            thousands_separator: Some('.'),
            date_formats: vec!["%d/%m/%Y".to_string(), "%d-%m-%Y".to_string()],
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.thousands_separator == Some(self.decimal_separator) {
            return Err(format!(
                "decimal and thousands separators are both '{}'",
                self.decimal_separator
            ));
        }
        if self.decimal_separator.is_ascii_digit() || self.decimal_separator == '-' {
            return Err(format!(
                "'{}' cannot be a decimal separator",
                self.decimal_separator
            ));
        }
        Ok(())
    }

    pub fn parse_number(&self, raw: &str) -> NumberCell {
        let trimmed = raw.trim();
        if trimmed.is_empty() || NULL_TOKENS.iter().any(|t| trimmed.eq_ignore_ascii_case(t)) {
            return NumberCell::Empty;
        }

        let mut text: String = match self.thousands_separator {
            Some(sep) => trimmed.chars().filter(|c| *c != sep).collect(),
            None => trimmed.to_string(),
        };
        if self.decimal_separator != '.' {
            if text.contains('.') {
                return NumberCell::Invalid;
            }
            text = text.replace(self.decimal_separator, ".");
        }

        match text.parse::<f64>() {
            Ok(v) if v.is_finite() => NumberCell::Value(v),
            _ => NumberCell::Invalid,
        }
    }
}
