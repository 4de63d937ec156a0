//! Text encoding shared by model and index dumps.
//!
//! Floats are written in scientific notation with 17 significant digits,
//! which is enough for every `f64` to parse back to the identical bit
//! pattern. Readers work on whitespace-separated tokens, so line layout is
//! cosmetic.

use std::str::{FromStr, SplitWhitespace};

use crate::error::{Result, TdeError};

/// Format a float with the fixed dump precision.
#[must_use]
pub fn format_float(value: f64) -> String {
    format!("{value:.16e}")
}

/// Format a row of floats separated by `sep`.
#[must_use]
pub fn format_row(values: &[f64], sep: char) -> String {
    let mut out = String::with_capacity(values.len() * 24);
    for (i, &v) in values.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        out.push_str(&format_float(v));
    }
    out
}

/// Sequential reader over whitespace-separated tokens.
///
/// Every failure is reported as [`TdeError::CorruptModel`] naming the field
/// that was being read.
#[derive(Debug)]
pub struct Tokens<'a> {
    inner: SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    /// Tokenize `text`.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self {
            inner: text.split_whitespace(),
        }
    }

    /// Next raw token.
    ///
    /// # Errors
    ///
    /// Returns an error on end of input.
    pub fn next_token(&mut self, field: &str) -> Result<&'a str> {
        self.inner
            .next()
            .ok_or_else(|| TdeError::corrupt_model(format!("unexpected end of input reading {field}")))
    }

    /// Parse the next token as `T`.
    ///
    /// # Errors
    ///
    /// Returns an error on end of input or a malformed token.
    pub fn parse<T: FromStr>(&mut self, field: &str) -> Result<T> {
        let token = self.next_token(field)?;
        token
            .parse()
            .map_err(|_| TdeError::corrupt_model(format!("malformed {field}: {token:?}")))
    }

    /// Next token as a `usize`.
    ///
    /// # Errors
    ///
    /// Returns an error on end of input or a malformed token.
    pub fn next_usize(&mut self, field: &str) -> Result<usize> {
        self.parse(field)
    }

    /// Next token as an `f64`.
    ///
    /// # Errors
    ///
    /// Returns an error on end of input or a malformed token.
    pub fn next_f64(&mut self, field: &str) -> Result<f64> {
        self.parse(field)
    }

    /// Read `n` floats into a new vector.
    ///
    /// # Errors
    ///
    /// Returns an error on end of input or a malformed token.
    pub fn next_floats(&mut self, n: usize, field: &str) -> Result<Vec<f64>> {
        (0..n).map(|_| self.next_f64(field)).collect()
    }

    /// Consume a literal keyword.
    ///
    /// # Errors
    ///
    /// Returns an error if the next token differs from `keyword`.
    pub fn expect(&mut self, keyword: &str) -> Result<()> {
        let token = self.next_token(keyword)?;
        if token == keyword {
            Ok(())
        } else {
            Err(TdeError::corrupt_model(format!(
                "expected {keyword:?}, found {token:?}"
            )))
        }
    }

    /// Whether all tokens have been consumed.
    pub fn is_exhausted(&mut self) -> bool {
        self.inner.clone().next().is_none()
    }
}
