//! Declarative field constraints applied before a record reaches a store

use crate::error::{Error, Result};

/// Accumulates constraint violations for one payload
#[derive(Debug, Default)]
pub struct FieldCheck {
    violations: Vec<String>,
}

impl FieldCheck {
    /// Start a check with no violations
    pub fn new() -> Self {
        Self::default()
    }

    /// Required text no longer than `max` characters
    #[must_use]
    pub fn text(mut self, field: &str, value: &str, max: usize) -> Self {
        if value.trim().is_empty() {
            self.violations.push(format!("{field} is required"));
        } else if value.chars().count() > max {
            self.violations
                .push(format!("{field} must be at most {max} characters"));
        }
        self
    }

    /// Finite floating point amount
    #[must_use]
    pub fn finite(mut self, field: &str, value: f64) -> Self {
        if !value.is_finite() {
            self.violations.push(format!("{field} must be a finite number"));
        }
        self
    }

    /// Strictly positive identifier reference
    #[must_use]
    pub fn positive(mut self, field: &str, value: i64) -> Self {
        if value <= 0 {
            self.violations.push(format!("{field} must be positive"));
        }
        self
    }

    /// Join collected violations into one `InvalidInput` error
    pub fn finish(self) -> Result<()> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(self.violations.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_every_violation() {
        let err = FieldCheck::new()
            .text("code", "", 10)
            .text("name", "abcdef", 3)
            .finite("amount", f64::NAN)
            .positive("ref", 0)
            .finish()
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("code is required"));
        assert!(message.contains("name must be at most 3 characters"));
        assert!(message.contains("amount must be a finite number"));
        assert!(message.contains("ref must be positive"));
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        assert!(FieldCheck::new().text("name", "Peñalosa", 8).finish().is_ok());
    }
}
