//! Remote key formatting
//!
//! Maps `(index name, key, value)` to the flat key under which the remote
//! store keeps the entity-id set of that index entry.
//!
//! The three components are joined with [`KEY_DELIMITER`] and nothing is
//! escaped. A component containing the delimiter can collide with another
//! entry (`("a:b", "c")` and `("a", "b:c")` both yield `idx:a:b:c`).
//! Callers must not put the delimiter inside a component. This is not
//! checked, because the formatted keys are durable and changing the format
//! would orphan existing remote data.

/// Separator between the components of a remote key
pub const KEY_DELIMITER: char = ':';

/// Formats remote keys for index entries
///
/// Deterministic and stable across restarts: the output is a durable
/// storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFormatter {
    delimiter: char,
}

impl KeyFormatter {
    /// Formatter using [`KEY_DELIMITER`]
    pub const fn new() -> Self {
        Self {
            delimiter: KEY_DELIMITER,
        }
    }

    /// Delimiter placed between components
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Remote key for one index entry
    ///
    /// # Examples
    ///
    /// ```
    /// use kvindex_core::KeyFormatter;
    ///
    /// let key = KeyFormatter::new().format("people", "name", "alice");
    /// assert_eq!(key, "people:name:alice");
    /// ```
    pub fn format(&self, index_name: &str, key: &str, value: &str) -> String {
        let mut out = String::with_capacity(index_name.len() + key.len() + value.len() + 2);
        out.push_str(index_name);
        out.push(self.delimiter);
        out.push_str(key);
        out.push(self.delimiter);
        out.push_str(value);
        out
    }
}

impl Default for KeyFormatter {
    fn default() -> Self {
        Self::new()
    }
}
