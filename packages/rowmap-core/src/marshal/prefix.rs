use std::fmt;

const SEPARATOR: char = '_';

/// Column name prefix of nested and expanded values.
///
/// The empty prefix leaves names untouched; any other prefix joins with `_`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Prefix(String);

impl Prefix {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(segment: impl Into<String>) -> Self {
        Prefix(segment.into())
    }

    /// Column name of `name` under this prefix.
    pub fn apply(&self, name: &str) -> String {
        if self.0.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", self.0, SEPARATOR, name)
        }
    }

    /// Prefix of the values nested under `name`.
    pub fn append(&self, name: &str) -> Prefix {
        Prefix(self.apply(name))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
