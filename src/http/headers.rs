//! Response header map with case-insensitive, unique names.

use std::fmt;

/// A case-insensitive HTTP header map holding at most one value per name.
///
/// Setting a header replaces any earlier value for the same name, whatever its
/// casing. Callers must not rely on iteration order.
///
/// # Examples
///
/// ```
/// use hubhttp::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.set("Content-Type", "text/html; charset=utf-8");
/// headers.set("content-type", "text/plain");
///
/// assert_eq!(headers.len(), 1);
/// assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with pre-allocated capacity for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Sets `name` to `value`, overwriting any existing entry for that name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.inner[idx] = (name, value),
            None => self.inner.push((name, value)),
        }
    }

    /// Sets `name` to `value` only when no entry for that name exists yet.
    ///
    /// Returns `true` if the value was inserted.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.inner.push((name, value.into()));
        true
    }

    /// Returns the value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|idx| self.inner[idx].1.as_str())
    }

    /// Removes the entry with the given name. Returns `true` if one was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(idx) => {
                self.inner.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if the map contains an entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns the number of header entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.inner.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}
