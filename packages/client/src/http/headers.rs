//! Ordered, case-preserving header containers.
//!
//! Browsers are fingerprinted on the exact order headers appear on the wire,
//! so the client never stores headers in a hash map: [`OrderedHeaders`] is an
//! insertion-ordered sequence of `(name, value)` pairs with a case-folded
//! secondary index. Duplicate names are allowed and keep their positions.

use std::fmt;

use http::{HeaderMap, HeaderName, HeaderValue};

/// The four HTTP/2 & HTTP/3 pseudo-headers, used to spell an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoId {
    Method,
    Authority,
    Scheme,
    Path,
}

impl PseudoId {
    pub fn name(self) -> &'static str {
        match self {
            PseudoId::Method => ":method",
            PseudoId::Authority => ":authority",
            PseudoId::Scheme => ":scheme",
            PseudoId::Path => ":path",
        }
    }

    fn short(self) -> char {
        match self {
            PseudoId::Method => 'm',
            PseudoId::Authority => 'a',
            PseudoId::Scheme => 's',
            PseudoId::Path => 'p',
        }
    }
}

/// A permutation of the pseudo-header emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PseudoOrder(pub [PseudoId; 4]);

impl Default for PseudoOrder {
    /// The order most HTTP/2 stacks emit: `:method`, `:authority`,
    /// `:scheme`, `:path`.
    fn default() -> Self {
        PseudoOrder([
            PseudoId::Method,
            PseudoId::Authority,
            PseudoId::Scheme,
            PseudoId::Path,
        ])
    }
}

impl PseudoOrder {
    /// Chrome's pseudo-header order.
    pub fn masp() -> Self {
        Self::default()
    }

    /// Firefox's pseudo-header order: `:method`, `:path`, `:authority`,
    /// `:scheme`.
    pub fn mpas() -> Self {
        PseudoOrder([
            PseudoId::Method,
            PseudoId::Path,
            PseudoId::Authority,
            PseudoId::Scheme,
        ])
    }

    /// The `m,a,s,p`-style rendering used in Akamai fingerprint text.
    pub fn akamai(&self) -> String {
        let mut out = String::with_capacity(7);
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push(id.short());
        }
        out
    }
}

/// Insertion-ordered multi-map of header `(name, value)` pairs.
///
/// Lookup is case-insensitive; iteration and wire encoding preserve both the
/// insertion order and the original spelling of each name.
#[derive(Clone, Default)]
pub struct OrderedHeaders {
    entries: Vec<(String, String)>,
}

impl OrderedHeaders {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a pair, keeping any existing entries with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every entry named `name` (case-insensitive) with a single
    /// pair at the position of the first occurrence, or append when absent.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let mut slot = None;
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].0.eq_ignore_ascii_case(&name) {
                if slot.is_none() {
                    slot = Some(i);
                    i += 1;
                } else {
                    self.entries.remove(i);
                }
            } else {
                i += 1;
            }
        }
        match slot {
            Some(i) => self.entries[i] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// First value for `name`, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove every entry named `name`; returns true when any was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Merge `defaults` below the existing entries: a default is appended
    /// only when no entry with its name is present.
    pub fn merge_defaults(&mut self, defaults: &OrderedHeaders) {
        for (name, value) in defaults.iter() {
            if !self.contains(name) {
                self.append(name, value);
            }
        }
    }

    /// Convert to an `http::HeaderMap`, appending in order. Names that are
    /// not valid header names are dropped with a warning.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in self.iter() {
            let parsed = HeaderName::from_bytes(name.as_bytes())
                .ok()
                .zip(HeaderValue::from_str(value).ok());
            match parsed {
                Some((name, value)) => {
                    map.append(name, value);
                }
                None => tracing::warn!(header = name, "dropping malformed header"),
            }
        }
        map
    }
}

impl fmt::Debug for OrderedHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(n, v)| (n, v)))
            .finish()
    }
}

impl<'a> IntoIterator for &'a OrderedHeaders {
    type Item = (&'a str, &'a str);
    type IntoIter = std::vec::IntoIter<(&'a str, &'a str)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OrderedHeaders {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = OrderedHeaders::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order_and_duplicates() {
        let mut headers = OrderedHeaders::new();
        headers.append("Accept", "text/html");
        headers.append("X-Custom", "1");
        headers.append("accept", "application/json");

        let order: Vec<_> = headers.iter().collect();
        assert_eq!(
            order,
            vec![
                ("Accept", "text/html"),
                ("X-Custom", "1"),
                ("accept", "application/json"),
            ]
        );
        assert_eq!(headers.get_all("ACCEPT").count(), 2);
    }

    #[test]
    fn set_collapses_in_place() {
        let mut headers = OrderedHeaders::new();
        headers.append("A", "1");
        headers.append("B", "2");
        headers.append("a", "3");
        headers.set("A", "4");

        let order: Vec<_> = headers.iter().collect();
        assert_eq!(order, vec![("A", "4"), ("B", "2")]);
    }

    #[test]
    fn pseudo_order_akamai_rendering() {
        assert_eq!(PseudoOrder::masp().akamai(), "m,a,s,p");
        assert_eq!(PseudoOrder::mpas().akamai(), "m,p,a,s");
    }
}
