use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeError};

/// Ordered tuple of labels identifying a column.
///
/// Ordering is lexicographic over the labels, with a shorter prefix sorting
/// before any header it is a prefix of. A header may have no labels at all.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Header(Vec<String>);

impl Header {
    /// Create a header from any sequence of labels.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().map(Into::into).collect())
    }

    /// The empty header.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build a header from labels that may be missing.
    ///
    /// Fails with [`TypeError::InvalidHeader`] if any label is `None`.
    pub fn try_from_labels(labels: Vec<Option<String>>) -> Result<Self> {
        let mut out = Vec::with_capacity(labels.len());
        for (position, label) in labels.into_iter().enumerate() {
            match label {
                Some(label) => out.push(label),
                None => {
                    return Err(TypeError::InvalidHeader(format!(
                        "missing label at position {position}"
                    )))
                }
            }
        }
        Ok(Self(out))
    }

    /// Label at `position`, or `None` past the end.
    pub fn get(&self, position: usize) -> Option<&str> {
        self.0.get(position).map(String::as_str)
    }

    /// All labels in order.
    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A new header with `label` appended.
    pub fn child(&self, label: impl Into<String>) -> Self {
        let mut labels = self.0.clone();
        labels.push(label.into());
        Self(labels)
    }

    /// Whether `other` starts with every label of this header.
    pub fn is_prefix_of(&self, other: &Header) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl From<&str> for Header {
    fn from(label: &str) -> Self {
        Self(vec![label.to_string()])
    }
}

impl From<String> for Header {
    fn from(label: String) -> Self {
        Self(vec![label])
    }
}

impl From<&String> for Header {
    fn from(label: &String) -> Self {
        Self(vec![label.clone()])
    }
}

impl From<Vec<String>> for Header {
    fn from(labels: Vec<String>) -> Self {
        Self(labels)
    }
}

impl From<&[&str]> for Header {
    fn from(labels: &[&str]) -> Self {
        Self::new(labels.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Header {
    fn from(labels: [&str; N]) -> Self {
        Self::new(labels)
    }
}

impl From<&Header> for Header {
    fn from(header: &Header) -> Self {
        header.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ---- Test 1: equality follows labels ----
    #[test]
    fn equality_is_label_equality() {
        assert_eq!(Header::from(["A", "B"]), Header::new(vec!["A", "B"]));
        assert_ne!(Header::from(["A", "B"]), Header::from(["B", "A"]));
        assert_eq!(Header::empty(), Header::new(Vec::<String>::new()));
    }

    // ---- Test 2: shorter prefix sorts first ----
    #[test]
    fn prefix_sorts_first() {
        let a = Header::from("A");
        let ab = Header::from(["A", "B"]);
        let b = Header::from("B");
        assert!(Header::empty() < a);
        assert!(a < ab);
        assert!(ab < b);
        assert!(a.is_prefix_of(&ab));
        assert!(!ab.is_prefix_of(&a));
    }

    // ---- Test 3: missing labels are rejected ----
    #[test]
    fn missing_label_is_invalid() {
        let err = Header::try_from_labels(vec![Some("A".into()), None]).unwrap_err();
        assert!(matches!(err, TypeError::InvalidHeader(_)));
        let ok = Header::try_from_labels(vec![Some("A".into())]).unwrap();
        assert_eq!(ok, Header::from("A"));
    }

    // ---- Test 4: indexing past the end yields no label ----
    #[test]
    fn get_past_end() {
        let h = Header::from(["A", "B"]);
        assert_eq!(h.get(0), Some("A"));
        assert_eq!(h.get(1), Some("B"));
        assert_eq!(h.get(2), None);
        assert_eq!(h.to_string(), "[A, B]");
    }

    proptest! {
        #[test]
        fn ordering_matches_label_vectors(
            a in proptest::collection::vec("[a-c]{0,2}", 0..4),
            b in proptest::collection::vec("[a-c]{0,2}", 0..4),
        ) {
            let ha = Header::from(a.clone());
            let hb = Header::from(b.clone());
            prop_assert_eq!(ha.cmp(&hb), a.cmp(&b));
        }
    }
}
