use std::fmt;

use serde::{Deserialize, Serialize};

/// How a row index is resolved against the indexes a column actually holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexRelation {
    /// Exactly the given index.
    #[default]
    At,
    /// The given index, or the nearest populated index below it.
    AtOrBefore,
    /// The given index, or the nearest populated index above it.
    AtOrAfter,
    /// The nearest populated index strictly below the given one.
    Before,
    /// The nearest populated index strictly above the given one.
    After,
}

impl IndexRelation {
    /// Whether this relation only ever matches the exact index.
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::At)
    }
}

impl fmt::Display for IndexRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::At => "at",
            Self::AtOrBefore => "at or before",
            Self::AtOrAfter => "at or after",
            Self::Before => "before",
            Self::After => "after",
        };
        f.write_str(s)
    }
}
