//! Product identifiers.
//!
//! Products are opaque uppercase strings (hyphen allowed), not a closed enum —
//! clients must accept identifiers they don't recognize without aborting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The canonical product set this deployment trades. Frozen here per DESIGN.md;
/// unknown tokens received over the wire are still accepted and carried opaquely.
pub const CANONICAL_PRODUCTS: &[&str] = &[
    "FOSFO",
    "GUACA",
    "PITA",
    "PALTA-OIL",
    "CASCAR-ALLOY",
    "GTRON",
    "H-GUACA",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Product(pub String);

impl Product {
    pub fn new(s: impl Into<String>) -> Self {
        Product(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Uppercase ASCII letters, digits and hyphens only, non-empty.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-')
    }

    pub fn is_canonical(&self) -> bool {
        CANONICAL_PRODUCTS.contains(&self.0.as_str())
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Product {
    fn from(s: &str) -> Self {
        Product(s.to_string())
    }
}
