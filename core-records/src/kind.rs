use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MappingError;

/// Level of a record in the registry hierarchy.
///
/// A Mine owns Collections; a Collection owns Documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SchemaKind {
    Mine,
    Collection,
    Document,
}

impl SchemaKind {
    pub const ALL: [SchemaKind; 3] = [SchemaKind::Mine, SchemaKind::Collection, SchemaKind::Document];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Mine => "Mine",
            SchemaKind::Collection => "Collection",
            SchemaKind::Document => "Document",
        }
    }

    /// Kind of the owning record, if any.
    pub fn parent(&self) -> Option<SchemaKind> {
        match self {
            SchemaKind::Mine => None,
            SchemaKind::Collection => Some(SchemaKind::Mine),
            SchemaKind::Document => Some(SchemaKind::Collection),
        }
    }
}

impl FromStr for SchemaKind {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Mine" => Ok(SchemaKind::Mine),
            "Collection" => Ok(SchemaKind::Collection),
            "Document" => Ok(SchemaKind::Document),
            _ => Err(MappingError::InvalidKind(s.to_string())),
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_through_str() {
        for kind in SchemaKind::ALL {
            assert_eq!(kind.as_str().parse::<SchemaKind>().unwrap(), kind);
        }
        assert!("mine".parse::<SchemaKind>().is_err());
    }

    #[test]
    fn test_parent_chain() {
        assert_eq!(SchemaKind::Mine.parent(), None);
        assert_eq!(SchemaKind::Collection.parent(), Some(SchemaKind::Mine));
        assert_eq!(SchemaKind::Document.parent(), Some(SchemaKind::Collection));
    }
}
