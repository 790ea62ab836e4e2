use crate::{FormatError, Namespace};
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};

/// Logical component kind an identifier is issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Concept,
    Description,
    Relationship,
}

struct PartitionRow {
    category: Category,
    core: u8,
    extension: u8,
}

// Indexed by `Category` discriminant. Adding a category is a new variant plus
// a row here.
const PARTITION_TABLE: [PartitionRow; 3] = [
    PartitionRow {
        category: Category::Concept,
        core: 0,
        extension: 10,
    },
    PartitionRow {
        category: Category::Description,
        core: 1,
        extension: 11,
    },
    PartitionRow {
        category: Category::Relationship,
        core: 2,
        extension: 12,
    },
];

impl Category {
    pub const ALL: [Self; 3] = [Self::Concept, Self::Description, Self::Relationship];

    /// The partition identifiers of this category carry in `namespace`.
    pub fn partition(self, namespace: Namespace) -> PartitionId {
        let row = &PARTITION_TABLE[self as usize];
        debug_assert_eq!(row.category, self);
        if namespace.is_core() {
            PartitionId(row.core)
        } else {
            PartitionId(row.extension)
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Concept => "CONCEPT",
            Self::Description => "DESCRIPTION",
            Self::Relationship => "RELATIONSHIP",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// Two-digit code embedded in every identifier, encoding the category and
/// whether the identifier is core or extension (long form).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PartitionId(u8);

impl PartitionId {
    /// Digits a partition occupies inside an identifier.
    pub const WIDTH: usize = 2;

    pub fn new(raw: u8) -> Result<Self, FormatError> {
        PARTITION_TABLE
            .iter()
            .any(|row| row.core == raw || row.extension == raw)
            .then_some(Self(raw))
            .ok_or(FormatError::UnknownPartition { partition: raw })
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Extension partitions imply a seven-digit namespace in the identifier.
    pub const fn is_extension(self) -> bool {
        self.0 / 10 == 1
    }

    pub fn category(self) -> Category {
        // Row `i` holds core partition `i` and extension partition `10 + i`.
        let row = &PARTITION_TABLE[usize::from(self.0 % 10)];
        debug_assert!(row.core == self.0 || row.extension == self.0);
        row.category
    }
}

impl TryFrom<u8> for PartitionId {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PartitionId> for u8 {
    fn from(p: PartitionId) -> Self {
        p.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}
