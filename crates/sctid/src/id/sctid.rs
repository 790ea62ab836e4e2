use crate::{
    BucketKey, Category, FormatError, Namespace, PartitionId, verhoeff_check_digit,
    verhoeff_is_valid,
};
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};

/// Inclusive range of item (sequence) numbers available to a bucket.
///
/// The bounds keep every identifier within 6..=18 digits: short-form ids need
/// at least a three digit item, long-form ids spend ten digits on namespace,
/// partition and check digit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SequenceSpace {
    pub first: u64,
    pub last: u64,
}

impl SequenceSpace {
    pub const CORE: Self = Self {
        first: 100,
        last: 999_999_999_999_999,
    };
    pub const EXTENSION: Self = Self {
        first: 1,
        last: 99_999_999,
    };

    pub const fn for_namespace(namespace: Namespace) -> Self {
        if namespace.is_core() {
            Self::CORE
        } else {
            Self::EXTENSION
        }
    }

    pub const fn contains(self, sequence: u64) -> bool {
        sequence >= self.first && sequence <= self.last
    }

    pub const fn capacity(self) -> u64 {
        self.last - self.first + 1
    }
}

/// A decoded, checksum-valid SNOMED CT identifier.
///
/// Short form (core): `<item><partition><check>`.
/// Long form (extension): `<item><namespace:7><partition><check>`.
///
/// Values of this type can only be obtained from [`SctId::encode`] or
/// [`SctId::decode`], so every instance renders to a valid identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SctId {
    sequence: u64,
    namespace: Namespace,
    partition: PartitionId,
    check_digit: u8,
}

impl SctId {
    pub const MIN_LEN: usize = 6;
    pub const MAX_LEN: usize = 18;

    /// Builds the identifier for `(namespace, partition, sequence)` and
    /// computes its check digit.
    ///
    /// # Errors
    /// - [`FormatError::InvalidNamespace`] if the partition's core/extension
    ///   flag disagrees with the namespace.
    /// - [`FormatError::SequenceOutOfRange`] if `sequence` lies outside the
    ///   namespace's [`SequenceSpace`].
    pub fn encode(
        namespace: Namespace,
        partition: PartitionId,
        sequence: u64,
    ) -> Result<Self, FormatError> {
        if partition.is_extension() == namespace.is_core() {
            return Err(FormatError::InvalidNamespace {
                namespace: namespace.into(),
            });
        }
        let space = SequenceSpace::for_namespace(namespace);
        if !space.contains(sequence) {
            return Err(FormatError::SequenceOutOfRange {
                sequence,
                min: space.first,
                max: space.last,
            });
        }
        let mut id = Self {
            sequence,
            namespace,
            partition,
            check_digit: 0,
        };
        id.check_digit = verhoeff_check_digit(id.body().as_bytes());
        Ok(id)
    }

    /// Parses and validates an identifier string.
    ///
    /// # Errors
    /// Rejects wrong lengths, non-digits, a leading zero, an unknown
    /// partition, a malformed namespace, and check digit mismatches.
    pub fn decode(id: &str) -> Result<Self, FormatError> {
        let bytes = id.as_bytes();
        let len = bytes.len();
        if !(Self::MIN_LEN..=Self::MAX_LEN).contains(&len) {
            return Err(FormatError::InvalidLength { len });
        }
        if let Some(&byte) = bytes.iter().find(|b| !b.is_ascii_digit()) {
            return Err(FormatError::InvalidCharacter { byte });
        }
        if bytes[0] == b'0' {
            return Err(FormatError::LeadingZero);
        }
        let found = bytes[len - 1] - b'0';
        if !verhoeff_is_valid(bytes) {
            return Err(FormatError::ChecksumMismatch {
                expected: verhoeff_check_digit(&bytes[..len - 1]),
                found,
            });
        }

        let partition = PartitionId::new(digits_value(&bytes[len - 3..len - 1]) as u8)?;
        let (namespace, item) = if partition.is_extension() {
            let suffix = Namespace::WIDTH + PartitionId::WIDTH + 1;
            if len <= suffix {
                return Err(FormatError::InvalidLength { len });
            }
            let namespace = Namespace::new(digits_value(&bytes[len - suffix..len - 3]))?;
            (namespace, &bytes[..len - suffix])
        } else {
            (Namespace::CORE, &bytes[..len - 3])
        };

        let sequence = digits_value(item);
        let space = SequenceSpace::for_namespace(namespace);
        if !space.contains(sequence) {
            return Err(FormatError::SequenceOutOfRange {
                sequence,
                min: space.first,
                max: space.last,
            });
        }

        Ok(Self {
            sequence,
            namespace,
            partition,
            check_digit: found,
        })
    }

    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    pub const fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub const fn partition(&self) -> PartitionId {
        self.partition
    }

    pub const fn check_digit(&self) -> u8 {
        self.check_digit
    }

    pub fn category(&self) -> Category {
        self.partition.category()
    }

    /// The allocation bucket this identifier's sequence belongs to.
    pub fn bucket(&self) -> BucketKey {
        BucketKey::new(self.namespace, self.category())
    }

    /// Every digit except the check digit.
    fn body(&self) -> String {
        if self.namespace.is_core() {
            format!("{}{}", self.sequence, self.partition)
        } else {
            format!(
                "{}{:07}{}",
                self.sequence,
                self.namespace.get(),
                self.partition
            )
        }
    }
}

fn digits_value(digits: &[u8]) -> u64 {
    digits
        .iter()
        .fold(0_u64, |acc, d| acc * 10 + u64::from(d - b'0'))
}

impl fmt::Display for SctId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.body(), self.check_digit)
    }
}

impl FromStr for SctId {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl TryFrom<String> for SctId {
    type Error = FormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::decode(&value)
    }
}

impl From<SctId> for String {
    fn from(id: SctId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ext() -> Namespace {
        Namespace::new(1_000_154).unwrap()
    }

    #[test]
    fn encodes_known_core_identifiers() {
        let concept = Category::Concept.partition(Namespace::CORE);
        assert_eq!(
            SctId::encode(Namespace::CORE, concept, 138_875).unwrap().to_string(),
            "138875005"
        );
        assert_eq!(
            SctId::encode(Namespace::CORE, concept, 900_000_000_000_003)
                .unwrap()
                .to_string(),
            "900000000000003001"
        );
    }

    #[test]
    fn encodes_long_form_with_namespace() {
        let partition = Category::Concept.partition(ext());
        let id = SctId::encode(ext(), partition, 1).unwrap();
        assert_eq!(id.to_string(), "11000154102");
        let description = Category::Description.partition(ext());
        assert_eq!(
            SctId::encode(ext(), description, 1).unwrap().to_string(),
            "11000154118"
        );
    }

    #[test]
    fn decode_reverses_encode() {
        let mut seen = HashSet::new();
        for namespace in [Namespace::CORE, ext()] {
            let space = SequenceSpace::for_namespace(namespace);
            for category in Category::ALL {
                let partition = category.partition(namespace);
                for sequence in [space.first, space.first + 1, 4_242, 7_777_777, space.last] {
                    let id = SctId::encode(namespace, partition, sequence).unwrap();
                    let text = id.to_string();
                    assert!((SctId::MIN_LEN..=SctId::MAX_LEN).contains(&text.len()));
                    let decoded: SctId = text.parse().unwrap();
                    assert_eq!(decoded, id);
                    assert_eq!(decoded.namespace(), namespace);
                    assert_eq!(decoded.partition(), partition);
                    assert_eq!(decoded.sequence(), sequence);
                    assert_eq!(decoded.category(), category);
                    assert!(seen.insert(text), "encode must be injective");
                }
            }
        }
    }

    #[test]
    fn encode_rejects_bad_inputs() {
        let core_concept = Category::Concept.partition(Namespace::CORE);
        let ext_concept = Category::Concept.partition(ext());
        assert!(matches!(
            SctId::encode(Namespace::CORE, core_concept, 99),
            Err(FormatError::SequenceOutOfRange { sequence: 99, .. })
        ));
        assert!(matches!(
            SctId::encode(ext(), ext_concept, 100_000_000),
            Err(FormatError::SequenceOutOfRange { .. })
        ));
        assert!(matches!(
            SctId::encode(ext(), core_concept, 1),
            Err(FormatError::InvalidNamespace { .. })
        ));
        assert!(matches!(
            SctId::encode(Namespace::CORE, ext_concept, 1_000),
            Err(FormatError::InvalidNamespace { namespace: 0 })
        ));
    }

    #[test]
    fn decode_rejects_malformed_strings() {
        assert_eq!(
            SctId::decode("12345"),
            Err(FormatError::InvalidLength { len: 5 })
        );
        assert_eq!(
            SctId::decode("1234567890123456789"),
            Err(FormatError::InvalidLength { len: 19 })
        );
        assert_eq!(
            SctId::decode("13887a005"),
            Err(FormatError::InvalidCharacter { byte: b'a' })
        );
        assert_eq!(SctId::decode("038875005"), Err(FormatError::LeadingZero));
        assert_eq!(
            SctId::decode("138875006"),
            Err(FormatError::ChecksumMismatch {
                expected: 5,
                found: 6
            })
        );
    }

    #[test]
    fn serde_uses_the_decimal_string() {
        let id: SctId = "404684003".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"404684003\"");
        let back: SctId = serde_json::from_str("\"404684003\"").unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<SctId>("\"404684004\"").is_err());
    }

    #[test]
    fn bucket_follows_namespace_and_category() {
        let id: SctId = "11000154118".parse().unwrap();
        assert_eq!(id.bucket(), BucketKey::new(ext(), Category::Description));
        assert_eq!(id.sequence(), 1);
    }
}
