use core::fmt;

/// Reasons an identifier string or component triple is not a valid SCTID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatError {
    InvalidLength { len: usize },
    InvalidCharacter { byte: u8 },
    LeadingZero,
    ChecksumMismatch { expected: u8, found: u8 },
    UnknownPartition { partition: u8 },
    InvalidNamespace { namespace: u64 },
    SequenceOutOfRange { sequence: u64, min: u64, max: u64 },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { len } => write!(f, "invalid length: {len}"),
            Self::InvalidCharacter { byte } => write!(f, "invalid character: {byte:#04x}"),
            Self::LeadingZero => write!(f, "leading zero"),
            Self::ChecksumMismatch { expected, found } => {
                write!(f, "check digit mismatch: expected {expected}, found {found}")
            }
            Self::UnknownPartition { partition } => write!(f, "unknown partition: {partition:02}"),
            Self::InvalidNamespace { namespace } => write!(f, "invalid namespace: {namespace}"),
            Self::SequenceOutOfRange { sequence, min, max } => {
                write!(f, "sequence {sequence} outside {min}..={max}")
            }
        }
    }
}

impl core::error::Error for FormatError {}
