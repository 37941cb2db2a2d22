use std::{error::Error, fmt::Display};

#[derive(Debug, PartialEq)]
pub enum PIRError {
    // Configuration
    InvalidElementByteLength,
    InvalidNumberOfSets,
    DatabaseNotDivisibleIntoChunks { db_num_elems: usize, set_num_elems: usize },
    EmptyUniverse,
    UnsupportedNumberOfDpfPoints(u64),
    PermutationSizeTooLarge(usize),
    UnexpectedBufferLength { expected: usize, actual: usize },
    DatabaseLengthNotMultipleOfRowLength { db_len: usize, row_len: usize },

    // Bounds
    RowOffsetOutOfBounds { offset: u64, block_len: usize, db_len: usize },
    RowIndexOutOfBounds { index: usize, num_rows: usize },
    PermutationEntryOutOfRange { entry: u32, perm_size: usize },
    BitVectorTooShort { num_rows: usize, num_bits: usize },
    DomainPointOutOfRange { position: usize, domain: usize },
    ArithmeticOverflowComputingOffset,

    // External collaborators
    PuncturableSetEvaluationFailed(String),
    UnexpectedPuncturedSetSize { expected: usize, actual: usize },
    DpfEvaluationFailed(String),
}

impl Display for PIRError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidElementByteLength => write!(f, "Database element byte length must be non-zero."),
            Self::InvalidNumberOfSets => write!(f, "Number of sets (chunks) must be non-zero."),
            Self::DatabaseNotDivisibleIntoChunks { db_num_elems, set_num_elems } => {
                write!(f, "Database of {} elements can't be split into {} equal chunks.", db_num_elems, set_num_elems)
            }
            Self::EmptyUniverse => write!(f, "Universe of a puncturable set must be non-empty."),
            Self::UnsupportedNumberOfDpfPoints(num_points) => write!(f, "Only single-point DPFs are supported, requested '{}' points.", num_points),
            Self::PermutationSizeTooLarge(size) => write!(f, "Permutation of size '{}' can't be indexed with 32-bit entries.", size),
            Self::UnexpectedBufferLength { expected, actual } => write!(f, "Expected a buffer of {} elements, found {}.", expected, actual),
            Self::DatabaseLengthNotMultipleOfRowLength { db_len, row_len } => {
                write!(f, "Database of {} bytes is not a whole number of {} -byte rows.", db_len, row_len)
            }

            Self::RowOffsetOutOfBounds { offset, block_len, db_len } => {
                write!(f, "Reading {} bytes at offset {} overruns database of {} bytes.", block_len, offset, db_len)
            }
            Self::RowIndexOutOfBounds { index, num_rows } => write!(f, "Row index {} is outside a database of {} rows.", index, num_rows),
            Self::PermutationEntryOutOfRange { entry, perm_size } => write!(f, "Permutation entry {} is outside [0, {}).", entry, perm_size),
            Self::BitVectorTooShort { num_rows, num_bits } => write!(f, "Bit vector of {} bits can't index {} rows.", num_bits, num_rows),
            Self::DomainPointOutOfRange { position, domain } => write!(f, "Expanded share position {} is outside a domain of {} blocks.", position, domain),
            Self::ArithmeticOverflowComputingOffset => write!(f, "Encountered arithmetic overflow while computing a row offset."),

            Self::PuncturableSetEvaluationFailed(e) => write!(f, "Puncturable set evaluation failed with: {}", e),
            Self::UnexpectedPuncturedSetSize { expected, actual } => write!(f, "Punctured set evaluated to {} elements, expected {}.", actual, expected),
            Self::DpfEvaluationFailed(e) => write!(f, "DPF key expansion failed with: {}", e),
        }
    }
}

impl Error for PIRError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}
