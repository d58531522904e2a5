use crate::types::word::Word;
use wordvm_derive::Error;

/// Errors surfaced to the caller.
///
/// Runtime faults (`OOG`, `OOB`, …) are NOT errors: they are status words in
/// a well-formed returned state. An error here means the wire contract
/// itself was violated (malformed flat input, corrupt transport encoding)
/// or a toolchain step failed (assembly, file I/O).
#[derive(Debug, Error)]
pub enum VmError {
    /// Flat input ended before its declared content.
    #[error("flat state truncated at word {offset}: {needed} more words declared than present")]
    Truncated { offset: usize, needed: usize },
    /// A length field cannot be represented on this host.
    #[error("length field at word {offset} exceeds the address space")]
    LengthOverflow { offset: usize },
    /// The map section must hold whole key/value pairs.
    #[error("map length {0} is odd; entries are key/value word pairs")]
    OddMapLength(usize),
    /// The status word is not one of the defined machine statuses.
    #[error("unknown status code {0}")]
    UnknownStatus(Word),
    /// Extra words after the declared machine content.
    #[error("{0} trailing words after declared machine content")]
    TrailingWords(usize),

    /// Assembly failure with source location context.
    #[error("line {line}:{column}: {message}")]
    Assembly {
        line: usize,
        column: usize,
        message: String,
    },

    /// Corrupt packed machine image.
    #[error("transport encoding corrupt: {0}")]
    Transport(String),
    /// File I/O failure in a toolchain step.
    #[error("io error: {0}")]
    Io(String),
}
