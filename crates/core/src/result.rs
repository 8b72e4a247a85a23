//! Core results and error types

use std::path::PathBuf;
use thiserror::Error;

/// Core error type encompassing all core module errors.
#[derive(Debug, Error)]
pub enum Error {
    /// One of the files a compilation is expected to produce is absent.
    #[error("compilation artifact missing: {} (expected {})", missing.display(), expected.join(", "))]
    CompilationArtifactMissing {
        /// The first file that was not found.
        missing: PathBuf,
        /// Every file name the loader requires.
        expected: Vec<String>,
    },

    /// Failed to read file at the specified path.
    #[error("could not read file '{}': {source}", path.display())]
    FileRead {
        /// The path to the file that could not be read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to decode hex string.
    #[error("hex decode failed: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Hex input had an odd number of digits.
    #[error("hex string has odd length {0}")]
    OddHexLength(usize),

    /// A JSON artifact could not be parsed.
    #[error("malformed {what} in '{}': {source}", path.display())]
    Json {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The combined compiler output does not describe the requested contract.
    #[error("contract '{contract}' not found in combined output (have: {})", available.join(", "))]
    ContractNotInOutput {
        contract: String,
        available: Vec<String>,
    },

    /// Deploying the contract would require constructor arguments.
    #[error("contract '{contract}' has a constructor with {inputs} argument(s); only argument-free constructors are supported")]
    UnsupportedConstructorArguments { contract: String, inputs: usize },

    /// A patch spec or caller named a function the contract does not expose.
    #[error("function '{function}' not found in contract (known functions: {})", known.join(", "))]
    FunctionNotFound {
        function: String,
        /// Known function names, sorted.
        known: Vec<String>,
    },

    /// No selector dispatcher could be located in runtime bytecode.
    #[error("no function dispatcher found in runtime bytecode")]
    NoDispatcher,

    /// The immediate data for a PUSH opcode is invalid.
    #[error("invalid immediate: {0}")]
    InvalidImmediate(String),

    /// A value does not fit in the requested push width.
    #[error("value 0x{value} does not fit in {width} byte(s)")]
    ImmediateTooWide { value: String, width: usize },

    /// A label was referenced but never placed.
    #[error("label {0} referenced but never bound")]
    UnboundLabel(usize),

    /// A label was placed twice.
    #[error("label {0} bound more than once")]
    LabelRebound(usize),

    /// Assembled code would place a jump target beyond PUSH2 range.
    #[error("jump target 0x{0:x} exceeds the 16-bit label range")]
    LabelOutOfRange(usize),
}

/// Core result type
pub type Result<T> = std::result::Result<T, Error>;
