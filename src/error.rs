//! # Error Types
//!
//! One `thiserror` enum covers every failure the pipeline can hit, from
//! argument validation through input parsing to output I/O. There is no
//! partial-success mode: callers propagate these to the binary, which
//! reports them and aborts the run.

use std::path::PathBuf;
use thiserror::Error;

/// Any failure raised by the clustering pipeline
#[derive(Error, Debug)]
pub enum IbdclustError {
    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A VCF structural problem (header, fields, genotype format)
    #[error("VCF error: {message}")]
    Vcf { message: String },

    /// A genetic map file problem
    #[error("Genetic map error: {message}")]
    Map { message: String },

    /// A bref3 file problem
    #[error("bref3 error: {message}")]
    Bref3 { message: String },

    /// Input data that parses but violates an analysis requirement
    /// (too few haplotypes, non-contiguous chromosomes, unsorted markers)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// A command line argument problem
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A named input file does not exist
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// A malformed input line, with its line number for context
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, IbdclustError>;

macro_rules! message_constructor {
    ($(#[$doc:meta])* $name:ident => $variant:ident) => {
        $(#[$doc])*
        pub fn $name(message: impl Into<String>) -> Self {
            Self::$variant {
                message: message.into(),
            }
        }
    };
}

impl IbdclustError {
    message_constructor!(
        /// A VCF error from a message
        vcf => Vcf
    );
    message_constructor!(
        /// A genetic map error from a message
        map => Map
    );
    message_constructor!(
        /// A bref3 error from a message
        bref3 => Bref3
    );
    message_constructor!(
        /// An invalid-data error from a message
        invalid_data => InvalidData
    );
    message_constructor!(
        /// A configuration error from a message
        config => Config
    );

    /// A parse error with line context
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = IbdclustError::parse(17, "bad field");
        assert_eq!(err.to_string(), "Parse error at line 17: bad field");
        let err = IbdclustError::invalid_data("haplotypes missing");
        assert!(err.to_string().contains("haplotypes missing"));
    }
}
