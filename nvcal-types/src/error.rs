// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The error kinds shared by every component in the pipeline.
//!
//! Per the propagation policy: [`NvError::Schema`], [`NvError::Type`],
//! [`NvError::Encoding`], [`NvError::Token`], [`NvError::LengthMismatch`],
//! and [`NvError::Range`] are meant to be *collected* into an item's
//! [`crate::value::Diagnostic`] list rather than returned as a hard error.
//! [`NvError::Format`] and [`NvError::Io`] are fatal and are expected to
//! propagate through a `Result`.

use thiserror::Error;

/// The eight error kinds of the pipeline.
#[derive(Debug, Error)]
pub enum NvError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("unknown type: {0}")]
    Type(String),

    #[error("unknown or inconsistent encoding: {0}")]
    Encoding(String),

    #[error("parameter {0} not a number")]
    Token(String),

    #[error("mismatch between {declared} declared, {defined} defined elements")]
    LengthMismatch { declared: usize, defined: usize },

    #[error("format error: {0}")]
    Format(String),

    #[error("value {value} out of range for {bits}-bit {}", if *signed { "signed" } else { "unsigned" })]
    Range { value: i128, bits: u8, signed: bool },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NvError {
    /// Render this error as the human-readable diagnostic text the printer
    /// and update-script emitters expect, without the `NvError` wrapper.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_error_message_matches_spec_wording() {
        let err = NvError::Token("ims".to_string());
        assert_eq!(err.message(), "parameter ims not a number");
    }

    #[test]
    fn length_mismatch_message_matches_spec_wording() {
        let err = NvError::LengthMismatch {
            declared: 2,
            defined: 1,
        };
        assert_eq!(
            err.message(),
            "mismatch between 2 declared, 1 defined elements"
        );
    }
}
