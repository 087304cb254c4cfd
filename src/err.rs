use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Runtime failures while emitting a document.
///
/// Only genuine I/O conditions are represented here. Misuse of the writer
/// API (an operation that is illegal in the current [`State`], a mismatched
/// end tag, a duplicate attribute name in strict mode) is a programming
/// defect and panics instead of returning an error; the offending call
/// sequence is deterministic and should be caught by tests.
///
/// [`State`]: crate::State
#[derive(Debug, Error)]
pub enum Error {
    #[error("An I/O error has occurred while writing to the output sink: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
