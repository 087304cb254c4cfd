//! A streaming, state-checked writer for well-formed XML/HTML output.
//!
//! The core of this crate is [`TagWriter`], a character sink that exposes a
//! tag/attribute/text/CDATA/comment/script building API and tracks the
//! current output position in an explicit [`State`] machine. The state gates
//! which operations are legal and selects the escaping applied to every
//! content write, so that the emitted stream is well-formed with respect to
//! the currently open construct:
//!
//! - element text, attribute values, comments and JavaScript string
//!   literals are escaped for their exact context,
//! - CDATA sections are restarted transparently around `]]>` sequences,
//!   even when they straddle chunk boundaries,
//! - `<script>` blocks are framed for XHTML/HTML4 compatibility while
//!   their content is passed through completely unquoted.
//!
//! The stateless escaping functions are available separately in [`escape`]
//! for callers that already manage their own framing.
//!
//! # Usage
//!
//! ```
//! use tagwriter::TagWriter;
//!
//! let mut xml = TagWriter::with_buffer();
//! xml.begin_begin_tag("div")?;
//! xml.write_attribute("class", Some("my-paragraph"))?;
//! xml.end_begin_tag()?;
//! {
//!     xml.begin_tag("b")?;
//!     xml.write_text("Some text")?;
//!     xml.end_tag("b")?;
//! }
//! xml.end_tag("div")?;
//!
//! assert_eq!(
//!     xml.into_string(),
//!     r#"<div class="my-paragraph"><b>Some text</b></div>"#
//! );
//! # Ok::<(), tagwriter::Error>(())
//! ```
//!
//! Writing to a file or socket works through any `io::Write`; use
//! [`TagWriter::buffered`] for unbuffered sinks. After a failure in the
//! middle of a document, [`TagWriter::end_all`] closes whatever is open and
//! brings the stream back to a well-formed state.

pub mod err;
pub mod escape;
pub mod writer;

pub use err::{Error, Result};
pub use writer::{State, TagWriter};

#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

#[cfg(test)]
pub(crate) fn ensure_env_logger_initialized() {
    LOGGER_INIT.call_once(|| {
        env_logger::init();
    });
}
