//! The tag writer state machine.
//!
//! [`TagWriter`] emits properly nested XML/HTML structures to an
//! `io::Write` sink. Every operation is checked against the current
//! [`State`], which also selects the escaping applied to content writes:
//!
//! - Start tags, attributes and CSS class lists are assembled lazily, so
//!   `None` values and empty streaming attributes are omitted entirely.
//! - CDATA sections track the last two content bytes across calls and
//!   restart the section whenever a `]]>` would otherwise appear, including
//!   terminators that straddle chunk boundaries.
//! - Script blocks are framed for XHTML/HTML4 compatibility but their
//!   content is written with zero quoting.
//! - JavaScript string literals may be opened from attribute, element,
//!   CDATA and script positions; content escaping follows the entering
//!   context and [`TagWriter::end_js_string`] restores it exactly.
//!
//! Misuse (an operation that is illegal in the current state, a mismatched
//! end tag) panics; I/O failures of the sink are returned as errors.

use std::collections::HashSet;
use std::io::{BufWriter, Write};

use log::trace;

use crate::err::Result;
use crate::escape;

const SCRIPT_TAG: &str = "script";

const SCRIPT_TYPE_ATTR: &str = "type";

const SCRIPT_TYPE_JAVASCRIPT: &str = "text/javascript";

const SCRIPT_LINE_COMMENT: &str = "// ";

const CLASS_ATTR: &str = "class";

/// Stack entry marking an open quoted XML region.
const QUOTED_XML_PSEUDO_TAG: &str = "<![CDATA[";

/// CDATA terminator written while inside an enclosing quoted XML region:
/// the logical `]]>` split so that the outer section closes and reopens
/// around it.
const QUOTED_CDATA_END: &str = "]]]]><![CDATA[>";

/// Default indentation buffer, 80 spaces.
const SPACES: &str =
    "                                                                                ";

/// Abstract position within an XML document.
///
/// The current state determines which writer operations are legal and which
/// escaping applies to content writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Within a start tag.
    StartTag,
    /// Within a common attribute value.
    Attribute,
    /// Start of an attribute value, nothing written yet.
    AttributeStart,
    /// Start of a CSS class attribute value, nothing written yet.
    ClassAttributeStart,
    /// Within a CSS class attribute value.
    ClassAttribute,
    /// Within an element.
    ElementContent,
    /// Within a CDATA section.
    CdataContent,
    /// Within a script section. Absolutely no quoting occurs here, see
    /// [`TagWriter::begin_script`].
    Script,
    /// Within a JavaScript string literal in an XML attribute.
    JsAttributeString,
    /// Within a JavaScript string literal in element content.
    JsElementString,
    /// Within a JavaScript string literal in CDATA content.
    JsCdataString,
    /// Within a JavaScript string literal in script content.
    JsScriptString,
    /// Within a comment.
    CommentContent,
}

impl State {
    /// Whether any white space content is allowed (including line breaks).
    pub fn space_allowed(self) -> bool {
        matches!(
            self,
            State::StartTag
                | State::ElementContent
                | State::CdataContent
                | State::Script
                | State::CommentContent
        )
    }

    /// Whether (quoted) plain text content is allowed.
    pub fn text_allowed(self) -> bool {
        matches!(
            self,
            State::ElementContent | State::CdataContent | State::Script
        )
    }

    /// Whether (quoted) attribute text is allowed.
    pub fn attribute_text_allowed(self) -> bool {
        matches!(self, State::Attribute | State::AttributeStart)
    }

    /// Whether JavaScript content can be rendered.
    pub fn js_allowed(self) -> bool {
        matches!(
            self,
            State::Attribute
                | State::AttributeStart
                | State::ElementContent
                | State::CdataContent
                | State::Script
        )
    }

    /// Whether opening a tag is allowed.
    pub fn begin_tag_allowed(self) -> bool {
        matches!(self, State::ElementContent)
    }

    /// Whether writing an attribute is allowed.
    pub fn attribute_allowed(self) -> bool {
        matches!(self, State::StartTag)
    }

    /// Whether ending an attribute is allowed.
    pub fn end_attribute_allowed(self) -> bool {
        self.attribute_text_allowed()
    }

    /// Whether closing an open start tag is allowed.
    pub fn end_begin_tag_allowed(self) -> bool {
        self.attribute_allowed()
    }

    /// Whether writing an end tag is allowed.
    pub fn end_tag_allowed(self) -> bool {
        matches!(self, State::ElementContent)
    }

    /// Whether inserting a comment is allowed.
    pub fn comment_allowed(self) -> bool {
        matches!(self, State::ElementContent)
    }

    /// Whether comment content is allowed.
    pub fn comment_content_allowed(self) -> bool {
        matches!(self, State::CommentContent)
    }

    /// Whether a JavaScript string literal is currently rendered.
    pub fn in_js_string(self) -> bool {
        matches!(
            self,
            State::JsAttributeString
                | State::JsElementString
                | State::JsCdataString
                | State::JsScriptString
        )
    }

    /// The state entered when a JavaScript string literal is opened here.
    fn begin_js_string(self) -> State {
        match self {
            State::Attribute | State::AttributeStart => State::JsAttributeString,
            State::ElementContent => State::JsElementString,
            State::CdataContent => State::JsCdataString,
            State::Script => State::JsScriptString,
            other => panic!("No JavaScript content in state {other:?}."),
        }
    }

    /// The state restored when the current JavaScript string literal ends.
    fn end_js_string(self) -> State {
        match self {
            State::JsAttributeString => State::Attribute,
            State::JsElementString => State::ElementContent,
            State::JsCdataString => State::CdataContent,
            State::JsScriptString => State::Script,
            other => panic!("Not rendering a JavaScript string literal, but {other:?}."),
        }
    }
}

/// A writer that creates properly nested XML/HTML structures.
///
/// ```
/// use tagwriter::TagWriter;
///
/// let mut xml = TagWriter::with_buffer();
/// xml.begin_begin_tag("div")?;
/// xml.write_attribute("class", Some("my-paragraph"))?;
/// xml.end_begin_tag()?;
/// xml.begin_tag("b")?;
/// xml.write_text("Some text")?;
/// xml.end_tag("b")?;
/// xml.end_tag("div")?;
///
/// assert_eq!(
///     xml.into_string(),
///     "<div class=\"my-paragraph\"><b>Some text</b></div>"
/// );
/// # Ok::<(), tagwriter::Error>(())
/// ```
pub struct TagWriter<W: Write> {
    out: W,

    /// The state at the current output position.
    state: State,

    /// Stack of currently open tags, innermost last.
    stack: Vec<String>,

    /// Whether a quoted XML region is open, see
    /// [`TagWriter::begin_quoted_xml`].
    quoting: bool,

    /// Name recorded by [`TagWriter::begin_attribute`], emitted lazily by
    /// the first content write.
    pending_attr: Option<String>,

    /// Attribute names used on the current start tag, strict mode only.
    seen_attrs: HashSet<String>,

    strict: bool,

    /// Current indentation depth in characters.
    indent: i32,

    indent_step: i32,

    indent_whitespace: String,

    new_line: String,

    do_indent: bool,

    /// Last two content bytes of the open CDATA section, used to detect a
    /// `]]>` straddling a chunk boundary.
    cdata_tail: [u8; 2],
}

impl TagWriter<Vec<u8>> {
    /// Creates a [`TagWriter`] that accumulates the document in memory.
    ///
    /// Retrieve the result with [`TagWriter::into_string`].
    pub fn with_buffer() -> Self {
        TagWriter::new(Vec::new())
    }

    /// Returns the accumulated document.
    pub fn into_string(self) -> String {
        String::from_utf8(self.out).expect("writer emits UTF-8 only")
    }
}

impl<W: Write> TagWriter<BufWriter<W>> {
    /// Creates a [`TagWriter`] with an intermediate buffer in front of
    /// `out`, avoiding many small writes on unbuffered sinks.
    pub fn buffered(out: W) -> Self {
        TagWriter::new(BufWriter::new(out))
    }
}

impl<W: Write> TagWriter<W> {
    /// Creates a new [`TagWriter`] emitting to `out`.
    ///
    /// Indentation is disabled by default; the strict duplicate-attribute
    /// check is enabled in debug builds.
    pub fn new(out: W) -> Self {
        TagWriter {
            out,
            state: State::ElementContent,
            stack: Vec::new(),
            quoting: false,
            pending_attr: None,
            seen_attrs: HashSet::new(),
            strict: cfg!(debug_assertions),
            indent: 0,
            indent_step: 2,
            indent_whitespace: SPACES.to_string(),
            new_line: "\n".to_string(),
            do_indent: false,
            cdata_tail: [b'[', b'A'],
        }
    }

    /// The current state of this writer.
    pub fn state(&self) -> State {
        self.state
    }

    /// Adjusts the current state, bypassing all checks.
    ///
    /// Intended for collaborators that write through the sink directly and
    /// need to resynchronize the state machine afterwards.
    pub fn set_state(&mut self, state: State) {
        self.state = state;
    }

    /// The number of currently open elements.
    ///
    /// See [`TagWriter::end_all`].
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The currently open tags, innermost last.
    pub fn open_tags(&self) -> &[String] {
        &self.stack
    }

    /// Whether the strict duplicate-attribute check is enabled.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Enables or disables the strict duplicate-attribute check.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// The string used to render line breaks.
    pub fn new_line(&self) -> &str {
        &self.new_line
    }

    /// Sets the string used to render line breaks.
    pub fn set_new_line(&mut self, new_line: &str) {
        self.new_line = new_line.to_string();
    }

    /// The number of indentation characters added at each level.
    pub fn indent_step(&self) -> i32 {
        self.indent_step
    }

    /// Sets the number of indentation characters added at each level.
    pub fn set_indent_step(&mut self, indent_step: i32) {
        self.indent_step = indent_step;
    }

    /// The buffer indentation characters are taken from.
    pub fn indent_whitespace(&self) -> &str {
        &self.indent_whitespace
    }

    /// Sets the buffer indentation characters are taken from.
    pub fn set_indent_whitespace(&mut self, indent_whitespace: &str) {
        self.indent_whitespace = indent_whitespace.to_string();
    }

    /// Sets whether to indent the output. Returns the previous setting.
    pub fn set_indent(&mut self, do_indent: bool) -> bool {
        let before = self.do_indent;
        self.do_indent = do_indent;
        before
    }

    /// Whether indentation is enabled.
    pub fn is_indenting(&self) -> bool {
        self.do_indent
    }

    /// Increases the indentation for the next writing operation.
    pub fn increase_indent(&mut self) {
        self.indent += self.indent_step;
    }

    /// Decreases the indentation for the next writing operation.
    pub fn decrease_indent(&mut self) {
        self.indent -= self.indent_step;
    }

    /// Flushes the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// A shared reference to the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// A mutable reference to the underlying sink, circumventing all
    /// structural checks.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Flushes and returns the underlying sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    /// Replaces the underlying sink, returning the previous one.
    ///
    /// The current sink is flushed first; the swap must happen between
    /// writing operations.
    pub fn replace_out(&mut self, new_out: W) -> Result<W> {
        trace!("replacing output sink");
        self.out.flush()?;
        Ok(std::mem::replace(&mut self.out, new_out))
    }

    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        Ok(())
    }

    #[inline]
    fn write_str(&mut self, text: &str) -> Result<()> {
        self.write_bytes(text.as_bytes())
    }

    fn write_nl(&mut self) -> Result<()> {
        self.out.write_all(self.new_line.as_bytes())?;
        Ok(())
    }

    /// Writes the XML declaration with the given encoding, followed by a
    /// line break.
    pub fn write_xml_header(&mut self, encoding: &str) -> Result<()> {
        self.write_str("<?xml version=\"1.0\" encoding=\"")?;
        self.write_str(encoding)?;
        self.write_str("\"?>")?;
        self.nl()
    }

    /// Writes a single line break.
    pub fn nl(&mut self) -> Result<()> {
        assert!(
            self.state.space_allowed(),
            "No white space in state {:?}",
            self.state
        );
        self.write_nl()
    }

    /// Writes the number of indentation characters for the current level,
    /// without a preceding line break.
    pub fn indented(&mut self) -> Result<()> {
        let count = self
            .indent
            .clamp(0, self.indent_whitespace.len() as i32) as usize;
        self.out
            .write_all(&self.indent_whitespace.as_bytes()[..count])?;
        Ok(())
    }

    /// Writes a line break and then the indentation for the current level.
    pub fn write_indent(&mut self) -> Result<()> {
        self.nl()?;
        self.indented()
    }

    /// Begins a tag by writing `<tag`.
    ///
    /// The start tag must be completed with [`TagWriter::end_begin_tag`]
    /// or [`TagWriter::end_empty_tag`] after writing the attributes.
    pub fn begin_begin_tag(&mut self, tag: &str) -> Result<()> {
        assert!(
            self.state.begin_tag_allowed(),
            "No tag in state {:?}",
            self.state
        );
        self.stack.push(tag.to_string());
        if self.do_indent {
            self.write_indent()?;
        }
        self.write_str("<")?;
        self.write_str(tag)?;
        self.state = State::StartTag;
        self.increase_indent();
        Ok(())
    }

    /// Writes an XML attribute `name="value"` with the value escaped for a
    /// double-quoted attribute.
    ///
    /// A `None` value prevents the attribute from being written at all;
    /// callers rely on this to emit attributes conditionally.
    pub fn write_attribute(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        assert!(
            self.state.attribute_allowed(),
            "No attribute in state {:?}",
            self.state
        );
        self.check_attribute_name(name);
        if let Some(value) = value {
            self.write_str(" ")?;
            self.write_str(name)?;
            self.write_str("=\"")?;
            escape::write_attribute_text_dquot(&mut self.out, value)?;
            self.write_str("\"")?;
        }
        Ok(())
    }

    /// Opens an attribute with the given name.
    ///
    /// The value is expected to be streamed through
    /// [`TagWriter::write_attribute_text`] and the attribute closed with
    /// [`TagWriter::end_attribute`]. If no write happens in between, the
    /// attribute itself is not written. A zero-length write still opens the
    /// attribute and renders `name=""`.
    pub fn begin_attribute(&mut self, name: &str) {
        assert!(
            self.state.attribute_allowed(),
            "No attribute in state {:?}",
            self.state
        );
        self.pending_attr = Some(name.to_string());
        self.state = State::AttributeStart;
    }

    /// Closes an attribute opened with [`TagWriter::begin_attribute`].
    pub fn end_attribute(&mut self) -> Result<()> {
        if self.state == State::Attribute {
            self.write_str("\"")?;
            self.state = State::StartTag;
        } else {
            assert!(
                self.state == State::AttributeStart,
                "No attribute end in state {:?}",
                self.state
            );
            self.state = State::StartTag;
        }
        self.pending_attr = None;
        Ok(())
    }

    /// Begins a CSS class attribute named `class`.
    ///
    /// See [`TagWriter::begin_css_classes_as`].
    pub fn begin_css_classes(&mut self) {
        self.begin_css_classes_as(CLASS_ATTR);
    }

    /// Begins a CSS class attribute with the given name.
    ///
    /// The attribute is only created if some fragment with non-whitespace
    /// content is written before [`TagWriter::end_css_classes`]. Fragments
    /// are trimmed and joined with a single space.
    pub fn begin_css_classes_as(&mut self, class_attr: &str) {
        assert!(
            self.state.attribute_allowed(),
            "No class attribute in state {:?}",
            self.state
        );
        self.pending_attr = Some(class_attr.to_string());
        self.state = State::ClassAttributeStart;
    }

    /// Closes a CSS class attribute opened with
    /// [`TagWriter::begin_css_classes`].
    pub fn end_css_classes(&mut self) -> Result<()> {
        if self.state == State::ClassAttribute {
            self.write_str("\"")?;
            self.state = State::StartTag;
        } else {
            assert!(
                self.state == State::ClassAttributeStart,
                "No class attribute end in state {:?}",
                self.state
            );
            self.state = State::StartTag;
        }
        self.pending_attr = None;
        Ok(())
    }

    fn start_attribute(&mut self) -> Result<()> {
        let name = self
            .pending_attr
            .clone()
            .expect("attribute name recorded by begin_attribute");
        self.internal_begin_attribute(&name)?;
        self.state = State::Attribute;
        Ok(())
    }

    fn start_class_attribute(&mut self) -> Result<()> {
        let name = self
            .pending_attr
            .clone()
            .expect("attribute name recorded by begin_css_classes");
        self.internal_begin_attribute(&name)?;
        self.state = State::ClassAttribute;
        Ok(())
    }

    fn internal_begin_attribute(&mut self, name: &str) -> Result<()> {
        self.check_attribute_name(name);
        self.write_str(" ")?;
        self.write_str(name)?;
        self.write_str("=\"")
    }

    fn class_fragment(&mut self, text: &str) -> Result<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        match self.state {
            State::ClassAttributeStart => {
                self.start_class_attribute()?;
            }
            State::ClassAttribute => {
                escape::write_attribute_text_dquot_char(&mut self.out, ' ')?;
            }
            other => panic!("No class attribute content in state {other:?}"),
        }
        escape::write_attribute_text_dquot(&mut self.out, trimmed)?;
        Ok(())
    }

    /// Closes the start tag opened by [`TagWriter::begin_begin_tag`] by
    /// writing `>`.
    pub fn end_begin_tag(&mut self) -> Result<()> {
        self.clear_attribute_names();
        assert!(
            self.state.end_begin_tag_allowed(),
            "No closing of start tag in state {:?}",
            self.state
        );
        self.write_str(">")?;
        self.state = State::ElementContent;
        Ok(())
    }

    /// Closes an empty tag opened by [`TagWriter::begin_begin_tag`] by
    /// writing `/>`.
    pub fn end_empty_tag(&mut self) -> Result<()> {
        self.clear_attribute_names();
        assert!(
            self.state.end_begin_tag_allowed(),
            "No end tag in state {:?}",
            self.state
        );
        self.write_str("/>")?;
        self.stack.pop();
        self.decrease_indent();
        self.state = State::ElementContent;
        Ok(())
    }

    /// Begins a tag by writing `<tag>`.
    pub fn begin_tag(&mut self, tag: &str) -> Result<()> {
        self.begin_begin_tag(tag)?;
        self.end_begin_tag()
    }

    /// Writes an empty tag `<tag/>`.
    pub fn empty_tag(&mut self, tag: &str) -> Result<()> {
        self.begin_begin_tag(tag)?;
        self.end_empty_tag()
    }

    /// Ends a tag by writing `</tag>`.
    ///
    /// The name must match the innermost open tag.
    pub fn end_tag(&mut self, tag: &str) -> Result<()> {
        assert!(
            self.state.end_tag_allowed(),
            "No end tag in state {:?}",
            self.state
        );
        let current = self.stack.pop().expect("Root tag already closed.");
        assert!(tag == current, "Expected '{current}'");

        self.decrease_indent();
        if self.do_indent {
            self.write_indent()?;
        }
        self.write_str("</")?;
        self.write_str(tag)?;
        self.write_str(">")?;
        self.state = State::ElementContent;
        Ok(())
    }

    /// Writes text in the current context, escaped for that context.
    ///
    /// Equivalent to [`TagWriter::append`].
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        self.append(text)
    }

    /// Writes a single character in the current context.
    pub fn write_text_char(&mut self, c: char) -> Result<()> {
        self.append_char(c)
    }

    /// Writes a fragment of an attribute value opened with
    /// [`TagWriter::begin_attribute`] or [`TagWriter::begin_css_classes`].
    pub fn write_attribute_text(&mut self, value: &str) -> Result<()> {
        self.append(value)
    }

    /// Writes a single character of an attribute value.
    pub fn write_attribute_text_char(&mut self, value: char) -> Result<()> {
        self.append_char(value)
    }

    /// Writes `text` with the escaping selected by the current state.
    pub fn append(&mut self, text: &str) -> Result<()> {
        match self.state {
            State::ClassAttributeStart | State::ClassAttribute => self.class_fragment(text),
            State::Attribute => {
                escape::write_attribute_text_dquot(&mut self.out, text)?;
                Ok(())
            }
            State::AttributeStart => {
                self.start_attribute()?;
                escape::write_attribute_text_dquot(&mut self.out, text)?;
                Ok(())
            }
            State::ElementContent => {
                escape::write_text(&mut self.out, text)?;
                Ok(())
            }
            State::CdataContent => self.cdata_chunk(text),
            State::Script => self.write_str(text),
            State::JsElementString | State::JsAttributeString => {
                escape::write_js_string_content(&mut self.out, text)?;
                Ok(())
            }
            State::JsScriptString | State::JsCdataString => {
                escape::write_direct_js_string_content(&mut self.out, text)?;
                Ok(())
            }
            State::CommentContent => {
                escape::write_comment_content(&mut self.out, text)?;
                Ok(())
            }
            other => panic!("No text content allowed in state {other:?}"),
        }
    }

    /// Writes a single character with the escaping selected by the current
    /// state.
    pub fn append_char(&mut self, c: char) -> Result<()> {
        match self.state {
            State::ClassAttributeStart | State::ClassAttribute => {
                // A lone whitespace character trims to nothing, like an
                // all-whitespace fragment. Anything else cannot be assembled
                // into class names char by char.
                if c.is_whitespace() {
                    return Ok(());
                }
                panic!("No single char content in a CSS class attribute")
            }
            State::Attribute => {
                escape::write_attribute_text_dquot_char(&mut self.out, c)?;
                Ok(())
            }
            State::AttributeStart => {
                self.start_attribute()?;
                escape::write_attribute_text_dquot_char(&mut self.out, c)?;
                Ok(())
            }
            State::ElementContent => {
                escape::write_text_char(&mut self.out, c)?;
                Ok(())
            }
            State::CdataContent => self.cdata_char(c),
            State::Script => {
                let mut buf = [0u8; 4];
                self.write_str(c.encode_utf8(&mut buf))
            }
            State::JsElementString | State::JsAttributeString => {
                escape::write_js_string_content_char(&mut self.out, c)?;
                Ok(())
            }
            State::JsScriptString | State::JsCdataString => {
                escape::write_direct_js_string_content_char(&mut self.out, c)?;
                Ok(())
            }
            State::CommentContent => {
                escape::write_comment_content_char(&mut self.out, c)?;
                Ok(())
            }
            other => panic!("No text content allowed in state {other:?}"),
        }
    }

    /// Appends the given decimal value in the current context.
    pub fn write_int(&mut self, value: i64) -> Result<()> {
        let mut buf = itoa::Buffer::new();
        self.append(buf.format(value))
    }

    /// Appends the given floating point value in the current context.
    ///
    /// A value with integral content is rendered as the integer.
    pub fn write_float(&mut self, value: f64) -> Result<()> {
        let int_value = value as i64;
        if value == int_value as f64 {
            self.write_int(int_value)
        } else {
            let mut buf = ryu::Buffer::new();
            self.append(buf.format(value))
        }
    }

    /// Starts a CDATA section.
    ///
    /// Content is written with [`TagWriter::write_cdata_content`]; the
    /// section must be ended with [`TagWriter::end_cdata`]. CDATA sections
    /// must not be nested.
    pub fn begin_cdata(&mut self) -> Result<()> {
        assert!(
            self.state.begin_tag_allowed(),
            "No CDATA in state {:?}",
            self.state
        );
        self.state = State::CdataContent;
        self.write_str(escape::CDATA_BEGIN)?;
        self.cdata_tail = [b'[', b'A'];
        Ok(())
    }

    /// Ends a CDATA section started with [`TagWriter::begin_cdata`].
    pub fn end_cdata(&mut self) -> Result<()> {
        assert!(
            self.state == State::CdataContent,
            "No end of CDATA in state {:?}",
            self.state
        );
        self.state = State::ElementContent;
        self.write_end_cdata()
    }

    fn write_end_cdata(&mut self) -> Result<()> {
        if self.quoting {
            self.write_str(QUOTED_CDATA_END)
        } else {
            self.write_str(escape::CDATA_END)
        }
    }

    /// Writes arbitrary text within a CDATA section.
    ///
    /// The content may be split across calls at any position; a `]]>`
    /// straddling a call boundary is detected through the recorded lookback
    /// and the section is restarted transparently.
    pub fn write_cdata_content(&mut self, content: &str) -> Result<()> {
        assert!(
            self.state == State::CdataContent,
            "Not within a CDATA section."
        );
        self.cdata_chunk(content)
    }

    /// Writes a single character within a CDATA section.
    pub fn write_cdata_content_char(&mut self, content: char) -> Result<()> {
        assert!(
            self.state == State::CdataContent,
            "Not within a CDATA section."
        );
        self.cdata_char(content)
    }

    fn cdata_chunk(&mut self, content: &str) -> Result<()> {
        let bytes = content.as_bytes();
        match bytes.len() {
            0 => Ok(()),
            1 => self.cdata_byte(bytes[0]),
            len => {
                self.break_cdata_if_needed(bytes[0], bytes[1])?;
                escape::write_cdata_chunk(&mut self.out, content)?;
                self.cdata_tail = [bytes[len - 2], bytes[len - 1]];
                Ok(())
            }
        }
    }

    fn cdata_char(&mut self, c: char) -> Result<()> {
        let mut buf = [0u8; 4];
        let encoded = c.encode_utf8(&mut buf).as_bytes();
        if encoded.len() == 1 {
            self.cdata_byte(encoded[0])
        } else {
            // Multi-byte characters cannot take part in a `]]>` sequence.
            self.out.write_all(encoded)?;
            self.cdata_tail = [encoded[encoded.len() - 2], encoded[encoded.len() - 1]];
            Ok(())
        }
    }

    fn cdata_byte(&mut self, b: u8) -> Result<()> {
        if is_cdata_end(self.cdata_tail[0], self.cdata_tail[1], b) {
            self.write_str(escape::CDATA_BREAK)?;
            self.cdata_tail = [b'A', b'['];
        }
        self.out.write_all(&[b])?;
        self.cdata_tail = [self.cdata_tail[1], b];
        Ok(())
    }

    fn break_cdata_if_needed(&mut self, first: u8, second: u8) -> Result<()> {
        if is_cdata_end(self.cdata_tail[0], self.cdata_tail[1], first)
            || is_cdata_end(self.cdata_tail[1], first, second)
        {
            self.write_str(escape::CDATA_BREAK)?;
        }
        Ok(())
    }

    /// Puts this writer into a mode rendering quoted XML as text.
    ///
    /// The fragment written until [`TagWriter::end_quoted_xml`] is emitted
    /// inside a CDATA section, so a parser of the generated document sees
    /// it as text content. Quoting must not be nested.
    pub fn begin_quoted_xml(&mut self) -> Result<()> {
        assert!(!self.quoting, "No nested quoting supported.");
        assert!(
            self.state == State::ElementContent,
            "Cannot start quoting in state {:?}",
            self.state
        );
        self.stack.push(QUOTED_XML_PSEUDO_TAG.to_string());
        self.quoting = true;
        self.write_str(escape::CDATA_BEGIN)
    }

    /// Stops the quoting mode started with [`TagWriter::begin_quoted_xml`].
    pub fn end_quoted_xml(&mut self) -> Result<()> {
        assert!(self.quoting, "Not in quoting mode.");
        assert!(
            self.state == State::ElementContent,
            "Cannot stop quoting in state {:?}",
            self.state
        );
        let top = self.stack.pop().expect("Quoted region not open.");
        assert!(
            top == QUOTED_XML_PSEUDO_TAG,
            "Expected closing tag '{top}'."
        );
        self.quoting = false;
        self.write_str(escape::CDATA_END)
    }

    /// Opens an inline script block.
    ///
    /// Within the block, content is written completely unquoted; callers
    /// must never write the character sequences `</script>` or `]]>` in
    /// script source. The block must be closed with
    /// [`TagWriter::end_script`].
    pub fn begin_script(&mut self) -> Result<()> {
        self.begin_begin_tag(SCRIPT_TAG)?;
        self.write_attribute(SCRIPT_TYPE_ATTR, Some(SCRIPT_TYPE_JAVASCRIPT))?;
        self.end_begin_tag()?;

        // The script element is PCDATA in XHTML but CDATA in HTML 4. The
        // CDATA marker keeps XML parsers from interpreting script source,
        // and the JS line comment hides the marker from HTML parsers that
        // never saw it. This must not enter the CDATA state machine: even
        // section-restart quoting of a stray `]` would corrupt the script
        // for HTML consumers.
        self.write_nl()?;
        self.write_str(SCRIPT_LINE_COMMENT)?;
        self.write_str(escape::CDATA_BEGIN)?;
        self.state = State::Script;
        self.write_nl()?;
        Ok(())
    }

    /// Closes an inline script block started with
    /// [`TagWriter::begin_script`].
    pub fn end_script(&mut self) -> Result<()> {
        assert!(
            self.state == State::Script,
            "Cannot end script in state {:?}",
            self.state
        );
        self.write_nl()?;
        self.write_str(SCRIPT_LINE_COMMENT)?;
        self.write_end_cdata()?;
        self.state = State::ElementContent;
        self.write_nl()?;
        self.end_tag(SCRIPT_TAG)
    }

    /// Writes script content in the current context.
    pub fn write_script(&mut self, text: &str) -> Result<()> {
        assert!(
            self.state.js_allowed(),
            "Not within script content, but {:?}",
            self.state
        );
        self.append(text)
    }

    /// Writes a single script content character.
    pub fn write_script_char(&mut self, c: char) -> Result<()> {
        assert!(
            self.state.js_allowed(),
            "Not within script content, but {:?}",
            self.state
        );
        self.append_char(c)
    }

    /// Writes a complete JavaScript string literal in the current context.
    ///
    /// `None` renders the bare token `null`.
    pub fn write_js_string(&mut self, value: Option<&str>) -> Result<()> {
        match self.state {
            State::AttributeStart => {
                self.start_attribute()?;
                escape::write_js_string(&mut self.out, value)?;
            }
            State::ElementContent | State::Attribute => {
                escape::write_js_string(&mut self.out, value)?;
            }
            State::Script | State::CdataContent => {
                escape::write_direct_js_string(&mut self.out, value)?;
            }
            other => panic!("No JavaScript in state {other:?}"),
        }
        Ok(())
    }

    /// Starts a JavaScript string literal.
    ///
    /// Content is expected through
    /// [`TagWriter::write_js_string_content`]; the literal is closed with
    /// [`TagWriter::end_js_string`], restoring the entering state.
    pub fn begin_js_string(&mut self) -> Result<()> {
        if self.state == State::AttributeStart {
            self.start_attribute()?;
        }
        self.state = self.state.begin_js_string();
        self.write_str("'")
    }

    /// Writes part of a JavaScript string literal.
    pub fn write_js_string_content(&mut self, value: &str) -> Result<()> {
        assert!(
            self.state.in_js_string(),
            "Not within a JavaScript string literal."
        );
        self.append(value)
    }

    /// Writes a single character of a JavaScript string literal.
    pub fn write_js_string_content_char(&mut self, value: char) -> Result<()> {
        assert!(
            self.state.in_js_string(),
            "Not within a JavaScript string literal."
        );
        self.append_char(value)
    }

    /// Ends a JavaScript string literal started with
    /// [`TagWriter::begin_js_string`].
    pub fn end_js_string(&mut self) -> Result<()> {
        self.state = self.state.end_js_string();
        self.write_str("'")
    }

    /// Writes the given string as an indented comment.
    pub fn write_comment(&mut self, comment: &str) -> Result<()> {
        assert!(
            self.state.comment_allowed(),
            "No comment in state {:?}",
            self.state
        );
        self.write_indent()?;
        self.write_str("<!-- ")?;
        escape::write_comment_content(&mut self.out, comment)?;
        self.write_str(" -->")
    }

    /// Like [`TagWriter::write_comment`], but without indentation and
    /// padding spaces.
    ///
    /// Panics if the content contains `--` or ends with `-`; such content
    /// cannot be represented in an XML comment verbatim.
    pub fn write_comment_plain(&mut self, comment: &str) -> Result<()> {
        assert!(
            self.state.comment_allowed(),
            "No comment in state {:?}",
            self.state
        );
        assert!(
            !comment.contains("--") && !comment.ends_with('-'),
            "Not a valid XML comment: '{comment}'"
        );
        self.write_str("<!--")?;
        self.write_str(comment)?;
        self.write_str("-->")
    }

    /// Begins a comment.
    pub fn begin_comment(&mut self) -> Result<()> {
        assert!(
            self.state.comment_allowed(),
            "No comment in state {:?}",
            self.state
        );
        self.write_str("<!-- ")?;
        self.state = State::CommentContent;
        Ok(())
    }

    /// Writes text within a comment.
    pub fn write_comment_content(&mut self, comment: &str) -> Result<()> {
        assert!(
            self.state.comment_content_allowed(),
            "Comment content in state {:?}",
            self.state
        );
        escape::write_comment_content(&mut self.out, comment)?;
        Ok(())
    }

    /// Ends a comment.
    pub fn end_comment(&mut self) -> Result<()> {
        assert!(
            self.state.comment_content_allowed(),
            "No comment end in state {:?}",
            self.state
        );
        self.write_str(" -->")?;
        self.state = State::ElementContent;
        Ok(())
    }

    /// Closes all open constructs and elements down to the given depth.
    ///
    /// Whatever is currently open (a JavaScript string literal, a CSS class
    /// attribute, a plain attribute, a start tag, a comment, a CDATA
    /// section, a script block) is closed in correct nesting order, then
    /// tags are popped until `depth` elements remain. Use together with
    /// [`TagWriter::depth`] to recover a well-formed stream after an error
    /// in the middle of a document.
    pub fn end_all(&mut self, depth: usize) -> Result<()> {
        trace!(
            "recovering to depth {} from state {:?}",
            depth,
            self.state
        );
        if self.state.in_js_string() {
            self.end_js_string()?;
        }
        if matches!(
            self.state,
            State::ClassAttribute | State::ClassAttributeStart
        ) {
            self.end_css_classes()?;
        }
        if matches!(self.state, State::Attribute | State::AttributeStart) {
            self.end_attribute()?;
        }
        if self.state == State::StartTag {
            self.end_begin_tag()?;
        }
        if self.state == State::CommentContent {
            self.end_comment()?;
        }
        if self.state == State::CdataContent {
            self.end_cdata()?;
        }
        if self.state == State::Script {
            self.end_script()?;
        }
        while self.stack.len() > depth {
            let current = self
                .stack
                .last()
                .cloned()
                .expect("stack checked non-empty");
            if current == QUOTED_XML_PSEUDO_TAG {
                self.end_quoted_xml()?;
            } else {
                self.end_tag(&current)?;
            }
        }
        Ok(())
    }

    fn clear_attribute_names(&mut self) {
        if self.strict {
            self.seen_attrs.clear();
        }
    }

    fn check_attribute_name(&mut self, name: &str) {
        if self.strict && !self.seen_attrs.insert(name.to_string()) {
            panic!(
                "Attribute '{}' already given in current element: {:?}",
                name, self.stack
            );
        }
    }
}

#[inline]
fn is_cdata_end(c1: u8, c2: u8, c3: u8) -> bool {
    c1 == b']' && c2 == b']' && c3 == b'>'
}
