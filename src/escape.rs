//! Context-sensitive escaping for generated XML/HTML and embedded JavaScript.
//!
//! Every function here is stateless and writes directly to an `io::Write`
//! sink, escaping only what the target syntactic context requires:
//!
//! - Element text: `<`, `>`, `&` become entities; C0 controls other than
//!   TAB/LF/CR are dropped (they are illegal in XML 1.0).
//! - Attribute text: additionally `"` (and `'` in the quote-neutral
//!   variant), TAB/LF/CR as numeric character references, and `>` only when
//!   preceded by two or more `]` so that no literal `]]>` can appear inside
//!   an attribute value.
//! - CDATA content: verbatim, except embedded `]]>` restarts the section.
//! - Comment content: runs of `-` collapse to a single `-`.
//! - JavaScript string literals: backslash escapes plus either XML entities
//!   (attribute context) or `\uXXXX` escapes (direct context) for the
//!   characters that would break the enclosing markup.
//!
//! All functions accept the full `char` range and zero-length input without
//! failing. Cross-call state (the CDATA lookback) lives on the writer, not
//! here.

use std::io::{Result as IoResult, Write};

use memchr::{memchr3, memmem};

/// Opening delimiter of a CDATA section.
pub const CDATA_BEGIN: &str = "<![CDATA[";

/// Closing delimiter of a CDATA section.
pub const CDATA_END: &str = "]]>";

/// Section restart written in place of a literal `]]>` inside CDATA content.
pub const CDATA_BREAK: &str = "]]><![CDATA[";

const HEX: &[u8; 16] = b"0123456789ABCDEF";

#[inline]
fn write_char<W: Write + ?Sized>(out: &mut W, c: char) -> IoResult<()> {
    let mut buf = [0u8; 4];
    out.write_all(c.encode_utf8(&mut buf).as_bytes())
}

#[inline]
fn is_dropped_control(b: u8) -> bool {
    b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r'
}

/// Escape `text` for element content.
pub fn write_text<W: Write + ?Sized>(out: &mut W, text: &str) -> IoResult<()> {
    let bytes = text.as_bytes();
    // Fast path: nothing to replace or drop, emit the whole run at once.
    if memchr3(b'<', b'>', b'&', bytes).is_none() && !bytes.iter().any(|&b| is_dropped_control(b)) {
        return out.write_all(bytes);
    }

    let mut run_start = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        let replacement: &[u8] = match b {
            b'<' => b"&lt;",
            b'>' => b"&gt;",
            b'&' => b"&amp;",
            b'\t' | b'\n' | b'\r' => continue,
            _ if b < 0x20 => b"",
            _ => continue,
        };
        if run_start < i {
            out.write_all(&bytes[run_start..i])?;
        }
        out.write_all(replacement)?;
        run_start = i + 1;
    }
    if run_start < bytes.len() {
        out.write_all(&bytes[run_start..])?;
    }
    Ok(())
}

/// Escape a single character for element content.
pub fn write_text_char<W: Write + ?Sized>(out: &mut W, c: char) -> IoResult<()> {
    match c {
        '<' => out.write_all(b"&lt;"),
        '>' => out.write_all(b"&gt;"),
        '&' => out.write_all(b"&amp;"),
        '\t' | '\n' | '\r' => write_char(out, c),
        c if (c as u32) < 0x20 => Ok(()),
        c => write_char(out, c),
    }
}

/// Escape `text` for an attribute value with unknown quoting.
///
/// Both `"` and `'` are escaped, the latter numerically as `&#39;` since
/// `&apos;` is not defined in HTML 4.
pub fn write_attribute_text<W: Write + ?Sized>(out: &mut W, text: &str) -> IoResult<()> {
    write_attr_impl(out, text, true)
}

/// Escape `text` for an attribute value known to be double-quoted.
///
/// Like [`write_attribute_text`], but `'` passes through.
pub fn write_attribute_text_dquot<W: Write + ?Sized>(out: &mut W, text: &str) -> IoResult<()> {
    write_attr_impl(out, text, false)
}

fn write_attr_impl<W: Write + ?Sized>(out: &mut W, text: &str, escape_apos: bool) -> IoResult<()> {
    let bytes = text.as_bytes();
    let mut run_start = 0usize;
    // Consecutive `]` seen immediately before the current byte. A `>` is
    // only escaped after `]]` to keep `]]>` out of attribute values.
    let mut brackets = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        let replacement: Option<&[u8]> = match b {
            b'<' => Some(b"&lt;"),
            b'&' => Some(b"&amp;"),
            b'"' => Some(b"&quot;"),
            b'\'' if escape_apos => Some(b"&#39;"),
            b'>' if brackets >= 2 => Some(b"&gt;"),
            b'\t' => Some(b"&#9;"),
            b'\n' => Some(b"&#10;"),
            b'\r' => Some(b"&#13;"),
            _ if b < 0x20 => Some(b""),
            _ => None,
        };
        brackets = if b == b']' { brackets + 1 } else { 0 };
        if let Some(replacement) = replacement {
            if run_start < i {
                out.write_all(&bytes[run_start..i])?;
            }
            out.write_all(replacement)?;
            run_start = i + 1;
        }
    }
    if run_start < bytes.len() {
        out.write_all(&bytes[run_start..])?;
    }
    Ok(())
}

/// Escape a single character for an attribute value with unknown quoting.
pub fn write_attribute_text_char<W: Write + ?Sized>(out: &mut W, c: char) -> IoResult<()> {
    write_attr_char_impl(out, c, true)
}

/// Escape a single character for a double-quoted attribute value.
pub fn write_attribute_text_dquot_char<W: Write + ?Sized>(out: &mut W, c: char) -> IoResult<()> {
    write_attr_char_impl(out, c, false)
}

fn write_attr_char_impl<W: Write + ?Sized>(out: &mut W, c: char, escape_apos: bool) -> IoResult<()> {
    match c {
        '<' => out.write_all(b"&lt;"),
        '&' => out.write_all(b"&amp;"),
        '"' => out.write_all(b"&quot;"),
        '\'' if escape_apos => out.write_all(b"&#39;"),
        '\t' => out.write_all(b"&#9;"),
        '\n' => out.write_all(b"&#10;"),
        '\r' => out.write_all(b"&#13;"),
        c if (c as u32) < 0x20 => Ok(()),
        c => write_char(out, c),
    }
}

/// Copy CDATA content, restarting the section around each embedded `]]>`.
///
/// The split is placed between the `]]` and the `>`, so the serialized form
/// never contains the terminator inside one section while a parser still
/// reconstructs the content unchanged. Terminators that straddle chunk
/// boundaries are the writer's concern; see `TagWriter::write_cdata_content`.
pub fn write_cdata_chunk<W: Write + ?Sized>(out: &mut W, content: &str) -> IoResult<()> {
    let mut bytes = content.as_bytes();
    while let Some(pos) = memmem::find(bytes, b"]]>") {
        out.write_all(&bytes[..pos + 2])?;
        out.write_all(CDATA_BREAK.as_bytes())?;
        bytes = &bytes[pos + 2..];
    }
    out.write_all(bytes)
}

/// Copy comment content, collapsing any run of `-` to a single `-`.
///
/// XML forbids `--` inside comments.
pub fn write_comment_content<W: Write + ?Sized>(out: &mut W, text: &str) -> IoResult<()> {
    let bytes = text.as_bytes();
    let mut run_start = 0usize;
    let mut prev_dash = false;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'-' && prev_dash {
            if run_start < i {
                out.write_all(&bytes[run_start..i])?;
            }
            run_start = i + 1;
        }
        prev_dash = b == b'-';
    }
    if run_start < bytes.len() {
        out.write_all(&bytes[run_start..])?;
    }
    Ok(())
}

/// Copy a single comment content character.
pub fn write_comment_content_char<W: Write + ?Sized>(out: &mut W, c: char) -> IoResult<()> {
    write_char(out, c)
}

/// Open a JavaScript string literal.
pub fn begin_js_string<W: Write + ?Sized>(out: &mut W) -> IoResult<()> {
    out.write_all(b"'")
}

/// Close a JavaScript string literal.
pub fn end_js_string<W: Write + ?Sized>(out: &mut W) -> IoResult<()> {
    out.write_all(b"'")
}

/// Write a complete JavaScript string literal for XML attribute context.
///
/// `None` renders the bare token `null`, which callers rely on to encode
/// absent values.
pub fn write_js_string<W: Write + ?Sized>(out: &mut W, value: Option<&str>) -> IoResult<()> {
    match value {
        None => out.write_all(b"null"),
        Some(value) => {
            begin_js_string(out)?;
            write_js_string_content(out, value)?;
            end_js_string(out)
        }
    }
}

/// Write a complete JavaScript string literal for script or CDATA context.
///
/// `None` renders the bare token `null`.
pub fn write_direct_js_string<W: Write + ?Sized>(out: &mut W, value: Option<&str>) -> IoResult<()> {
    match value {
        None => out.write_all(b"null"),
        Some(value) => {
            begin_js_string(out)?;
            write_direct_js_string_content(out, value)?;
            end_js_string(out)
        }
    }
}

/// Escape JavaScript string literal content for XML attribute context.
///
/// The literal is single-quoted; the surrounding text is simultaneously
/// subject to attribute quoting, so `<`, `>`, `&` and `"` become entities.
pub fn write_js_string_content<W: Write + ?Sized>(out: &mut W, value: &str) -> IoResult<()> {
    write_js_content_impl(out, value, false)
}

/// Escape JavaScript string literal content for script or CDATA context.
///
/// `<` and `>` become `\uXXXX` escapes rather than entities so that the
/// enclosing `<script>` or CDATA framing cannot be terminated by literal
/// content.
pub fn write_direct_js_string_content<W: Write + ?Sized>(out: &mut W, value: &str) -> IoResult<()> {
    write_js_content_impl(out, value, true)
}

fn write_js_content_impl<W: Write + ?Sized>(out: &mut W, value: &str, direct: bool) -> IoResult<()> {
    let bytes = value.as_bytes();
    let mut run_start = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        let replacement: &[u8] = match b {
            b'\\' => b"\\\\",
            b'\t' => b"\\t",
            b'\n' => b"\\n",
            b'\r' => b"\\r",
            b'\'' => b"\\'",
            b'<' if direct => b"\\u003C",
            b'<' => b"&lt;",
            b'>' if direct => b"\\u003E",
            b'>' => b"&gt;",
            b'&' if !direct => b"&amp;",
            b'"' if !direct => b"&quot;",
            _ if b < 0x20 => {
                if run_start < i {
                    out.write_all(&bytes[run_start..i])?;
                }
                write_js_control(out, b)?;
                run_start = i + 1;
                continue;
            }
            _ => continue,
        };
        if run_start < i {
            out.write_all(&bytes[run_start..i])?;
        }
        out.write_all(replacement)?;
        run_start = i + 1;
    }
    if run_start < bytes.len() {
        out.write_all(&bytes[run_start..])?;
    }
    Ok(())
}

/// Escape a single JavaScript string literal character, attribute context.
pub fn write_js_string_content_char<W: Write + ?Sized>(out: &mut W, c: char) -> IoResult<()> {
    write_js_char_impl(out, c, false)
}

/// Escape a single JavaScript string literal character, direct context.
pub fn write_direct_js_string_content_char<W: Write + ?Sized>(
    out: &mut W,
    c: char,
) -> IoResult<()> {
    write_js_char_impl(out, c, true)
}

fn write_js_char_impl<W: Write + ?Sized>(out: &mut W, c: char, direct: bool) -> IoResult<()> {
    match c {
        '\\' => out.write_all(b"\\\\"),
        '\t' => out.write_all(b"\\t"),
        '\n' => out.write_all(b"\\n"),
        '\r' => out.write_all(b"\\r"),
        '\'' => out.write_all(b"\\'"),
        '<' if direct => out.write_all(b"\\u003C"),
        '<' => out.write_all(b"&lt;"),
        '>' if direct => out.write_all(b"\\u003E"),
        '>' => out.write_all(b"&gt;"),
        '&' if !direct => out.write_all(b"&amp;"),
        '"' if !direct => out.write_all(b"&quot;"),
        c if (c as u32) < 0x20 => write_js_control(out, c as u8),
        c => write_char(out, c),
    }
}

#[inline]
fn write_js_control<W: Write + ?Sized>(out: &mut W, b: u8) -> IoResult<()> {
    let escape = [
        b'\\',
        b'u',
        b'0',
        b'0',
        HEX[(b >> 4) as usize],
        HEX[(b & 0x0F) as usize],
    ];
    out.write_all(&escape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collect(f: impl FnOnce(&mut Vec<u8>) -> IoResult<()>) -> String {
        let mut out = Vec::new();
        f(&mut out).expect("writing to a Vec cannot fail");
        String::from_utf8(out).expect("escaped output is UTF-8")
    }

    #[test]
    fn text_escapes_markup_characters() {
        assert_eq!(collect(|out| write_text(out, "<&>")), "&lt;&amp;&gt;");
    }

    #[test]
    fn text_passes_safe_input_unchanged() {
        let input = "nothing special at all, not even quotes: \" '";
        assert_eq!(collect(|out| write_text(out, input)), input);
    }

    #[test]
    fn text_drops_illegal_controls_but_keeps_whitespace() {
        assert_eq!(
            collect(|out| write_text(out, "a\u{0}\u{1}b\tc\nd\re\u{1F}f")),
            "ab\tc\nd\ref"
        );
    }

    #[test]
    fn text_empty_input_is_noop() {
        assert_eq!(collect(|out| write_text(out, "")), "");
    }

    #[test]
    fn attribute_escapes_quotes_and_whitespace() {
        assert_eq!(
            collect(|out| write_attribute_text_dquot(out, "\"a\"\t\n\r'b'")),
            "&quot;a&quot;&#9;&#10;&#13;'b'"
        );
        assert_eq!(
            collect(|out| write_attribute_text(out, "'b'")),
            "&#39;b&#39;"
        );
    }

    #[test]
    fn attribute_gt_only_escaped_after_two_brackets() {
        assert_eq!(collect(|out| write_attribute_text_dquot(out, "a>b")), "a>b");
        assert_eq!(
            collect(|out| write_attribute_text_dquot(out, "a]>b")),
            "a]>b"
        );
        assert_eq!(
            collect(|out| write_attribute_text_dquot(out, "a]]>b")),
            "a]]&gt;b"
        );
        assert_eq!(
            collect(|out| write_attribute_text_dquot(out, "a]]]>b")),
            "a]]]&gt;b"
        );
    }

    #[test]
    fn cdata_chunk_splits_every_terminator() {
        assert_eq!(
            collect(|out| write_cdata_chunk(out, "a]]>b")),
            "a]]]]><![CDATA[>b"
        );
        assert_eq!(
            collect(|out| write_cdata_chunk(out, "]]>]]>")),
            "]]]]><![CDATA[>]]]]><![CDATA[>"
        );
    }

    #[test]
    fn cdata_chunk_without_terminator_is_verbatim() {
        assert_eq!(collect(|out| write_cdata_chunk(out, "a]>]b")), "a]>]b");
    }

    #[test]
    fn comment_collapses_dash_runs() {
        assert_eq!(collect(|out| write_comment_content(out, "a---b")), "a-b");
        assert_eq!(collect(|out| write_comment_content(out, "a-b-c")), "a-b-c");
        assert_eq!(collect(|out| write_comment_content(out, "----")), "-");
    }

    #[test]
    fn js_string_attribute_context_uses_entities() {
        assert_eq!(
            collect(|out| write_js_string(out, Some("<a> & \"b\" 'c' \\"))),
            r#"'&lt;a&gt; &amp; &quot;b&quot; \'c\' \\'"#
        );
    }

    #[test]
    fn js_string_direct_context_uses_unicode_escapes() {
        assert_eq!(
            collect(|out| write_direct_js_string(out, Some("<a> & \"b\" 'c'"))),
            "'\\u003Ca\\u003E & \"b\" \\'c\\''"
        );
    }

    #[test]
    fn js_string_null_renders_bare_token() {
        assert_eq!(collect(|out| write_js_string(out, None)), "null");
        assert_eq!(collect(|out| write_direct_js_string(out, None)), "null");
    }

    #[test]
    fn js_string_controls_use_uppercase_hex() {
        assert_eq!(
            collect(|out| write_direct_js_string_content(out, "\u{0}\u{B}\u{1A}\t\n\r")),
            "\\u0000\\u000B\\u001A\\t\\n\\r"
        );
    }
}
