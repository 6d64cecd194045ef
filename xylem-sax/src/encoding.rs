//! The encoding decoder: bytes in, normalized characters out.
//!
//! Detection order: byte order mark, then the `<?xml` signature in each
//! candidate encoding, then the UTF-8 fallback. When the XML declaration
//! names an encoding, the decoder switches to it for the remaining bytes;
//! the already-decoded prefix is ASCII-compatible in every encoding the
//! signature sniff can produce, so no re-decode is needed.
//!
//! Line-end normalization also lives here: handlers never see a CR. A
//! trailing CR is held back across `feed` boundaries so a CRLF split
//! between chunks still collapses to a single LF.

use crate::error::{Diagnostic, Result, SaxError};

// a declaration longer than this is taken as evidence of garbage input
const MAX_DECL_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoding {
    Utf8,
    Utf16Be,
    Utf16Le,
    Utf32Be,
    Utf32Le,
    Latin1,
    Ascii,
}

impl Encoding {
    fn by_name(name: &str) -> Option<Encoding> {
        let upper = name.to_ascii_uppercase();
        Some(match upper.as_str() {
            "UTF-8" => Encoding::Utf8,
            "UTF-16" | "UTF-16BE" => Encoding::Utf16Be,
            "UTF-16LE" => Encoding::Utf16Le,
            "UTF-32" | "UTF-32BE" => Encoding::Utf32Be,
            "UTF-32LE" => Encoding::Utf32Le,
            "ISO-8859-1" | "LATIN1" | "LATIN-1" => Encoding::Latin1,
            "US-ASCII" | "ASCII" => Encoding::Ascii,
            _ => return None,
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf32Be => "UTF-32BE",
            Encoding::Utf32Le => "UTF-32LE",
            Encoding::Latin1 => "ISO-8859-1",
            Encoding::Ascii => "US-ASCII",
        }
    }

    // code unit width in bits; switching between families cannot be
    // honored once decoding has begun
    fn family(&self) -> u8 {
        match self {
            Encoding::Utf16Be | Encoding::Utf16Le => 16,
            Encoding::Utf32Be | Encoding::Utf32Le => 32,
            _ => 8,
        }
    }
}

#[derive(Debug, PartialEq)]
enum DeclScan {
    // still deciding whether the document opens with an XML declaration
    Sniffing,
    // inside <?xml ...; buffering until ?>
    Scanning,
    // declaration handled (or absent); chars flow straight through
    Done,
}

#[derive(Debug)]
pub(crate) struct Decoder {
    encoding: Option<Encoding>,
    bom_fixed: bool,
    pending: Vec<u8>,
    held_cr: bool,
    xml11: bool,
    allow_xml11: bool,
    decl_scan: DeclScan,
    decl_buf: String,
    byte_offset: u64,
}

impl Decoder {
    pub(crate) fn new() -> Self {
        Self {
            encoding: None,
            bom_fixed: false,
            pending: Vec::new(),
            held_cr: false,
            xml11: false,
            allow_xml11: false,
            decl_scan: DeclScan::Sniffing,
            decl_buf: String::new(),
            byte_offset: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self {
            allow_xml11: self.allow_xml11,
            ..Self::new()
        };
    }

    pub(crate) fn set_allow_xml11(&mut self, allow: bool) {
        self.allow_xml11 = allow;
    }

    pub(crate) fn is_xml11(&self) -> bool {
        self.xml11
    }

    pub(crate) fn encoding_name(&self) -> Option<&'static str> {
        self.encoding.map(|e| e.name())
    }

    /// Feed a byte chunk; decoded, normalized characters are appended to
    /// `out`.
    pub(crate) fn feed(&mut self, chunk: &[u8], out: &mut String) -> Result<()> {
        self.pending.extend_from_slice(chunk);
        if self.encoding.is_none() {
            if self.pending.len() < 4 {
                return Ok(());
            }
            self.detect();
        }
        self.pump(out, false)
    }

    /// Signal end of input: flush the held CR, fail on an incomplete
    /// trailing byte sequence.
    pub(crate) fn finish(&mut self, out: &mut String) -> Result<()> {
        if self.encoding.is_none() {
            self.detect();
        }
        self.pump(out, true)?;
        if !self.pending.is_empty() {
            return Err(SaxError::MalformedInput {
                offset: self.byte_offset,
            });
        }
        if self.held_cr {
            self.held_cr = false;
            self.route('\n', out)?;
        }
        if self.decl_scan != DeclScan::Done {
            // document too short for a declaration; release what we have
            self.decl_scan = DeclScan::Done;
            out.push_str(&self.decl_buf);
            self.decl_buf.clear();
        }
        Ok(())
    }

    fn detect(&mut self) {
        let b = &self.pending;
        let (encoding, bom_len, fixed) = match b.as_slice() {
            [0xEF, 0xBB, 0xBF, ..] => (Encoding::Utf8, 3, true),
            [0xFF, 0xFE, 0x00, 0x00, ..] => (Encoding::Utf32Le, 4, true),
            [0x00, 0x00, 0xFE, 0xFF, ..] => (Encoding::Utf32Be, 4, true),
            [0xFE, 0xFF, ..] => (Encoding::Utf16Be, 2, true),
            [0xFF, 0xFE, ..] => (Encoding::Utf16Le, 2, true),
            [0x00, 0x00, 0x00, 0x3C, ..] => (Encoding::Utf32Be, 0, false),
            [0x3C, 0x00, 0x00, 0x00, ..] => (Encoding::Utf32Le, 0, false),
            [0x00, 0x3C, 0x00, 0x3F, ..] => (Encoding::Utf16Be, 0, false),
            [0x3C, 0x00, 0x3F, 0x00, ..] => (Encoding::Utf16Le, 0, false),
            _ => (Encoding::Utf8, 0, false),
        };
        self.encoding = Some(encoding);
        self.bom_fixed = fixed;
        self.pending.drain(..bom_len);
        self.byte_offset += bom_len as u64;
    }

    // decode everything decodable out of `pending`, routing through the
    // declaration scanner and line-end normalization
    fn pump(&mut self, out: &mut String, at_end: bool) -> Result<()> {
        loop {
            let encoding = match self.encoding {
                Some(encoding) => encoding,
                None => return Ok(()),
            };
            // while the XML declaration is still in play, stop decoding
            // right after the first '>' so bytes past a possible
            // encoding switch are never decoded with the old encoding
            let limit_gt = self.decl_scan != DeclScan::Done;
            let mut decoded = String::new();
            let consumed = self.decode_available(encoding, limit_gt, &mut decoded)?;
            self.pending.drain(..consumed);
            self.byte_offset += consumed as u64;
            if decoded.is_empty() && !at_end {
                return Ok(());
            }
            let switched = self.normalize_and_route(&decoded, out)?;
            if !switched {
                // no encoding switch happened; if nothing more can be
                // decoded we are done for this feed
                if decoded.is_empty() {
                    return Ok(());
                }
            }
            // on a switch, loop to re-pump remaining bytes in the new
            // encoding; otherwise keep draining until pending runs dry
            if self.pending.is_empty() {
                return Ok(());
            }
        }
    }

    fn decode_available(&self, encoding: Encoding, limit_gt: bool, out: &mut String) -> Result<usize> {
        let mut bytes: &[u8] = &self.pending;
        if limit_gt {
            match encoding {
                Encoding::Utf8 | Encoding::Latin1 | Encoding::Ascii => {
                    if let Some(pos) = bytes.iter().position(|b| *b == b'>') {
                        bytes = &bytes[..pos + 1];
                    }
                }
                Encoding::Utf16Be | Encoding::Utf16Le => {
                    let mut i = 0;
                    while i + 2 <= bytes.len() {
                        if self.unit16(encoding, &bytes[i..]) == b'>' as u16 {
                            bytes = &bytes[..i + 2];
                            break;
                        }
                        i += 2;
                    }
                }
                Encoding::Utf32Be | Encoding::Utf32Le => {
                    let mut i = 0;
                    while i + 4 <= bytes.len() {
                        let raw = if encoding == Encoding::Utf32Be {
                            u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
                        } else {
                            u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
                        };
                        if raw == b'>' as u32 {
                            bytes = &bytes[..i + 4];
                            break;
                        }
                        i += 4;
                    }
                }
            }
        }
        match encoding {
            Encoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => {
                    out.push_str(s);
                    Ok(bytes.len())
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&bytes[..valid]).unwrap());
                    if e.error_len().is_some() {
                        return Err(SaxError::MalformedInput {
                            offset: self.byte_offset + valid as u64,
                        });
                    }
                    Ok(valid)
                }
            },
            Encoding::Utf16Be | Encoding::Utf16Le => {
                let mut i = 0;
                while i + 2 <= bytes.len() {
                    let unit = self.unit16(encoding, &bytes[i..]);
                    if (0xD800..0xDC00).contains(&unit) {
                        if i + 4 > bytes.len() {
                            break;
                        }
                        let low = self.unit16(encoding, &bytes[i + 2..]);
                        if !(0xDC00..0xE000).contains(&low) {
                            return Err(SaxError::MalformedInput {
                                offset: self.byte_offset + i as u64,
                            });
                        }
                        let scalar =
                            0x10000 + (((unit as u32 - 0xD800) << 10) | (low as u32 - 0xDC00));
                        out.push(char::from_u32(scalar).unwrap());
                        i += 4;
                    } else if (0xDC00..0xE000).contains(&unit) {
                        return Err(SaxError::MalformedInput {
                            offset: self.byte_offset + i as u64,
                        });
                    } else {
                        out.push(char::from_u32(unit as u32).unwrap());
                        i += 2;
                    }
                }
                Ok(i)
            }
            Encoding::Utf32Be | Encoding::Utf32Le => {
                let mut i = 0;
                while i + 4 <= bytes.len() {
                    let raw = if encoding == Encoding::Utf32Be {
                        u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
                    } else {
                        u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
                    };
                    match char::from_u32(raw) {
                        Some(c) => out.push(c),
                        None => {
                            return Err(SaxError::MalformedInput {
                                offset: self.byte_offset + i as u64,
                            })
                        }
                    }
                    i += 4;
                }
                Ok(i)
            }
            Encoding::Latin1 => {
                for b in bytes {
                    out.push(*b as char);
                }
                Ok(bytes.len())
            }
            Encoding::Ascii => {
                for (i, b) in bytes.iter().enumerate() {
                    if *b >= 0x80 {
                        return Err(SaxError::MalformedInput {
                            offset: self.byte_offset + i as u64,
                        });
                    }
                    out.push(*b as char);
                }
                Ok(bytes.len())
            }
        }
    }

    fn unit16(&self, encoding: Encoding, bytes: &[u8]) -> u16 {
        if encoding == Encoding::Utf16Be {
            u16::from_be_bytes([bytes[0], bytes[1]])
        } else {
            u16::from_le_bytes([bytes[0], bytes[1]])
        }
    }

    // returns true when the XML declaration switched the encoding and
    // the caller must re-pump
    fn normalize_and_route(&mut self, decoded: &str, out: &mut String) -> Result<bool> {
        for c in decoded.chars() {
            if self.held_cr {
                self.held_cr = false;
                self.route('\n', out)?;
                if c == '\n' || (self.xml11 && c == '\u{85}') {
                    continue;
                }
            }
            match c {
                '\r' => {
                    self.held_cr = true;
                }
                '\u{85}' | '\u{2028}' if self.xml11 => self.route('\n', out)?,
                _ => self.route(c, out)?,
            }
        }
        // the declaration scanner may have requested a switch
        if let Some(switched) = self.try_finish_decl(out)? {
            return Ok(switched);
        }
        Ok(false)
    }

    fn route(&mut self, c: char, out: &mut String) -> Result<()> {
        match self.decl_scan {
            DeclScan::Done => out.push(c),
            _ => {
                self.decl_buf.push(c);
                if self.decl_buf.len() > MAX_DECL_LEN {
                    return Err(SaxError::Lexical(Diagnostic::new(
                        "XML declaration is not terminated",
                        1,
                        1,
                    )));
                }
            }
        }
        Ok(())
    }

    fn try_finish_decl(&mut self, out: &mut String) -> Result<Option<bool>> {
        match self.decl_scan {
            DeclScan::Done => Ok(None),
            DeclScan::Sniffing => {
                let buf = &self.decl_buf;
                if buf.len() < 6 {
                    // can't tell yet whether this is a declaration
                    if !"<?xml ".starts_with(buf.as_str())
                        && !(buf.starts_with("<?xml") && buf.len() == 5)
                    {
                        self.release_decl_buf(out);
                        return Ok(Some(false));
                    }
                    return Ok(None);
                }
                let sixth = buf.chars().nth(5);
                if buf.starts_with("<?xml")
                    && matches!(sixth, Some(c) if crate::chars::is_whitespace_char(c) || c == '\u{85}' || c == '\u{2028}')
                {
                    self.decl_scan = DeclScan::Scanning;
                    self.try_finish_decl(out)
                } else {
                    self.release_decl_buf(out);
                    Ok(Some(false))
                }
            }
            DeclScan::Scanning => {
                if !self.decl_buf.contains("?>") {
                    return Ok(None);
                }
                let switched = self.handle_declaration()?;
                self.release_decl_buf(out);
                Ok(Some(switched))
            }
        }
    }

    fn release_decl_buf(&mut self, out: &mut String) {
        self.decl_scan = DeclScan::Done;
        out.push_str(&self.decl_buf);
        self.decl_buf.clear();
    }

    fn handle_declaration(&mut self) -> Result<bool> {
        if let Some(version) = pseudo_attribute(&self.decl_buf, "version") {
            if version == "1.1" && self.allow_xml11 {
                self.xml11 = true;
            }
        }
        let declared = match pseudo_attribute(&self.decl_buf, "encoding") {
            Some(declared) => declared,
            None => return Ok(false),
        };
        let target = Encoding::by_name(&declared)
            .ok_or_else(|| SaxError::UnsupportedEncoding(declared.clone()))?;
        let current = self.encoding.unwrap();
        if self.bom_fixed || current == target {
            return Ok(false);
        }
        if current.family() != target.family() {
            // a BOM-less document whose declaration names an encoding in
            // a different family than the bytes we sniffed
            return Err(SaxError::UnsupportedEncoding(declared));
        }
        if current.family() != 8 {
            // byte order was established by BOM or sniff; the
            // declaration cannot change it
            return Ok(false);
        }
        self.encoding = Some(target);
        Ok(true)
    }
}

// extract a pseudo-attribute value out of an XML declaration
fn pseudo_attribute(decl: &str, name: &str) -> Option<String> {
    let mut rest = decl;
    while let Some(pos) = rest.find(name) {
        let before_ok = pos == 0
            || rest[..pos]
                .chars()
                .next_back()
                .map(|c| crate::chars::is_whitespace_char(c))
                .unwrap_or(true);
        let after = &rest[pos + name.len()..];
        let after_eq = after.trim_start();
        if before_ok && after_eq.starts_with('=') {
            let value_part = after_eq[1..].trim_start();
            let quote = value_part.chars().next()?;
            if quote == '"' || quote == '\'' {
                let inner = &value_part[1..];
                if let Some(end) = inner.find(quote) {
                    return Some(inner[..end].to_string());
                }
            }
        }
        rest = &rest[pos + name.len()..];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Result<String> {
        let mut decoder = Decoder::new();
        let mut out = String::new();
        for chunk in chunks {
            decoder.feed(chunk, &mut out)?;
        }
        decoder.finish(&mut out)?;
        Ok(out)
    }

    #[test]
    fn utf8_fallback() {
        assert_eq!(decode_all(&[b"<a>hi</a>"]).unwrap(), "<a>hi</a>");
    }

    #[test]
    fn utf8_bom_consumed() {
        assert_eq!(decode_all(&[b"\xEF\xBB\xBF<a/>"]).unwrap(), "<a/>");
    }

    #[test]
    fn utf16_le_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<a/>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_all(&[&bytes]).unwrap(), "<a/>");
    }

    #[test]
    fn utf16_be_sniffed_without_bom() {
        let mut bytes = Vec::new();
        for unit in "<?xml version=\"1.0\"?><a/>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(
            decode_all(&[&bytes]).unwrap(),
            "<?xml version=\"1.0\"?><a/>"
        );
    }

    #[test]
    fn declared_latin1_switch() {
        let mut bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>".to_vec();
        bytes.push(0xE9); // e-acute in latin-1
        bytes.extend_from_slice(b"</a>");
        let out = decode_all(&[&bytes]).unwrap();
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>\u{e9}</a>"
        );
    }

    #[test]
    fn unknown_declared_encoding_fails() {
        let result = decode_all(&[b"<?xml version=\"1.0\" encoding=\"EBCDIC-FI\"?><a/>"]);
        assert!(matches!(result, Err(SaxError::UnsupportedEncoding(_))));
    }

    #[test]
    fn crlf_normalized_within_chunk() {
        assert_eq!(decode_all(&[b"<a>x\r\ny</a>"]).unwrap(), "<a>x\ny</a>");
    }

    #[test]
    fn crlf_split_across_chunks() {
        assert_eq!(decode_all(&[b"<a>x\r", b"\ny</a>"]).unwrap(), "<a>x\ny</a>");
    }

    #[test]
    fn lone_cr_normalized() {
        assert_eq!(decode_all(&[b"<a>x\ry</a>"]).unwrap(), "<a>x\ny</a>");
        assert_eq!(decode_all(&[b"<a>x\r</a>"]).unwrap(), "<a>x\n</a>");
    }

    #[test]
    fn xml11_nel_normalized() {
        let mut decoder = Decoder::new();
        decoder.set_allow_xml11(true);
        let mut out = String::new();
        decoder
            .feed("<?xml version=\"1.1\"?><a>x\u{85}y</a>".as_bytes(), &mut out)
            .unwrap();
        decoder.finish(&mut out).unwrap();
        assert_eq!(out, "<?xml version=\"1.1\"?><a>x\ny</a>");
    }

    #[test]
    fn declaration_split_across_many_chunks() {
        let out = decode_all(&[b"<?xml ver", b"sion=\"1.0\" enc", b"oding=\"UTF-8\"?><a/", b">"])
            .unwrap();
        assert_eq!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>");
    }

    #[test]
    fn truncated_utf8_sequence_is_malformed() {
        let mut decoder = Decoder::new();
        let mut out = String::new();
        decoder.feed(b"<a>\xC3", &mut out).unwrap();
        assert!(matches!(
            decoder.finish(&mut out),
            Err(SaxError::MalformedInput { .. })
        ));
    }

    #[test]
    fn invalid_ascii_byte_is_malformed() {
        let mut decoder = Decoder::new();
        let mut out = String::new();
        let result = decoder.feed(
            b"<?xml version=\"1.0\" encoding=\"US-ASCII\"?><a>\xFF</a>",
            &mut out,
        );
        assert!(matches!(result, Err(SaxError::MalformedInput { .. })));
    }
}
