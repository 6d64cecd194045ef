//! The character-level state machine.
//!
//! Drives over decoded, line-normalized characters and hands typed
//! tokens to a [`TokenSink`]. The machine is restartable at any
//! character boundary: everything that must survive a `feed` boundary
//! lives in small scratch buffers, while contiguous text runs are
//! handed out as slices of the caller's buffer without copying.

use crate::chars::{
    is_name_char, is_name_start_char, is_whitespace_char, is_xml10_char, is_xml11_char,
};
use crate::error::{Diagnostic, Result, SaxError};
use crate::handler::Locator;

/// A token handed to the consumer. Slices are valid only for the
/// duration of the call.
#[derive(Debug, PartialEq)]
pub(crate) enum Token<'a> {
    /// The XML declaration, only ever first in the stream.
    XmlDecl {
        version: Option<&'a str>,
        encoding: Option<&'a str>,
        standalone: Option<&'a str>,
    },
    /// `<name`
    StartTagName(&'a str),
    /// An attribute name inside a start tag.
    AttrName(&'a str),
    /// A literal piece of an attribute value, whitespace-mapped,
    /// character references resolved.
    AttrValuePiece(&'a str),
    /// A general entity reference inside an attribute value.
    AttrValueEntityRef(&'a str),
    /// The closing quote of an attribute value.
    AttrValueEnd,
    /// `>` ending a start tag.
    StartTagClose,
    /// `/>`
    StartTagSelfClose,
    /// `</name>` complete.
    EndTag(&'a str),
    /// A run of character data; may be a partial run.
    Text(&'a str),
    /// A general entity reference in content.
    EntityRef(&'a str),
    /// A complete processing instruction.
    Pi { target: &'a str, data: &'a str },
    /// A complete comment body.
    Comment(&'a str),
    /// `<![CDATA[`
    CdataStart,
    /// `]]>` ending a CDATA section.
    CdataEnd,
    /// The root element name of the DOCTYPE declaration.
    DoctypeName(&'a str),
    /// The public identifier literal of the DOCTYPE.
    DoctypePublicId(&'a str),
    /// The system identifier literal of the DOCTYPE.
    DoctypeSystemId(&'a str),
    /// `[` opening the internal subset.
    DtdSubsetOpen,
    /// The interior of one `<!…>` markup declaration in the internal
    /// subset, e.g. `ELEMENT a (b)`.
    MarkupDecl(&'a str),
    /// A parameter entity reference at internal-subset level.
    DtdPeRef(&'a str),
    /// `>` terminating the DOCTYPE declaration.
    DoctypeEnd,
}

/// Consumer of the token stream.
pub(crate) trait TokenSink {
    fn token(&mut self, token: Token<'_>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Content,
    TagOpen,
    TagName,
    InTag,
    AttrName,
    AfterAttrName,
    BeforeAttrValue,
    AttrValue,
    SelfClose,
    CloseTagName,
    CloseTagEnd,
    PiTarget,
    PiAfterTarget,
    PiData,
    MarkupDeclOpen,
    CommentStartDash,
    Comment,
    CommentDash,
    CommentDashDash,
    CdataKeyword,
    Cdata,
    CdataBracket,
    CdataBracketBracket,
    Reference,
    ReferenceName,
    CharRefStart,
    CharRefDec,
    CharRefHex,
    DoctypeKeyword,
    DoctypeBeforeName,
    DoctypeName,
    DoctypeAfterName,
    DoctypeIdKeyword,
    DoctypeBeforePublicId,
    DoctypePublicId,
    DoctypeBeforeSystemId,
    DoctypeSystemId,
    DoctypeAfterIds,
    DtdSubset,
    DtdMarkupOpen,
    DtdDecl,
    DtdPeRef,
    DtdAfterSubset,
}

// where a resolved reference or nested construct delivers its output
#[derive(Debug, Clone, Copy, PartialEq)]
enum RefContext {
    Content,
    AttrValue,
}

#[derive(Debug)]
pub(crate) struct Tokenizer {
    state: State,
    line: u64,
    column: u64,
    // position of the token currently being assembled
    token_line: u64,
    token_column: u64,
    xml11: bool,
    seen_content: bool,
    at_document_start: bool,
    scratch: String,
    aux: String,
    quote: char,
    ref_context: RefContext,
    char_ref_value: u32,
    char_ref_digits: u32,
    keyword_progress: usize,
    decl_quote: Option<char>,
    bracket_run: usize,
    had_doctype: bool,
    in_subset: bool,
    locator: Option<Locator>,
}

impl Tokenizer {
    pub(crate) fn new() -> Self {
        Self {
            state: State::Content,
            line: 1,
            column: 1,
            token_line: 1,
            token_column: 1,
            xml11: false,
            seen_content: false,
            at_document_start: true,
            scratch: String::new(),
            aux: String::new(),
            quote: '"',
            ref_context: RefContext::Content,
            char_ref_value: 0,
            char_ref_digits: 0,
            keyword_progress: 0,
            decl_quote: None,
            bracket_run: 0,
            had_doctype: false,
            in_subset: false,
            locator: None,
        }
    }

    /// A nested tokenizer for entity replacement text; inherits the
    /// version flag and reports positions of the outer document.
    pub(crate) fn for_entity(xml11: bool, line: u64, column: u64) -> Self {
        let mut tokenizer = Self::new();
        tokenizer.xml11 = xml11;
        tokenizer.line = line;
        tokenizer.column = column;
        tokenizer.at_document_start = false;
        tokenizer
    }

    pub(crate) fn set_xml11(&mut self, xml11: bool) {
        self.xml11 = xml11;
    }

    /// External entities may open with a text declaration.
    pub(crate) fn allow_text_decl(&mut self) {
        self.at_document_start = true;
    }

    pub(crate) fn attach_locator(&mut self, locator: Locator) {
        self.locator = Some(locator);
    }

    pub(crate) fn position(&self) -> (u64, u64) {
        (self.line, self.column)
    }

    pub(crate) fn token_position(&self) -> (u64, u64) {
        (self.token_line, self.token_column)
    }

    fn error(&self, message: impl Into<String>) -> SaxError {
        SaxError::Lexical(Diagnostic::new(message, self.line, self.column))
    }

    /// Run the machine over one buffer of characters.
    pub(crate) fn run(&mut self, buf: &str, sink: &mut dyn TokenSink) -> Result<()> {
        let mut text_start: Option<usize> = None;
        for (i, c) in buf.char_indices() {
            if let Some(locator) = &self.locator {
                locator.set_position(self.line, self.column);
            }
            if !(if self.xml11 { is_xml11_char(c) } else { is_xml10_char(c) }) {
                return Err(self.error(format!("character U+{:04X} is not allowed", c as u32)));
            }
            // fast path: a text run stays in the caller's buffer
            if self.state == State::Content {
                match c {
                    '<' | '&' => {
                        if let Some(start) = text_start.take() {
                            self.flush_bracket_run(sink)?;
                            if i > start {
                                sink.token(Token::Text(&buf[start..i]))?;
                            }
                        } else {
                            self.flush_bracket_run(sink)?;
                        }
                    }
                    ']' => {
                        // track ]]> which may not appear in content
                        if let Some(start) = text_start.take() {
                            if i > start {
                                sink.token(Token::Text(&buf[start..i]))?;
                            }
                        }
                        self.bracket_run += 1;
                        self.advance_position(c);
                        continue;
                    }
                    '>' if self.bracket_run >= 2 => {
                        return Err(self.error("']]>' is not allowed in content"));
                    }
                    _ => {
                        self.flush_bracket_run(sink)?;
                        self.at_document_start = false;
                        if text_start.is_none() {
                            self.token_line = self.line;
                            self.token_column = self.column;
                            text_start = Some(i);
                        }
                        self.advance_position(c);
                        continue;
                    }
                }
            }
            self.step(c, sink)?;
            self.advance_position(c);
        }
        if let Some(start) = text_start {
            sink.token(Token::Text(&buf[start..]))?;
        }
        Ok(())
    }

    /// Signal end of input; errors if mid-construct.
    pub(crate) fn finish(&mut self, sink: &mut dyn TokenSink) -> Result<()> {
        self.flush_bracket_run(sink)?;
        if self.state != State::Content {
            return Err(self.error("unexpected end of input"));
        }
        Ok(())
    }

    fn flush_bracket_run(&mut self, sink: &mut dyn TokenSink) -> Result<()> {
        if self.bracket_run > 0 {
            let brackets = "]".repeat(self.bracket_run);
            self.bracket_run = 0;
            sink.token(Token::Text(&brackets))?;
        }
        Ok(())
    }

    fn advance_position(&mut self, c: char) {
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    fn begin_token(&mut self) {
        self.token_line = self.line;
        self.token_column = self.column;
    }

    fn step(&mut self, c: char, sink: &mut dyn TokenSink) -> Result<()> {
        use State::*;
        match self.state {
            Content => match c {
                '<' => {
                    self.begin_token();
                    self.state = TagOpen;
                }
                '&' => {
                    self.begin_token();
                    self.ref_context = RefContext::Content;
                    self.state = Reference;
                }
                _ => unreachable!("content chars handled in run()"),
            },
            TagOpen => match c {
                '/' => {
                    self.at_document_start = false;
                    self.scratch.clear();
                    self.state = CloseTagName;
                }
                '?' => {
                    self.scratch.clear();
                    self.state = PiTarget;
                }
                '!' => {
                    self.at_document_start = false;
                    self.state = MarkupDeclOpen;
                }
                c if is_name_start_char(c) => {
                    self.at_document_start = false;
                    self.seen_content = true;
                    self.scratch.clear();
                    self.scratch.push(c);
                    self.state = TagName;
                }
                _ => return Err(self.error(format!("unexpected character {c:?} after '<'"))),
            },
            TagName => match c {
                c if is_name_char(c) => self.scratch.push(c),
                c if is_whitespace_char(c) => {
                    sink.token(Token::StartTagName(&self.scratch))?;
                    self.state = InTag;
                }
                '>' => {
                    sink.token(Token::StartTagName(&self.scratch))?;
                    sink.token(Token::StartTagClose)?;
                    self.state = Content;
                }
                '/' => {
                    sink.token(Token::StartTagName(&self.scratch))?;
                    self.state = SelfClose;
                }
                _ => return Err(self.error(format!("unexpected character {c:?} in element name"))),
            },
            InTag => match c {
                c if is_whitespace_char(c) => {}
                '>' => {
                    sink.token(Token::StartTagClose)?;
                    self.state = Content;
                }
                '/' => self.state = SelfClose,
                c if is_name_start_char(c) => {
                    self.begin_token();
                    self.scratch.clear();
                    self.scratch.push(c);
                    self.state = AttrName;
                }
                _ => return Err(self.error(format!("unexpected character {c:?} in tag"))),
            },
            AttrName => match c {
                c if is_name_char(c) => self.scratch.push(c),
                c if is_whitespace_char(c) => {
                    sink.token(Token::AttrName(&self.scratch))?;
                    self.state = AfterAttrName;
                }
                '=' => {
                    sink.token(Token::AttrName(&self.scratch))?;
                    self.state = BeforeAttrValue;
                }
                _ => return Err(self.error(format!("unexpected character {c:?} in attribute name"))),
            },
            AfterAttrName => match c {
                c if is_whitespace_char(c) => {}
                '=' => self.state = BeforeAttrValue,
                _ => return Err(self.error("expected '=' after attribute name")),
            },
            BeforeAttrValue => match c {
                c if is_whitespace_char(c) => {}
                '"' | '\'' => {
                    self.quote = c;
                    self.scratch.clear();
                    self.state = AttrValue;
                }
                _ => return Err(self.error("attribute value must be quoted")),
            },
            AttrValue => match c {
                c if c == self.quote => {
                    if !self.scratch.is_empty() {
                        sink.token(Token::AttrValuePiece(&self.scratch))?;
                        self.scratch.clear();
                    }
                    sink.token(Token::AttrValueEnd)?;
                    self.state = InTag;
                }
                '<' => return Err(self.error("'<' is not allowed in attribute values")),
                '&' => {
                    if !self.scratch.is_empty() {
                        sink.token(Token::AttrValuePiece(&self.scratch))?;
                        self.scratch.clear();
                    }
                    self.ref_context = RefContext::AttrValue;
                    self.state = Reference;
                }
                // attribute-value normalization: literal whitespace
                // becomes a space; referenced whitespace stays
                '\t' | '\n' => self.scratch.push(' '),
                _ => self.scratch.push(c),
            },
            SelfClose => match c {
                '>' => {
                    sink.token(Token::StartTagSelfClose)?;
                    self.state = Content;
                }
                _ => return Err(self.error("expected '>' after '/'")),
            },
            CloseTagName => match c {
                c if is_name_start_char(c) && self.scratch.is_empty() => self.scratch.push(c),
                c if is_name_char(c) && !self.scratch.is_empty() => self.scratch.push(c),
                '>' if !self.scratch.is_empty() => {
                    sink.token(Token::EndTag(&self.scratch))?;
                    self.state = Content;
                }
                c if is_whitespace_char(c) && !self.scratch.is_empty() => {
                    self.state = CloseTagEnd;
                }
                _ => return Err(self.error(format!("unexpected character {c:?} in end tag"))),
            },
            CloseTagEnd => match c {
                c if is_whitespace_char(c) => {}
                '>' => {
                    sink.token(Token::EndTag(&self.scratch))?;
                    self.state = Content;
                }
                _ => return Err(self.error("expected '>' in end tag")),
            },
            PiTarget => match c {
                c if is_name_char(c) || (self.scratch.is_empty() && is_name_start_char(c)) => {
                    self.scratch.push(c);
                }
                c if is_whitespace_char(c) && !self.scratch.is_empty() => {
                    self.aux.clear();
                    self.state = PiAfterTarget;
                }
                '?' if !self.scratch.is_empty() => {
                    self.aux.clear();
                    self.aux.push('?');
                    self.state = PiData;
                }
                _ => return Err(self.error("invalid processing instruction target")),
            },
            PiAfterTarget => match c {
                c if is_whitespace_char(c) => {}
                _ => {
                    self.aux.clear();
                    self.aux.push(c);
                    self.state = PiData;
                }
            },
            PiData => {
                self.aux.push(c);
                if self.aux.ends_with("?>") {
                    self.aux.truncate(self.aux.len() - 2);
                    self.emit_pi(sink)?;
                    self.state = if self.in_subset { DtdSubset } else { Content };
                }
            }
            MarkupDeclOpen => match c {
                '-' => self.state = CommentStartDash,
                '[' => {
                    if !self.seen_content {
                        return Err(self.error("CDATA section is not allowed outside content"));
                    }
                    self.keyword_progress = 0;
                    self.state = CdataKeyword;
                }
                'D' => {
                    if self.seen_content || self.had_doctype {
                        return Err(self.error("DOCTYPE must precede content"));
                    }
                    self.keyword_progress = 1;
                    self.state = DoctypeKeyword;
                }
                _ => return Err(self.error("unexpected markup declaration")),
            },
            CommentStartDash => match c {
                '-' => {
                    self.scratch.clear();
                    self.state = Comment;
                }
                _ => return Err(self.error("expected '<!--'")),
            },
            Comment => match c {
                '-' => self.state = CommentDash,
                _ => self.scratch.push(c),
            },
            CommentDash => match c {
                '-' => self.state = CommentDashDash,
                _ => {
                    self.scratch.push('-');
                    self.scratch.push(c);
                    self.state = Comment;
                }
            },
            CommentDashDash => match c {
                '>' => {
                    sink.token(Token::Comment(&self.scratch))?;
                    self.state = if self.in_subset { DtdSubset } else { Content };
                }
                _ => return Err(self.error("'--' is not allowed inside comments")),
            },
            CdataKeyword => {
                const KEYWORD: &str = "CDATA[";
                if KEYWORD.as_bytes().get(self.keyword_progress) == Some(&(c as u8)) {
                    self.keyword_progress += 1;
                    if self.keyword_progress == KEYWORD.len() {
                        sink.token(Token::CdataStart)?;
                        self.state = Cdata;
                    }
                } else {
                    return Err(self.error("expected '<![CDATA['"));
                }
            }
            Cdata => match c {
                ']' => self.state = CdataBracket,
                _ => {
                    // CDATA content flows out as plain text pieces
                    let mut tmp = [0u8; 4];
                    sink.token(Token::Text(c.encode_utf8(&mut tmp)))?;
                }
            },
            CdataBracket => match c {
                ']' => self.state = CdataBracketBracket,
                _ => {
                    sink.token(Token::Text("]"))?;
                    let mut tmp = [0u8; 4];
                    sink.token(Token::Text(c.encode_utf8(&mut tmp)))?;
                    self.state = Cdata;
                }
            },
            CdataBracketBracket => match c {
                '>' => {
                    sink.token(Token::CdataEnd)?;
                    self.state = Content;
                }
                ']' => {
                    sink.token(Token::Text("]"))?;
                }
                _ => {
                    sink.token(Token::Text("]]"))?;
                    let mut tmp = [0u8; 4];
                    sink.token(Token::Text(c.encode_utf8(&mut tmp)))?;
                    self.state = Cdata;
                }
            },
            Reference => match c {
                '#' => {
                    self.state = CharRefStart;
                }
                c if is_name_start_char(c) => {
                    self.scratch.clear();
                    self.scratch.push(c);
                    self.state = ReferenceName;
                }
                _ => return Err(self.error("invalid reference")),
            },
            ReferenceName => return self.step_reference_name(c, sink),
            CharRefStart => match c {
                'x' => {
                    self.char_ref_value = 0;
                    self.char_ref_digits = 0;
                    self.state = CharRefHex;
                }
                '0'..='9' => {
                    self.char_ref_value = c as u32 - '0' as u32;
                    self.char_ref_digits = 1;
                    self.state = CharRefDec;
                }
                _ => return Err(self.error("invalid character reference")),
            },
            CharRefDec => match c {
                '0'..='9' => {
                    self.char_ref_value = self
                        .char_ref_value
                        .saturating_mul(10)
                        .saturating_add(c as u32 - '0' as u32);
                    self.char_ref_digits += 1;
                }
                ';' => self.emit_char_ref(sink)?,
                _ => return Err(self.error("invalid character reference")),
            },
            CharRefHex => match c {
                c if c.is_ascii_hexdigit() => {
                    self.char_ref_value = self
                        .char_ref_value
                        .saturating_mul(16)
                        .saturating_add(c.to_digit(16).unwrap());
                    self.char_ref_digits += 1;
                }
                ';' => self.emit_char_ref(sink)?,
                _ => return Err(self.error("invalid character reference")),
            },
            DoctypeKeyword => {
                const KEYWORD: &str = "DOCTYPE";
                if KEYWORD.as_bytes().get(self.keyword_progress) == Some(&(c as u8)) {
                    self.keyword_progress += 1;
                    if self.keyword_progress == KEYWORD.len() {
                        self.had_doctype = true;
                        self.state = DoctypeBeforeName;
                    }
                } else {
                    return Err(self.error("expected '<!DOCTYPE'"));
                }
            }
            DoctypeBeforeName => match c {
                c if is_whitespace_char(c) => {}
                c if is_name_start_char(c) => {
                    self.scratch.clear();
                    self.scratch.push(c);
                    self.state = DoctypeName;
                }
                _ => return Err(self.error("expected document type name")),
            },
            DoctypeName => match c {
                c if is_name_char(c) => self.scratch.push(c),
                c if is_whitespace_char(c) => {
                    sink.token(Token::DoctypeName(&self.scratch))?;
                    self.state = DoctypeAfterName;
                }
                '[' => {
                    sink.token(Token::DoctypeName(&self.scratch))?;
                    sink.token(Token::DtdSubsetOpen)?;
                    self.in_subset = true;
                    self.state = DtdSubset;
                }
                '>' => {
                    sink.token(Token::DoctypeName(&self.scratch))?;
                    sink.token(Token::DoctypeEnd)?;
                    self.state = Content;
                }
                _ => return Err(self.error("invalid document type name")),
            },
            DoctypeAfterName => match c {
                c if is_whitespace_char(c) => {}
                'P' | 'S' => {
                    self.scratch.clear();
                    self.scratch.push(c);
                    self.state = DoctypeIdKeyword;
                }
                '[' => {
                    sink.token(Token::DtdSubsetOpen)?;
                    self.in_subset = true;
                    self.state = DtdSubset;
                }
                '>' => {
                    sink.token(Token::DoctypeEnd)?;
                    self.state = Content;
                }
                _ => return Err(self.error("unexpected character in DOCTYPE")),
            },
            DoctypeIdKeyword => {
                if c.is_ascii_uppercase() {
                    self.scratch.push(c);
                } else if is_whitespace_char(c) {
                    match self.scratch.as_str() {
                        "PUBLIC" => self.state = DoctypeBeforePublicId,
                        "SYSTEM" => self.state = DoctypeBeforeSystemId,
                        other => {
                            return Err(self.error(format!("unexpected keyword {other:?}")));
                        }
                    }
                } else {
                    return Err(self.error("expected PUBLIC or SYSTEM"));
                }
            }
            DoctypeBeforePublicId => match c {
                c if is_whitespace_char(c) => {}
                '"' | '\'' => {
                    self.quote = c;
                    self.scratch.clear();
                    self.state = DoctypePublicId;
                }
                _ => return Err(self.error("expected public identifier literal")),
            },
            DoctypePublicId => match c {
                c if c == self.quote => {
                    sink.token(Token::DoctypePublicId(&self.scratch))?;
                    self.state = DoctypeBeforeSystemId;
                }
                _ => self.scratch.push(c),
            },
            DoctypeBeforeSystemId => match c {
                c if is_whitespace_char(c) => {}
                '"' | '\'' => {
                    self.quote = c;
                    self.scratch.clear();
                    self.state = DoctypeSystemId;
                }
                // SYSTEM id is optional after a public id
                '[' => {
                    sink.token(Token::DtdSubsetOpen)?;
                    self.in_subset = true;
                    self.state = DtdSubset;
                }
                '>' => {
                    sink.token(Token::DoctypeEnd)?;
                    self.state = Content;
                }
                _ => return Err(self.error("expected system identifier literal")),
            },
            DoctypeSystemId => match c {
                c if c == self.quote => {
                    sink.token(Token::DoctypeSystemId(&self.scratch))?;
                    self.state = DoctypeAfterIds;
                }
                _ => self.scratch.push(c),
            },
            DoctypeAfterIds => match c {
                c if is_whitespace_char(c) => {}
                '[' => {
                    sink.token(Token::DtdSubsetOpen)?;
                    self.in_subset = true;
                    self.state = DtdSubset;
                }
                '>' => {
                    sink.token(Token::DoctypeEnd)?;
                    self.state = Content;
                }
                _ => return Err(self.error("unexpected character in DOCTYPE")),
            },
            DtdSubset => match c {
                c if is_whitespace_char(c) => {}
                '<' => self.state = DtdMarkupOpen,
                '%' => {
                    self.scratch.clear();
                    self.state = DtdPeRef;
                }
                ']' => {
                    self.in_subset = false;
                    self.state = DtdAfterSubset;
                }
                _ => return Err(self.error("unexpected character in internal subset")),
            },
            DtdMarkupOpen => match c {
                '!' => {
                    self.scratch.clear();
                    self.decl_quote = None;
                    self.state = DtdDecl;
                }
                '?' => {
                    self.scratch.clear();
                    self.state = PiTarget;
                }
                _ => return Err(self.error("expected markup declaration in internal subset")),
            },
            DtdDecl => {
                if self.scratch == "-" && c == '-' {
                    // actually a comment
                    self.scratch.clear();
                    self.state = Comment;
                    return Ok(());
                }
                match self.decl_quote {
                    Some(quote) => {
                        self.scratch.push(c);
                        if c == quote {
                            self.decl_quote = None;
                        }
                    }
                    None => match c {
                        '"' | '\'' => {
                            self.decl_quote = Some(c);
                            self.scratch.push(c);
                        }
                        '>' => {
                            sink.token(Token::MarkupDecl(&self.scratch))?;
                            self.state = DtdSubset;
                        }
                        _ => self.scratch.push(c),
                    },
                }
            }
            DtdPeRef => match c {
                c if is_name_char(c) || (self.scratch.is_empty() && is_name_start_char(c)) => {
                    self.scratch.push(c);
                }
                ';' if !self.scratch.is_empty() => {
                    sink.token(Token::DtdPeRef(&self.scratch))?;
                    self.state = DtdSubset;
                }
                _ => return Err(self.error("invalid parameter entity reference")),
            },
            DtdAfterSubset => match c {
                c if is_whitespace_char(c) => {}
                '>' => {
                    sink.token(Token::DoctypeEnd)?;
                    self.state = Content;
                }
                _ => return Err(self.error("expected '>' after internal subset")),
            },
        }
        Ok(())
    }

    fn emit_pi(&mut self, sink: &mut dyn TokenSink) -> Result<()> {
        let target = std::mem::take(&mut self.scratch);
        let data = std::mem::take(&mut self.aux);
        if target.eq_ignore_ascii_case("xml") {
            if self.at_document_start && target == "xml" {
                let version = pseudo_attr(&data, "version");
                let encoding = pseudo_attr(&data, "encoding");
                let standalone = pseudo_attr(&data, "standalone");
                sink.token(Token::XmlDecl {
                    version: version.as_deref(),
                    encoding: encoding.as_deref(),
                    standalone: standalone.as_deref(),
                })?;
                self.at_document_start = false;
                return Ok(());
            }
            return Err(self.error("processing instruction target 'xml' is reserved"));
        }
        self.at_document_start = false;
        sink.token(Token::Pi {
            target: &target,
            data: &data,
        })?;
        Ok(())
    }

    fn emit_char_ref(&mut self, sink: &mut dyn TokenSink) -> Result<()> {
        if self.char_ref_digits == 0 {
            return Err(self.error("empty character reference"));
        }
        let c = char::from_u32(self.char_ref_value)
            .filter(|c| {
                if self.xml11 {
                    is_xml11_char(*c)
                } else {
                    is_xml10_char(*c)
                }
            })
            .ok_or_else(|| {
                self.error(format!(
                    "character reference &#{}; is not a legal XML character",
                    self.char_ref_value
                ))
            })?;
        let mut tmp = [0u8; 4];
        let s = c.encode_utf8(&mut tmp);
        match self.ref_context {
            RefContext::Content => {
                sink.token(Token::Text(s))?;
                self.state = State::Content;
            }
            RefContext::AttrValue => {
                // referenced characters bypass whitespace mapping
                self.scratch.push(c);
                self.state = State::AttrValue;
            }
        }
        Ok(())
    }
}

impl Tokenizer {
    fn step_reference_name(&mut self, c: char, sink: &mut dyn TokenSink) -> Result<()> {
        if is_name_char(c) {
            self.scratch.push(c);
            return Ok(());
        }
        if c != ';' {
            return Err(self.error("entity reference must end with ';'"));
        }
        let name = std::mem::take(&mut self.scratch);
        let predefined = match name.as_str() {
            "lt" => Some("<"),
            "gt" => Some(">"),
            "amp" => Some("&"),
            "apos" => Some("'"),
            "quot" => Some("\""),
            _ => None,
        };
        match self.ref_context {
            RefContext::Content => {
                match predefined {
                    Some(s) => sink.token(Token::Text(s))?,
                    None => sink.token(Token::EntityRef(&name))?,
                }
                self.state = State::Content;
            }
            RefContext::AttrValue => {
                match predefined {
                    Some(s) => self.scratch.push_str(s),
                    None => sink.token(Token::AttrValueEntityRef(&name))?,
                }
                self.state = State::AttrValue;
            }
        }
        Ok(())
    }
}

fn pseudo_attr(data: &str, name: &str) -> Option<String> {
    let mut rest = data;
    while let Some(pos) = rest.find(name) {
        let after = rest[pos + name.len()..].trim_start();
        if after.starts_with('=') {
            let value = after[1..].trim_start();
            let quote = value.chars().next()?;
            if quote == '"' || quote == '\'' {
                if let Some(end) = value[1..].find(quote) {
                    return Some(value[1..1 + end].to_string());
                }
            }
        }
        rest = &rest[pos + name.len()..];
    }
    None
}
