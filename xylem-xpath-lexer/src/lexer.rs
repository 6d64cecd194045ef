use std::ops::Range;
use std::str::FromStr;

use ibig::IBig;
use logos::{FilterResult, Lexer, Logos};
use rust_decimal::Decimal;

/// A QName written with a prefix, e.g. `xs:integer`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixedQName {
    /// The prefix before the colon.
    pub prefix: String,
    /// The local part after the colon.
    pub local: String,
}

/// One XPath token.
#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(subpattern name_start = r"[A-Za-z_\u{c0}-\u{d6}\u{d8}-\u{f6}\u{f8}-\u{2ff}\u{370}-\u{37d}\u{37f}-\u{1fff}\u{200c}-\u{200d}\u{2070}-\u{218f}\u{2c00}-\u{2fef}\u{3001}-\u{d7ff}\u{f900}-\u{fdcf}\u{fdf0}-\u{fffd}\u{10000}-\u{effff}]")]
#[logos(subpattern name_char = r"(?&name_start)|[\-\.0-9\u{b7}\u{300}-\u{36f}\u{203f}-\u{2040}]")]
#[logos(subpattern ncname = r"(?&name_start)(?&name_char)*")]
#[allow(missing_docs)]
pub enum Token<'a> {
    /// Produced by [`lex`] for unlexable input.
    Error,

    #[regex(r"[0-9]+", integer_literal, priority = 3)]
    IntegerLiteral(IBig),
    #[regex(r"(\.[0-9]+)|([0-9]+\.[0-9]*)", decimal_literal, priority = 2)]
    DecimalLiteral(Decimal),
    #[regex(r"(\.[0-9]+|[0-9]+(\.[0-9]*)?)([eE][+-]?[0-9]+)", double_literal, priority = 2)]
    DoubleLiteral(f64),
    #[regex(r#""(?:""|[^"])*"|'(?:''|[^'])*'"#, string_literal, priority = 1)]
    StringLiteral(String),

    // a QName with a prefix is one token since no whitespace may
    // surround its colon; a lone NCName may still turn out to be an
    // unprefixed QName or a keyword, which the parser decides
    #[regex(r"(?&ncname):(?&ncname)", prefixed_qname, priority = 3)]
    PrefixedQName(PrefixedQName),
    #[regex(r"(?&ncname)", priority = 2)]
    NCName(&'a str),
    #[regex(r#"Q\{[^\{\}]*\}"#, braced_uri, priority = 4)]
    BracedURILiteral(&'a str),

    #[token("(:", comment, priority = 4)]
    Comment,

    #[token("!")]
    ExclamationMark,
    #[token("!=")]
    NotEqual,
    #[token("#")]
    Hash,
    #[token("$")]
    Dollar,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("*")]
    Asterisk,
    #[regex(r"\*:(?&ncname)", suffix_wildcard, priority = 4)]
    AsteriskColon(&'a str),
    #[token("+")]
    Plus,
    #[token(",")]
    Comma,
    #[token("-")]
    Minus,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[regex(r"(?&ncname):\*", prefix_wildcard, priority = 4)]
    ColonAsterisk(&'a str),
    #[token(":")]
    Colon,
    #[token("::")]
    DoubleColon,
    #[token(":=")]
    ColonEqual,
    #[token("<")]
    LessThan,
    #[token("<<")]
    Precedes,
    #[token("<=")]
    LessThanEqual,
    #[token("=")]
    Equal,
    #[token("=>")]
    Arrow,
    #[token(">")]
    GreaterThan,
    #[token(">=")]
    GreaterThanEqual,
    #[token(">>")]
    Follows,
    #[token("?")]
    QuestionMark,
    #[token("@")]
    At,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("|")]
    Pipe,
    #[token("||")]
    DoublePipe,
}

fn integer_literal<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Option<IBig> {
    IBig::from_str(lex.slice()).ok()
}

fn decimal_literal<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Option<Decimal> {
    // "1." and ".5" are legal XPath decimals but not rust_decimal input
    let slice = lex.slice().trim_end_matches('.');
    if let Some(fraction) = slice.strip_prefix('.') {
        return Decimal::from_str(&format!("0.{fraction}")).ok();
    }
    Decimal::from_str(slice).ok()
}

fn double_literal<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Option<f64> {
    lex.slice().parse::<f64>().ok()
}

fn string_literal<'a>(lex: &mut Lexer<'a, Token<'a>>) -> String {
    let slice = lex.slice();
    let quote = slice.chars().next().unwrap();
    let inner = &slice[1..slice.len() - 1];
    match quote {
        '"' => inner.replace("\"\"", "\""),
        _ => inner.replace("''", "'"),
    }
}

fn prefixed_qname<'a>(lex: &mut Lexer<'a, Token<'a>>) -> PrefixedQName {
    let (prefix, local) = lex.slice().split_once(':').unwrap();
    PrefixedQName {
        prefix: prefix.to_string(),
        local: local.to_string(),
    }
}

fn braced_uri<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    let slice = lex.slice();
    &slice[2..slice.len() - 1]
}

fn suffix_wildcard<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    &lex.slice()[2..]
}

fn prefix_wildcard<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    let slice = lex.slice();
    &slice[..slice.len() - 2]
}

// comments nest and are dropped entirely
fn comment<'a>(lex: &mut Lexer<'a, Token<'a>>) -> FilterResult<(), ()> {
    let remainder = lex.remainder();
    let bytes = remainder.as_bytes();
    let mut depth = 1usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if &bytes[i..i + 2] == b"(:" {
            depth += 1;
            i += 2;
        } else if &bytes[i..i + 2] == b":)" {
            depth -= 1;
            i += 2;
            if depth == 0 {
                lex.bump(i);
                return FilterResult::Skip;
            }
        } else {
            i += 1;
        }
    }
    FilterResult::Error(())
}

/// A token plus its byte span in the source expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Spanned<'a> {
    /// The token.
    pub token: Token<'a>,
    /// Byte range of the token in the input.
    pub span: Range<usize>,
}

/// Lex a whole expression. Unlexable stretches surface as
/// [`Token::Error`] so the parser can report a position.
pub fn lex(input: &str) -> Vec<Spanned<'_>> {
    Token::lexer(input)
        .spanned()
        .map(|(token, span)| Spanned {
            token: token.unwrap_or(Token::Error),
            span,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        lex(input).into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(
            tokens("1 2.5 .5 1e3"),
            vec![
                Token::IntegerLiteral(IBig::from(1u8)),
                Token::DecimalLiteral(Decimal::from_str("2.5").unwrap()),
                Token::DecimalLiteral(Decimal::from_str("0.5").unwrap()),
                Token::DoubleLiteral(1000.0),
            ]
        );
    }

    #[test]
    fn strings_with_doubled_quotes() {
        assert_eq!(
            tokens(r#""say ""hi""" 'don''t'"#),
            vec![
                Token::StringLiteral("say \"hi\"".to_string()),
                Token::StringLiteral("don't".to_string()),
            ]
        );
    }

    #[test]
    fn qnames_and_axes() {
        assert_eq!(
            tokens("child::xs:integer"),
            vec![
                Token::NCName("child"),
                Token::DoubleColon,
                Token::PrefixedQName(PrefixedQName {
                    prefix: "xs".to_string(),
                    local: "integer".to_string(),
                }),
            ]
        );
    }

    #[test]
    fn wildcards() {
        assert_eq!(
            tokens("* *:name ns:*"),
            vec![
                Token::Asterisk,
                Token::AsteriskColon("name"),
                Token::ColonAsterisk("ns"),
            ]
        );
    }

    #[test]
    fn multi_char_operators() {
        assert_eq!(
            tokens("<< >> || => != <= >= :="),
            vec![
                Token::Precedes,
                Token::Follows,
                Token::DoublePipe,
                Token::Arrow,
                Token::NotEqual,
                Token::LessThanEqual,
                Token::GreaterThanEqual,
                Token::ColonEqual,
            ]
        );
    }

    #[test]
    fn nested_comments_are_skipped() {
        assert_eq!(
            tokens("1 (: outer (: inner :) still :) + 2"),
            vec![
                Token::IntegerLiteral(IBig::from(1u8)),
                Token::Plus,
                Token::IntegerLiteral(IBig::from(2u8)),
            ]
        );
    }

    #[test]
    fn unterminated_comment_is_error() {
        assert!(tokens("1 (: oops").contains(&Token::Error));
    }

    #[test]
    fn braced_uri_literal() {
        assert_eq!(
            tokens("Q{http://example.com}name"),
            vec![
                Token::BracedURILiteral("http://example.com"),
                Token::NCName("name"),
            ]
        );
    }
}
