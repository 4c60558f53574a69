//! **TagParser**: splits annotated model output into spans.
//!
//! Recognizes `<name>…</name>` markers. Parsing never fails: markup that cannot be
//! paired is reported as [`Token::Stray`] and treated as plain text. The spans of the
//! returned tokens are contiguous and cover the whole input, so concatenating the token
//! slices reproduces the input exactly.

use std::ops::Range;

/// Longest marker name accepted, in characters.
const MAX_NAME_CHARS: usize = 32;

/// An unvalidated marker name and the span of its opening marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTag {
    /// Name as written between the angle brackets.
    pub name: String,
    /// Byte span of the opening marker (`<name>`).
    pub span: Range<usize>,
}

impl RawTag {
    /// Trimmed, lowercased name used for pairing and validation.
    pub fn normalized_name(&self) -> String {
        normalize(&self.name)
    }
}

/// How a paired marker participates in its pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupRole {
    Open,
    Close,
    /// A second opening marker of the same kind, read as the missing closing marker
    /// (`<happy>text<happy>`).
    RepairedClose,
}

/// Why a marker could not be paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrayReason {
    /// Opening marker with no closing marker before its enclosing marker closed or
    /// input ended.
    Unterminated,
    /// Closing marker with no open marker of the same name.
    UnmatchedClose,
}

/// One span of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text; `tag` is the innermost enclosing paired marker, if any.
    Text {
        span: Range<usize>,
        tag: Option<RawTag>,
    },
    /// A paired marker. Its characters are markup, not content.
    Markup {
        span: Range<usize>,
        tag: RawTag,
        role: MarkupRole,
    },
    /// Marker syntax that could not be paired; treated as plain text.
    Stray {
        span: Range<usize>,
        name: String,
        reason: StrayReason,
        /// Innermost enclosing paired marker, if any.
        enclosing: Option<RawTag>,
    },
}

impl Token {
    pub fn span(&self) -> &Range<usize> {
        match self {
            Token::Text { span, .. } | Token::Markup { span, .. } | Token::Stray { span, .. } => {
                span
            }
        }
    }

    /// The slice of `source` this token covers.
    pub fn as_str<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span().clone()]
    }
}

#[derive(Debug, Clone)]
enum LexKind {
    Text,
    Open(String),
    Close(String),
}

#[derive(Debug, Clone)]
struct Lexeme {
    kind: LexKind,
    span: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pairing {
    Unresolved,
    Opened,
    Closed(MarkupRole),
    Stray(StrayReason),
}

/// Stateless marker parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagParser;

impl TagParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse `text` into tokens covering every byte of it.
    pub fn parse(&self, text: &str) -> Vec<Token> {
        let lexemes = lex(text);
        let pairing = pair(&lexemes);
        attribute(&lexemes, &pairing)
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn lex(text: &str) -> Vec<Lexeme> {
    let mut lexemes: Vec<Lexeme> = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('<') {
        let start = pos + offset;
        match lex_marker(text, start) {
            Some((kind, end)) => {
                if start > text_start {
                    lexemes.push(Lexeme {
                        kind: LexKind::Text,
                        span: text_start..start,
                    });
                }
                lexemes.push(Lexeme {
                    kind,
                    span: start..end,
                });
                text_start = end;
                pos = end;
            }
            None => pos = start + 1,
        }
    }

    if text_start < text.len() {
        lexemes.push(Lexeme {
            kind: LexKind::Text,
            span: text_start..text.len(),
        });
    }
    lexemes
}

/// Try to read a marker starting at the `<` at byte `start`.
fn lex_marker(text: &str, start: usize) -> Option<(LexKind, usize)> {
    let rest = &text[start + 1..];
    let (closing, body) = match rest.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, rest),
    };

    let mut name_len = 0;
    let mut chars = 0;
    for ch in body.chars() {
        if ch == '>' {
            let name = &body[..name_len];
            let trimmed = name.trim();
            if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
                return None;
            }
            let prefix = if closing { 2 } else { 1 };
            let end = start + prefix + name_len + 1;
            let kind = if closing {
                LexKind::Close(name.to_string())
            } else {
                LexKind::Open(name.to_string())
            };
            return Some((kind, end));
        }
        if matches!(ch, '<' | '/' | '\n' | '\r') {
            return None;
        }
        chars += 1;
        if chars > MAX_NAME_CHARS {
            return None;
        }
        name_len += ch.len_utf8();
    }
    None
}

/// Pair opening and closing markers with a stack.
fn pair(lexemes: &[Lexeme]) -> Vec<Pairing> {
    let mut pairing = vec![Pairing::Unresolved; lexemes.len()];
    let mut stack: Vec<(usize, String)> = Vec::new();

    for (i, lexeme) in lexemes.iter().enumerate() {
        match &lexeme.kind {
            LexKind::Text => {}
            LexKind::Open(name) => {
                let key = normalize(name);
                if close_matching(&mut stack, &mut pairing, &key) {
                    pairing[i] = Pairing::Closed(MarkupRole::RepairedClose);
                } else {
                    stack.push((i, key));
                }
            }
            LexKind::Close(name) => {
                let key = normalize(name);
                pairing[i] = if close_matching(&mut stack, &mut pairing, &key) {
                    Pairing::Closed(MarkupRole::Close)
                } else {
                    Pairing::Stray(StrayReason::UnmatchedClose)
                };
            }
        }
    }

    for (open, _) in stack {
        pairing[open] = Pairing::Stray(StrayReason::Unterminated);
    }
    pairing
}

/// Close the innermost open marker named `key`. Markers opened after it are left
/// unterminated. Returns false when no such marker is open.
fn close_matching(
    stack: &mut Vec<(usize, String)>,
    pairing: &mut [Pairing],
    key: &str,
) -> bool {
    let Some(depth) = stack.iter().rposition(|(_, open)| open == key) else {
        return false;
    };
    for (abandoned, _) in stack.drain(depth + 1..) {
        pairing[abandoned] = Pairing::Stray(StrayReason::Unterminated);
    }
    if let Some((open, _)) = stack.pop() {
        pairing[open] = Pairing::Opened;
    }
    true
}

fn attribute(lexemes: &[Lexeme], pairing: &[Pairing]) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(lexemes.len());
    let mut open: Vec<RawTag> = Vec::new();

    for (lexeme, pairing) in lexemes.iter().zip(pairing) {
        let span = lexeme.span.clone();
        match (&lexeme.kind, pairing) {
            (LexKind::Text, _) => tokens.push(Token::Text {
                span,
                tag: open.last().cloned(),
            }),
            (LexKind::Open(name), Pairing::Opened) => {
                let tag = RawTag {
                    name: name.clone(),
                    span: span.clone(),
                };
                open.push(tag.clone());
                tokens.push(Token::Markup {
                    span,
                    tag,
                    role: MarkupRole::Open,
                });
            }
            (LexKind::Open(_) | LexKind::Close(_), Pairing::Closed(role)) => {
                // Unterminated markers are never pushed, so the top is the partner.
                match open.pop() {
                    Some(tag) => tokens.push(Token::Markup {
                        span,
                        tag,
                        role: *role,
                    }),
                    None => tokens.push(Token::Text { span, tag: None }),
                }
            }
            (LexKind::Open(name) | LexKind::Close(name), Pairing::Stray(reason)) => {
                tokens.push(Token::Stray {
                    span,
                    name: name.clone(),
                    reason: *reason,
                    enclosing: open.last().cloned(),
                });
            }
            // A closing marker is never marked `Opened`.
            (LexKind::Close(_), Pairing::Opened)
            | (LexKind::Open(_) | LexKind::Close(_), Pairing::Unresolved) => {
                tokens.push(Token::Text {
                    span,
                    tag: open.last().cloned(),
                });
            }
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(text: &str, tokens: &[Token]) -> String {
        tokens.iter().map(|t| t.as_str(text)).collect()
    }

    fn assert_covers(text: &str, tokens: &[Token]) {
        let mut expected_start = 0;
        for token in tokens {
            assert_eq!(token.span().start, expected_start, "gap or overlap in {tokens:?}");
            expected_start = token.span().end;
        }
        assert_eq!(expected_start, text.len());
        assert_eq!(reassemble(text, tokens), text);
    }

    #[test]
    fn plain_text_is_a_single_untagged_token() {
        let text = "普通のテキストです。";
        let tokens = TagParser::new().parse(text);
        assert_eq!(tokens.len(), 1);
        assert!(matches!(&tokens[0], Token::Text { tag: None, .. }));
        assert_covers(text, &tokens);
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(TagParser::new().parse("").is_empty());
    }

    #[test]
    fn tagged_text_is_attributed_to_its_marker() {
        let text = "今日の天気は<happy>晴れ</happy>です！";
        let tokens = TagParser::new().parse(text);
        assert_covers(text, &tokens);
        assert_eq!(tokens.len(), 5);
        match &tokens[2] {
            Token::Text { tag: Some(tag), span } => {
                assert_eq!(tag.name, "happy");
                assert_eq!(&text[span.clone()], "晴れ");
            }
            other => panic!("unexpected token {other:?}"),
        }
        assert!(matches!(&tokens[3], Token::Markup { role: MarkupRole::Close, .. }));
    }

    #[test]
    fn repeated_opening_marker_is_read_as_close() {
        let text = "<happy>こんにちは！<happy>元気？";
        let tokens = TagParser::new().parse(text);
        assert_covers(text, &tokens);
        assert!(matches!(
            &tokens[2],
            Token::Markup { role: MarkupRole::RepairedClose, .. }
        ));
        assert!(matches!(&tokens[3], Token::Text { tag: None, .. }));
    }

    #[test]
    fn unterminated_marker_falls_back_to_plain_text() {
        let text = "前<sad>ここから最後まで";
        let tokens = TagParser::new().parse(text);
        assert_covers(text, &tokens);
        assert!(matches!(
            &tokens[1],
            Token::Stray { reason: StrayReason::Unterminated, .. }
        ));
        assert!(matches!(&tokens[2], Token::Text { tag: None, .. }));
    }

    #[test]
    fn orphan_close_is_stray() {
        let text = "abc</wink>def";
        let tokens = TagParser::new().parse(text);
        assert_covers(text, &tokens);
        assert!(matches!(
            &tokens[1],
            Token::Stray { reason: StrayReason::UnmatchedClose, .. }
        ));
    }

    #[test]
    fn nested_markers_attribute_to_innermost() {
        let text = "<thinking>a<happy>b</happy>c</thinking>";
        let tokens = TagParser::new().parse(text);
        assert_covers(text, &tokens);
        let attributed: Vec<(String, Option<String>)> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Text { span, tag } => {
                    Some((text[span.clone()].to_string(), tag.as_ref().map(|t| t.name.clone())))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            attributed,
            vec![
                ("a".to_string(), Some("thinking".to_string())),
                ("b".to_string(), Some("happy".to_string())),
                ("c".to_string(), Some("thinking".to_string())),
            ]
        );
    }

    #[test]
    fn closing_outer_marker_abandons_inner_open() {
        let text = "<happy><excited>もちろん！</happy>";
        let tokens = TagParser::new().parse(text);
        assert_covers(text, &tokens);
        assert!(matches!(
            &tokens[1],
            Token::Stray { reason: StrayReason::Unterminated, .. }
        ));
        match &tokens[2] {
            Token::Text { tag: Some(tag), .. } => assert_eq!(tag.name, "happy"),
            other => panic!("unexpected token {other:?}"),
        }
    }

    #[test]
    fn comparison_operators_are_not_markers() {
        let text = "1 < 2 and 3 > 2, a <b c> d, x<>y";
        let tokens = TagParser::new().parse(text);
        assert_covers(text, &tokens);
        assert!(tokens.iter().all(|t| matches!(t, Token::Text { .. })));
    }

    #[test]
    fn closing_match_is_case_insensitive() {
        let text = "<Happy>やった</HAPPY>";
        let tokens = TagParser::new().parse(text);
        assert_covers(text, &tokens);
        assert!(matches!(&tokens[2], Token::Markup { role: MarkupRole::Close, .. }));
    }

    #[test]
    fn arbitrary_inputs_round_trip() {
        let inputs = [
            "<",
            ">",
            "</>",
            "<<happy>>x<</happy>>",
            "<happy>",
            "</happy>",
            "<a><b><c>x</a>y</b>z</c>",
            "絵文字🎉<pien>ぴえん🥺</pien>🎉",
            "<happy>a</sad>b</happy>",
            "<neutral>\n</neutral>\r\n<wink>x",
        ];
        for text in inputs {
            let tokens = TagParser::new().parse(text);
            assert_covers(text, &tokens);
        }
    }
}
