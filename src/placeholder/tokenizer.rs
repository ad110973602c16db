use std::ops::Range;

/// Opening sequence shared by both placeholder formats.
pub const TOKEN_PREFIX: &str = "[IMAGE:";
const TOKEN_SUFFIX: char = ']';
const LEGACY_SEPARATOR: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    Placeholder,
    Legacy,
}

/// One lexical unit of a note body. Spans are byte ranges into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Text {
        span: Range<usize>,
        text: &'a str,
    },
    /// `[IMAGE:<id>]`
    Placeholder { span: Range<usize>, id: &'a str },
    /// `[IMAGE:<url>|<description>]`
    Legacy {
        span: Range<usize>,
        url: &'a str,
        description: &'a str,
    },
}

impl<'a> Token<'a> {
    pub fn span(&self) -> Range<usize> {
        match self {
            Token::Text { span, .. }
            | Token::Placeholder { span, .. }
            | Token::Legacy { span, .. } => span.clone(),
        }
    }

    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Text { .. } => TokenKind::Text,
            Token::Placeholder { .. } => TokenKind::Placeholder,
            Token::Legacy { .. } => TokenKind::Legacy,
        }
    }
}

/// Lazy scan over a body. Holds no state beyond its cursor, so calling
/// [`tokenize`] again on the same input restarts from the beginning.
///
/// Adjacent literal text is always yielded as a single `Text` token, including
/// any malformed `[IMAGE:` fragments.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    input: &'a str,
    pos: usize,
    pending: Option<Token<'a>>,
}

pub fn tokenize(input: &str) -> Tokens<'_> {
    Tokens {
        input,
        pos: 0,
        pending: None,
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.pending.take() {
            return Some(token);
        }

        let len = self.input.len();
        if self.pos >= len {
            return None;
        }

        let start = self.pos;
        let mut search = start;
        loop {
            let Some(offset) = self.input[search..].find(TOKEN_PREFIX) else {
                self.pos = len;
                return Some(Token::Text {
                    span: start..len,
                    text: &self.input[start..],
                });
            };

            let at = search + offset;
            match parse_token_at(self.input, at) {
                Some(token) => {
                    self.pos = token.span().end;
                    if at > start {
                        self.pending = Some(token);
                        return Some(Token::Text {
                            span: start..at,
                            text: &self.input[start..at],
                        });
                    }
                    return Some(token);
                }
                // '[' is one byte, so stepping past it stays on a char boundary.
                None => search = at + 1,
            }
        }
    }
}

/// Parses a well-formed token starting at `at`, which must point at
/// [`TOKEN_PREFIX`]. Anything else (unterminated, nested, empty) is rejected.
fn parse_token_at(input: &str, at: usize) -> Option<Token<'_>> {
    let inner_start = at + TOKEN_PREFIX.len();
    let rest = &input[inner_start..];

    let close = rest.find(|c: char| matches!(c, '[' | ']' | '\n' | '\r'))?;
    if !rest[close..].starts_with(TOKEN_SUFFIX) {
        return None;
    }

    let inner = &rest[..close];
    let span = at..inner_start + close + TOKEN_SUFFIX.len_utf8();

    match inner.split_once(LEGACY_SEPARATOR) {
        Some((url, description)) => {
            let url = url.trim();
            if url.is_empty() || description.contains(LEGACY_SEPARATOR) {
                return None;
            }
            Some(Token::Legacy {
                span,
                url,
                description: description.trim(),
            })
        }
        None => {
            if inner.is_empty() || inner.chars().any(char::is_whitespace) {
                return None;
            }
            Some(Token::Placeholder { span, id: inner })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).map(|t| t.kind()).collect()
    }

    #[test]
    fn splits_text_and_placeholders() {
        let tokens: Vec<_> = tokenize("see [IMAGE:a1] and [IMAGE:b2]").collect();
        assert_eq!(tokens.len(), 4);
        assert_eq!(
            tokens[1],
            Token::Placeholder {
                span: 4..14,
                id: "a1"
            }
        );
        assert_eq!(
            tokens[2],
            Token::Text {
                span: 14..19,
                text: " and "
            }
        );
    }

    #[test]
    fn recognizes_legacy_tokens() {
        let tokens: Vec<_> = tokenize("[IMAGE:http://x/1.png|A diagram]").collect();
        assert_eq!(
            tokens,
            vec![Token::Legacy {
                span: 0..32,
                url: "http://x/1.png",
                description: "A diagram",
            }]
        );
    }

    #[test]
    fn malformed_tokens_stay_text() {
        assert_eq!(kinds("[IMAGE:abc"), vec![TokenKind::Text]);
        assert_eq!(kinds("[IMAGE:]"), vec![TokenKind::Text]);
        assert_eq!(kinds("[IMAGE:a b]"), vec![TokenKind::Text]);
        assert_eq!(kinds("[IMAGE:a|b|c]"), vec![TokenKind::Text]);
        assert_eq!(kinds("[IMAGE:a\n]"), vec![TokenKind::Text]);
    }

    #[test]
    fn nested_opening_only_matches_inner_token() {
        let tokens: Vec<_> = tokenize("[IMAGE:[IMAGE:x]]").collect();
        assert_eq!(
            tokens,
            vec![
                Token::Text {
                    span: 0..7,
                    text: "[IMAGE:"
                },
                Token::Placeholder {
                    span: 7..16,
                    id: "x"
                },
                Token::Text {
                    span: 16..17,
                    text: "]"
                },
            ]
        );
    }

    #[test]
    fn spans_cover_the_input_exactly() {
        let input = "héllo [IMAGE:é] [IMAGE:u|d] tail [IMAGE:";
        let mut rebuilt = String::new();
        let mut expected_start = 0;
        for token in tokenize(input) {
            let span = token.span();
            assert_eq!(span.start, expected_start);
            rebuilt.push_str(&input[span.clone()]);
            expected_start = span.end;
        }
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn restarting_yields_the_same_sequence() {
        let input = "[IMAGE:a]x[IMAGE:b]";
        let first: Vec<_> = tokenize(input).collect();
        let second: Vec<_> = tokenize(input).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_has_no_tokens() {
        assert_eq!(tokenize("").count(), 0);
    }
}
