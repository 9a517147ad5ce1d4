use crate::{
    error::{Error, Result},
    template,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    Int(usize),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Star,
    Plus,
    Arrow,
    Assign,
    PlusAssign,
    /// `+=!`: reset the output to the reduction identity, then accumulate.
    ReduceAssign,
}

pub type Spanned = (Token, usize);

pub fn tokenize(source: &str) -> Result<Vec<Spanned>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                pos += 1;
                continue;
            }
            b'#' => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
                continue;
            }
            b'(' => tokens.push((Token::LParen, start)),
            b')' => tokens.push((Token::RParen, start)),
            b'{' => tokens.push((Token::LBrace, start)),
            b'}' => tokens.push((Token::RBrace, start)),
            b',' => tokens.push((Token::Comma, start)),
            b'*' => tokens.push((Token::Star, start)),
            b'=' => tokens.push((Token::Assign, start)),
            b'+' => match (bytes.get(pos + 1), bytes.get(pos + 2)) {
                (Some(b'='), Some(b'!')) => {
                    tokens.push((Token::ReduceAssign, start));
                    pos += 2;
                }
                (Some(b'='), _) => {
                    tokens.push((Token::PlusAssign, start));
                    pos += 1;
                }
                _ => tokens.push((Token::Plus, start)),
            },
            b'-' if bytes.get(pos + 1) == Some(&b'>') => {
                tokens.push((Token::Arrow, start));
                pos += 1;
            }
            b'<' => {
                if let Some((offset, token)) = template::find_placeholder(&source[start..]) {
                    if offset == 0 {
                        return Err(Error::UnresolvedPlaceholder {
                            token: token.to_owned(),
                            offset: start,
                        });
                    }
                }
                return Err(unexpected(start, c));
            }
            b'0'..=b'9' => {
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
                let value = source[start..pos].parse().map_err(|_| Error::Parse {
                    offset: start,
                    message: format!("integer literal `{}` out of range", &source[start..pos]),
                })?;
                tokens.push((Token::Int(value), start));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                tokens.push((Token::Ident(source[start..pos].to_owned()), start));
                continue;
            }
            _ => return Err(unexpected(start, c)),
        }
        pos += 1;
    }

    Ok(tokens)
}

fn unexpected(offset: usize, c: u8) -> Error {
    Error::Parse {
        offset,
        message: format!("unexpected character `{}`", c as char),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("+=! += + = -> *"),
            vec![
                Token::ReduceAssign,
                Token::PlusAssign,
                Token::Plus,
                Token::Assign,
                Token::Arrow,
                Token::Star
            ]
        );
    }

    #[test]
    fn strided_index() {
        assert_eq!(
            kinds("h * 2+ r_kh"),
            vec![
                Token::Ident("h".into()),
                Token::Star,
                Token::Int(2),
                Token::Plus,
                Token::Ident("r_kh".into())
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("# a comment\nx"), vec![Token::Ident("x".into())]);
    }

    #[test]
    fn placeholder_is_reported_with_offset() {
        match tokenize("h * <stride>") {
            Err(Error::UnresolvedPlaceholder { token, offset }) => {
                assert_eq!(token, "<stride>");
                assert_eq!(offset, 4);
            }
            other => panic!("expected placeholder error, got {:?}", other),
        }
    }

    #[test]
    fn stray_character() {
        assert!(matches!(
            tokenize("a ; b"),
            Err(Error::Parse { offset: 2, .. })
        ));
    }
}
