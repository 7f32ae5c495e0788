//! Tokenizer and node builder for the text (ASCII) variant.
//!
//! Every datum is stored as [`Property::Text`]; the text variant carries no
//! type information. Malformed input never fails, it just ends the tree early.

use super::types::{Node, Property};

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Datum(String),
    Colon,
    OpenBrace,
    CloseBrace,
    Comma,
}

struct Tokenizer<'a> {
    data: &'a [u8],
    position: usize,
    // LIFO; a datum followed by `:` pushes back both
    pushed_back: Vec<Token>,
}

fn is_space(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c')
}

fn ends_datum(ch: u8) -> bool {
    is_space(ch) || matches!(ch, b';' | b':' | b'{' | b'}' | b',' | b'"')
}

impl<'a> Tokenizer<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            pushed_back: Vec::new(),
        }
    }

    fn next_char(&mut self) -> Option<u8> {
        let ch = self.data.get(self.position).copied()?;
        self.position += 1;
        Some(ch)
    }

    fn push_back(&mut self, token: Token) {
        self.pushed_back.push(token);
    }

    fn next_token(&mut self) -> Option<Token> {
        if let Some(token) = self.pushed_back.pop() {
            return Some(token);
        }

        while let Some(ch) = self.next_char() {
            match ch {
                ch if is_space(ch) => continue,
                b';' => {
                    // comment runs to the end of the line
                    while let Some(ch) = self.next_char() {
                        if ch == b'\n' {
                            break;
                        }
                    }
                }
                b':' => return Some(Token::Colon),
                b'{' => return Some(Token::OpenBrace),
                b'}' => return Some(Token::CloseBrace),
                b',' => return Some(Token::Comma),
                b'"' => return Some(Token::Datum(self.quoted())),
                _ => return Some(Token::Datum(self.unquoted())),
            }
        }
        None
    }

    fn quoted(&mut self) -> String {
        let mut datum = Vec::new();
        while let Some(mut ch) = self.next_char() {
            if ch == b'"' {
                break;
            }
            if ch == b'\\' {
                // only an escaped quote loses its backslash
                if let Some(escaped) = self.next_char() {
                    if escaped != b'"' {
                        datum.push(b'\\');
                    }
                    ch = escaped;
                }
            }
            datum.push(ch);
        }
        String::from_utf8_lossy(&datum).into_owned()
    }

    /// Read the rest of a bare datum whose first byte was just consumed.
    fn unquoted(&mut self) -> String {
        let start = self.position - 1;
        while let Some(&ch) = self.data.get(self.position) {
            if ends_datum(ch) {
                break;
            }
            self.position += 1;
        }
        String::from_utf8_lossy(&self.data[start..self.position]).into_owned()
    }
}

/// How far one node header got before stopping.
enum Parsed {
    /// No node started here (a non-datum token or the end of input).
    Nothing,
    /// A complete node with scalar properties only.
    Leaf(Node),
    /// A node whose `{` was consumed; its children follow.
    Block(Node),
}

fn parse_node(tokenizer: &mut Tokenizer<'_>) -> Parsed {
    let name = match tokenizer.next_token() {
        Some(Token::Datum(name)) => name,
        _ => return Parsed::Nothing,
    };
    let mut node = Node::new(name);

    if tokenizer.next_token() != Some(Token::Colon) {
        return Parsed::Leaf(node);
    }

    let mut expecting_datum = true;
    while let Some(token) = tokenizer.next_token() {
        match token {
            Token::OpenBrace => return Parsed::Block(node),
            Token::Comma => expecting_datum = true,
            Token::Datum(datum) if expecting_datum => match tokenizer.next_token() {
                Some(Token::Colon) => {
                    // the datum was the next sibling's name
                    tokenizer.push_back(Token::Colon);
                    tokenizer.push_back(Token::Datum(datum));
                    return Parsed::Leaf(node);
                }
                next => {
                    if let Some(next) = next {
                        tokenizer.push_back(next);
                    }
                    node.properties.push(Property::Text(datum));
                    expecting_datum = false;
                }
            },
            other => {
                tokenizer.push_back(other);
                return Parsed::Leaf(node);
            }
        }
    }
    Parsed::Leaf(node)
}

/// Parse a text document into a synthetic root node.
pub fn parse_text(data: &[u8]) -> Node {
    let mut tokenizer = Tokenizer::new(data);
    let mut root = Node::default();
    let mut open: Vec<Node> = Vec::new();

    loop {
        match parse_node(&mut tokenizer) {
            Parsed::Leaf(node) => match open.last_mut() {
                Some(parent) => parent.children.push(node),
                None => root.children.push(node),
            },
            Parsed::Block(node) => open.push(node),
            Parsed::Nothing => match open.pop() {
                Some(node) => match open.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root.children.push(node),
                },
                None => break,
            },
        }
    }
    root
}
