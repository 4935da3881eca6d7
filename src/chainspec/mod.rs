//! Chain-description parser
//!
//! Parses the small experiment-description language that names the
//! configuration chains to compile:
//!
//! ```text
//! spec    := assignment* chain+
//! assign  := identifier ':' path
//! subrule := '%' path | identifier
//! chain   := subrule ('->' subrule)*
//! ```
//!
//! An assignment binds an identifier to a configuration-file path; later
//! assignments to the same identifier overwrite earlier ones. A chain is an
//! ordered list of configuration references, each either a `%`-prefixed
//! literal path or an identifier bound by a prior assignment.
//!
//! Example:
//!
//! ```text
//! base : linux-4.14.152/.config
//! tiny : exp0/.config
//! tiny -> %exp1/.config -> base
//! ```
//!
//! Parsing is a pure function: all output comes back in the returned
//! [`ChainSpec`], no state survives the call. Every referenced file must
//! exist at parse time; a dangling path fails the parse before any build
//! starts.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from chain-spec parsing
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("line {line}, col {col}: {message}")]
    Parse {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("line {line}, col {col}: '{name}' is not assigned to a path")]
    UndefinedSymbol {
        line: usize,
        col: usize,
        name: String,
    },

    #[error("line {line}, col {col}: no such file: {}", .path.display())]
    MissingFile {
        line: usize,
        col: usize,
        path: PathBuf,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Result type for chain-spec operations
pub type SpecResult<T> = Result<T, SpecError>;

/// One element of an unresolved chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainElement {
    /// A `%`-prefixed literal configuration path
    Literal(PathBuf),
    /// An identifier to be looked up in the symbol table
    Symbol(String),
}

/// A resolved chain: an ordered list of configuration-file paths.
///
/// Position 0 is the chain's baseline configuration; later positions are
/// successive edits applied in place to one persistent build tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    /// Configuration-file paths, in compile order
    pub links: Vec<PathBuf>,
}

impl Chain {
    /// Number of links in the chain.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True iff the chain has no links.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The baseline (position 0) configuration.
    pub fn baseline(&self) -> Option<&Path> {
        self.links.first().map(PathBuf::as_path)
    }
}

/// Parse result: the symbol table plus the ordered chains.
///
/// Produced only by [`parse`] / [`parse_file`], which guarantee that every
/// [`ChainElement::Symbol`] is bound in the table.
#[derive(Debug, Clone)]
pub struct ChainSpec {
    symbols: HashMap<String, PathBuf>,
    chains: Vec<Vec<ChainElement>>,
}

impl ChainSpec {
    /// The identifier → path symbol table.
    pub fn symbols(&self) -> &HashMap<String, PathBuf> {
        &self.symbols
    }

    /// The chains, in spec order, before resolution.
    pub fn chains(&self) -> &[Vec<ChainElement>] {
        &self.chains
    }

    /// Find an identifier bound to the given path, if any.
    ///
    /// Used to name scratch directories after the spec's own aliases. When
    /// several identifiers map to the same path an arbitrary one is
    /// returned.
    pub fn alias_for(&self, path: &Path) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, bound)| bound.as_path() == path)
            .map(|(name, _)| name.as_str())
    }

    /// Replace every identifier element with its assigned path.
    ///
    /// Literal paths pass through unchanged. Infallible because [`parse`]
    /// rejects unbound identifiers.
    pub fn resolve(&self) -> Vec<Chain> {
        self.chains
            .iter()
            .map(|elements| Chain {
                links: elements
                    .iter()
                    .map(|element| match element {
                        ChainElement::Literal(path) => path.clone(),
                        ChainElement::Symbol(name) => match self.symbols.get(name) {
                            Some(path) => path.clone(),
                            None => unreachable!("parse() verifies every symbol is bound"),
                        },
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Parse a chain spec from a file.
pub fn parse_file(path: &Path) -> SpecResult<ChainSpec> {
    let text = fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}

/// Parse a chain spec from text.
///
/// Fails fast: a syntax error, an identifier used without a prior
/// assignment, or a referenced file that does not exist all abort the parse
/// before any build is attempted. Duplicate chains (same element list) are
/// kept once.
pub fn parse(text: &str) -> SpecResult<ChainSpec> {
    let tokens = lex(text)?;
    Parser { tokens, cursor: 0 }.parse_spec()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    /// A maximal run of path characters (identifiers are a subset)
    Word(String),
    Colon,
    Arrow,
    Percent,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
    col: usize,
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '~' | '-' | '/' | '.')
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn lex(text: &str) -> SpecResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1usize;
    let mut col = 1usize;

    while let Some(&c) = chars.peek() {
        if c == '\n' {
            chars.next();
            line += 1;
            col = 1;
            continue;
        }
        if c.is_whitespace() {
            chars.next();
            col += 1;
            continue;
        }

        let (tok_line, tok_col) = (line, col);
        match c {
            ':' => {
                chars.next();
                col += 1;
                tokens.push(Token {
                    kind: TokenKind::Colon,
                    line: tok_line,
                    col: tok_col,
                });
            }
            '%' => {
                chars.next();
                col += 1;
                tokens.push(Token {
                    kind: TokenKind::Percent,
                    line: tok_line,
                    col: tok_col,
                });
            }
            _ if is_path_char(c) => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_path_char(c) {
                        break;
                    }
                    // '-' starts the arrow token when followed by '>'.
                    if c == '-' {
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        if lookahead.peek() == Some(&'>') {
                            break;
                        }
                    }
                    word.push(c);
                    chars.next();
                    col += 1;
                }
                if word.is_empty() {
                    // Lone '-' followed by '>': the arrow token.
                    chars.next();
                    chars.next();
                    col += 2;
                    tokens.push(Token {
                        kind: TokenKind::Arrow,
                        line: tok_line,
                        col: tok_col,
                    });
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Word(word),
                        line: tok_line,
                        col: tok_col,
                    });
                }
            }
            _ => {
                return Err(SpecError::Parse {
                    line,
                    col,
                    message: format!("unexpected character '{c}'"),
                });
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser {
    fn parse_spec(mut self) -> SpecResult<ChainSpec> {
        let mut symbols: HashMap<String, PathBuf> = HashMap::new();

        // assignment*: identifier ':' path, all before the first chain.
        while self.peek_is_assignment() {
            let (name, name_line, name_col) = self.expect_word()?;
            if !is_identifier(&name) {
                return Err(SpecError::Parse {
                    line: name_line,
                    col: name_col,
                    message: format!("'{name}' is not a valid identifier"),
                });
            }
            self.cursor += 1; // the ':' established by peek_is_assignment
            let (path, path_line, path_col) = self.expect_word()?;
            let path = PathBuf::from(path);
            check_exists(&path, path_line, path_col)?;
            // Last assignment wins.
            symbols.insert(name, path);
        }

        // chain+
        let mut chains: Vec<Vec<ChainElement>> = Vec::new();
        loop {
            let mut elements = vec![self.parse_element(&symbols)?];
            while self.peek_kind() == Some(&TokenKind::Arrow) {
                self.cursor += 1;
                elements.push(self.parse_element(&symbols)?);
            }
            if !chains.contains(&elements) {
                chains.push(elements);
            }
            if self.cursor >= self.tokens.len() {
                break;
            }
        }

        Ok(ChainSpec { symbols, chains })
    }

    fn parse_element(&mut self, symbols: &HashMap<String, PathBuf>) -> SpecResult<ChainElement> {
        match self.peek_kind() {
            Some(TokenKind::Percent) => {
                self.cursor += 1;
                let (path, line, col) = self.expect_word()?;
                let path = PathBuf::from(path);
                check_exists(&path, line, col)?;
                Ok(ChainElement::Literal(path))
            }
            Some(TokenKind::Word(_)) => {
                let (name, line, col) = self.expect_word()?;
                if !is_identifier(&name) {
                    return Err(SpecError::Parse {
                        line,
                        col,
                        message: format!(
                            "'{name}' is not a valid identifier; prefix literal paths with '%'"
                        ),
                    });
                }
                if !symbols.contains_key(&name) {
                    return Err(SpecError::UndefinedSymbol { line, col, name });
                }
                Ok(ChainElement::Symbol(name))
            }
            Some(other) => {
                let token = &self.tokens[self.cursor];
                Err(SpecError::Parse {
                    line: token.line,
                    col: token.col,
                    message: format!("expected identifier or '%'-prefixed path, found {other:?}"),
                })
            }
            None => Err(self.end_of_input("expected at least one chain")),
        }
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.cursor).map(|t| &t.kind)
    }

    /// True iff the next two tokens form `identifier ':'`.
    fn peek_is_assignment(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Word(_)))
            && matches!(
                self.tokens.get(self.cursor + 1).map(|t| &t.kind),
                Some(TokenKind::Colon)
            )
    }

    fn expect_word(&mut self) -> SpecResult<(String, usize, usize)> {
        match self.tokens.get(self.cursor) {
            Some(Token {
                kind: TokenKind::Word(word),
                line,
                col,
            }) => {
                let out = (word.clone(), *line, *col);
                self.cursor += 1;
                Ok(out)
            }
            Some(token) => Err(SpecError::Parse {
                line: token.line,
                col: token.col,
                message: format!("expected a path or identifier, found {:?}", token.kind),
            }),
            None => Err(self.end_of_input("unexpected end of spec")),
        }
    }

    fn end_of_input(&self, message: &str) -> SpecError {
        let (line, col) = self
            .tokens
            .last()
            .map(|t| (t.line, t.col))
            .unwrap_or((1, 1));
        SpecError::Parse {
            line,
            col,
            message: message.to_string(),
        }
    }
}

fn check_exists(path: &Path, line: usize, col: usize) -> SpecResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(SpecError::MissingFile {
            line,
            col,
            path: path.to_path_buf(),
        })
    }
}
