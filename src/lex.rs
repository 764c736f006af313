use std::iter::FusedIterator;
use std::ops::Range;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug)]
pub struct File {
    name: String,
    contents: String,
    lines: Vec<usize>,
}

impl File {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let name = name.into();
        let contents = contents.into();
        let mut lines = vec![0];
        for (idx, ch) in contents.char_indices() {
            if ch == '\n' {
                lines.push(idx + ch.len_utf8());
            }
        }
        Self {
            name,
            contents,
            lines,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn line_column_at(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.contents.len());
        let line_index = match self.lines.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        };
        let line_start = self.lines.get(line_index).copied().unwrap_or(0);
        let column = self.contents[line_start..offset].chars().count() + 1;
        (line_index + 1, column)
    }

    pub fn line(&self, line: usize) -> &str {
        if line == 0 || line > self.lines.len() {
            return "";
        }
        let start = self.lines[line - 1];
        let end = if let Some(next_start) = self.lines.get(line) {
            let mut end = *next_start;
            if end > start && self.contents.as_bytes()[end - 1] == b'\n' {
                end -= 1;
            }
            if end > start && self.contents.as_bytes()[end - 1] == b'\r' {
                end -= 1;
            }
            end
        } else {
            self.contents.len()
        };
        &self.contents[start..end]
    }
}

/// A range of a source file. Renders as `file:line:column`, the source line,
/// and a caret run under the range.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    range: Range<usize>,
    file: Arc<File>,
}

impl SourceInfo {
    pub fn new(file: Arc<File>, range: Range<usize>) -> Self {
        Self { range, file }
    }

    pub fn eof(file: Arc<File>) -> Self {
        let len = file.len();
        let start = len.saturating_sub(1);
        Self::new(file, start..len)
    }

    pub fn file(&self) -> &Arc<File> {
        &self.file
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// The smallest range covering both `self` and `other`. Both must come
    /// from the same file.
    pub fn join(&self, other: &SourceInfo) -> SourceInfo {
        let start = self.range.start.min(other.range.start);
        let end = self.range.end.max(other.range.end);
        SourceInfo::new(Arc::clone(&self.file), start..end)
    }

    pub fn as_str(&self) -> &str {
        self.file.contents().get(self.range.clone()).unwrap_or("")
    }

    pub fn line_column(&self) -> (usize, usize) {
        self.file.line_column_at(self.range.start)
    }
}

impl std::fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let (line, column) = self.line_column();
        writeln!(f, "{}:{}:{}\n", self.file.name(), line, column)?;
        let line_text = self.file.line(line);
        writeln!(f, "{}", line_text)?;
        // a multi-line range is underlined up to the end of its first line
        let first_line = self.as_str().lines().next().unwrap_or("");
        write!(
            f,
            "{}{}",
            " ".repeat(column - 1),
            "^".repeat(std::cmp::max(1, first_line.chars().count()))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Open,  // "("
    Close, // ")"
    Ident, // e.g. "succ", "plus-comm", "2"
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub source_info: SourceInfo,
}

impl Token {
    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn as_str(&self) -> &str {
        self.source_info.as_str()
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?} {}\n{}", self.kind, self.as_str(), self.source_info)
    }
}

#[derive(Debug, Clone)]
pub struct Lex {
    file: Arc<File>,
    position: usize,
}

#[derive(Debug, Clone, Error)]
#[error("illegal character at {source_info}")]
pub struct LexError {
    pub source_info: SourceInfo,
}

impl From<Lex> for LexError {
    fn from(lex: Lex) -> Self {
        let start = std::cmp::min(lex.position, lex.file.len());
        let end = if start < lex.file.len() {
            let rest = &lex.file.contents()[start..];
            rest.chars()
                .next()
                .map(|c| start + c.len_utf8())
                .unwrap_or(start)
        } else {
            start
        };
        Self {
            source_info: SourceInfo::new(lex.file, start..end),
        }
    }
}

impl Lex {
    pub fn new(file: Arc<File>) -> Self {
        Self { file, position: 0 }
    }

    pub fn input(&self) -> &Arc<File> {
        &self.file
    }

    fn advance(&mut self, bytes: usize) -> SourceInfo {
        let source_info =
            SourceInfo::new(Arc::clone(&self.file), self.position..self.position + bytes);
        self.position += bytes;
        source_info
    }
}

impl Iterator for Lex {
    type Item = std::result::Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        static RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^(?:(?P<space>[ \t\r\n]+)|(?P<open>\()|(?P<close>\))|(?P<ident>[!-'*-~]+))")
                .unwrap()
        });

        loop {
            if self.file.len() == self.position {
                return None;
            }
            let input = Arc::clone(&self.file);
            let cap = match RE.captures(&input.contents()[self.position..]) {
                None => return Some(Err(LexError::from(self.clone()))),
                Some(cap) => cap,
            };

            // skip whitespaces
            if let Some(m) = cap.name("space") {
                self.advance(m.as_str().len());
                continue;
            }

            let kind = if cap.name("open").is_some() {
                TokenKind::Open
            } else if cap.name("close").is_some() {
                TokenKind::Close
            } else {
                TokenKind::Ident
            };
            let len = cap.get(0).map_or(0, |m| m.as_str().len());
            let source_info = self.advance(len);
            return Some(Ok(Token { kind, source_info }));
        }
    }
}

impl FusedIterator for Lex {}
