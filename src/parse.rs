//! Reader for the parenthesized labeled-tree notation.
//!
//! Identifiers are leaves, parenthesized lists are internal nodes. Every node
//! keeps its [SourceInfo] so later stages can point at the offending text.

use std::fmt::Display;
use std::mem;
use std::sync::Arc;

use thiserror::Error;

use crate::lex::{File, Lex, LexError, SourceInfo, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Name,
    Type,
    Arity,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Syntax => write!(f, "syntax error"),
            ErrorKind::Name => write!(f, "name error"),
            ErrorKind::Type => write!(f, "type error"),
            ErrorKind::Arity => write!(f, "arity error"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message} at {source_info}")]
pub struct SourceError {
    pub kind: ErrorKind,
    pub message: String,
    pub source_info: SourceInfo,
}

impl SourceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, source_info: SourceInfo) -> Self {
        Self {
            kind,
            message: message.into(),
            source_info,
        }
    }

    pub fn syntax(message: impl Into<String>, source_info: SourceInfo) -> Self {
        Self::new(ErrorKind::Syntax, message, source_info)
    }
}

impl From<LexError> for SourceError {
    fn from(e: LexError) -> Self {
        SourceError::syntax("illegal character", e.source_info)
    }
}

#[derive(Debug)]
pub enum Tree {
    Ident(Ident),
    List(List),
}

#[derive(Debug)]
pub struct Ident {
    pub name: String,
    pub source_info: SourceInfo,
}

#[derive(Debug)]
pub struct List {
    pub elems: Vec<Tree>,
    /// From the opening to the closing parenthesis, inclusive.
    pub source_info: SourceInfo,
}

// Deeply nested lists are freed with a work list instead of the default
// recursive drop glue.
impl Drop for List {
    fn drop(&mut self) {
        let mut stack = mem::take(&mut self.elems);
        while let Some(tree) = stack.pop() {
            if let Tree::List(mut list) = tree {
                stack.append(&mut list.elems);
            }
        }
    }
}

impl Tree {
    pub fn source_info(&self) -> &SourceInfo {
        match self {
            Tree::Ident(ident) => &ident.source_info,
            Tree::List(list) => &list.source_info,
        }
    }

    pub fn as_ident(&self) -> Result<&Ident, SourceError> {
        match self {
            Tree::Ident(ident) => Ok(ident),
            Tree::List(list) => Err(SourceError::syntax(
                "expected an identifier, but found a list",
                list.source_info.clone(),
            )),
        }
    }

    pub fn as_list(&self) -> Result<&List, SourceError> {
        match self {
            Tree::List(list) => Ok(list),
            Tree::Ident(ident) => Err(SourceError::syntax(
                format!("expected a list, but found identifier `{}`", ident.name),
                ident.source_info.clone(),
            )),
        }
    }
}

impl Ident {
    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn expect(&self, name: &str) -> Result<(), SourceError> {
        if self.name != name {
            return Err(SourceError::syntax(
                format!("expected identifier `{}`, but found `{}`", name, self.name),
                self.source_info.clone(),
            ));
        }
        Ok(())
    }

    pub fn is_nat(&self) -> bool {
        !self.name.is_empty() && self.name.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn nat(&self) -> Result<usize, SourceError> {
        let well_formed = self.name == "0" || (self.is_nat() && !self.name.starts_with('0'));
        match self.name.parse::<usize>() {
            Ok(n) if well_formed => Ok(n),
            _ => Err(SourceError::syntax(
                format!("expected a natural number, but found `{}`", self.name),
                self.source_info.clone(),
            )),
        }
    }
}

impl List {
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Position of the closing parenthesis.
    pub fn end_info(&self) -> SourceInfo {
        let range = self.source_info.range();
        let start = range.end.saturating_sub(1).max(range.start);
        SourceInfo::new(Arc::clone(self.source_info.file()), start..range.end)
    }

    pub fn expect_min_len(&self, len: usize) -> Result<&[Tree], SourceError> {
        if self.elems.len() < len {
            return Err(SourceError::syntax(
                "expected another element, but found the end of the list",
                self.end_info(),
            ));
        }
        Ok(&self.elems)
    }

    pub fn expect_len(&self, len: usize) -> Result<&[Tree], SourceError> {
        self.expect_min_len(len)?;
        if let Some(extra) = self.elems.get(len) {
            return Err(SourceError::syntax(
                "superfluous element found in the list",
                extra.source_info().clone(),
            ));
        }
        Ok(&self.elems)
    }

    /// Checks that the list starts with the keyword `head`.
    pub fn expect_head(&self, head: &str) -> Result<(), SourceError> {
        self.expect_min_len(1)?;
        self.elems[0].as_ident()?.expect(head)
    }
}

/// Reads every top-level tree of `file`.
pub fn parse(file: Arc<File>) -> Result<Vec<Tree>, SourceError> {
    let mut top = vec![];
    // open parenthesis and the elements collected so far
    let mut stack: Vec<(SourceInfo, Vec<Tree>)> = vec![];

    for token in Lex::new(Arc::clone(&file)) {
        let token = token?;
        match token.kind {
            TokenKind::Open => stack.push((token.source_info, vec![])),
            TokenKind::Close => {
                let Some((open, elems)) = stack.pop() else {
                    return Err(SourceError::syntax(
                        "unmatched closing parenthesis",
                        token.source_info,
                    ));
                };
                let list = Tree::List(List {
                    elems,
                    source_info: open.join(&token.source_info),
                });
                match stack.last_mut() {
                    Some((_, elems)) => elems.push(list),
                    None => top.push(list),
                }
            }
            TokenKind::Ident => {
                let ident = Tree::Ident(Ident {
                    name: token.as_str().to_owned(),
                    source_info: token.source_info,
                });
                match stack.last_mut() {
                    Some((_, elems)) => elems.push(ident),
                    None => top.push(ident),
                }
            }
        }
    }

    if let Some((open, _)) = stack.into_iter().next() {
        return Err(SourceError::syntax("unmatched opening parenthesis", open));
    }
    Ok(top)
}

/// Reads a file that must consist of exactly one top-level list.
pub fn parse_single(file: Arc<File>) -> Result<Tree, SourceError> {
    let mut trees = parse(Arc::clone(&file))?;
    if trees.len() > 1 {
        return Err(SourceError::syntax(
            "superfluous element found after the top-level list",
            trees[1].source_info().clone(),
        ));
    }
    match trees.pop() {
        Some(tree) => {
            tree.as_list()?;
            Ok(tree)
        }
        None => Err(SourceError::syntax(
            "unexpected end of the source code",
            SourceInfo::eof(file),
        )),
    }
}
