//! Expressions of the object language.
//!
//! Every traversal in this module (equality, printing, dropping) runs on an
//! explicit stack, so terms of arbitrary depth never exhaust the call stack.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::iter::zip;
use std::mem;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Arc<str>);

#[derive(Error, Debug, Clone)]
#[error("invalid name `{0}`")]
pub struct InvalidNameError(pub String);

impl Name {
    /// Lowercase alphanumeric segments separated by single hyphens.
    pub fn is_valid(value: &str) -> bool {
        static RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap());
        RE.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Name {
    type Error = InvalidNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if !Name::is_valid(value) {
            return Err(InvalidNameError(value.to_owned()));
        }
        Ok(Name(Arc::from(value)))
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
pub enum Expr {
    Var(Name),
    /// Application of a struct (data constructor). Never reduces.
    Struct(Arc<ExprApp>),
    /// Application of a function entity. Only found in function case results
    /// and in expressions handed to the reducer.
    Func(Arc<ExprApp>),
}

pub struct ExprApp {
    pub head: Name,
    pub args: Vec<Expr>,
    // structural hash of the node, computed from the hashes of its children
    hash: u64,
}

impl ExprApp {
    fn new(tag: u8, head: Name, args: Vec<Expr>) -> Self {
        let mut hasher = DefaultHasher::new();
        tag.hash(&mut hasher);
        head.hash(&mut hasher);
        for arg in &args {
            arg.hash(&mut hasher);
        }
        let hash = hasher.finish();
        Self { head, args, hash }
    }
}

impl Drop for ExprApp {
    fn drop(&mut self) {
        let mut stack = mem::take(&mut self.args);
        while let Some(e) = stack.pop() {
            match e {
                Expr::Var(_) => {}
                Expr::Struct(inner) | Expr::Func(inner) => {
                    // shared subterms are left to their other owners
                    if let Ok(mut app) = Arc::try_unwrap(inner) {
                        stack.append(&mut app.args);
                    }
                }
            }
        }
    }
}

pub fn mk_var(name: Name) -> Expr {
    Expr::Var(name)
}

pub fn mk_struct(head: Name, args: Vec<Expr>) -> Expr {
    Expr::Struct(Arc::new(ExprApp::new(1, head, args)))
}

pub fn mk_func(head: Name, args: Vec<Expr>) -> Expr {
    Expr::Func(Arc::new(ExprApp::new(2, head, args)))
}

impl Expr {
    pub fn head(&self) -> Option<&Name> {
        match self {
            Expr::Var(_) => None,
            Expr::Struct(inner) | Expr::Func(inner) => Some(&inner.head),
        }
    }

    pub fn args(&self) -> &[Expr] {
        match self {
            Expr::Var(_) => &[],
            Expr::Struct(inner) | Expr::Func(inner) => &inner.args,
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Expr::Var(_))
    }

    /// Rebuilds a node of the same variant and head around new arguments.
    pub fn with_args(&self, args: Vec<Expr>) -> Expr {
        match self {
            Expr::Var(_) => self.clone(),
            Expr::Struct(inner) => mk_struct(inner.head.clone(), args),
            Expr::Func(inner) => mk_func(inner.head.clone(), args),
        }
    }

    /// Returns true if no function term occurs in `self`.
    pub fn is_normal(&self) -> bool {
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            match e {
                Expr::Var(_) => {}
                Expr::Struct(inner) => stack.extend(&inner.args),
                Expr::Func(_) => return false,
            }
        }
        true
    }

    /// Variables of `self` in order of first occurrence, without duplicates.
    pub fn vars(&self) -> Vec<Name> {
        let mut vars: Vec<Name> = vec![];
        let mut seen = HashSet::new();
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            match e {
                Expr::Var(name) => {
                    if seen.insert(name) {
                        vars.push(name.clone());
                    }
                }
                Expr::Struct(inner) | Expr::Func(inner) => stack.extend(inner.args.iter().rev()),
            }
        }
        vars
    }

    /// Number of nodes.
    pub fn size(&self) -> usize {
        let mut size = 0;
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            size += 1;
            stack.extend(e.args());
        }
        size
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        let mut stack = vec![(self, other)];
        while let Some((left, right)) = stack.pop() {
            match (left, right) {
                (Expr::Var(x), Expr::Var(y)) => {
                    if x != y {
                        return false;
                    }
                }
                (Expr::Struct(l), Expr::Struct(r)) | (Expr::Func(l), Expr::Func(r)) => {
                    if Arc::ptr_eq(l, r) {
                        continue;
                    }
                    if l.hash != r.hash || l.head != r.head || l.args.len() != r.args.len() {
                        return false;
                    }
                    stack.extend(zip(&l.args, &r.args));
                }
                _ => return false,
            }
        }
        true
    }
}

impl Eq for Expr {}

// Consistent with `PartialEq`: application nodes contribute their cached
// structural hash, so hashing never walks the term.
impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Expr::Var(name) => {
                0u8.hash(state);
                name.hash(state);
            }
            Expr::Struct(inner) | Expr::Func(inner) => inner.hash.hash(state),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        enum Item<'a> {
            Expr(&'a Expr),
            Str(&'static str),
        }

        let mut stack = vec![Item::Expr(self)];
        while let Some(item) = stack.pop() {
            match item {
                Item::Str(s) => write!(f, "{s}")?,
                Item::Expr(Expr::Var(name)) => write!(f, "{name}")?,
                Item::Expr(Expr::Struct(inner) | Expr::Func(inner)) => {
                    if inner.args.is_empty() {
                        write!(f, "{}", inner.head)?;
                        continue;
                    }
                    write!(f, "({}", inner.head)?;
                    stack.push(Item::Str(")"));
                    for arg in inner.args.iter().rev() {
                        stack.push(Item::Expr(arg));
                        stack.push(Item::Str(" "));
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}
