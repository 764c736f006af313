//! First-order matching of formal patterns against actual arguments.

use std::collections::HashMap;
use std::iter::zip;

use thiserror::Error;

use super::expr::{Expr, Name};

/// Mapping from pattern variables to the expressions they matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    map: HashMap<Name, Expr>,
}

impl Binding {
    pub fn get(&self, name: &Name) -> Option<&Expr> {
        self.map.get(name)
    }

    pub fn insert(&mut self, name: Name, e: Expr) -> Option<Expr> {
        self.map.insert(name, e)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Expr)> {
        self.map.iter()
    }
}

impl FromIterator<(Name, Expr)> for Binding {
    fn from_iter<T: IntoIterator<Item = (Name, Expr)>>(iter: T) -> Self {
        Binding {
            map: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Mismatch {
    #[error("a variable cannot match a shaped pattern")]
    NotShaped,
    #[error("struct and function term do not match")]
    VariantMismatch,
    #[error("head names differ")]
    HeadMismatch,
    #[error("argument counts differ")]
    ArgCount,
}

#[derive(Debug, Clone, Error)]
pub enum MatchError {
    #[error("expected {expected} argument(s), but {found} given")]
    Arity { expected: usize, found: usize },
    #[error("variable `{var}` is bound to both `{first}` and `{second}`")]
    Conflict { var: Name, first: Expr, second: Expr },
    #[error("pattern `{pattern}` does not match `{actual}`: {reason}")]
    ShapeMismatch {
        pattern: Expr,
        actual: Expr,
        reason: Mismatch,
    },
}

/// Matches `formals` against `actuals` position by position.
///
/// A variable occurring more than once must be matched by equal expressions.
/// The actual side is taken as is; it is never reduced.
pub fn match_vars(formals: &[Expr], actuals: &[Expr]) -> Result<Binding, MatchError> {
    if formals.len() != actuals.len() {
        return Err(MatchError::Arity {
            expected: formals.len(),
            found: actuals.len(),
        });
    }

    let mut binding = Binding::default();
    let mut stack: Vec<(&Expr, &Expr)> = zip(formals, actuals).rev().collect();
    while let Some((formal, actual)) = stack.pop() {
        match formal {
            Expr::Var(var) => match binding.get(var) {
                None => {
                    binding.insert(var.clone(), actual.clone());
                }
                Some(first) => {
                    if first != actual {
                        return Err(MatchError::Conflict {
                            var: var.clone(),
                            first: first.clone(),
                            second: actual.clone(),
                        });
                    }
                }
            },
            Expr::Struct(pattern) | Expr::Func(pattern) => {
                let reason = match (formal, actual) {
                    (_, Expr::Var(_)) => Some(Mismatch::NotShaped),
                    (Expr::Struct(_), Expr::Func(_)) | (Expr::Func(_), Expr::Struct(_)) => {
                        Some(Mismatch::VariantMismatch)
                    }
                    _ if actual.head() != Some(&pattern.head) => Some(Mismatch::HeadMismatch),
                    _ if actual.args().len() != pattern.args.len() => Some(Mismatch::ArgCount),
                    _ => None,
                };
                if let Some(reason) = reason {
                    return Err(MatchError::ShapeMismatch {
                        pattern: formal.clone(),
                        actual: actual.clone(),
                        reason,
                    });
                }
                stack.extend(zip(&pattern.args, actual.args()).rev());
            }
        }
    }
    Ok(binding)
}
