use std::fmt::Display;

use easy_ext::ext;
use thiserror::Error;

use super::entity::EntityKind;
use super::expr::{Expr, Name};
use super::matcher::MatchError;

#[ext(JoinDisplay)]
impl<T: Display> [T] {
    fn join_display(&self, sep: &str) -> String {
        self.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(sep)
    }
}

/// Failures detected by the kernel. Positions are attached by the caller as
/// context.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("unknown entity `{0}`")]
    UnknownEntity(Name),
    #[error("`{name}` is declared more than once (as {})", .kinds.join_display(" and "))]
    DuplicateDeclaration { name: Name, kinds: Vec<EntityKind> },
    #[error("{kind} `{name}` cannot be used here; expected {expected}")]
    WrongKind {
        name: Name,
        kind: EntityKind,
        expected: &'static str,
    },
    #[error("{kind} `{name}` expects {expected} argument(s), but {found} given")]
    Arity {
        name: Name,
        kind: EntityKind,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("non-exhaustive patterns in function `{func}` for arguments ({})", .args.join_display(" "))]
    NonExhaustiveMatch { func: Name, args: Vec<Expr> },
    #[error("reduction limit of {limit} step(s) exceeded")]
    ReductionLimit { limit: usize },
    #[error("cyclic dependency: {}", .chain.join_display(" -> "))]
    CyclicDependency { chain: Vec<Name> },
    #[error("theorem `{theorem}` has no steps")]
    EmptyTheorem { theorem: Name },
    #[error("step `{step}` of theorem `{theorem}` refers to argument {}, but the theorem has {count} argument(s)", .index + 1)]
    ArgumentIndex {
        theorem: Name,
        step: Name,
        index: usize,
        count: usize,
    },
    #[error("step `{step}` of theorem `{theorem}` refers to a step that does not precede it")]
    StepReference { theorem: Name, step: Name },
    #[error("proof mismatch in step `{step}` of theorem `{theorem}`: expected `{expected}`, but the invocation yields `{actual}`")]
    ProofMismatch {
        theorem: Name,
        step: Name,
        expected: Expr,
        actual: Expr,
    },
}

impl Error {
    /// Finds the kernel error at the root of an error chain.
    pub fn find(err: &anyhow::Error) -> Option<&Error> {
        err.chain().find_map(|cause| cause.downcast_ref::<Error>())
    }
}
