//! The trusted core: expressions, matching, substitution, reduction and
//! theorem verification.
//!
//! The kernel knows nothing about files. Entities are obtained through a
//! [Resolver] and verification results are recorded in a [Ledger].

use std::collections::{HashMap, HashSet};

pub mod entity;
pub mod error;
pub mod expr;
pub mod matcher;
pub mod reduce;
pub mod subst;
pub mod verify;

pub use entity::{Arg, Axiom, Case, Entity, EntityKind, Function, Invocation, Step, StructDecl, Theorem};
pub use error::Error;
pub use expr::{mk_func, mk_struct, mk_var, Expr, Name};
pub use matcher::{match_vars, Binding, MatchError, Mismatch};
pub use reduce::Reducer;
pub use subst::substitute;
pub use verify::{Verifier, VerifyReport, Warning};

/// Looks entities up by name.
pub trait Resolver {
    fn resolve(&mut self, name: &Name) -> anyhow::Result<Entity>;
}

/// The set of theorems already verified.
pub trait Ledger {
    fn is_verified(&self, name: &Name) -> bool;
    fn mark_verified(&mut self, name: &Name) -> anyhow::Result<()>;
}

impl Resolver for HashMap<Name, Entity> {
    fn resolve(&mut self, name: &Name) -> anyhow::Result<Entity> {
        match self.get(name) {
            Some(entity) => Ok(entity.clone()),
            None => Err(Error::UnknownEntity(name.clone()).into()),
        }
    }
}

impl Ledger for HashSet<Name> {
    fn is_verified(&self, name: &Name) -> bool {
        self.contains(name)
    }

    fn mark_verified(&mut self, name: &Name) -> anyhow::Result<()> {
        self.insert(name.clone());
        Ok(())
    }
}
