use std::fmt::Display;
use std::sync::Arc;

use super::expr::{Expr, Name};
use crate::lex::SourceInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Struct,
    Function,
    Axiom,
    Theorem,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Struct => write!(f, "struct"),
            EntityKind::Function => write!(f, "function"),
            EntityKind::Axiom => write!(f, "axiom"),
            EntityKind::Theorem => write!(f, "theorem"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: Name,
    pub arity: usize,
}

#[derive(Debug, Clone)]
pub struct Case {
    // variables are scoped to the case
    pub patterns: Vec<Expr>,
    pub result: Expr,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Name,
    pub arity: usize,
    /// Tried in declaration order; the first match wins.
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone)]
pub struct Axiom {
    pub name: Name,
    pub args: Vec<Expr>,
    pub result: Expr,
}

/// An argument of an entity invocation inside a theorem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    /// Zero-based index of a formal argument of the theorem.
    Argument(usize),
    /// Index of an earlier step of the theorem.
    Step(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Argument(usize),
    Entity { target: Name, args: Vec<Arg> },
}

#[derive(Debug, Clone)]
pub struct Step {
    pub name: Name,
    pub invocation: Invocation,
    pub expected: Expr,
    pub source_info: Option<SourceInfo>,
}

#[derive(Debug, Clone)]
pub struct Theorem {
    pub name: Name,
    pub args: Vec<Expr>,
    /// Empty only for malformed theorems, which the verifier rejects.
    pub steps: Vec<Step>,
}

impl Theorem {
    /// The expected expression of the last step.
    pub fn conclusion(&self) -> Option<&Expr> {
        self.steps.last().map(|step| &step.expected)
    }

    pub fn step(&self, name: &Name) -> Option<&Step> {
        self.steps.iter().find(|step| step.name == *name)
    }

    /// The expression an invocation argument stands for, if the index is in
    /// range.
    pub fn arg_expr(&self, arg: Arg) -> Option<&Expr> {
        match arg {
            Arg::Argument(i) => self.args.get(i),
            Arg::Step(i) => self.steps.get(i).map(|step| &step.expected),
        }
    }

    /// Steps from which the final step cannot be reached through invocation
    /// arguments.
    pub fn unused_steps(&self) -> Vec<&Step> {
        let Some(last) = self.steps.len().checked_sub(1) else {
            return vec![];
        };
        let mut reached = vec![false; self.steps.len()];
        reached[last] = true;
        let mut stack = vec![last];
        while let Some(i) = stack.pop() {
            let Invocation::Entity { args, .. } = &self.steps[i].invocation else {
                continue;
            };
            for arg in args {
                if let Arg::Step(j) = *arg {
                    if !reached[j] {
                        reached[j] = true;
                        stack.push(j);
                    }
                }
            }
        }
        self.steps
            .iter()
            .zip(reached)
            .filter_map(|(step, reached)| (!reached).then_some(step))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum Entity {
    Struct(Arc<StructDecl>),
    Function(Arc<Function>),
    Axiom(Arc<Axiom>),
    Theorem(Arc<Theorem>),
}

impl Entity {
    pub fn name(&self) -> &Name {
        match self {
            Entity::Struct(inner) => &inner.name,
            Entity::Function(inner) => &inner.name,
            Entity::Axiom(inner) => &inner.name,
            Entity::Theorem(inner) => &inner.name,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Struct(_) => EntityKind::Struct,
            Entity::Function(_) => EntityKind::Function,
            Entity::Axiom(_) => EntityKind::Axiom,
            Entity::Theorem(_) => EntityKind::Theorem,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Entity::Struct(inner) => inner.arity,
            Entity::Function(inner) => inner.arity,
            Entity::Axiom(inner) => inner.args.len(),
            Entity::Theorem(inner) => inner.args.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::expr::{mk_struct, mk_var};
    use super::*;

    fn name(s: &str) -> Name {
        s.try_into().unwrap()
    }

    fn step(s: &str, invocation: Invocation) -> Step {
        Step {
            name: name(s),
            invocation,
            expected: mk_struct(name("top"), vec![]),
            source_info: None,
        }
    }

    fn invoke(target: &str, args: Vec<Arg>) -> Invocation {
        Invocation::Entity {
            target: name(target),
            args,
        }
    }

    #[test]
    fn unused_steps_follow_step_references_backwards() {
        let theorem = Theorem {
            name: name("t"),
            args: vec![mk_var(name("p"))],
            steps: vec![
                step("a", Invocation::Argument(0)),
                step("b", invoke("ax", vec![Arg::Argument(0)])),
                step("c", invoke("ax", vec![Arg::Step(0)])),
                step("d", invoke("ax", vec![Arg::Step(2), Arg::Argument(0)])),
                step("e", invoke("ax", vec![Arg::Step(3)])),
            ],
        };
        let unused: Vec<_> = theorem
            .unused_steps()
            .into_iter()
            .map(|step| step.name.to_string())
            .collect();
        assert_eq!(unused, ["b"]);
        assert_eq!(theorem.conclusion(), Some(&mk_struct(name("top"), vec![])));
        assert_eq!(theorem.arg_expr(Arg::Argument(1)), None);
        assert_eq!(theorem.step(&name("c")).map(|s| &s.invocation), Some(&invoke("ax", vec![Arg::Step(0)])));
    }

    #[test]
    fn single_step_theorem_has_no_unused_steps() {
        let theorem = Theorem {
            name: name("t"),
            args: vec![mk_var(name("p"))],
            steps: vec![step("a", Invocation::Argument(0))],
        };
        assert!(theorem.unused_steps().is_empty());
    }
}
