//! Step-by-step checking of theorems.
//!
//! A step is justified when instantiating the invoked axiom or theorem with
//! the step's arguments yields exactly the step's expected expression.
//! Theorems invoked before being verified are verified first, depth-first,
//! on an explicit stack of frames.

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;

use anyhow::{bail, Context};

use super::entity::{Arg, Entity, Invocation, Step, Theorem};
use super::error::Error;
use super::expr::{Expr, Name};
use super::matcher::match_vars;
use super::subst::substitute;
use super::{Ledger, Resolver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    UnusedStep { theorem: Name, step: Name },
}

impl Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnusedStep { theorem, step } => {
                write!(f, "step `{step}` of theorem `{theorem}` is never used")
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Theorems verified by this call, prerequisites first.
    pub verified: Vec<Name>,
    /// `(theorem, step)` pairs checked by this call.
    pub checked_steps: Vec<(Name, Name)>,
    pub warnings: Vec<Warning>,
}

impl VerifyReport {
    pub fn merge(&mut self, other: VerifyReport) {
        self.verified.extend(other.verified);
        self.checked_steps.extend(other.checked_steps);
        self.warnings.extend(other.warnings);
    }
}

struct Frame {
    theorem: Arc<Theorem>,
    next: usize,
}

enum Outcome {
    Checked,
    // the invoked theorem must be verified before the step can be checked
    Requires(Arc<Theorem>),
}

pub struct Verifier<'a, R: Resolver + ?Sized, L: Ledger + ?Sized> {
    resolver: &'a mut R,
    ledger: &'a mut L,
}

impl<'a, R: Resolver + ?Sized, L: Ledger + ?Sized> Verifier<'a, R, L> {
    pub fn new(resolver: &'a mut R, ledger: &'a mut L) -> Self {
        Self { resolver, ledger }
    }

    /// Verifies the theorem `name` and every unverified theorem it depends on.
    /// Each theorem is recorded in the ledger as soon as all its steps pass,
    /// so prerequisites stay verified even if a dependent theorem fails.
    pub fn verify(&mut self, name: &Name) -> anyhow::Result<VerifyReport> {
        let mut report = VerifyReport::default();
        if self.ledger.is_verified(name) {
            log::debug!("theorem `{name}` is already verified");
            return Ok(report);
        }

        let root = self.theorem(name)?;
        let mut frames = vec![];
        let mut on_stack = HashSet::new();
        self.enter(root, &mut frames, &mut on_stack, &mut report)
            .with_context(|| format!("while verifying `{name}`"))?;

        while let Some(frame) = frames.last() {
            let theorem = Arc::clone(&frame.theorem);
            let Some(step) = theorem.steps.get(frame.next) else {
                self.ledger
                    .mark_verified(&theorem.name)
                    .with_context(|| format!("failed to record theorem `{}`", theorem.name))?;
                log::info!("verified theorem `{}`", theorem.name);
                on_stack.remove(&theorem.name);
                report.verified.push(theorem.name.clone());
                frames.pop();
                continue;
            };

            let outcome = match self.check_step(&theorem, step, &frames, &on_stack) {
                Ok(outcome) => outcome,
                Err(e) => {
                    let e = match &step.source_info {
                        Some(source_info) => e.context(format!(
                            "in step `{}` of theorem `{}` at {source_info}",
                            step.name, theorem.name
                        )),
                        None => e.context(format!(
                            "in step `{}` of theorem `{}`",
                            step.name, theorem.name
                        )),
                    };
                    return Err(e.context(format!("while verifying {}", path(&frames))));
                }
            };
            match outcome {
                Outcome::Checked => {
                    log::debug!("checked step `{}` of theorem `{}`", step.name, theorem.name);
                    report
                        .checked_steps
                        .push((theorem.name.clone(), step.name.clone()));
                    if let Some(frame) = frames.last_mut() {
                        frame.next += 1;
                    }
                }
                Outcome::Requires(dependency) => {
                    let context = format!("while verifying {} -> `{}`", path(&frames), dependency.name);
                    self.enter(dependency, &mut frames, &mut on_stack, &mut report)
                        .context(context)?;
                }
            }
        }
        Ok(report)
    }

    fn theorem(&mut self, name: &Name) -> anyhow::Result<Arc<Theorem>> {
        match self.resolver.resolve(name)? {
            Entity::Theorem(theorem) => Ok(theorem),
            other => bail!(Error::WrongKind {
                name: name.clone(),
                kind: other.kind(),
                expected: "a theorem",
            }),
        }
    }

    fn enter(
        &mut self,
        theorem: Arc<Theorem>,
        frames: &mut Vec<Frame>,
        on_stack: &mut HashSet<Name>,
        report: &mut VerifyReport,
    ) -> Result<(), Error> {
        log::debug!("verifying theorem `{}`", theorem.name);
        validate(&theorem)?;
        for step in theorem.unused_steps() {
            let warning = Warning::UnusedStep {
                theorem: theorem.name.clone(),
                step: step.name.clone(),
            };
            log::warn!("{warning}");
            report.warnings.push(warning);
        }
        on_stack.insert(theorem.name.clone());
        frames.push(Frame { theorem, next: 0 });
        Ok(())
    }

    fn check_step(
        &mut self,
        theorem: &Theorem,
        step: &Step,
        frames: &[Frame],
        on_stack: &HashSet<Name>,
    ) -> anyhow::Result<Outcome> {
        let actual = match &step.invocation {
            Invocation::Argument(i) => match theorem.args.get(*i) {
                Some(arg) => arg.clone(),
                None => bail!(argument_index(theorem, step, *i)),
            },
            Invocation::Entity { target, args } => {
                let entity = self.resolver.resolve(target)?;
                let (formals, conclusion) = match &entity {
                    Entity::Axiom(axiom) => (&axiom.args, &axiom.result),
                    Entity::Theorem(dependency) => {
                        if !self.ledger.is_verified(&dependency.name) {
                            if on_stack.contains(&dependency.name) {
                                bail!(Error::CyclicDependency {
                                    chain: cycle(frames, &dependency.name),
                                });
                            }
                            return Ok(Outcome::Requires(Arc::clone(dependency)));
                        }
                        let Some(conclusion) = dependency.conclusion() else {
                            bail!(Error::EmptyTheorem {
                                theorem: dependency.name.clone(),
                            });
                        };
                        (&dependency.args, conclusion)
                    }
                    Entity::Struct(_) | Entity::Function(_) => bail!(Error::WrongKind {
                        name: target.clone(),
                        kind: entity.kind(),
                        expected: "an axiom or a theorem",
                    }),
                };
                if formals.len() != args.len() {
                    bail!(Error::Arity {
                        name: target.clone(),
                        kind: entity.kind(),
                        expected: formals.len(),
                        found: args.len(),
                    });
                }
                let mut actuals = Vec::with_capacity(args.len());
                for &arg in args {
                    match theorem.arg_expr(arg) {
                        Some(e) => actuals.push(e.clone()),
                        None => bail!(Error::StepReference {
                            theorem: theorem.name.clone(),
                            step: step.name.clone(),
                        }),
                    }
                }
                let binding = match_vars(formals, &actuals).map_err(Error::from)?;
                substitute(&binding, conclusion)
            }
        };
        if actual != step.expected {
            bail!(Error::ProofMismatch {
                theorem: theorem.name.clone(),
                step: step.name.clone(),
                expected: step.expected.clone(),
                actual,
            });
        }
        Ok(Outcome::Checked)
    }
}

/// Rejects theorems whose shape the step checks rely on: at least one step,
/// argument indices in range, and step references to earlier steps only.
fn validate(theorem: &Theorem) -> Result<(), Error> {
    if theorem.steps.is_empty() {
        return Err(Error::EmptyTheorem {
            theorem: theorem.name.clone(),
        });
    }
    for (i, step) in theorem.steps.iter().enumerate() {
        let single;
        let args: &[Arg] = match &step.invocation {
            Invocation::Argument(index) => {
                single = [Arg::Argument(*index)];
                &single
            }
            Invocation::Entity { args, .. } => args,
        };
        for &arg in args {
            match arg {
                Arg::Argument(index) if index >= theorem.args.len() => {
                    return Err(argument_index(theorem, step, index));
                }
                Arg::Step(j) if j >= i => {
                    return Err(Error::StepReference {
                        theorem: theorem.name.clone(),
                        step: step.name.clone(),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn argument_index(theorem: &Theorem, step: &Step, index: usize) -> Error {
    Error::ArgumentIndex {
        theorem: theorem.name.clone(),
        step: step.name.clone(),
        index,
        count: theorem.args.len(),
    }
}

/// The frames from the first occurrence of `name` on, closed by `name`.
fn cycle(frames: &[Frame], name: &Name) -> Vec<Name> {
    let start = frames
        .iter()
        .position(|frame| frame.theorem.name == *name)
        .unwrap_or(0);
    frames[start..]
        .iter()
        .map(|frame| frame.theorem.name.clone())
        .chain([name.clone()])
        .collect()
}

fn path(frames: &[Frame]) -> String {
    frames
        .iter()
        .map(|frame| format!("`{}`", frame.theorem.name))
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::super::entity::{Arg, Axiom};
    use super::super::expr::{mk_struct, mk_var};
    use super::super::matcher::{MatchError, Mismatch};
    use super::*;

    fn name(s: &str) -> Name {
        s.try_into().unwrap()
    }

    fn var(s: &str) -> Expr {
        mk_var(name(s))
    }

    fn imp(a: Expr, b: Expr) -> Expr {
        mk_struct(name("imp"), vec![a, b])
    }

    fn axiom(s: &str, args: Vec<Expr>, result: Expr) -> (Name, Entity) {
        let axiom = Axiom {
            name: name(s),
            args,
            result,
        };
        (name(s), Entity::Axiom(Arc::new(axiom)))
    }

    fn step(s: &str, invocation: Invocation, expected: Expr) -> Step {
        Step {
            name: name(s),
            invocation,
            expected,
            source_info: None,
        }
    }

    fn invoke(target: &str, args: Vec<Arg>) -> Invocation {
        Invocation::Entity {
            target: name(target),
            args,
        }
    }

    fn theorem(s: &str, args: Vec<Expr>, steps: Vec<Step>) -> (Name, Entity) {
        let theorem = Theorem {
            name: name(s),
            args,
            steps,
        };
        (name(s), Entity::Theorem(Arc::new(theorem)))
    }

    /// Implication with modus ponens and weakening.
    fn env() -> HashMap<Name, Entity> {
        let (p, q) = (var("p"), var("q"));
        [
            axiom("mp", vec![imp(p.clone(), q.clone()), p.clone()], q.clone()),
            axiom("intro", vec![p.clone(), q.clone()], imp(q.clone(), p.clone())),
            // a, b ⊢ b ⇒ a
            theorem(
                "weaken",
                vec![var("a"), var("b")],
                vec![step(
                    "w",
                    invoke("intro", vec![Arg::Argument(0), Arg::Argument(1)]),
                    imp(var("b"), var("a")),
                )],
            ),
            // a, b ⊢ b ⇒ (b ⇒ a), through the theorem above
            theorem(
                "weaken-twice",
                vec![var("a"), var("b")],
                vec![
                    step(
                        "w1",
                        invoke("weaken", vec![Arg::Argument(0), Arg::Argument(1)]),
                        imp(var("b"), var("a")),
                    ),
                    step(
                        "w2",
                        invoke("weaken", vec![Arg::Step(0), Arg::Argument(1)]),
                        imp(var("b"), imp(var("b"), var("a"))),
                    ),
                ],
            ),
            // a ⇒ b, a ⊢ b with an unused detour
            theorem(
                "apply",
                vec![imp(var("a"), var("b")), var("a")],
                vec![
                    step(
                        "detour",
                        invoke("intro", vec![Arg::Argument(1), Arg::Argument(0)]),
                        imp(imp(var("a"), var("b")), var("a")),
                    ),
                    step(
                        "done",
                        invoke("mp", vec![Arg::Argument(0), Arg::Argument(1)]),
                        var("b"),
                    ),
                ],
            ),
        ]
        .into_iter()
        .collect()
    }

    fn verify(env: &mut HashMap<Name, Entity>, ledger: &mut HashSet<Name>, s: &str) -> anyhow::Result<VerifyReport> {
        Verifier::new(env, ledger).verify(&name(s))
    }

    #[test]
    fn axiom_instances_check() {
        let mut env = env();
        let mut ledger = HashSet::new();
        let report = verify(&mut env, &mut ledger, "weaken").unwrap();
        assert_eq!(report.verified, [name("weaken")]);
        assert_eq!(report.checked_steps, [(name("weaken"), name("w"))]);
        assert!(report.warnings.is_empty());
        assert!(ledger.contains(&name("weaken")));
    }

    #[test]
    fn prerequisites_are_verified_first() {
        let mut env = env();
        let mut ledger = HashSet::new();
        let report = verify(&mut env, &mut ledger, "weaken-twice").unwrap();
        assert_eq!(report.verified, [name("weaken"), name("weaken-twice")]);
        assert_eq!(report.checked_steps.len(), 3);

        // verified theorems are not checked again
        let report = verify(&mut env, &mut ledger, "weaken-twice").unwrap();
        assert!(report.verified.is_empty());
        assert!(report.checked_steps.is_empty());
    }

    #[test]
    fn unused_steps_warn_but_verify() {
        let mut env = env();
        let mut ledger = HashSet::new();
        let report = verify(&mut env, &mut ledger, "apply").unwrap();
        assert_eq!(report.verified, [name("apply")]);
        assert_eq!(report.checked_steps.len(), 2);
        assert_eq!(
            report.warnings,
            [Warning::UnusedStep {
                theorem: name("apply"),
                step: name("detour"),
            }]
        );
        insta::assert_snapshot!(report.warnings[0], @"step `detour` of theorem `apply` is never used");
    }

    #[test]
    fn changed_expectation_fails_at_that_step() {
        let mut env = env();
        let (_, broken) = theorem(
            "weaken-twice",
            vec![var("a"), var("b")],
            vec![
                step(
                    "w1",
                    invoke("weaken", vec![Arg::Argument(0), Arg::Argument(1)]),
                    imp(var("b"), var("a")),
                ),
                step(
                    "w2",
                    invoke("weaken", vec![Arg::Step(0), Arg::Argument(1)]),
                    imp(var("a"), imp(var("b"), var("a"))),
                ),
            ],
        );
        env.insert(name("weaken-twice"), broken);
        let mut ledger = HashSet::new();
        let err = verify(&mut env, &mut ledger, "weaken-twice").unwrap_err();
        match Error::find(&err) {
            Some(Error::ProofMismatch {
                theorem,
                step,
                expected,
                actual,
            }) => {
                assert_eq!(theorem, &name("weaken-twice"));
                assert_eq!(step, &name("w2"));
                assert_eq!(expected.to_string(), "(imp a (imp b a))");
                assert_eq!(actual.to_string(), "(imp b (imp b a))");
            }
            other => panic!("unexpected error {other:?}"),
        }
        // the prerequisite stays verified, the failing theorem does not
        assert!(ledger.contains(&name("weaken")));
        assert!(!ledger.contains(&name("weaken-twice")));
        insta::assert_snapshot!(format!("{err:#}"), @"while verifying `weaken-twice`: in step `w2` of theorem `weaken-twice`: proof mismatch in step `w2` of theorem `weaken-twice`: expected `(imp a (imp b a))`, but the invocation yields `(imp b (imp b a))`");
    }

    #[test]
    fn invocation_errors() {
        let mut env = env();
        let mut ledger = HashSet::new();

        let (_, bad) = theorem(
            "bad",
            vec![var("a")],
            vec![step("x", invoke("assoc", vec![Arg::Argument(0)]), var("a"))],
        );
        env.insert(name("bad"), bad);
        let err = verify(&mut env, &mut ledger, "bad").unwrap_err();
        assert!(matches!(Error::find(&err), Some(Error::UnknownEntity(n)) if n == &name("assoc")));

        let (_, bad) = theorem(
            "bad",
            vec![var("a")],
            vec![step("x", invoke("mp", vec![Arg::Argument(0)]), var("a"))],
        );
        env.insert(name("bad"), bad);
        let err = verify(&mut env, &mut ledger, "bad").unwrap_err();
        assert!(matches!(
            Error::find(&err),
            Some(Error::Arity {
                expected: 2,
                found: 1,
                ..
            })
        ));

        let (_, bad) = theorem(
            "bad",
            vec![var("a"), var("b")],
            vec![step(
                "x",
                invoke("mp", vec![Arg::Argument(0), Arg::Argument(1)]),
                var("b"),
            )],
        );
        env.insert(name("bad"), bad);
        let err = verify(&mut env, &mut ledger, "bad").unwrap_err();
        assert!(matches!(
            Error::find(&err),
            Some(Error::Match(MatchError::ShapeMismatch {
                reason: Mismatch::NotShaped,
                ..
            }))
        ));
        assert!(ledger.is_empty());

        let err = verify(&mut env, &mut ledger, "mp").unwrap_err();
        insta::assert_snapshot!(err, @"axiom `mp` cannot be used here; expected a theorem");
    }

    #[test]
    fn step_references_must_point_backwards() {
        let mut env = env();
        env.extend([axiom("id", vec![var("x")], var("x"))]);
        let falsum = mk_struct(name("false"), vec![]);
        let mut ledger = HashSet::new();

        // a step justified by itself
        let (n, t) = theorem(
            "bogus",
            vec![],
            vec![step("s", invoke("id", vec![Arg::Step(0)]), falsum.clone())],
        );
        env.insert(n, t);
        let err = verify(&mut env, &mut ledger, "bogus").unwrap_err();
        assert!(matches!(
            Error::find(&err),
            Some(Error::StepReference { step, .. }) if step == &name("s")
        ));
        insta::assert_snapshot!(format!("{err:#}"), @"while verifying `bogus`: step `s` of theorem `bogus` refers to a step that does not precede it");

        // a step justified by a later one
        let (n, t) = theorem(
            "bogus",
            vec![],
            vec![
                step("s", invoke("id", vec![Arg::Step(1)]), falsum.clone()),
                step("t", invoke("id", vec![Arg::Step(0)]), falsum.clone()),
            ],
        );
        env.insert(n, t);
        let err = verify(&mut env, &mut ledger, "bogus").unwrap_err();
        assert!(matches!(
            Error::find(&err),
            Some(Error::StepReference { step, .. }) if step == &name("s")
        ));
        assert!(ledger.is_empty());
    }

    #[test]
    fn malformed_theorems_are_rejected() {
        let mut env = env();
        let mut ledger = HashSet::new();

        let (n, t) = theorem(
            "bad",
            vec![var("a")],
            vec![step("x", Invocation::Argument(1), var("a"))],
        );
        env.insert(n, t);
        let err = verify(&mut env, &mut ledger, "bad").unwrap_err();
        insta::assert_snapshot!(format!("{err:#}"), @"while verifying `bad`: step `x` of theorem `bad` refers to argument 2, but the theorem has 1 argument(s)");

        let (n, t) = theorem(
            "bad",
            vec![var("a"), var("b")],
            vec![step(
                "x",
                invoke("intro", vec![Arg::Argument(0), Arg::Argument(2)]),
                imp(var("b"), var("a")),
            )],
        );
        env.insert(n, t);
        let err = verify(&mut env, &mut ledger, "bad").unwrap_err();
        assert!(matches!(
            Error::find(&err),
            Some(Error::ArgumentIndex { index: 2, count: 2, .. })
        ));

        // an empty prerequisite is reported through the dependent theorem
        let (n, t) = theorem("empty", vec![], vec![]);
        env.insert(n, t);
        let (n, t) = theorem(
            "uses-empty",
            vec![],
            vec![step("x", invoke("empty", vec![]), var("a"))],
        );
        env.insert(n, t);
        let err = verify(&mut env, &mut ledger, "uses-empty").unwrap_err();
        assert!(matches!(
            Error::find(&err),
            Some(Error::EmptyTheorem { theorem }) if theorem == &name("empty")
        ));
        insta::assert_snapshot!(format!("{err:#}"), @"while verifying `uses-empty` -> `empty`: theorem `empty` has no steps");
        assert!(ledger.is_empty());

        // a recorded theorem without steps cannot be invoked either
        ledger.insert(name("empty"));
        let err = verify(&mut env, &mut ledger, "uses-empty").unwrap_err();
        assert!(matches!(Error::find(&err), Some(Error::EmptyTheorem { .. })));
        assert!(!ledger.contains(&name("uses-empty")));
    }

    #[test]
    fn cycles_are_reported_with_their_chain() {
        let mut env = env();
        for (s, next) in [("t1", "t2"), ("t2", "t3"), ("t3", "t1")] {
            let (n, t) = theorem(
                s,
                vec![var("a")],
                vec![step("x", invoke(next, vec![Arg::Argument(0)]), var("a"))],
            );
            env.insert(n, t);
        }
        let mut ledger = HashSet::new();
        let err = verify(&mut env, &mut ledger, "t2").unwrap_err();
        match Error::find(&err) {
            Some(Error::CyclicDependency { chain }) => {
                assert_eq!(chain, &[name("t2"), name("t3"), name("t1"), name("t2")]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(ledger.is_empty());
        insta::assert_snapshot!(err, @"while verifying `t2` -> `t3` -> `t1`");

        // a theorem invoking itself
        let (n, t) = theorem(
            "t1",
            vec![var("a")],
            vec![step("x", invoke("t1", vec![Arg::Argument(0)]), var("a"))],
        );
        env.insert(n, t);
        let err = verify(&mut env, &mut ledger, "t1").unwrap_err();
        assert!(matches!(
            Error::find(&err),
            Some(Error::CyclicDependency { chain }) if chain.len() == 2
        ));
    }

    #[test]
    fn long_dependency_chains_do_not_overflow() {
        let mut env = env();
        let n = 50_000;
        for i in 0..n {
            let target = if i == 0 {
                "intro".to_owned()
            } else {
                format!("chain{}", i - 1)
            };
            let (k, t) = theorem(
                &format!("chain{i}"),
                vec![var("a"), var("b")],
                vec![step(
                    "x",
                    invoke(&target, vec![Arg::Argument(0), Arg::Argument(1)]),
                    imp(var("b"), var("a")),
                )],
            );
            env.insert(k, t);
        }
        let mut ledger = HashSet::new();
        let report = verify(&mut env, &mut ledger, &format!("chain{}", n - 1)).unwrap();
        assert_eq!(report.verified.len(), n);
        assert_eq!(report.verified[0], name("chain0"));
        assert_eq!(ledger.len(), n);
    }
}
