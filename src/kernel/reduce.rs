//! Evaluation of function terms to normal form.
//!
//! A matching case's result is instantiated while it is being normalized:
//! this is [substitute](super::subst::substitute) fused into the reduction
//! walk, so values bound by the matcher are never traversed again.
//! Normal forms of applications are remembered for the life of the reducer.

use std::collections::HashMap;
use std::rc::Rc;

use anyhow::bail;

use super::entity::{Entity, EntityKind};
use super::error::Error;
use super::expr::{mk_func, Expr, Name};
use super::matcher::{match_vars, Binding};
use super::Resolver;

pub struct Reducer<'a, R: Resolver + ?Sized> {
    resolver: &'a mut R,
    limit: Option<usize>,
    steps: usize,
    // applications with normal arguments to their normal forms
    memo: HashMap<Expr, Expr>,
}

impl<'a, R: Resolver + ?Sized> Reducer<'a, R> {
    pub fn new(resolver: &'a mut R) -> Self {
        Self {
            resolver,
            limit: None,
            steps: 0,
            memo: HashMap::new(),
        }
    }

    /// Caps the number of case applications a reducer may perform.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Number of case applications performed so far. Applications answered
    /// from the memo are not counted.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Reduces every function term of `e`, arguments first, until none is
    /// left.
    pub fn normalize(&mut self, e: &Expr) -> anyhow::Result<Expr> {
        enum Task {
            // the binding instantiates the variables of a case result; its
            // values are already normal
            Visit(Expr, Option<Rc<Binding>>),
            // rebuild a struct node from the last `args.len()` values
            Build(Expr),
            // apply a function to the last `n` values
            Apply(Name, usize),
            // record the last value as the normal form of the application
            Memo(Expr),
        }

        let mut tasks = vec![Task::Visit(e.clone(), None)];
        let mut values: Vec<Expr> = vec![];
        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(e, binding) => match &e {
                    Expr::Var(name) => match &binding {
                        Some(binding) => match binding.get(name) {
                            Some(value) => values.push(value.clone()),
                            None => panic!("unbound variable `{name}` in case result"),
                        },
                        None => values.push(e.clone()),
                    },
                    Expr::Struct(inner) => {
                        if inner.args.is_empty() {
                            values.push(e.clone());
                            continue;
                        }
                        let args: Vec<_> = inner
                            .args
                            .iter()
                            .rev()
                            .map(|arg| Task::Visit(arg.clone(), binding.clone()))
                            .collect();
                        tasks.push(Task::Build(e.clone()));
                        tasks.extend(args);
                    }
                    Expr::Func(inner) => {
                        tasks.push(Task::Apply(inner.head.clone(), inner.args.len()));
                        tasks.extend(
                            inner
                                .args
                                .iter()
                                .rev()
                                .map(|arg| Task::Visit(arg.clone(), binding.clone())),
                        );
                    }
                },
                Task::Build(template) => {
                    let args = values.split_off(values.len() - template.args().len());
                    values.push(template.with_args(args));
                }
                Task::Apply(head, n) => {
                    let args = values.split_off(values.len() - n);
                    let key = mk_func(head.clone(), args.clone());
                    if let Some(normal) = self.memo.get(&key) {
                        values.push(normal.clone());
                        continue;
                    }
                    let (binding, result) = self.select(&head, args)?;
                    tasks.push(Task::Memo(key));
                    tasks.push(Task::Visit(result, Some(Rc::new(binding))));
                }
                Task::Memo(key) => {
                    if let Some(normal) = values.last() {
                        self.memo.insert(key, normal.clone());
                    }
                }
            }
        }
        debug_assert_eq!(values.len(), 1);
        Ok(values.pop().unwrap_or_else(|| e.clone()))
    }

    /// Finds the first case of `head` whose patterns match `args` and returns
    /// its binding and result. The arguments must be in normal form.
    fn select(&mut self, head: &Name, args: Vec<Expr>) -> anyhow::Result<(Binding, Expr)> {
        let function = match self.resolver.resolve(head)? {
            Entity::Function(function) => function,
            other => bail!(Error::WrongKind {
                name: head.clone(),
                kind: other.kind(),
                expected: "a function",
            }),
        };
        if function.arity != args.len() {
            bail!(Error::Arity {
                name: head.clone(),
                kind: EntityKind::Function,
                expected: function.arity,
                found: args.len(),
            });
        }
        if let Some(limit) = self.limit {
            if self.steps >= limit {
                bail!(Error::ReductionLimit { limit });
            }
        }
        self.steps += 1;

        for (index, case) in function.cases.iter().enumerate() {
            let Ok(binding) = match_vars(&case.patterns, &args) else {
                continue;
            };
            log::trace!("`{}` reduces by case {}", function.name, index + 1);
            return Ok((binding, case.result.clone()));
        }
        bail!(Error::NonExhaustiveMatch {
            func: function.name.clone(),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::super::entity::{Case, Function, StructDecl};
    use super::super::expr::{mk_func, mk_struct, mk_var};
    use super::*;

    fn name(s: &str) -> Name {
        s.try_into().unwrap()
    }

    fn var(s: &str) -> Expr {
        mk_var(name(s))
    }

    fn zero() -> Expr {
        mk_struct(name("zero"), vec![])
    }

    fn succ(e: Expr) -> Expr {
        mk_struct(name("succ"), vec![e])
    }

    fn plus(a: Expr, b: Expr) -> Expr {
        mk_func(name("plus"), vec![a, b])
    }

    fn nat(n: usize) -> Expr {
        (0..n).fold(zero(), |e, _| succ(e))
    }

    fn function(s: &str, arity: usize, cases: Vec<(Vec<Expr>, Expr)>) -> (Name, Entity) {
        let cases = cases
            .into_iter()
            .map(|(patterns, result)| Case { patterns, result })
            .collect();
        let f = Function {
            name: name(s),
            arity,
            cases,
        };
        (name(s), Entity::Function(Arc::new(f)))
    }

    fn env() -> HashMap<Name, Entity> {
        let structs = [("zero", 0), ("succ", 1)].map(|(s, arity)| {
            let decl = StructDecl {
                name: name(s),
                arity,
            };
            (name(s), Entity::Struct(Arc::new(decl)))
        });
        let plus_fn = function(
            "plus",
            2,
            vec![
                (vec![zero(), var("y")], var("y")),
                (vec![succ(var("x")), var("y")], succ(plus(var("x"), var("y")))),
            ],
        );
        let double_fn = function(
            "double",
            1,
            vec![(vec![var("x")], plus(var("x"), var("x")))],
        );
        let pred_fn = function("pred", 1, vec![(vec![succ(var("x"))], var("x"))]);
        let spin_fn = function(
            "spin",
            1,
            vec![(vec![var("x")], mk_func(name("spin"), vec![var("x")]))],
        );
        structs
            .into_iter()
            .chain([plus_fn, double_fn, pred_fn, spin_fn])
            .collect()
    }

    #[test]
    fn one_plus_one() {
        let mut env = env();
        let mut reducer = Reducer::new(&mut env);
        let e = reducer.normalize(&plus(succ(zero()), succ(zero()))).unwrap();
        insta::assert_snapshot!(e, @"(succ (succ zero))");
        assert_eq!(reducer.steps(), 2);
    }

    #[test]
    fn nested_function_terms_reduce_innermost_first() {
        let mut env = env();
        let mut reducer = Reducer::new(&mut env);
        let e = mk_func(name("double"), vec![plus(nat(2), nat(1))]);
        assert_eq!(reducer.normalize(&e).unwrap(), nat(6));

        // function terms below structs are reduced too
        let e = succ(mk_func(name("pred"), vec![nat(3)]));
        assert_eq!(reducer.normalize(&e).unwrap(), nat(3));
    }

    #[test]
    fn normal_forms_are_fixed_points() {
        let mut env = env();
        let mut reducer = Reducer::new(&mut env);
        for e in [nat(4), var("x"), mk_struct(name("pair"), vec![var("x"), nat(1)])] {
            assert_eq!(reducer.normalize(&e).unwrap(), e);
        }
        assert_eq!(reducer.steps(), 0);
    }

    #[test]
    fn non_exhaustive_match_names_function_and_arguments() {
        let mut env = env();
        let mut reducer = Reducer::new(&mut env);
        let err = reducer
            .normalize(&mk_func(name("pred"), vec![zero()]))
            .unwrap_err();
        assert!(matches!(
            Error::find(&err),
            Some(Error::NonExhaustiveMatch { .. })
        ));
        insta::assert_snapshot!(err, @"non-exhaustive patterns in function `pred` for arguments (zero)");

        // arguments are not reduced by matching: a stuck variable fails
        let err = reducer.normalize(&plus(var("n"), zero())).unwrap_err();
        insta::assert_snapshot!(err, @"non-exhaustive patterns in function `plus` for arguments (n zero)");
    }

    #[test]
    fn heads_are_checked() {
        let mut env = env();
        let mut reducer = Reducer::new(&mut env);
        let err = reducer
            .normalize(&mk_func(name("succ"), vec![zero()]))
            .unwrap_err();
        insta::assert_snapshot!(err, @"struct `succ` cannot be used here; expected a function");

        let err = reducer.normalize(&mk_func(name("plus"), vec![zero()])).unwrap_err();
        insta::assert_snapshot!(err, @"function `plus` expects 2 argument(s), but 1 given");

        let err = reducer.normalize(&mk_func(name("minus"), vec![])).unwrap_err();
        insta::assert_snapshot!(err, @"unknown entity `minus`");
    }

    #[test]
    fn repeated_applications_reduce_once() {
        let mut env = env();
        let mut reducer = Reducer::new(&mut env);
        let e = mk_struct(name("pair"), vec![plus(nat(2), nat(1)), plus(nat(2), nat(1))]);
        let normal = reducer.normalize(&e).unwrap();
        insta::assert_snapshot!(normal, @"(pair (succ (succ (succ zero))) (succ (succ (succ zero))))");
        assert_eq!(reducer.steps(), 3);

        // the memo outlives a single call
        assert_eq!(reducer.normalize(&plus(nat(2), nat(1))).unwrap(), nat(3));
        assert_eq!(reducer.steps(), 3);

        // a failed reduction leaves nothing behind
        assert!(reducer.normalize(&mk_func(name("pred"), vec![zero()])).is_err());
        assert!(reducer.normalize(&mk_func(name("pred"), vec![zero()])).is_err());
        assert_eq!(reducer.steps(), 5);
    }

    #[test]
    fn divergence_hits_the_limit() {
        let mut env = env();
        let mut reducer = Reducer::new(&mut env).with_limit(Some(100));
        let err = reducer
            .normalize(&mk_func(name("spin"), vec![zero()]))
            .unwrap_err();
        assert!(matches!(
            Error::find(&err),
            Some(Error::ReductionLimit { limit: 100 })
        ));
        assert_eq!(reducer.steps(), 100);
    }

    #[test]
    fn long_reductions_do_not_overflow() {
        let mut env = env();
        let mut reducer = Reducer::new(&mut env);
        let n = 100_000;
        let e = reducer.normalize(&plus(nat(n), zero())).unwrap();
        assert_eq!(e.size(), n + 1);
        assert_eq!(reducer.steps(), n + 1);
    }
}
