use super::expr::Expr;
use super::matcher::Binding;

/// Instantiates the variables of `pattern` with their bindings.
///
/// # Panics
///
/// Panics if a variable of `pattern` is unbound. Callers substitute only into
/// bodies whose variables all occur in the patterns that produced `binding`.
pub fn substitute(binding: &Binding, pattern: &Expr) -> Expr {
    enum Task<'a> {
        Visit(&'a Expr),
        Build(&'a Expr),
    }

    let mut tasks = vec![Task::Visit(pattern)];
    let mut values: Vec<Expr> = vec![];
    while let Some(task) = tasks.pop() {
        match task {
            Task::Visit(e) => match e {
                Expr::Var(name) => match binding.get(name) {
                    Some(value) => values.push(value.clone()),
                    None => panic!("unbound variable `{name}` in substitution"),
                },
                Expr::Struct(inner) | Expr::Func(inner) => {
                    if inner.args.is_empty() {
                        values.push(e.clone());
                        continue;
                    }
                    tasks.push(Task::Build(e));
                    tasks.extend(inner.args.iter().rev().map(Task::Visit));
                }
            },
            Task::Build(e) => {
                let args = values.split_off(values.len() - e.args().len());
                values.push(e.with_args(args));
            }
        }
    }
    debug_assert_eq!(values.len(), 1);
    values.pop().unwrap_or_else(|| pattern.clone())
}
