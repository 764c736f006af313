//! Conversion of parsed trees into kernel entities.
//!
//! Identifiers are classified against the struct table and the name-to-kind
//! table of the system: a declared struct, then a function, then a variable.
//! Every failure is reported as a [SourceError] pointing into the file.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::kernel::{
    mk_func, mk_struct, mk_var, Arg, Axiom, Case, Entity, EntityKind, Expr, Function, Invocation,
    Name, Step, StructDecl, Theorem,
};
use crate::parse::{ErrorKind, Ident, List, SourceError, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Formal parameters. Unknown identifiers introduce variables.
    Pattern,
    /// Function case results. Function terms are allowed.
    Result,
    /// Axiom results and expected expressions of steps.
    Fact,
    /// Closed input to the reducer. Function terms are allowed, variables are
    /// not.
    Ground,
}

impl Mode {
    fn allows_function_terms(self) -> bool {
        matches!(self, Mode::Result | Mode::Ground)
    }

    fn describe(self) -> &'static str {
        match self {
            Mode::Pattern => "a pattern",
            Mode::Result => "a function result",
            Mode::Fact => "an axiom or theorem body",
            Mode::Ground => "a ground expression",
        }
    }
}

fn name_of(ident: &Ident) -> Result<Name, SourceError> {
    Name::try_from(ident.as_str()).map_err(|e| SourceError::syntax(e.to_string(), ident.source_info.clone()))
}

/// Reads `(structs (name arity) ...)`.
pub fn elab_structs(tree: &Tree) -> Result<Vec<StructDecl>, SourceError> {
    let list = tree.as_list()?;
    list.expect_head("structs")?;
    let mut decls: Vec<StructDecl> = vec![];
    let mut seen = HashSet::new();
    for elem in &list.elems[1..] {
        let elems = elem.as_list()?.expect_len(2)?;
        let ident = elems[0].as_ident()?;
        let name = name_of(ident)?;
        let arity = elems[1].as_ident()?.nat()?;
        if !seen.insert(name.clone()) {
            return Err(SourceError::new(
                ErrorKind::Name,
                format!("struct `{name}` is declared more than once"),
                ident.source_info.clone(),
            ));
        }
        decls.push(StructDecl { name, arity });
    }
    Ok(decls)
}

pub struct Elaborator<'a> {
    structs: &'a HashMap<Name, Arc<StructDecl>>,
    kinds: &'a HashMap<Name, EntityKind>,
}

impl<'a> Elaborator<'a> {
    pub fn new(
        structs: &'a HashMap<Name, Arc<StructDecl>>,
        kinds: &'a HashMap<Name, EntityKind>,
    ) -> Self {
        Self { structs, kinds }
    }

    /// Elaborates the contents of an entity file. The entity must be named
    /// `expected`, the stem of the file.
    pub fn elab_entity(
        &self,
        kind: EntityKind,
        tree: &Tree,
        expected: &Name,
    ) -> Result<Entity, SourceError> {
        let entity = match kind {
            EntityKind::Function => Entity::Function(Arc::new(self.elab_function(tree, expected)?)),
            EntityKind::Axiom => Entity::Axiom(Arc::new(self.elab_axiom(tree, expected)?)),
            EntityKind::Theorem => Entity::Theorem(Arc::new(self.elab_theorem(tree, expected)?)),
            EntityKind::Struct => {
                return Err(SourceError::new(
                    ErrorKind::Type,
                    "structs are declared in the struct table",
                    tree.source_info().clone(),
                ))
            }
        };
        Ok(entity)
    }

    /// `(func name (arity) (pattern ... result) ...)`
    pub fn elab_function(&self, tree: &Tree, expected: &Name) -> Result<Function, SourceError> {
        let list = tree.as_list()?;
        list.expect_head("func")?;
        let elems = list.expect_min_len(3)?;
        let name = self.entity_name(&elems[1], expected)?;
        let arity = {
            let elems = elems[2].as_list()?.expect_len(1)?;
            elems[0].as_ident()?.nat()?
        };

        let mut cases = vec![];
        for case in &elems[3..] {
            let case = case.as_list()?.expect_len(arity + 1)?;
            let mut patterns = vec![];
            for pattern in &case[..arity] {
                patterns.push(self.elab_expr(pattern, Mode::Pattern, &HashSet::new())?);
            }
            let scope = vars_of(&patterns);
            let result = self.elab_expr(&case[arity], Mode::Result, &scope)?;
            cases.push(Case { patterns, result });
        }
        Ok(Function { name, arity, cases })
    }

    /// `(axiom name (arg ...) result)`
    pub fn elab_axiom(&self, tree: &Tree, expected: &Name) -> Result<Axiom, SourceError> {
        let list = tree.as_list()?;
        list.expect_head("axiom")?;
        let elems = list.expect_len(4)?;
        let name = self.entity_name(&elems[1], expected)?;
        let args = self.elab_formals(&elems[2])?;
        let scope = vars_of(&args);
        let result = self.elab_expr(&elems[3], Mode::Fact, &scope)?;
        Ok(Axiom { name, args, result })
    }

    /// `(theorem name (arg ...) (step invocation expected) ...)`
    pub fn elab_theorem(&self, tree: &Tree, expected: &Name) -> Result<Theorem, SourceError> {
        let list = tree.as_list()?;
        list.expect_head("theorem")?;
        let elems = list.expect_min_len(4)?;
        let name = self.entity_name(&elems[1], expected)?;
        let args = self.elab_formals(&elems[2])?;
        let scope = vars_of(&args);

        let mut steps: Vec<Step> = vec![];
        // step name to its index, for duplicate checks and references
        let mut indices: HashMap<Name, usize> = HashMap::new();
        for step in &elems[3..] {
            let step_list = step.as_list()?;
            let parts = step_list.expect_len(3)?;
            let ident = parts[0].as_ident()?;
            if ident.is_nat() {
                return Err(SourceError::syntax(
                    format!("step name `{}` must not be a number", ident.as_str()),
                    ident.source_info.clone(),
                ));
            }
            let step_name = name_of(ident)?;
            if indices.contains_key(&step_name) {
                return Err(SourceError::new(
                    ErrorKind::Name,
                    format!("step `{step_name}` is defined more than once"),
                    ident.source_info.clone(),
                ));
            }
            let invocation = self.elab_invocation(&parts[1], args.len(), &indices)?;
            let expected = self.elab_expr(&parts[2], Mode::Fact, &scope)?;
            indices.insert(step_name.clone(), steps.len());
            steps.push(Step {
                name: step_name,
                invocation,
                expected,
                source_info: Some(step_list.source_info.clone()),
            });
        }
        Ok(Theorem { name, args, steps })
    }

    /// A closed expression given to the reducer.
    pub fn elab_ground(&self, tree: &Tree) -> Result<Expr, SourceError> {
        self.elab_expr(tree, Mode::Ground, &HashSet::new())
    }

    fn entity_name(&self, tree: &Tree, expected: &Name) -> Result<Name, SourceError> {
        let ident = tree.as_ident()?;
        let name = name_of(ident)?;
        if name != *expected {
            return Err(SourceError::new(
                ErrorKind::Name,
                format!("entity `{name}` must be declared in a file named `{name}.txt`, not `{expected}.txt`"),
                ident.source_info.clone(),
            ));
        }
        Ok(name)
    }

    fn elab_formals(&self, tree: &Tree) -> Result<Vec<Expr>, SourceError> {
        let list = tree.as_list()?;
        let mut args = vec![];
        for arg in &list.elems {
            args.push(self.elab_expr(arg, Mode::Pattern, &HashSet::new())?);
        }
        Ok(args)
    }

    fn elab_invocation(
        &self,
        tree: &Tree,
        arg_count: usize,
        earlier: &HashMap<Name, usize>,
    ) -> Result<Invocation, SourceError> {
        let list = match tree {
            Tree::Ident(ident) => return Ok(Invocation::Argument(argument_index(ident, arg_count)?)),
            Tree::List(list) => list,
        };
        let elems = list.expect_min_len(1)?;
        let ident = elems[0].as_ident()?;
        let target = name_of(ident)?;
        self.check_invocable(&target, ident)?;

        let mut args = vec![];
        for arg in &elems[1..] {
            let ident = arg.as_ident()?;
            if ident.is_nat() {
                args.push(Arg::Argument(argument_index(ident, arg_count)?));
                continue;
            }
            let name = name_of(ident)?;
            match earlier.get(&name) {
                Some(&index) => args.push(Arg::Step(index)),
                None => {
                    return Err(SourceError::new(
                        ErrorKind::Name,
                        format!("step `{name}` is not defined before this step"),
                        ident.source_info.clone(),
                    ))
                }
            }
        }
        Ok(Invocation::Entity { target, args })
    }

    fn check_invocable(&self, target: &Name, ident: &Ident) -> Result<(), SourceError> {
        let kind = if self.structs.contains_key(target) {
            EntityKind::Struct
        } else {
            match self.kinds.get(target) {
                Some(kind) => *kind,
                None => {
                    return Err(SourceError::new(
                        ErrorKind::Name,
                        format!("unknown axiom or theorem `{target}`"),
                        ident.source_info.clone(),
                    ))
                }
            }
        };
        match kind {
            EntityKind::Axiom | EntityKind::Theorem => Ok(()),
            EntityKind::Struct | EntityKind::Function => Err(SourceError::new(
                ErrorKind::Type,
                format!("{kind} `{target}` cannot be invoked as a proof step"),
                ident.source_info.clone(),
            )),
        }
    }

    fn elab_expr(&self, tree: &Tree, mode: Mode, scope: &HashSet<Name>) -> Result<Expr, SourceError> {
        enum Task<'t> {
            Visit(&'t Tree),
            Build { head: Name, func: bool, len: usize },
        }

        let mut tasks = vec![Task::Visit(tree)];
        let mut values: Vec<Expr> = vec![];
        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(Tree::Ident(ident)) => values.push(self.elab_atom(ident, mode, scope)?),
                Task::Visit(Tree::List(list)) => {
                    let (head, func) = self.elab_head(list, mode)?;
                    let args = &list.elems[1..];
                    tasks.push(Task::Build {
                        head,
                        func,
                        len: args.len(),
                    });
                    tasks.extend(args.iter().rev().map(Task::Visit));
                }
                Task::Build { head, func, len } => {
                    let args = values.split_off(values.len() - len);
                    values.push(if func {
                        mk_func(head, args)
                    } else {
                        mk_struct(head, args)
                    });
                }
            }
        }
        debug_assert_eq!(values.len(), 1);
        values
            .pop()
            .ok_or_else(|| SourceError::syntax("expected an expression", tree.source_info().clone()))
    }

    fn elab_atom(&self, ident: &Ident, mode: Mode, scope: &HashSet<Name>) -> Result<Expr, SourceError> {
        let name = name_of(ident)?;
        if let Some(decl) = self.structs.get(&name) {
            check_arity(decl.arity, 0, EntityKind::Struct, &name, ident)?;
            return Ok(mk_struct(name, vec![]));
        }
        if let Some(kind) = self.kinds.get(&name) {
            if *kind == EntityKind::Function {
                if !mode.allows_function_terms() {
                    return Err(function_term_error(&name, mode, ident));
                }
                return Ok(mk_func(name, vec![]));
            }
        }
        match mode {
            Mode::Pattern => Ok(mk_var(name)),
            Mode::Result | Mode::Fact if scope.contains(&name) => Ok(mk_var(name)),
            Mode::Result | Mode::Fact => Err(SourceError::new(
                ErrorKind::Name,
                format!("undeclared variable `{name}`"),
                ident.source_info.clone(),
            )),
            Mode::Ground => Err(SourceError::new(
                ErrorKind::Name,
                format!("unknown struct or function `{name}` in a ground expression"),
                ident.source_info.clone(),
            )),
        }
    }

    /// Classifies the head of `list`: `false` for a struct, `true` for a
    /// function term.
    fn elab_head(&self, list: &List, mode: Mode) -> Result<(Name, bool), SourceError> {
        let elems = list.expect_min_len(1)?;
        let ident = elems[0].as_ident()?;
        let head = name_of(ident)?;
        let len = elems.len() - 1;
        if let Some(decl) = self.structs.get(&head) {
            check_arity(decl.arity, len, EntityKind::Struct, &head, ident)?;
            return Ok((head, false));
        }
        match self.kinds.get(&head) {
            Some(EntityKind::Function) if mode.allows_function_terms() => Ok((head, true)),
            Some(EntityKind::Function) => Err(function_term_error(&head, mode, ident)),
            Some(kind) => Err(SourceError::new(
                ErrorKind::Type,
                format!("{kind} `{head}` cannot be applied in {}", mode.describe()),
                ident.source_info.clone(),
            )),
            None => Err(SourceError::new(
                ErrorKind::Name,
                format!("unknown struct `{head}`"),
                ident.source_info.clone(),
            )),
        }
    }
}

fn function_term_error(name: &Name, mode: Mode, ident: &Ident) -> SourceError {
    SourceError::new(
        ErrorKind::Type,
        format!("function `{name}` cannot be used in {}", mode.describe()),
        ident.source_info.clone(),
    )
}

fn check_arity(
    expected: usize,
    found: usize,
    kind: EntityKind,
    name: &Name,
    ident: &Ident,
) -> Result<(), SourceError> {
    if expected != found {
        return Err(SourceError::new(
            ErrorKind::Arity,
            format!("{kind} `{name}` expects {expected} argument(s), but {found} given"),
            ident.source_info.clone(),
        ));
    }
    Ok(())
}

/// Parses a 1-based argument index into a 0-based one.
fn argument_index(ident: &Ident, arg_count: usize) -> Result<usize, SourceError> {
    if !ident.is_nat() {
        return Err(SourceError::syntax(
            format!("expected an argument index or a step name, but found `{}`", ident.as_str()),
            ident.source_info.clone(),
        ));
    }
    let index = ident.nat()?;
    if index == 0 || index > arg_count {
        return Err(SourceError::new(
            ErrorKind::Name,
            format!("argument index {index} is out of range (the theorem has {arg_count} argument(s))"),
            ident.source_info.clone(),
        ));
    }
    Ok(index - 1)
}

fn vars_of(exprs: &[Expr]) -> HashSet<Name> {
    exprs.iter().flat_map(Expr::vars).collect()
}
