//! A system: one directory of structs, functions, axioms and theorems, plus
//! the set of theorems already verified.
//!
//! ```text
//! <root>/systems/<name>/structs.txt
//! <root>/systems/<name>/funcs/<entity>.txt
//! <root>/systems/<name>/axioms/<entity>.txt
//! <root>/systems/<name>/theorems/<entity>.txt
//! <root>/systems/<name>/verified.txt
//! ```
//!
//! Entities are read on first use and kept for the lifetime of the
//! [System].

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, ensure, Context};
use once_cell::unsync::OnceCell;

use crate::config::Config;
use crate::elab::{elab_structs, Elaborator};
use crate::kernel::{
    self, Entity, EntityKind, Expr, Ledger, Name, Reducer, Resolver, StructDecl, Verifier,
    VerifyReport,
};
use crate::lex::{File, SourceInfo};
use crate::parse::{parse, parse_single, SourceError};

const STRUCTS_FILE: &str = "structs.txt";
const VERIFIED_FILE: &str = "verified.txt";
const ENTITY_DIRS: [(EntityKind, &str); 3] = [
    (EntityKind::Function, "funcs"),
    (EntityKind::Axiom, "axioms"),
    (EntityKind::Theorem, "theorems"),
];

fn entity_dir(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Function => "funcs",
        EntityKind::Axiom => "axioms",
        EntityKind::Theorem => "theorems",
        EntityKind::Struct => ".",
    }
}

/// Names of the systems under `config.root`, sorted.
pub fn list_systems(config: &Config) -> anyhow::Result<Vec<String>> {
    let dir = config.systems_dir();
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let mut names = vec![];
    for entry in fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Lazily loads entities from the system directory.
pub struct Loader {
    dir: PathBuf,
    structs: OnceCell<HashMap<Name, Arc<StructDecl>>>,
    kinds: OnceCell<HashMap<Name, EntityKind>>,
    entities: HashMap<Name, Entity>,
}

impl Loader {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            structs: OnceCell::new(),
            kinds: OnceCell::new(),
            entities: HashMap::new(),
        }
    }

    fn read(&self, relative: &str) -> anyhow::Result<Arc<File>> {
        let path = self.dir.join(relative);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Arc::new(File::new(relative, contents)))
    }

    pub fn structs(&self) -> anyhow::Result<&HashMap<Name, Arc<StructDecl>>> {
        self.structs.get_or_try_init(|| -> anyhow::Result<_> {
            log::trace!("loading the struct table of {}", self.dir.display());
            let file = self.read(STRUCTS_FILE)?;
            let decls = elab_structs(&parse_single(file)?)?;
            Ok(decls
                .into_iter()
                .map(|decl| (decl.name.clone(), Arc::new(decl)))
                .collect())
        })
    }

    /// Every function, axiom and theorem name with its kind. A name may be
    /// declared once across all kinds, structs included.
    pub fn kinds(&self) -> anyhow::Result<&HashMap<Name, EntityKind>> {
        self.kinds.get_or_try_init(|| -> anyhow::Result<_> {
            let structs = self.structs()?;
            let mut kinds: HashMap<Name, EntityKind> = HashMap::new();
            for (kind, dir) in ENTITY_DIRS {
                let path = self.dir.join(dir);
                log::trace!("scanning {}", path.display());
                let entries = fs::read_dir(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                for entry in entries {
                    let path = entry?.path();
                    if path.extension().and_then(|ext| ext.to_str()) != Some("txt") {
                        continue;
                    }
                    let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                        continue;
                    };
                    let name = Name::try_from(stem)
                        .with_context(|| format!("bad entity file name {}", path.display()))?;
                    let mut previous = vec![];
                    if structs.contains_key(&name) {
                        previous.push(EntityKind::Struct);
                    }
                    if let Some(other) = kinds.get(&name) {
                        previous.push(*other);
                    }
                    if !previous.is_empty() {
                        previous.push(kind);
                        bail!(kernel::Error::DuplicateDeclaration {
                            name,
                            kinds: previous,
                        });
                    }
                    kinds.insert(name, kind);
                }
            }
            Ok(kinds)
        })
    }

    fn load(&self, name: &Name, kind: EntityKind) -> anyhow::Result<Entity> {
        log::trace!("loading {kind} `{name}`");
        let relative = format!("{}/{}.txt", entity_dir(kind), name);
        let file = self.read(&relative)?;
        let tree = parse_single(file)?;
        let elaborator = Elaborator::new(self.structs()?, self.kinds()?);
        let entity = elaborator.elab_entity(kind, &tree, name)?;
        Ok(entity)
    }

    fn clear(&mut self) {
        self.structs = OnceCell::new();
        self.kinds = OnceCell::new();
        self.entities.clear();
    }
}

impl Resolver for Loader {
    fn resolve(&mut self, name: &Name) -> anyhow::Result<Entity> {
        if let Some(entity) = self.entities.get(name) {
            return Ok(entity.clone());
        }
        // the kind table also rejects names declared twice
        let kinds = self.kinds()?;
        if let Some(decl) = self.structs()?.get(name) {
            return Ok(Entity::Struct(Arc::clone(decl)));
        }
        let Some(&kind) = kinds.get(name) else {
            bail!(kernel::Error::UnknownEntity(name.clone()));
        };
        let entity = self
            .load(name, kind)
            .with_context(|| format!("failed to load {kind} `{name}`"))?;
        self.entities.insert(name.clone(), entity.clone());
        Ok(entity)
    }
}

/// The persisted set of verified theorems: one name per line.
#[derive(Debug)]
pub struct VerifiedSet {
    path: PathBuf,
    names: HashSet<Name>,
}

impl VerifiedSet {
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut names = HashSet::new();
        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            for (index, line) in contents.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let name = Name::try_from(line)
                    .with_context(|| format!("{}:{}: bad theorem name", path.display(), index + 1))?;
                names.insert(name);
            }
        }
        log::trace!("{} verified theorem(s) in {}", names.len(), path.display());
        Ok(Self { path, names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        fs::write(&self.path, "")
            .with_context(|| format!("failed to truncate {}", self.path.display()))?;
        self.names.clear();
        Ok(())
    }
}

impl Ledger for VerifiedSet {
    fn is_verified(&self, name: &Name) -> bool {
        self.names.contains(name)
    }

    fn mark_verified(&mut self, name: &Name) -> anyhow::Result<()> {
        if self.names.contains(name) {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(file, "{name}")
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        // only names that reached the file count as verified
        self.names.insert(name.clone());
        Ok(())
    }
}

/// Outcome of verifying every theorem of a system.
#[derive(Debug, Default)]
pub struct VerifyAllReport {
    pub report: VerifyReport,
    /// Theorems already verified when the sweep reached them.
    pub skipped: Vec<Name>,
    pub failures: Vec<(Name, anyhow::Error)>,
}

impl VerifyAllReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct System {
    name: String,
    dir: PathBuf,
    reduction_limit: Option<usize>,
    loader: Loader,
    verified: Option<VerifiedSet>,
}

impl System {
    /// Opens the system `name` under `config.root`, creating any missing
    /// part of its layout.
    pub fn open(config: &Config, name: &str) -> anyhow::Result<Self> {
        ensure!(Name::is_valid(name), "invalid system name `{name}`");
        let dir = config.system_dir(name);
        for (_, sub) in ENTITY_DIRS {
            let path = dir.join(sub);
            fs::create_dir_all(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
        }
        let structs = dir.join(STRUCTS_FILE);
        if !structs.exists() {
            fs::write(&structs, "(structs)\n")
                .with_context(|| format!("failed to create {}", structs.display()))?;
        }
        log::debug!("opened system `{name}` at {}", dir.display());
        Ok(Self {
            name: name.to_owned(),
            loader: Loader::new(dir.clone()),
            dir,
            reduction_limit: config.reduction_limit,
            verified: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn resolve(&mut self, name: &Name) -> anyhow::Result<Entity> {
        self.loader.resolve(name)
    }

    /// Names of every theorem, sorted.
    pub fn theorems(&self) -> anyhow::Result<Vec<Name>> {
        let mut names: Vec<Name> = self
            .loader
            .kinds()?
            .iter()
            .filter(|(_, kind)| **kind == EntityKind::Theorem)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn verified(&mut self) -> anyhow::Result<&mut VerifiedSet> {
        load_verified(&mut self.verified, &self.dir)
    }

    pub fn is_verified(&mut self, theorem: &Name) -> anyhow::Result<bool> {
        Ok(self.verified()?.is_verified(theorem))
    }

    /// Verifies `theorem` and its unverified prerequisites.
    pub fn verify(&mut self, theorem: &str) -> anyhow::Result<VerifyReport> {
        let name = Name::try_from(theorem)?;
        let ledger = load_verified(&mut self.verified, &self.dir)?;
        Verifier::new(&mut self.loader, ledger)
            .verify(&name)
            .with_context(|| format!("theorem `{name}` of system `{}` failed to verify", self.name))
    }

    /// Verifies every theorem not yet verified, in name order. A failure is
    /// recorded and the sweep goes on.
    pub fn verify_all(&mut self) -> anyhow::Result<VerifyAllReport> {
        let mut all = VerifyAllReport::default();
        for name in self.theorems()? {
            if self.is_verified(&name)? {
                all.skipped.push(name);
                continue;
            }
            match self.verify(name.as_str()) {
                Ok(report) => all.report.merge(report),
                Err(e) => {
                    log::debug!("theorem `{name}` failed to verify");
                    all.failures.push((name, e));
                }
            }
        }
        log::info!(
            "system `{}`: {} verified, {} already verified, {} failed",
            self.name,
            all.report.verified.len(),
            all.skipped.len(),
            all.failures.len()
        );
        Ok(all)
    }

    /// Reads a ground expression and reduces it to normal form.
    pub fn reduce(&mut self, src: &str) -> anyhow::Result<Expr> {
        let file = Arc::new(File::new("<input>", src));
        let mut trees = parse(Arc::clone(&file))?;
        if trees.len() != 1 {
            let info = match trees.get(1) {
                Some(extra) => extra.source_info().clone(),
                None => SourceInfo::eof(file),
            };
            bail!(SourceError::syntax("expected exactly one expression", info));
        }
        let tree = trees.remove(0);
        let expr = Elaborator::new(self.loader.structs()?, self.loader.kinds()?).elab_ground(&tree)?;
        let mut reducer = Reducer::new(&mut self.loader).with_limit(self.reduction_limit);
        let normal = reducer.normalize(&expr)?;
        log::debug!("`{expr}` reduced to `{normal}` in {} step(s)", reducer.steps());
        Ok(normal)
    }

    /// Forgets every verified theorem, on disk too.
    pub fn clear_verified(&mut self) -> anyhow::Result<()> {
        self.verified()?.clear()?;
        log::info!("cleared verified theorems of system `{}`", self.name);
        Ok(())
    }

    /// Drops loaded entities so that edited files are read again.
    pub fn clear_cache(&mut self) {
        self.loader.clear();
        self.verified = None;
    }
}

fn load_verified<'a>(
    slot: &'a mut Option<VerifiedSet>,
    dir: &Path,
) -> anyhow::Result<&'a mut VerifiedSet> {
    let set = match slot.take() {
        Some(set) => set,
        None => VerifiedSet::load(dir.join(VERIFIED_FILE))?,
    };
    Ok(slot.insert(set))
}
