//! Per-run registries.
//!
//! A [`BuildContext`] is created for each run and threaded by `&mut`
//! through registration, import resolution, graph building and manifest
//! writing. First declarations win; later ones land in [`Duplicates`].

use crate::config::ProjectConfig;
use crate::dohpath::DohPath;
use crate::extract::pod;
use crate::extract::{
    ExtractedValue, FileExtraction, Location, ModuleDecl, PackageDecl, PatternDecl, RouteDecl,
    SubrecordKind,
};
use crate::imports::{ImportClassification, ImportMaps};
use crate::problems::{codes, Deprecation, Problem};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a declaration was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Site {
    pub file: String,
    pub line: usize,
}

impl From<&Location> for Site {
    fn from(loc: &Location) -> Self {
        Self {
            file: loc.file.clone(),
            line: loc.start_line,
        }
    }
}

/// Every site of a name declared more than once; the first entry is the
/// declaration that was kept.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Duplicates {
    pub modules: BTreeMap<String, Vec<Site>>,
    pub packages: BTreeMap<String, Vec<Site>>,
    pub patterns: BTreeMap<String, Vec<Site>>,
}

impl Duplicates {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.packages.is_empty() && self.patterns.is_empty()
    }
}

/// Registry a repeated declaration is recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DuplicateKind {
    Module,
    Package,
    Pattern,
}

impl DuplicateKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Package => "package",
            Self::Pattern => "pattern",
        }
    }
}

/// An installer, CLI or pod body attached to a package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attached {
    pub body: ExtractedValue,
    pub file: String,
    pub line: usize,
}

/// One row of the merged package table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageEntry {
    pub name: String,
    pub load: Vec<String>,
    /// File of the package declaration, or of the module for implied packages.
    pub file: String,
    pub line: usize,
    /// Root-slash directory owning the package.
    pub dir: String,
    /// File of the module of the same name, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_file: Option<String>,
    /// Declared with `Doh.Package` rather than implied by a module.
    pub explicit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imports: Option<ImportClassification>,
}

/// Registries for one run.
#[derive(Debug)]
pub struct BuildContext {
    pub root: PathBuf,
    pub dohpath: DohPath,
    pub config: ProjectConfig,

    pub modules: BTreeMap<String, ModuleDecl>,
    pub packages: BTreeMap<String, PackageDecl>,
    pub patterns: BTreeMap<String, PatternDecl>,
    /// Pattern name to owning module.
    pub pattern_modules: BTreeMap<String, String>,
    /// Module name to the patterns it owns, in registration order.
    pub module_patterns: BTreeMap<String, Vec<String>>,

    pub installers: BTreeMap<String, Attached>,
    pub clis: BTreeMap<String, Attached>,
    pub pods: BTreeMap<String, Attached>,
    pub routes: Vec<RouteDecl>,
    /// Owning module (or file, when there is none) to root-slash asset paths.
    pub assets: BTreeMap<String, BTreeSet<String>>,

    /// File to the import specifiers found in it.
    pub file_imports: BTreeMap<String, Vec<String>>,
    /// Module name to its classified imports; filled by import resolution.
    pub module_imports: BTreeMap<String, ImportClassification>,
    pub import_maps: ImportMaps,

    pub duplicates: Duplicates,
    pub problems: Vec<Problem>,
    pub deprecations: Vec<Deprecation>,
}

impl BuildContext {
    #[must_use]
    pub fn new(root: &Path, config: ProjectConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            dohpath: DohPath::new(root),
            config,
            modules: BTreeMap::new(),
            packages: BTreeMap::new(),
            patterns: BTreeMap::new(),
            pattern_modules: BTreeMap::new(),
            module_patterns: BTreeMap::new(),
            installers: BTreeMap::new(),
            clis: BTreeMap::new(),
            pods: BTreeMap::new(),
            routes: Vec::new(),
            assets: BTreeMap::new(),
            file_imports: BTreeMap::new(),
            module_imports: BTreeMap::new(),
            import_maps: ImportMaps::default(),
            duplicates: Duplicates::default(),
            problems: Vec::new(),
            deprecations: Vec::new(),
        }
    }

    /// Module name given to framework patterns outside any module.
    #[must_use]
    pub fn implicit_module(&self) -> &str {
        self.config.core_dir.trim_matches('/')
    }

    /// Whether a root-slash file lives under the framework directory.
    #[must_use]
    pub fn is_core_file(&self, file: &str) -> bool {
        let core = self.implicit_module();
        !core.is_empty()
            && file
                .strip_prefix('/')
                .and_then(|f| f.strip_prefix(core))
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Merge one file's extraction into the registries.
    pub fn register(&mut self, extraction: &FileExtraction) {
        let file = extraction.file.as_str();

        for module in &extraction.modules {
            if let Some(first) = self.modules.get(&module.name) {
                let first = Site::from(&first.location);
                self.duplicate(DuplicateKind::Module, &module.name, first, &module.location);
            } else {
                self.modules.insert(module.name.clone(), module.clone());
            }
        }

        for package in &extraction.packages {
            if let Some(first) = self.packages.get(&package.name) {
                let first = Site::from(&first.location);
                self.duplicate(DuplicateKind::Package, &package.name, first, &package.location);
                continue;
            }
            self.packages.insert(package.name.clone(), package.clone());

            let inline = [
                (SubrecordKind::Install, &package.install),
                (SubrecordKind::Cli, &package.cli),
                (SubrecordKind::Pod, &package.pod),
            ];
            for (kind, body) in inline {
                if let Some(body) = body {
                    self.attach(kind, &package.name, body, &package.location);
                }
            }
        }

        for pattern in &extraction.patterns {
            if let Some(first) = self.patterns.get(&pattern.name) {
                let first = Site::from(&first.location);
                self.duplicate(DuplicateKind::Pattern, &pattern.name, first, &pattern.location);
                continue;
            }

            let mut pattern = pattern.clone();
            if pattern.module.is_none() {
                if self.is_core_file(file) {
                    pattern.module = Some(self.implicit_module().to_string());
                } else {
                    self.problems.push(
                        Problem::new(
                            codes::ORPHANED_PATTERN,
                            format!("pattern '{}' is not inside any module", pattern.name),
                        )
                        .in_file(file)
                        .at_line(pattern.location.start_line),
                    );
                }
            }

            if let Some(module) = &pattern.module {
                self.pattern_modules
                    .insert(pattern.name.clone(), module.clone());
                self.module_patterns
                    .entry(module.clone())
                    .or_default()
                    .push(pattern.name.clone());
            }
            self.patterns.insert(pattern.name.clone(), pattern);
        }

        for sub in &extraction.subrecords {
            self.attach(sub.kind, &sub.package, &sub.body, &sub.location);
        }

        self.routes.extend(extraction.routes.iter().cloned());

        for asset in &extraction.assets {
            match self.dohpath.dohslash(&asset.path, Some(file)) {
                Ok(path) => {
                    let owner = asset.module.clone().unwrap_or_else(|| file.to_string());
                    self.assets.entry(owner).or_default().insert(path);
                }
                Err(e) => self.problems.push(
                    Problem::new(
                        codes::INVALID_DECLARATION,
                        format!("asset '{}': {e}", asset.path),
                    )
                    .in_file(file)
                    .at_line(asset.location.start_line),
                ),
            }
        }

        if !extraction.imports.is_empty() {
            self.file_imports
                .insert(file.to_string(), extraction.imports.clone());
        }

        self.problems.extend(extraction.problems.iter().cloned());
        self.deprecations
            .extend(extraction.deprecations.iter().cloned());
    }

    /// Checks that need every file registered first.
    ///
    /// Sub-records for packages nobody declared are kept but reported.
    pub fn finish(&mut self) {
        let table = self.package_table();
        let attached = [
            (SubrecordKind::Install, &self.installers),
            (SubrecordKind::Cli, &self.clis),
            (SubrecordKind::Pod, &self.pods),
        ];

        let mut orphans = Vec::new();
        for (kind, records) in attached {
            for (package, record) in records {
                if !table.contains_key(package) {
                    orphans.push(
                        Problem::new(
                            codes::ORPHANED_SUBRECORD,
                            format!("{} for undeclared package '{package}'", kind.callee()),
                        )
                        .in_file(record.file.clone())
                        .at_line(record.line),
                    );
                }
            }
        }
        self.problems.extend(orphans);
    }

    /// Explicit packages plus the package implied by each module.
    #[must_use]
    pub fn package_table(&self) -> BTreeMap<String, PackageEntry> {
        let mut table = BTreeMap::new();

        for (name, package) in &self.packages {
            table.insert(
                name.clone(),
                PackageEntry {
                    name: name.clone(),
                    load: package.load.clone(),
                    file: package.location.file.clone(),
                    line: package.location.start_line,
                    dir: parent_dir(&package.location.file),
                    module_file: self.modules.get(name).map(|m| m.location.file.clone()),
                    explicit: true,
                    imports: self.module_imports.get(name).cloned(),
                },
            );
        }

        for (name, module) in &self.modules {
            table.entry(name.clone()).or_insert_with(|| PackageEntry {
                name: name.clone(),
                load: module.load.clone(),
                file: module.location.file.clone(),
                line: module.location.start_line,
                dir: parent_dir(&module.location.file),
                module_file: Some(module.location.file.clone()),
                explicit: false,
                imports: self.module_imports.get(name).cloned(),
            });
        }

        table
    }

    fn duplicate(&mut self, kind: DuplicateKind, name: &str, first: Site, again: &Location) {
        let registry = match kind {
            DuplicateKind::Module => &mut self.duplicates.modules,
            DuplicateKind::Package => &mut self.duplicates.packages,
            DuplicateKind::Pattern => &mut self.duplicates.patterns,
        };
        let what = kind.as_str();
        registry
            .entry(name.to_string())
            .or_insert_with(|| vec![first.clone()])
            .push(Site::from(again));

        debug!(name, file = %again.file, "duplicate {what}");
        self.problems.push(
            Problem::new(
                codes::DUPLICATE_DECLARATION,
                format!(
                    "{what} '{name}' already declared at {}:{}",
                    first.file, first.line
                ),
            )
            .in_file(again.file.clone())
            .at_line(again.start_line),
        );
    }

    /// Attach a sub-record body; object bodies for the same package merge,
    /// with keys already present kept.
    fn attach(&mut self, kind: SubrecordKind, package: &str, body: &ExtractedValue, loc: &Location) {
        let body = if kind == SubrecordKind::Pod {
            pod::evaluate(body, &self.dohpath, &loc.file, &mut self.problems)
        } else {
            body.clone()
        };

        let records = match kind {
            SubrecordKind::Install => &mut self.installers,
            SubrecordKind::Cli => &mut self.clis,
            SubrecordKind::Pod => &mut self.pods,
        };

        match records.get_mut(package) {
            Some(existing) => merge_bodies(&mut existing.body, body),
            None => {
                records.insert(
                    package.to_string(),
                    Attached {
                        body,
                        file: loc.file.clone(),
                        line: loc.start_line,
                    },
                );
            }
        }
    }
}

fn merge_bodies(into: &mut ExtractedValue, from: ExtractedValue) {
    if let (ExtractedValue::Object(existing), ExtractedValue::Object(incoming)) = (into, from) {
        for (key, value) in incoming {
            if !existing.iter().any(|(k, _)| *k == key) {
                existing.push((key, value));
            }
        }
    }
}

/// Root-slash parent directory of a root-slash file; `/` for top-level files.
#[must_use]
pub fn parent_dir(file: &str) -> String {
    match file.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => file[..idx].to_string(),
    }
}
