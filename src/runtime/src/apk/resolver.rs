//! Dependency resolution against loaded repository indexes.
//!
//! The world is a single requested package. Resolution is greedy and
//! breadth-first: each name is bound to one provider the first time it is
//! required (highest satisfying version, first repository on ties), and
//! every later requirement on that name is checked against the binding.
//! Requirements the binding cannot meet, and `!name` conflicts with a
//! bound package, are collected instead of aborting.

use std::collections::VecDeque;
use std::sync::Arc;

use apk2oci_core::error::{ChartError, Result};
use apk2oci_core::Arch;

use super::index::IndexEntry;
use super::keyring::Keyring;
use super::repository::{PackageSource, RepositoryIndex};
use super::version::{Constraint, Dependency, Version};

/// What to resolve.
#[derive(Debug, Clone)]
pub struct PackageQuery {
    pub name: String,
    pub constraint: Constraint,
    pub arch: Arch,
}

impl PackageQuery {
    /// `version` is an exact version or an operator-prefixed constraint;
    /// `None` or an empty string asks for the highest available.
    pub fn new(name: impl Into<String>, version: Option<&str>, arch: Arch) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ChartError::Resolution("package name is empty".to_string()));
        }
        let constraint = match version {
            Some(v) => Constraint::parse_request(v)?,
            None => Constraint::any(),
        };
        Ok(Self {
            name,
            constraint,
            arch,
        })
    }

    fn as_dependency(&self) -> Dependency {
        Dependency {
            name: self.name.clone(),
            constraint: self.constraint.clone(),
            conflict: false,
        }
    }
}

/// One package of a resolved world.
#[derive(Clone)]
pub struct ResolvedPackage {
    pub entry: IndexEntry,
    pub arch: Arch,
    pub source: Arc<dyn PackageSource>,
}

impl ResolvedPackage {
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn version(&self) -> &Version {
        &self.entry.version
    }

    pub fn filename(&self) -> String {
        self.entry.filename()
    }
}

impl std::fmt::Debug for ResolvedPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPackage")
            .field("name", &self.entry.name)
            .field("version", &self.entry.version.as_str())
            .field("arch", &self.arch)
            .field("repository", &self.source.location())
            .finish()
    }
}

/// The requested package, its dependency closure, and any conflicts.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPackageSet {
    /// Resolution order; the queried package comes first
    pub packages: Vec<ResolvedPackage>,
    pub conflicts: Vec<String>,
}

impl ResolvedPackageSet {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Fail with the collected conflicts, if any.
    pub fn ensure_no_conflicts(&self) -> Result<()> {
        if self.has_conflicts() {
            return Err(ChartError::Conflicts(self.conflicts.clone()));
        }
        Ok(())
    }

    /// The first package named `name`, in resolution order.
    pub fn select(&self, name: &str) -> Result<&ResolvedPackage> {
        self.packages
            .iter()
            .find(|p| p.entry.name == name)
            .ok_or_else(|| {
                ChartError::Resolution(format!("package {} is not in the resolved set", name))
            })
    }
}

/// Resolves queries against a fixed set of repository indexes.
#[derive(Debug, Clone)]
pub struct Resolver {
    arch: Arch,
    repositories: Vec<RepositoryIndex>,
}

impl Resolver {
    pub fn new(arch: Arch, repositories: Vec<RepositoryIndex>) -> Self {
        Self { arch, repositories }
    }

    /// Load and verify every repository index, in order.
    pub async fn load(
        sources: Vec<Arc<dyn PackageSource>>,
        arch: Arch,
        keyring: &Keyring,
        allow_untrusted: bool,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(ChartError::ConfigError(
                "no package repositories configured".to_string(),
            ));
        }
        let mut repositories = Vec::with_capacity(sources.len());
        for source in sources {
            repositories.push(RepositoryIndex::load(source, arch, keyring, allow_untrusted).await?);
        }
        Ok(Self::new(arch, repositories))
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Resolve the query and its runtime dependency closure.
    pub fn resolve(&self, query: &PackageQuery) -> Result<ResolvedPackageSet> {
        if query.arch != self.arch {
            return Err(ChartError::Resolution(format!(
                "query for {} does not match loaded indexes for {}",
                query.arch, self.arch
            )));
        }

        let candidates: Vec<(usize, &IndexEntry)> = self
            .repositories
            .iter()
            .enumerate()
            .flat_map(|(repo, index)| index.entries.iter().map(move |entry| (repo, entry)))
            .collect();
        let entries: Vec<&IndexEntry> = candidates.iter().map(|(_, e)| *e).collect();

        let world = resolve_world(&entries, &query.as_dependency(), self.arch)?;

        let packages = world
            .selected
            .into_iter()
            .map(|idx| {
                let (repo, entry) = candidates[idx];
                ResolvedPackage {
                    entry: entry.clone(),
                    arch: self.arch,
                    source: self.repositories[repo].source.clone(),
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(
            package = %query.name,
            constraint = %query.constraint,
            arch = %self.arch,
            resolved = packages.len(),
            conflicts = world.conflicts.len(),
            "Resolved package world"
        );

        Ok(ResolvedPackageSet {
            packages,
            conflicts: world.conflicts,
        })
    }
}

/// Indices into the candidate list plus conflict descriptions.
#[derive(Debug, Default)]
pub struct World {
    pub selected: Vec<usize>,
    pub conflicts: Vec<String>,
}

/// Resolve `root` against `candidates` (in repository order).
pub fn resolve_world(candidates: &[&IndexEntry], root: &Dependency, arch: Arch) -> Result<World> {
    let mut world = World::default();
    let mut forbidden: Vec<(Dependency, String)> = Vec::new();
    let mut queue: VecDeque<(Dependency, String)> = VecDeque::new();
    queue.push_back((root.clone(), "world".to_string()));

    while let Some((dep, required_by)) = queue.pop_front() {
        if dep.conflict {
            forbidden.push((dep, required_by));
            continue;
        }

        let bound = world
            .selected
            .iter()
            .map(|&idx| candidates[idx])
            .find_map(|entry| entry.provided_version(&dep.name).map(|v| (entry, v)));
        if let Some((entry, version)) = bound {
            if !dep.constraint.matches(version) {
                world.conflicts.push(format!(
                    "{} requires {} but {}-{} is selected",
                    required_by, dep, entry.name, entry.version
                ));
            }
            continue;
        }

        let idx = pick_candidate(candidates, &dep, arch)?;
        let entry = candidates[idx];
        tracing::debug!(
            name = %entry.name,
            version = %entry.version,
            required_by = %required_by,
            "Selected package"
        );
        world.selected.push(idx);
        for child in &entry.depends {
            queue.push_back((child.clone(), entry.name.clone()));
        }
    }

    for (dep, required_by) in forbidden {
        for entry in world.selected.iter().map(|&idx| candidates[idx]) {
            if let Some(version) = entry.provided_version(&dep.name) {
                if dep.constraint.matches(version) {
                    world.conflicts.push(format!(
                        "{} conflicts with {}-{}",
                        required_by, entry.name, entry.version
                    ));
                }
            }
        }
    }

    Ok(world)
}

fn pick_candidate(candidates: &[&IndexEntry], dep: &Dependency, arch: Arch) -> Result<usize> {
    let named: Vec<usize> = (0..candidates.len())
        .filter(|&i| candidates[i].name == dep.name)
        .collect();
    let pool = if named.is_empty() {
        (0..candidates.len())
            .filter(|&i| candidates[i].provided_version(&dep.name).is_some())
            .collect()
    } else {
        named
    };

    if pool.is_empty() {
        return Err(ChartError::NothingProvides {
            name: dep.name.clone(),
            arch: arch.to_string(),
        });
    }

    let mut best: Option<(usize, &Version)> = None;
    for &i in &pool {
        let Some(version) = candidates[i].provided_version(&dep.name) else {
            continue;
        };
        if !dep.constraint.matches(version) {
            continue;
        }
        // Strictly greater: ties keep the earlier repository
        if best.map_or(true, |(_, v)| version > v) {
            best = Some((i, version));
        }
    }

    match best {
        Some((i, _)) => Ok(i),
        None => {
            let available = pool
                .iter()
                .filter_map(|&i| candidates[i].provided_version(&dep.name))
                .map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            Err(ChartError::Unsatisfiable {
                name: dep.name.clone(),
                constraint: dep.constraint.to_string(),
                available,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apk::index::parse_index;
    use crate::apk::repository::open_source;
    use crate::testutil::{index_text, write_repo, FixturePackage};

    fn entries(pkgs: &[FixturePackage<'_>]) -> Vec<IndexEntry> {
        parse_index(&index_text("aarch64", pkgs)).unwrap()
    }

    fn resolve(entries: &[IndexEntry], atom: &str) -> Result<World> {
        let refs: Vec<&IndexEntry> = entries.iter().collect();
        resolve_world(&refs, &Dependency::parse(atom).unwrap(), Arch::Aarch64)
    }

    fn names(entries: &[IndexEntry], world: &World) -> Vec<String> {
        world
            .selected
            .iter()
            .map(|&i| format!("{}-{}", entries[i].name, entries[i].version))
            .collect()
    }

    #[test]
    fn test_highest_version_wins() {
        let e = entries(&[
            FixturePackage::new("istio-charts-base", "1.20.3-r0"),
            FixturePackage::new("istio-charts-base", "1.21.0-r1"),
            FixturePackage::new("istio-charts-base", "1.21.0_rc1-r0"),
        ]);
        let world = resolve(&e, "istio-charts-base").unwrap();
        assert_eq!(names(&e, &world), vec!["istio-charts-base-1.21.0-r1"]);
    }

    #[test]
    fn test_exact_version() {
        let e = entries(&[
            FixturePackage::new("istio-charts-base", "1.20.3-r0"),
            FixturePackage::new("istio-charts-base", "1.21.0-r1"),
        ]);
        let world = resolve(&e, "istio-charts-base=1.20.3-r0").unwrap();
        assert_eq!(names(&e, &world), vec!["istio-charts-base-1.20.3-r0"]);
    }

    #[test]
    fn test_nothing_provides() {
        let e = entries(&[FixturePackage::new("a", "1.0-r0")]);
        let err = resolve(&e, "missing").unwrap_err();
        assert!(err.to_string().contains("nothing provides missing"));
    }

    #[test]
    fn test_unsatisfiable_constraint() {
        let e = entries(&[
            FixturePackage::new("a", "1.0-r0"),
            FixturePackage::new("a", "1.1-r0"),
        ]);
        let err = resolve(&e, "a=2.0-r0").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("does not satisfy"));
        assert!(message.contains("1.0-r0, 1.1-r0"));
    }

    #[test]
    fn test_transitive_closure_each_once() {
        let e = entries(&[
            FixturePackage::new("chart", "1.0-r0").depends(&["lib", "tool>=2"]),
            FixturePackage::new("tool", "2.1-r0").depends(&["lib"]),
            FixturePackage::new("lib", "0.9-r0"),
        ]);
        let world = resolve(&e, "chart").unwrap();
        assert_eq!(
            names(&e, &world),
            vec!["chart-1.0-r0", "lib-0.9-r0", "tool-2.1-r0"]
        );
        assert!(world.conflicts.is_empty());
    }

    #[test]
    fn test_virtual_provides() {
        let e = entries(&[
            FixturePackage::new("chart", "1.0-r0").depends(&["cmd:helm"]),
            FixturePackage::new("helm", "3.14.0-r0").provides(&["cmd:helm=3.14.0-r0"]),
        ]);
        let world = resolve(&e, "chart").unwrap();
        assert_eq!(names(&e, &world), vec!["chart-1.0-r0", "helm-3.14.0-r0"]);
    }

    #[test]
    fn test_missing_dependency_fails() {
        let e = entries(&[FixturePackage::new("chart", "1.0-r0").depends(&["ghost"])]);
        let err = resolve(&e, "chart").unwrap_err();
        assert!(matches!(err, ChartError::NothingProvides { ref name, .. } if name == "ghost"));
    }

    #[test]
    fn test_incompatible_requirements_recorded() {
        let e = entries(&[
            FixturePackage::new("chart", "1.0-r0").depends(&["lib>=2", "tool"]),
            FixturePackage::new("tool", "1.0-r0").depends(&["lib<2"]),
            FixturePackage::new("lib", "1.5-r0"),
            FixturePackage::new("lib", "2.5-r0"),
        ]);
        let world = resolve(&e, "chart").unwrap();
        assert_eq!(world.conflicts.len(), 1);
        assert!(world.conflicts[0].contains("tool requires lib<2"));
    }

    #[test]
    fn test_explicit_conflict_recorded() {
        let e = entries(&[
            FixturePackage::new("chart", "1.0-r0").depends(&["a", "b"]),
            FixturePackage::new("a", "1.0-r0").depends(&["!b"]),
            FixturePackage::new("b", "1.0-r0"),
        ]);
        let world = resolve(&e, "chart").unwrap();
        assert_eq!(world.conflicts, vec!["a conflicts with b-1.0-r0".to_string()]);
    }

    #[test]
    fn test_resolved_set_selection_and_conflicts() {
        let set = ResolvedPackageSet {
            packages: Vec::new(),
            conflicts: vec!["x conflicts with y-1".to_string()],
        };
        let err = set.ensure_no_conflicts().unwrap_err();
        assert!(err.to_string().contains("package conflicts detected"));
        assert!(set.select("x").is_err());
    }

    #[test]
    fn test_query_parsing() {
        let q = PackageQuery::new("base", Some(">=1.2"), Arch::Aarch64).unwrap();
        assert!(!q.constraint.is_any());
        let q = PackageQuery::new("base", None, Arch::Aarch64).unwrap();
        assert!(q.constraint.is_any());
        assert!(PackageQuery::new(" ", None, Arch::Aarch64).is_err());
    }

    #[tokio::test]
    async fn test_resolver_prefers_first_repository_on_tie() {
        let first = tempfile::TempDir::new().unwrap();
        let second = tempfile::TempDir::new().unwrap();
        write_repo(first.path(), "aarch64", &[FixturePackage::new("base", "1.0-r0")]);
        write_repo(second.path(), "aarch64", &[FixturePackage::new("base", "1.0-r0")]);

        let sources = vec![
            open_source(&first.path().display().to_string()),
            open_source(&second.path().display().to_string()),
        ];
        let resolver = Resolver::load(sources, Arch::Aarch64, &Keyring::default(), true)
            .await
            .unwrap();
        let set = resolver
            .resolve(&PackageQuery::new("base", None, Arch::Aarch64).unwrap())
            .unwrap();
        let selected = set.select("base").unwrap();
        assert_eq!(selected.source.location(), first.path().display().to_string());
    }

    #[tokio::test]
    async fn test_resolver_requires_repositories() {
        let err = Resolver::load(Vec::new(), Arch::Aarch64, &Keyring::default(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ChartError::ConfigError(_)));
    }
}
