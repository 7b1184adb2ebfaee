//! Manifest store (§3, §4.H): the durable record of what dotlink has
//! linked, persisted as JSON with deterministic key ordering so repeated
//! saves of unchanged state produce byte-identical files.

use crate::error::DotlinkError;
use crate::fs::Filesystem;
use crate::path::{PackagePath, TargetPath, TypedPath};
use crate::plan::{Operation, Plan};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const SCHEMA_VERSION: u32 = 1;

/// What a recorded target path is: either a link back into a package, or
/// a real directory dotlink created while unfolding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedEntryKind {
    Link(PackagePath),
    Dir,
}

/// One recorded target path, reconstituted from the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedPath {
    pub package: String,
    pub target: TargetPath,
    pub kind: ManagedEntryKind,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct EntryRecord {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_hash: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
struct PackageRecord {
    links: BTreeMap<String, EntryRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ManifestFile {
    schema_version: u32,
    packages: BTreeMap<String, PackageRecord>,
    #[serde(default)]
    hash_index: BTreeMap<String, Vec<String>>,
}

impl Default for ManifestFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            packages: BTreeMap::new(),
            hash_index: BTreeMap::new(),
        }
    }
}

pub struct Manifest {
    data: ManifestFile,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            data: ManifestFile::default(),
        }
    }

    /// Load the manifest at `path`, or an empty one if it doesn't exist
    /// yet (a brand new dotlink setup).
    pub fn load(path: &Utf8Path, fs: &dyn Filesystem) -> Result<Self, DotlinkError> {
        if !fs.exists(path) {
            return Ok(Self::new());
        }
        let bytes = fs.read_file(path).map_err(|e| DotlinkError::io(path, e))?;
        let data: ManifestFile = serde_json::from_slice(&bytes)
            .map_err(|e| DotlinkError::Corruption(format!("{path}: {e}")))?;
        if data.schema_version > SCHEMA_VERSION {
            return Err(DotlinkError::Corruption(format!(
                "manifest schema version {} is newer than this build supports ({})",
                data.schema_version, SCHEMA_VERSION
            )));
        }
        let manifest = Self { data };
        manifest.check_integrity()?;
        Ok(manifest)
    }

    /// Write via a temp file in the same directory followed by a rename,
    /// so a crash mid-write never leaves a half-written manifest in place.
    pub fn save(&self, path: &Utf8Path, fs: &dyn Filesystem) -> Result<(), DotlinkError> {
        let json = serde_json::to_vec_pretty(&self.data)
            .map_err(|e| DotlinkError::Internal(format!("failed to serialize manifest: {e}")))?;
        let tmp = path.with_extension("tmp");
        fs.write_file(&tmp, &json).map_err(|e| DotlinkError::io(&tmp, e))?;
        fs.rename(&tmp, path).map_err(|e| DotlinkError::io(path, e))?;
        Ok(())
    }

    /// The recorded link count must match the number of entries actually
    /// present, and the hash index can never reference more entries than
    /// exist; a violation means the file was hand-edited or corrupted.
    pub fn check_integrity(&self) -> Result<(), DotlinkError> {
        let declared: usize = self.data.packages.values().map(|p| p.links.len()).sum();
        let hashed: usize = self.data.hash_index.values().map(|v| v.len()).sum();
        if hashed > declared {
            return Err(DotlinkError::Corruption(
                "hash index references more entries than are recorded".to_string(),
            ));
        }
        Ok(())
    }

    pub fn packages(&self) -> Vec<String> {
        self.data.packages.keys().cloned().collect()
    }

    pub fn paths_for_package(&self, package: &str) -> Vec<ManagedPath> {
        let Some(record) = self.data.packages.get(package) else {
            return Vec::new();
        };
        record
            .links
            .iter()
            .filter_map(|(target_str, entry)| {
                let target = TypedPath::new(target_str.as_str()).ok()?;
                let kind = match entry.kind.as_str() {
                    "dir" => ManagedEntryKind::Dir,
                    _ => ManagedEntryKind::Link(TypedPath::new(entry.source.clone()?).ok()?),
                };
                Some(ManagedPath {
                    package: package.to_string(),
                    target,
                    kind,
                })
            })
            .collect()
    }

    pub fn all_paths(&self) -> Vec<ManagedPath> {
        self.packages()
            .into_iter()
            .flat_map(|p| self.paths_for_package(&p))
            .collect()
    }

    /// Fold a plan's operations into the manifest's recorded state. Called
    /// by the executor only after every operation in the plan has been
    /// applied and journaled. `hashes` maps an absolute target path to the
    /// content hash the scanner computed for the package file it now
    /// points at; entries with no hash (directories, large unhashed files)
    /// are simply recorded without one.
    pub fn apply_plan(&mut self, plan: &Plan, hashes: &HashMap<String, String>) {
        for planned in &plan.operations {
            let record = self.data.packages.entry(planned.package.clone()).or_default();
            match &planned.operation {
                Operation::LinkCreate { link, pointing_to } => {
                    record.links.insert(
                        link.to_string(),
                        EntryRecord {
                            kind: "link".into(),
                            source: Some(pointing_to.to_string()),
                            content_hash: hashes.get(link.as_str()).cloned(),
                        },
                    );
                }
                Operation::DirCreate { path } => {
                    record.links.insert(
                        path.to_string(),
                        EntryRecord {
                            kind: "dir".into(),
                            source: None,
                            content_hash: None,
                        },
                    );
                }
                Operation::LinkDelete { link, .. } => {
                    record.links.remove(link.as_str());
                }
                Operation::DirDelete { path } => {
                    record.links.remove(path.as_str());
                }
                Operation::FileMove { .. } | Operation::FileBackup { .. } => {}
            }
        }
        self.data.packages.retain(|_, record| !record.links.is_empty());
        self.rebuild_hash_index();
    }

    /// Recompute `hashIndex` (content hash -> package names producing that
    /// content) from the current set of recorded links.
    fn rebuild_hash_index(&mut self) {
        let mut by_hash: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (package, record) in &self.data.packages {
            for entry in record.links.values() {
                if let Some(hash) = &entry.content_hash {
                    by_hash.entry(hash.clone()).or_default().insert(package.clone());
                }
            }
        }
        self.data.hash_index = by_hash
            .into_iter()
            .map(|(hash, packages)| (hash, packages.into_iter().collect()))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use crate::plan::{PlanKind, PlannedOperation};

    fn t(p: &str) -> TargetPath {
        TypedPath::new(p).unwrap()
    }
    fn pkg(p: &str) -> PackagePath {
        TypedPath::new(p).unwrap()
    }

    #[test]
    fn loading_a_missing_manifest_yields_an_empty_one() {
        let fs = MemFs::new();
        let manifest = Manifest::load(Utf8Path::new("/home/.dotlink/manifest.json"), &fs).unwrap();
        assert!(manifest.all_paths().is_empty());
    }

    #[test]
    fn apply_plan_then_save_then_load_round_trips() {
        let fs = MemFs::new();
        fs.mkdir_p(Utf8Path::new("/home/.dotlink"));
        let mut manifest = Manifest::new();
        let plan = Plan::new(
            PlanKind::Manage,
            vec!["vim".into()],
            vec![PlannedOperation {
                package: "vim".into(),
                operation: Operation::LinkCreate {
                    link: t("/home/.vimrc"),
                    pointing_to: pkg("/pkgs/vim/dot-vimrc"),
                },
            }],
            vec![],
        );
        manifest.apply_plan(&plan, &HashMap::new());

        let path = Utf8Path::new("/home/.dotlink/manifest.json");
        manifest.save(path, &fs).unwrap();
        let reloaded = Manifest::load(path, &fs).unwrap();
        let paths = reloaded.paths_for_package("vim");
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].target, t("/home/.vimrc"));
        assert_eq!(paths[0].kind, ManagedEntryKind::Link(pkg("/pkgs/vim/dot-vimrc")));
    }

    #[test]
    fn apply_plan_records_content_hash_and_rebuilds_hash_index() {
        let mut manifest = Manifest::new();
        let plan = Plan::new(
            PlanKind::Manage,
            vec!["vim".into()],
            vec![PlannedOperation {
                package: "vim".into(),
                operation: Operation::LinkCreate {
                    link: t("/home/.vimrc"),
                    pointing_to: pkg("/pkgs/vim/dot-vimrc"),
                },
            }],
            vec![],
        );
        let mut hashes = HashMap::new();
        hashes.insert("/home/.vimrc".to_string(), "deadbeef".to_string());
        manifest.apply_plan(&plan, &hashes);

        assert_eq!(manifest.data.hash_index.get("deadbeef"), Some(&vec!["vim".to_string()]));
    }

    #[test]
    fn link_delete_removes_the_recorded_path() {
        let mut manifest = Manifest::new();
        let create = Plan::new(
            PlanKind::Manage,
            vec!["vim".into()],
            vec![PlannedOperation {
                package: "vim".into(),
                operation: Operation::LinkCreate {
                    link: t("/home/.vimrc"),
                    pointing_to: pkg("/pkgs/vim/dot-vimrc"),
                },
            }],
            vec![],
        );
        manifest.apply_plan(&create, &HashMap::new());
        assert_eq!(manifest.paths_for_package("vim").len(), 1);

        let delete = Plan::new(
            PlanKind::Unmanage,
            vec!["vim".into()],
            vec![PlannedOperation {
                package: "vim".into(),
                operation: Operation::LinkDelete {
                    link: t("/home/.vimrc"),
                    previous_target: pkg("/pkgs/vim/dot-vimrc"),
                },
            }],
            vec![],
        );
        manifest.apply_plan(&delete, &HashMap::new());
        assert!(manifest.paths_for_package("vim").is_empty());
        assert!(!manifest.packages().contains(&"vim".to_string()));
    }

    #[test]
    fn corrupted_json_is_reported_as_corruption_not_a_panic() {
        let fs = MemFs::new();
        fs.put_file(Utf8Path::new("/home/.dotlink/manifest.json"), b"{ not json");
        let err = Manifest::load(Utf8Path::new("/home/.dotlink/manifest.json"), &fs).unwrap_err();
        assert!(matches!(err, DotlinkError::Corruption(_)));
    }

    #[test]
    fn save_is_deterministic_for_identical_state() {
        let fs = MemFs::new();
        fs.mkdir_p(Utf8Path::new("/home/.dotlink"));
        let mut a = Manifest::new();
        let mut b = Manifest::new();
        let plan = Plan::new(
            PlanKind::Manage,
            vec!["vim".into()],
            vec![PlannedOperation {
                package: "vim".into(),
                operation: Operation::LinkCreate {
                    link: t("/home/.vimrc"),
                    pointing_to: pkg("/pkgs/vim/dot-vimrc"),
                },
            }],
            vec![],
        );
        a.apply_plan(&plan, &HashMap::new());
        b.apply_plan(&plan, &HashMap::new());
        let json_a = serde_json::to_vec_pretty(&a.data).unwrap();
        let json_b = serde_json::to_vec_pretty(&b.data).unwrap();
        assert_eq!(json_a, json_b);
    }
}
