//! Git working directory handle
//!
//! [`GitRepository`] stores only the path and commit identity and opens a
//! fresh `git2::Repository` for every operation (`git2::Repository` is not
//! `Sync`), so a handle can be shared behind an `Arc` and used from any thread.

use crate::config::CommitSignature;
use crate::error::{RegistryError, RegistryResult};
use crate::services::STAGING_SUFFIX;
use chrono::{DateTime, TimeZone, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{IndexAddOption, IndexMatchedPath, Oid, Repository, Signature, Sort, Status, StatusOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// Reference that records the last published commit
pub const PUBLISHED_REF: &str = "refs/regvault/published";

/// Message of the empty commit made when a repository is created
pub const CREATED_MESSAGE: &str = "Created";

/// Uncommitted change of a record file relative to HEAD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

/// One changed file in the working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Path relative to the repository root
    pub file: String,
    pub status: ChangeStatus,
}

/// A commit as shown in a record's history
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommitInfo {
    pub id: String,
    pub message: String,
    pub author: String,
    pub time: DateTime<Utc>,
}

/// Handle to one git working directory
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
    signature: CommitSignature,
}

impl GitRepository {
    /// Whether `path` already holds a git repository
    pub fn exists(path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    /// Open the repository at `path`, initializing it if there is none
    pub fn open(path: impl Into<PathBuf>, signature: CommitSignature) -> RegistryResult<Self> {
        let path = path.into();
        if Self::exists(&path) {
            trace!("Opened existing repository at {:?}", path);
            return Ok(Self { path, signature });
        }
        Self::init(path, signature)
    }

    /// Initialize a new repository with an empty "Created" commit
    ///
    /// Fails if `path` is a file or a non-empty directory that is not a repository.
    pub fn init(path: impl Into<PathBuf>, signature: CommitSignature) -> RegistryResult<Self> {
        let path = path.into();

        if path.is_file() {
            return Err(RegistryError::repository_init(
                &path,
                "Path is occupied by a file",
            ));
        }
        if path.is_dir() {
            let occupied = fs::read_dir(&path)
                .map_err(|e| {
                    RegistryError::repository_init(&path, format!("Failed to read directory: {}", e))
                })?
                .next()
                .is_some();
            if occupied {
                return Err(RegistryError::repository_init(
                    &path,
                    "Path is occupied by a non-repository directory",
                ));
            }
        }

        fs::create_dir_all(&path).map_err(|e| {
            RegistryError::repository_init(&path, format!("Failed to create directory: {}", e))
        })?;

        let repo = Repository::init(&path).map_err(|e| {
            RegistryError::repository_init(&path, format!("Failed to init repository: {}", e))
        })?;

        let handle = Self { path, signature };
        let sig = handle.signature()?;
        let tree_id = repo
            .index()
            .and_then(|mut index| index.write_tree())
            .map_err(|e| {
                RegistryError::repository_init(&handle.path, format!("Failed to write tree: {}", e))
            })?;
        let tree = repo.find_tree(tree_id).map_err(|e| {
            RegistryError::repository_init(&handle.path, format!("Failed to find tree: {}", e))
        })?;
        repo.commit(Some("HEAD"), &sig, &sig, CREATED_MESSAGE, &tree, &[])
            .map_err(|e| {
                RegistryError::repository_init(
                    &handle.path,
                    format!("Failed to create initial commit: {}", e),
                )
            })?;

        info!("Initialized repository at {:?}", handle.path);
        Ok(handle)
    }

    /// Clone the committed state of `source` into `target`
    ///
    /// The clone starts out published: it holds exactly what the source committed.
    pub fn clone_from(
        source: &GitRepository,
        target: impl Into<PathBuf>,
        signature: CommitSignature,
    ) -> RegistryResult<Self> {
        let target = target.into();
        let url = source.path.to_str().ok_or_else(|| {
            RegistryError::repository_init(&source.path, "Source path is not valid UTF-8")
        })?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RegistryError::repository_init(
                    &target,
                    format!("Failed to create parent directory: {}", e),
                )
            })?;
        }

        debug!("Cloning {:?} into {:?}", source.path, target);
        RepoBuilder::new().clone(url, &target).map_err(|e| {
            RegistryError::repository_init(&target, format!("Failed to clone repository: {}", e))
        })?;

        let handle = Self {
            path: target,
            signature,
        };
        handle.mark_published()?;
        info!("Seeded repository {:?} from {:?}", handle.path, source.path);
        Ok(handle)
    }

    /// Working directory of the repository
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn repo(&self) -> RegistryResult<Repository> {
        Repository::open(&self.path).map_err(|e| {
            RegistryError::repository_init(&self.path, format!("Failed to open repository: {}", e))
        })
    }

    fn signature(&self) -> RegistryResult<Signature<'static>> {
        Signature::now(&self.signature.name, &self.signature.email).map_err(|e| {
            RegistryError::configuration(format!("Invalid commit signature: {}", e))
        })
    }

    /// Stage every addition, modification and deletion (`git add -A`)
    pub fn stage_all_changes(&self) -> RegistryResult<()> {
        let repo = self.repo()?;
        let mut index = repo.index()?;
        let skip_staging_files = &mut |path: &Path, _: &[u8]| -> i32 {
            if is_staging_file(path) {
                1
            } else {
                0
            }
        };
        index.add_all(
            ["*"].iter(),
            IndexAddOption::DEFAULT,
            Some(skip_staging_files as &mut IndexMatchedPath),
        )?;
        // add_all does not pick up removed files
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        trace!("Staged all changes in {:?}", self.path);
        Ok(())
    }

    /// Commit the staged changes
    ///
    /// Returns `None` without touching history when the index matches HEAD.
    pub fn commit(&self, message: &str) -> RegistryResult<Option<Oid>> {
        let repo = self.repo()?;
        let sig = self.signature()?;

        let mut index = repo.index()?;
        let tree_id = index.write_tree()?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(parent) = &parent {
            if parent.tree_id() == tree_id {
                debug!("Nothing to commit in {:?}", self.path);
                return Ok(None);
            }
        }

        let tree = repo.find_tree(tree_id)?;
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        info!("Committed {} in {:?}: {}", oid, self.path, message);
        Ok(Some(oid))
    }

    /// Flag the current HEAD as ready to be merged upstream
    pub fn mark_published(&self) -> RegistryResult<()> {
        let repo = self.repo()?;
        let head = repo.head()?.peel_to_commit()?.id();
        repo.reference(PUBLISHED_REF, head, true, "regvault: mark published")?;
        debug!("Marked {} as published in {:?}", head, self.path);
        Ok(())
    }

    /// Whether HEAD is the last published commit
    pub fn is_published(&self) -> RegistryResult<bool> {
        let repo = self.repo()?;
        let head = repo.head()?.peel_to_commit()?.id();
        Ok(repo.refname_to_id(PUBLISHED_REF).ok() == Some(head))
    }

    /// Number of commits on HEAD made after the last publish
    pub fn unpublished_commits(&self) -> RegistryResult<usize> {
        let repo = self.repo()?;
        let mut walk = repo.revwalk()?;
        walk.push_head()?;
        if let Ok(published) = repo.refname_to_id(PUBLISHED_REF) {
            walk.hide(published)?;
        }
        Ok(walk.count())
    }

    /// Total number of commits reachable from HEAD
    pub fn commit_count(&self) -> RegistryResult<usize> {
        let repo = self.repo()?;
        let mut walk = repo.revwalk()?;
        walk.push_head()?;
        Ok(walk.count())
    }

    /// Messages of every commit reachable from HEAD, newest first
    pub fn commit_messages(&self) -> RegistryResult<Vec<String>> {
        let repo = self.repo()?;
        let mut walk = repo.revwalk()?;
        walk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;
        walk.push_head()?;

        let mut messages = Vec::new();
        for oid in walk {
            let commit = repo.find_commit(oid?)?;
            messages.push(commit.message().unwrap_or_default().to_string());
        }
        Ok(messages)
    }

    /// Record files that differ from HEAD in the index or working directory
    pub fn status(&self) -> RegistryResult<Vec<FileChange>> {
        let repo = self.repo()?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        opts.recurse_untracked_dirs(true);

        let statuses = repo.statuses(Some(&mut opts))?;
        let mut changes = Vec::new();
        for entry in statuses.iter() {
            let Some(file) = entry.path() else {
                continue;
            };
            if !is_record_file(file) {
                continue;
            }
            if let Some(status) = classify(entry.status()) {
                changes.push(FileChange {
                    file: file.to_string(),
                    status,
                });
            }
        }
        changes.sort_by(|a, b| a.file.cmp(&b.file));
        Ok(changes)
    }

    /// Commits that changed `file`, newest first
    pub fn history(&self, file: &str) -> RegistryResult<Vec<CommitInfo>> {
        let repo = self.repo()?;
        let mut walk = repo.revwalk()?;
        walk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;
        walk.push_head()?;

        let path = Path::new(file);
        let mut history = Vec::new();
        for oid in walk {
            let commit = repo.find_commit(oid?)?;
            let current = commit.tree()?.get_path(path).ok().map(|e| e.id());
            let previous = match commit.parent(0) {
                Ok(parent) => parent.tree()?.get_path(path).ok().map(|e| e.id()),
                Err(_) => None,
            };
            if current != previous {
                history.push(CommitInfo {
                    id: commit.id().to_string(),
                    message: commit.message().unwrap_or_default().trim_end().to_string(),
                    author: commit.author().name().unwrap_or("unknown").to_string(),
                    time: Utc
                        .timestamp_opt(commit.time().seconds(), 0)
                        .single()
                        .unwrap_or_else(Utc::now),
                });
            }
        }
        Ok(history)
    }

    /// Record file names present in the HEAD commit
    pub fn committed_files(&self) -> RegistryResult<Vec<String>> {
        let repo = self.repo()?;
        let tree = repo.head()?.peel_to_tree()?;
        Ok(tree
            .iter()
            .filter_map(|entry| entry.name().map(str::to_string))
            .filter(|name| is_record_file(name))
            .collect())
    }

    /// Content of `file` as committed in HEAD
    pub fn read_committed(&self, file: &str) -> RegistryResult<Option<Vec<u8>>> {
        let repo = self.repo()?;
        let tree = repo.head()?.peel_to_tree()?;
        let entry = match tree.get_path(Path::new(file)) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob = repo.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }

    /// Restore `file` in the index and working directory to its HEAD version
    ///
    /// A file that does not exist in HEAD is removed.
    pub fn revert_file(&self, file: &str) -> RegistryResult<()> {
        let repo = self.repo()?;
        let head = repo.head()?.peel_to_commit()?;
        let in_head = head.tree()?.get_path(Path::new(file)).is_ok();

        if in_head {
            repo.reset_default(Some(head.as_object()), [file])?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force().path(file);
            repo.checkout_head(Some(&mut checkout))?;
        } else {
            let mut index = repo.index()?;
            if index.get_path(Path::new(file), 0).is_some() {
                index.remove_path(Path::new(file))?;
                index.write()?;
            }
            let on_disk = self.path.join(file);
            if on_disk.exists() {
                fs::remove_file(&on_disk)?;
            }
        }

        info!("Reverted {} in {:?}", file, self.path);
        Ok(())
    }
}

/// Hidden file a record store writes before renaming it into place
fn is_staging_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.') && name.ends_with(STAGING_SUFFIX))
}

fn is_record_file(path: &str) -> bool {
    path.ends_with(".json") && !path.starts_with('.') && !path.contains('/')
}

fn classify(status: Status) -> Option<ChangeStatus> {
    let added = status.intersects(Status::WT_NEW | Status::INDEX_NEW);
    let deleted = status.intersects(Status::WT_DELETED | Status::INDEX_DELETED);
    let modified = status.intersects(
        Status::WT_MODIFIED
            | Status::INDEX_MODIFIED
            | Status::WT_RENAMED
            | Status::INDEX_RENAMED
            | Status::WT_TYPECHANGE
            | Status::INDEX_TYPECHANGE,
    );

    match (added, deleted, modified) {
        // staged as new, then removed from disk: nothing relative to HEAD
        (true, true, _) => None,
        (true, false, _) => Some(ChangeStatus::Added),
        (false, true, _) => Some(ChangeStatus::Deleted),
        (false, false, true) => Some(ChangeStatus::Modified),
        _ => None,
    }
}
