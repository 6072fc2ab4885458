//! Read-only views of the local project workspace
//!
//! Lets an agent locate the git repository around a path, list its files,
//! read them and see uncommitted changes. Outside a git repository the file
//! listing falls back to walking the directory tree.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Where a workspace path lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessResult {
    /// The path the context was opened on
    pub project_root: PathBuf,
    /// Top level of the enclosing git repository, if any
    pub repo_root: Option<PathBuf>,
}

impl GuessResult {
    /// Directory that relative paths resolve against
    pub fn base(&self) -> &Path {
        self.repo_root.as_deref().unwrap_or(&self.project_root)
    }
}

/// Workspace inspector rooted at one directory
#[derive(Debug, Clone)]
pub struct ProjectContext {
    path: PathBuf,
}

impl ProjectContext {
    /// Open a context on `path`, or on the current directory
    pub fn new(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => std::env::current_dir()?,
        };
        Ok(Self {
            path: std::fs::canonicalize(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn guess(&self) -> GuessResult {
        GuessResult {
            project_root: self.path.clone(),
            repo_root: git_root(&self.path).await,
        }
    }

    /// Files tracked by git, or every regular file under the project root
    /// when there is no repository.
    ///
    /// Paths are relative to the repository (or project) root unless
    /// `relative_to_repo` is false and a repository was found.
    pub async fn list_files(&self, relative_to_repo: bool) -> Result<Vec<PathBuf>> {
        let guess = self.guess().await;

        if let Some(repo_root) = guess.repo_root {
            let output = git(&repo_root, &["ls-files"]).await?;
            let files = output
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(PathBuf::from);
            return Ok(if relative_to_repo {
                files.collect()
            } else {
                files.map(|file| repo_root.join(file)).collect()
            });
        }

        walk_files(&guess.project_root).await
    }

    /// Read a UTF-8 file relative to the repository (or project) root
    pub async fn read_file(&self, relative_path: impl AsRef<Path>) -> Result<String> {
        let guess = self.guess().await;
        let target = guess.base().join(relative_path);
        Ok(tokio::fs::read_to_string(target).await?)
    }

    /// Unified diff of the working tree, or of the index when `staged`.
    /// Empty outside a git repository.
    pub async fn get_diff(&self, staged: bool) -> Result<String> {
        let Some(repo_root) = self.guess().await.repo_root else {
            return Ok(String::new());
        };
        let args: &[&str] = if staged {
            &["diff", "--staged"]
        } else {
            &["diff"]
        };
        git(&repo_root, args).await
    }
}

async fn git_root(start: &Path) -> Option<PathBuf> {
    match git(start, &["rev-parse", "--show-toplevel"]).await {
        Ok(output) => Some(PathBuf::from(output.trim())),
        Err(e) => {
            tracing::debug!(path = %start.display(), error = %e, "Not inside a git repository");
            None
        }
    }
}

/// Run git in `cwd` and return stdout, failing on a non-zero exit
async fn git(cwd: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Git(format!(
            "git {} exited with {}: {}",
            args.join(" "),
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Every file below `root`, relative to it and sorted. Symlinked
/// directories are not followed.
async fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
                if let Ok(relative) = path.strip_prefix(root) {
                    files.push(relative.to_path_buf());
                }
            }
        }
    }

    files.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));
    Ok(files)
}
