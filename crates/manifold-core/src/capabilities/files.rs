//! Workspace file capabilities: list, read and write under one root.
//!
//! Paths are relative to the workspace root. Absolute paths and `..` are
//! refused. Filesystem problems come back as `Error: ...` text so the agent
//! can react to them; only malformed input is a service error.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::error::{ServiceError, ServiceResult};
use crate::services::Capability;

pub const LIST_DIRECTORY: &str = "list_directory";
pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";

/// Root directory the file capabilities are confined to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `relative` onto the root, refusing anything that could escape it.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, String> {
        let path = Path::new(relative);
        let inside = path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !inside {
            return Err(format!(
                "Error: access denied to {relative}, paths must be relative to the workspace"
            ));
        }
        Ok(self.root.join(path))
    }

    /// The three file capabilities sharing this root.
    pub fn capabilities(self) -> Vec<Arc<dyn Capability>> {
        let workspace = Arc::new(self);
        vec![
            Arc::new(ListDirectory(Arc::clone(&workspace))),
            Arc::new(ReadFile(Arc::clone(&workspace))),
            Arc::new(WriteFile(workspace)),
        ]
    }
}

fn parse_input<T: DeserializeOwned>(name: &str, input: &Value) -> ServiceResult<T> {
    serde_json::from_value(input.clone())
        .map_err(|e| ServiceError::InvalidInput(format!("{name}: {e}, got {input}")))
}

fn current_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize)]
struct ListInput {
    #[serde(default = "current_dir")]
    dir_path: String,
}

#[derive(Debug, Deserialize)]
struct ReadInput {
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct WriteInput {
    file_path: String,
    text: String,
    #[serde(default)]
    append: bool,
}

#[derive(Debug)]
pub struct ListDirectory(Arc<Workspace>);

#[async_trait]
impl Capability for ListDirectory {
    fn name(&self) -> &str {
        LIST_DIRECTORY
    }

    fn description(&self) -> &str {
        "List a workspace directory. Input: {\"dir_path\": relative path, default \".\"}"
    }

    #[instrument(skip_all, fields(capability = LIST_DIRECTORY))]
    async fn invoke(&self, input: &Value) -> ServiceResult<String> {
        let ListInput { dir_path } = parse_input(LIST_DIRECTORY, input)?;
        let dir = match self.0.resolve(&dir_path) {
            Ok(dir) => dir,
            Err(denied) => return Ok(denied),
        };
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => return Ok(format!("Error: cannot list {dir_path}: {e}")),
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                        name.push('/');
                    }
                    names.push(name);
                }
                Ok(None) => break,
                Err(e) => return Ok(format!("Error: cannot list {dir_path}: {e}")),
            }
        }
        debug!(entries = names.len(), "directory listed");

        if names.is_empty() {
            return Ok(format!("No files found in directory {dir_path}"));
        }
        names.sort();
        Ok(names.join("\n"))
    }
}

#[derive(Debug)]
pub struct ReadFile(Arc<Workspace>);

#[async_trait]
impl Capability for ReadFile {
    fn name(&self) -> &str {
        READ_FILE
    }

    fn description(&self) -> &str {
        "Read a workspace file. Input: {\"file_path\": relative path}"
    }

    #[instrument(skip_all, fields(capability = READ_FILE))]
    async fn invoke(&self, input: &Value) -> ServiceResult<String> {
        let ReadInput { file_path } = parse_input(READ_FILE, input)?;
        let path = match self.0.resolve(&file_path) {
            Ok(path) => path,
            Err(denied) => return Ok(denied),
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) => Ok(format!("Error: cannot read {file_path}: {e}")),
        }
    }
}

#[derive(Debug)]
pub struct WriteFile(Arc<Workspace>);

impl WriteFile {
    async fn write(path: &Path, text: &str, append: bool) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl Capability for WriteFile {
    fn name(&self) -> &str {
        WRITE_FILE
    }

    fn description(&self) -> &str {
        "Write a workspace file, creating directories as needed. Input: {\"file_path\": relative path, \"text\": content, \"append\": bool, default false}"
    }

    #[instrument(skip_all, fields(capability = WRITE_FILE))]
    async fn invoke(&self, input: &Value) -> ServiceResult<String> {
        let WriteInput {
            file_path,
            text,
            append,
        } = parse_input(WRITE_FILE, input)?;
        let path = match self.0.resolve(&file_path) {
            Ok(path) => path,
            Err(denied) => return Ok(denied),
        };
        match Self::write(&path, &text, append).await {
            Ok(()) => {
                debug!(bytes = text.len(), append, "file written");
                Ok(format!("File written successfully to {file_path}."))
            }
            Err(e) => Ok(format!("Error: cannot write {file_path}: {e}")),
        }
    }
}
