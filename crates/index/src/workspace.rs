use anyhow::{Context, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const WORKSPACE_PREFIX: &str = "graphrag_";
pub const LAYOUT_DIRS: [&str; 4] = ["input", "output", "cache", "reports"];
const MAX_GROUP_ID_LEN: usize = 64;

/// Which on-disk workspace backs each group.
///
/// One registry is owned by the application state and handed to whoever
/// needs it; nothing reaches it through globals.
pub struct WorkspaceRegistry {
    root: PathBuf,
    workspaces: DashMap<String, PathBuf>,
}

impl WorkspaceRegistry {
    /// Open a registry rooted at `root`, picking up workspaces left by
    /// earlier runs.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create workspace root: {:?}", root))?;

        let registry = Self {
            root,
            workspaces: DashMap::new(),
        };

        let mut entries = fs::read_dir(&registry.root)
            .await
            .context("Failed to read workspace root")?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(group_id) = name.strip_prefix(WORKSPACE_PREFIX) {
                if validate_group_id(group_id).is_ok() {
                    registry.workspaces.insert(group_id.to_string(), path.clone());
                }
            }
        }

        tracing::info!(
            root = %registry.root.display(),
            groups = registry.workspaces.len(),
            "Workspace registry opened"
        );

        Ok(registry)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the group's workspace, registering the group on first use.
    pub fn workspace(&self, group_id: &str) -> Result<PathBuf> {
        validate_group_id(group_id)?;
        let path = self
            .workspaces
            .entry(group_id.to_string())
            .or_insert_with(|| self.root.join(format!("{}{}", WORKSPACE_PREFIX, group_id)))
            .clone();
        Ok(path)
    }

    /// Path of an already registered workspace.
    pub fn existing(&self, group_id: &str) -> Option<PathBuf> {
        self.workspaces.get(group_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.workspaces.contains_key(group_id)
    }

    /// Create `input/`, `output/`, `cache/` and `reports/` for the group.
    pub async fn ensure_layout(&self, group_id: &str) -> Result<PathBuf> {
        let path = self.workspace(group_id)?;
        for dir in LAYOUT_DIRS {
            fs::create_dir_all(path.join(dir))
                .await
                .with_context(|| format!("Failed to create {} directory for group {}", dir, group_id))?;
        }
        Ok(path)
    }

    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.workspaces.iter().map(|r| r.key().clone()).collect();
        groups.sort();
        groups
    }

    /// Delete the group's workspace. Returns false for an unknown group.
    pub async fn remove(&self, group_id: &str) -> Result<bool> {
        let Some(path) = self.existing(group_id) else {
            return Ok(false);
        };

        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_dir_all(&path)
                .await
                .with_context(|| format!("Failed to delete workspace for group {}", group_id))?;
        }

        self.workspaces.remove(group_id);
        tracing::info!(group = group_id, "Workspace deleted");
        Ok(true)
    }
}

pub fn validate_group_id(group_id: &str) -> Result<()> {
    if group_id.is_empty() || group_id.len() > MAX_GROUP_ID_LEN {
        anyhow::bail!("Group id must be 1-{} characters", MAX_GROUP_ID_LEN);
    }
    if !group_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        anyhow::bail!("Group id may only contain letters, digits, '_' and '-': {}", group_id);
    }
    Ok(())
}
