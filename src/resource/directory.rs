//! Directory property resource.
//!
//! Same lifecycle as the file resource with directory semantics: no content
//! checksum in the properties model, recursive archives for backup and
//! restore, and a `-dir` suffix on the backup artifact.

use std::path::PathBuf;
use std::sync::Arc;

use agentkit::{AgentClient, AgentError, DirectoryProperties};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use converge::Resource;
use tokio_util::sync::CancellationToken;

use super::{DesiredProperties, Operation, State, backup_slug, is_valid_mode};

pub struct Directory {
    client: Arc<AgentClient>,
    backup_dir: PathBuf,

    desired_state: State,
    path: String,
    desired: DesiredProperties,

    current_state: State,
    current: Option<DirectoryProperties>,
    etag: Option<String>,

    last_operation: Operation,
}

impl Directory {
    pub fn new(
        client: Arc<AgentClient>,
        backup_dir: impl Into<PathBuf>,
        desired_state: State,
        path: impl Into<String>,
        desired: DesiredProperties,
    ) -> Self {
        Self {
            client,
            backup_dir: backup_dir.into(),
            desired_state,
            path: path.into(),
            desired,
            current_state: State::Unknown,
            current: None,
            etag: None,
            last_operation: Operation::None,
        }
    }

    fn backup_path(&self) -> PathBuf {
        self.backup_dir
            .join(format!("{}-dir.tar.gz", backup_slug(&self.path)))
    }

    async fn delete(&self, cancel: &CancellationToken) -> Result<()> {
        self.client
            .delete_directory(cancel, &self.path, self.etag.as_deref())
            .await
            .with_context(|| format!("failed to delete directory {}", self.path))?;
        Ok(())
    }

    async fn backup_content(&self, cancel: &CancellationToken) -> Result<bool> {
        let target = self.backup_path();
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create backup directory {}", parent.display()))?;
        }

        let archive = self
            .client
            .download(cancel, &self.path, true)
            .await
            .with_context(|| format!("failed to back up directory {}", self.path))?;

        if let Err(err) = tokio::fs::write(&target, &archive).await {
            let _ = tokio::fs::remove_file(&target).await;
            return Err(err)
                .with_context(|| format!("failed to write backup artifact {}", target.display()));
        }

        Ok(true)
    }

    async fn rollback_properties(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(current) = &self.current else {
            bail!("no properties to roll back for {}", self.path);
        };

        self.client
            .put_directory(cancel, &self.path, current, self.etag.as_deref())
            .await
            .with_context(|| format!("failed to restore properties of {}", self.path))?;
        Ok(())
    }

    async fn restore_from_backup(&self, cancel: &CancellationToken) -> Result<()> {
        let artifact = self.backup_path();
        let content = tokio::fs::read(&artifact)
            .await
            .with_context(|| format!("no backup artifact at {}", artifact.display()))?;

        self.client
            .upload(cancel, &self.path, true, content)
            .await
            .with_context(|| format!("failed to restore directory {} from backup", self.path))?;
        Ok(())
    }
}

#[async_trait]
impl Resource for Directory {
    fn name(&self) -> String {
        format!("directory:{}", self.path)
    }

    fn is_concurrent(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<()> {
        match self.desired_state {
            State::Absent | State::Present => {}
            State::Unknown => {
                bail!("invalid desired state for directory: {:?}", self.desired_state)
            }
        }

        if self.path.is_empty() {
            bail!("directory path cannot be empty");
        }

        if let Some(mode) = &self.desired.mode
            && !is_valid_mode(mode)
        {
            bail!("invalid directory mode: {mode:?}");
        }

        Ok(())
    }

    async fn check(&mut self, cancel: &CancellationToken) -> Result<bool> {
        match self
            .client
            .get_directory_properties(cancel, &self.path)
            .await
        {
            Ok(tagged) => {
                self.current_state = State::Present;
                let needs_apply = self.desired_state == State::Absent
                    || !self.desired.matches(
                        tagged.value.mode.as_deref(),
                        tagged.value.owner.as_deref(),
                        tagged.value.group.as_deref(),
                    );
                self.current = Some(tagged.value);
                self.etag = Some(tagged.etag);
                Ok(needs_apply)
            }
            Err(AgentError::NotFound) => {
                self.current_state = State::Absent;
                self.current = None;
                self.etag = None;
                Ok(self.desired_state == State::Present)
            }
            Err(err) => {
                Err(err).with_context(|| format!("failed to check directory {}", self.path))
            }
        }
    }

    async fn diff(&self, _cancel: &CancellationToken) -> Result<String> {
        match (self.desired_state, self.current_state) {
            (State::Absent, State::Present) => {
                return Ok(format!(
                    "diff -- directory: {}\n- present (directory will be deleted)\n",
                    self.path
                ));
            }
            (State::Present, State::Absent) => {
                return Ok(format!(
                    "diff -- directory: {}\n+ present (directory will be created)\n",
                    self.path
                ));
            }
            _ => {}
        }

        let Some(current) = &self.current else {
            bail!("no current state available for diff");
        };

        Ok(self.desired.diff_against(
            &format!("directory: {}", self.path),
            current.mode.as_deref(),
            current.owner.as_deref(),
            current.group.as_deref(),
        ))
    }

    async fn apply(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.last_operation = Operation::None;

        if self.desired_state == State::Absent {
            if self.current_state == State::Absent {
                return Ok(());
            }

            self.delete(cancel).await?;
            self.last_operation = Operation::Delete;
            return Ok(());
        }

        let properties = DirectoryProperties {
            mode: self.desired.mode.clone(),
            owner: self.desired.owner.clone(),
            group: self.desired.group.clone(),
        };

        let if_match = if self.current.is_some() {
            self.etag.as_deref()
        } else {
            None
        };

        let result = self
            .client
            .put_directory(cancel, &self.path, &properties, if_match)
            .await
            .with_context(|| format!("failed to apply directory {}", self.path))?;

        self.last_operation = if result.created {
            Operation::Create
        } else {
            Operation::Update
        };
        self.etag = Some(result.etag);
        Ok(())
    }

    fn supports_backup(&self) -> bool {
        true
    }

    async fn backup(&mut self, cancel: &CancellationToken) -> Result<bool> {
        if self.current_state != State::Present {
            return Ok(false);
        }

        if self.desired_state == State::Absent {
            return self.backup_content(cancel).await;
        }

        Ok(false)
    }

    async fn rollback(&mut self, cancel: &CancellationToken) -> Result<()> {
        match self.last_operation {
            Operation::None => Ok(()),
            Operation::Create => self.delete(cancel).await,
            Operation::Update => self.rollback_properties(cancel).await,
            Operation::Delete => self.restore_from_backup(cancel).await,
        }
    }
}
