//! File property resource.
//!
//! Reconciles existence, mode, owner and group of a single file on the
//! target host. Writes are guarded by the entity tag observed during
//! `check`; content is backed up as a single-file gzipped tar before a
//! delete so the rollback path can restore it.

use std::path::PathBuf;
use std::sync::Arc;

use agentkit::{AgentClient, AgentError, FileProperties};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use converge::Resource;
use tokio_util::sync::CancellationToken;

use super::{DesiredProperties, Operation, State, backup_slug, is_valid_mode};

pub struct File {
    client: Arc<AgentClient>,
    backup_dir: PathBuf,

    desired_state: State,
    path: String,
    desired: DesiredProperties,

    current_state: State,
    current: Option<FileProperties>,
    etag: Option<String>,

    // The operation the last apply performed
    last_operation: Operation,
}

impl File {
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
            .join(format!("{}.tar.gz", backup_slug(&self.path)))
    }

    async fn delete(&self, cancel: &CancellationToken) -> Result<()> {
        self.client
            .delete_file(cancel, &self.path, self.etag.as_deref())
            .await
            .with_context(|| format!("failed to delete file {}", self.path))?;
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
            .download(cancel, &self.path, false)
            .await
            .with_context(|| format!("failed to back up file {}", self.path))?;

        if let Err(err) = tokio::fs::write(&target, &archive).await {
            // Do not leave a partial artifact behind.
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

        let properties = FileProperties {
            mode: current.mode.clone(),
            owner: current.owner.clone(),
            group: current.group.clone(),
            checksum: None,
        };
        self.client
            .put_file(cancel, &self.path, &properties, self.etag.as_deref())
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
            .upload(cancel, &self.path, false, content)
            .await
            .with_context(|| format!("failed to restore file {} from backup", self.path))?;
        Ok(())
    }
}

#[async_trait]
impl Resource for File {
    fn name(&self) -> String {
        format!("file:{}", self.path)
    }

    fn is_concurrent(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<()> {
        match self.desired_state {
            State::Absent | State::Present => {}
            State::Unknown => bail!("invalid desired state for file: {:?}", self.desired_state),
        }

        if self.path.is_empty() {
            bail!("file path cannot be empty");
        }

        if let Some(mode) = &self.desired.mode
            && !is_valid_mode(mode)
        {
            bail!("invalid file mode: {mode:?}");
        }

        Ok(())
    }

    async fn check(&mut self, cancel: &CancellationToken) -> Result<bool> {
        match self.client.get_file_properties(cancel, &self.path).await {
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
                Err(err).with_context(|| format!("failed to check file {}", self.path))
            }
        }
    }

    async fn diff(&self, _cancel: &CancellationToken) -> Result<String> {
        match (self.desired_state, self.current_state) {
            (State::Absent, State::Present) => {
                return Ok(format!(
                    "diff -- file: {}\n- present (file will be deleted)\n",
                    self.path
                ));
            }
            (State::Present, State::Absent) => {
                return Ok(format!(
                    "diff -- file: {}\n+ present (file will be created)\n",
                    self.path
                ));
            }
            _ => {}
        }

        let Some(current) = &self.current else {
            bail!("no current state available for diff");
        };

        Ok(self.desired.diff_against(
            &format!("file: {}", self.path),
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

        let properties = FileProperties {
            mode: self.desired.mode.clone(),
            owner: self.desired.owner.clone(),
            group: self.desired.group.clone(),
            checksum: None,
        };

        // Enforce the tag only for an observed existing file
        let if_match = if self.current.is_some() {
            self.etag.as_deref()
        } else {
            None
        };

        let result = self
            .client
            .put_file(cancel, &self.path, &properties, if_match)
            .await
            .with_context(|| format!("failed to apply file {}", self.path))?;

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
        // Nothing to snapshot for a file that is not there
        if self.current_state != State::Present {
            return Ok(false);
        }

        // Deleting loses the content; download it for a full restore. A
        // property-only change needs no artifact: the observed properties
        // already live in memory.
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
