//! The per-file receipt pipeline.
//!
//! For every qualifying file the stages run strictly in order:
//!
//! 1. identify: fetch the backend counter and build a [`PublicId`]
//! 2. upload: store the file under that id (failure is logged and, by default, tolerated)
//! 3. persist: insert the receipt on the backend (failure ends the file)
//! 4. notify: hand the receipt id to the tag writer (failure is logged)
//!
//! Third-party logging is silenced around each backend call.

use std::path::{Path, PathBuf};
use rand::rngs::StdRng;
use crate::api::{BackendError, Receipt, ReceiptBackend};
use crate::cloud::{UploadError, Uploader};
use crate::config::PipelineConfig;
use crate::events::{ChangeKind, QualifyingFile};
use crate::id::{IdGenerator, PublicId};
use crate::logging;
use crate::tag::{ReceiptTag, TagWriter};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("could not fetch the receipt counter: {0}")]
    Counter(#[source] BackendError),
    #[error("upload of {} as {public_id} failed: {source}", .path.display())]
    Upload {
        path: PathBuf,
        public_id: PublicId,
        #[source]
        source: UploadError,
    },
    #[error("could not insert receipt {public_id}: {source}")]
    Persist {
        public_id: PublicId,
        #[source]
        source: BackendError,
    },
}

impl PipelineError {
    pub fn is_backend(&self) -> bool {
        matches!(self, PipelineError::Counter(_) | PipelineError::Persist { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    Written(ReceiptTag),
    /// No tag stage configured
    Skipped,
    Failed(String),
}

/// What happened to one file that made it through the persist stage.
#[derive(Debug, Clone)]
pub struct ReceiptOutcome {
    pub path: PathBuf,
    pub public_id: PublicId,
    pub uploaded: bool,
    pub receipt: Receipt,
    pub tag: TagOutcome,
}

pub struct ReceiptPipeline {
    backend: Box<dyn ReceiptBackend>,
    uploader: Box<dyn Uploader>,
    tag_writer: Option<Box<dyn TagWriter>>,
    ids: IdGenerator<StdRng>,
    config: PipelineConfig,
}

impl ReceiptPipeline {
    /// A cloud + database pipeline; add a final tag stage with [`Self::with_tag_writer`].
    pub fn new(backend: Box<dyn ReceiptBackend>, uploader: Box<dyn Uploader>) -> Self {
        Self {
            backend,
            uploader,
            tag_writer: None,
            ids: IdGenerator::new(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_tag_writer(mut self, tag_writer: Box<dyn TagWriter>) -> Self {
        self.tag_writer = Some(tag_writer);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn has_tag_stage(&self) -> bool {
        self.tag_writer.is_some()
    }

    pub fn process(&mut self, file: &QualifyingFile) -> Result<ReceiptOutcome, PipelineError> {
        tracing::info!("{} for {}", ChangeKind::Created.name(), file.path.display());

        let public_id = self.identify()?;
        let uploaded = self.upload(&file.path, &public_id)?;
        let receipt = self.persist(&public_id)?;
        let tag = self.notify(&receipt);

        Ok(ReceiptOutcome {
            path: file.path.clone(),
            public_id,
            uploaded,
            receipt,
            tag,
        })
    }

    fn identify(&mut self) -> Result<PublicId, PipelineError> {
        let counter = {
            let _quiet = logging::quiet();
            self.backend.next_auto_increment()
        }
        .map_err(PipelineError::Counter)?;

        Ok(self.ids.next_id(counter))
    }

    fn upload(&mut self, path: &Path, public_id: &PublicId) -> Result<bool, PipelineError> {
        tracing::info!("Uploading {} as {}...", path.display(), public_id);
        match self.uploader.upload(path, public_id) {
            Ok(()) => {
                tracing::info!("Upload Complete!");
                Ok(true)
            }
            Err(err) if self.config.continue_on_upload_failure => {
                tracing::warn!("Upload Failed: {}", err);
                Ok(false)
            }
            Err(source) => Err(PipelineError::Upload {
                path: path.to_path_buf(),
                public_id: public_id.clone(),
                source,
            }),
        }
    }

    fn persist(&mut self, public_id: &PublicId) -> Result<Receipt, PipelineError> {
        tracing::info!("Inserting '{}' to Database...", public_id);
        let receipt = {
            let _quiet = logging::quiet();
            self.backend.insert_receipt(public_id)
        }
        .map_err(|source| PipelineError::Persist {
            public_id: public_id.clone(),
            source,
        })?;

        tracing::info!("Insert Receipt Complete! (id {})", receipt.id);
        Ok(receipt)
    }

    fn notify(&mut self, receipt: &Receipt) -> TagOutcome {
        let Some(writer) = self.tag_writer.as_mut() else {
            return TagOutcome::Skipped;
        };

        let result = ReceiptTag::try_from(receipt.id).and_then(|tag| writer.write(&tag).map(|()| tag));
        match result {
            Ok(tag) => TagOutcome::Written(tag),
            Err(err) => {
                tracing::warn!("Tag write failed: {}", err);
                TagOutcome::Failed(err.to_string())
            }
        }
    }
}
