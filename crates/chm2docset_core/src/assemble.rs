//! Sequential conversion pipeline: clean, extract, index, write manifest.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::BundleConfig;
use crate::extract::Extractor;
use crate::index::{IndexStats, SqliteIndexStore, index_titles};
use crate::manifest::{ManifestDescriptor, write_manifest};
use crate::paths::{BundleLayout, normalize_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Stage {
    #[default]
    Init,
    Cleaned,
    Extracted,
    Indexed,
    ManifestWritten,
    Done,
    Failed,
}

impl Stage {
    pub fn can_transition_to(self, target: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, target),
            (Init, Cleaned)
                | (Cleaned, Extracted)
                | (Extracted, Indexed)
                | (Indexed, ManifestWritten)
                | (ManifestWritten, Done)
                | (Init, Failed)
                | (Cleaned, Failed)
                | (Extracted, Failed)
                | (Indexed, Failed)
                | (ManifestWritten, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Cleaned => "cleaned",
            Self::Extracted => "extracted",
            Self::Indexed => "indexed",
            Self::ManifestWritten => "manifest-written",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("failed to remove previous bundle output")]
    Clean(#[source] anyhow::Error),

    #[error("extraction failed")]
    Extraction(#[source] anyhow::Error),

    #[error("indexing failed")]
    Index(#[source] anyhow::Error),

    #[error("failed to write manifest")]
    Manifest(#[source] anyhow::Error),

    #[error("pipeline cannot move from {from} to {to}")]
    InvalidStage { from: Stage, to: Stage },
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub bundle_path: String,
    pub content_path: String,
    pub database_path: String,
    pub manifest_path: String,
    pub bundle_identifier: String,
    pub display_name: String,
    pub platform_family: String,
    pub index: IndexStats,
}

pub struct BundleAssembler<E> {
    config: BundleConfig,
    layout: BundleLayout,
    extractor: E,
    stage: Stage,
}

impl<E: Extractor> BundleAssembler<E> {
    pub fn new(config: BundleConfig, extractor: E) -> Self {
        let layout = config.layout();
        Self {
            config,
            layout,
            extractor,
            stage: Stage::Init,
        }
    }

    pub fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run every stage in order, stopping at the first failure.
    ///
    /// A failed run leaves whatever was already written on disk.
    pub fn run(&mut self) -> Result<BuildReport, AssembleError> {
        let result = self.run_stages();
        if let Err(error) = &result
            && !matches!(error, AssembleError::InvalidStage { .. })
        {
            self.stage = Stage::Failed;
        }
        result
    }

    fn run_stages(&mut self) -> Result<BuildReport, AssembleError> {
        self.expect_transition(Stage::Cleaned)?;
        clean_bundle(&self.layout.bundle_path).map_err(AssembleError::Clean)?;
        self.advance(Stage::Cleaned);

        self.expect_transition(Stage::Extracted)?;
        self.extract().map_err(AssembleError::Extraction)?;
        self.advance(Stage::Extracted);

        self.expect_transition(Stage::Indexed)?;
        let index = self.index().map_err(AssembleError::Index)?;
        self.advance(Stage::Indexed);

        self.expect_transition(Stage::ManifestWritten)?;
        let descriptor = self.descriptor();
        write_manifest(&self.layout.manifest_path, &descriptor)
            .map_err(AssembleError::Manifest)?;
        self.advance(Stage::ManifestWritten);

        self.advance(Stage::Done);
        Ok(BuildReport {
            bundle_path: normalize_path(&self.layout.bundle_path),
            content_path: normalize_path(&self.layout.content_path),
            database_path: normalize_path(&self.layout.database_path),
            manifest_path: normalize_path(&self.layout.manifest_path),
            bundle_identifier: descriptor.bundle_identifier,
            display_name: descriptor.display_name,
            platform_family: descriptor.platform_family,
            index,
        })
    }

    fn extract(&self) -> anyhow::Result<()> {
        let content_path = &self.layout.content_path;
        fs::create_dir_all(content_path)
            .with_context(|| format!("failed to create {}", content_path.display()))?;
        self.extractor
            .extract(&self.config.source_path, content_path)
    }

    fn index(&self) -> anyhow::Result<IndexStats> {
        let mut store = SqliteIndexStore::open(&self.layout.database_path)?;
        index_titles(&self.layout.content_path, &mut store)
    }

    fn descriptor(&self) -> ManifestDescriptor {
        ManifestDescriptor {
            bundle_identifier: self.layout.bundle_identifier.clone(),
            display_name: self.layout.basename.clone(),
            platform_family: self.config.platform.clone(),
        }
    }

    fn expect_transition(&self, target: Stage) -> Result<(), AssembleError> {
        if self.stage.can_transition_to(target) {
            Ok(())
        } else {
            Err(AssembleError::InvalidStage {
                from: self.stage,
                to: target,
            })
        }
    }

    fn advance(&mut self, target: Stage) {
        info!(
            from = %self.stage,
            to = %target,
            bundle = %self.layout.bundle_path.display(),
            "stage complete"
        );
        self.stage = target;
    }
}

/// Remove a previous bundle at `bundle_path`. A missing target is not an error.
pub fn clean_bundle(bundle_path: &Path) -> anyhow::Result<()> {
    let metadata = match fs::symlink_metadata(bundle_path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed to inspect {}", bundle_path.display()));
        }
    };
    if metadata.is_dir() {
        fs::remove_dir_all(bundle_path)
            .with_context(|| format!("failed to remove {}", bundle_path.display()))
    } else {
        fs::remove_file(bundle_path)
            .with_context(|| format!("failed to remove {}", bundle_path.display()))
    }
}
