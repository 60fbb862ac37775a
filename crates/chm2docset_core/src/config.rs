use std::env;
use std::path::{Path, PathBuf};

use crate::paths::{BundleLayout, normalize_path};

pub const DEFAULT_PLATFORM: &str = "unknown";
pub const DEFAULT_OUT_DIR: &str = "./";
pub const DEFAULT_EXTRACTOR: &str = "extract_chmLib";
pub const EXTRACTOR_ENV_VAR: &str = "CHM2DOCSET_EXTRACTOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub platform: Option<String>,
    pub out_dir: Option<PathBuf>,
    pub extractor: Option<PathBuf>,
}

/// Immutable input for one conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleConfig {
    pub source_path: PathBuf,
    pub out_dir: PathBuf,
    pub platform: String,
    pub extractor: PathBuf,
    pub extractor_source: ValueSource,
}

impl BundleConfig {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self::resolve_with_lookup(source_path, &ConfigOverrides::default(), |_| None)
    }

    pub fn resolve(source_path: impl Into<PathBuf>, overrides: &ConfigOverrides) -> Self {
        Self::resolve_with_lookup(source_path, overrides, |key| env::var(key).ok())
    }

    fn resolve_with_lookup<F>(
        source_path: impl Into<PathBuf>,
        overrides: &ConfigOverrides,
        lookup_env: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let out_dir = overrides
            .out_dir
            .clone()
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR));
        let platform = overrides
            .platform
            .clone()
            .unwrap_or_else(|| DEFAULT_PLATFORM.to_string());

        let (extractor, extractor_source) = if let Some(path) = overrides.extractor.clone() {
            (path, ValueSource::Flag)
        } else if let Some(value) = lookup_env(EXTRACTOR_ENV_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            (PathBuf::from(value), ValueSource::Env)
        } else {
            (PathBuf::from(DEFAULT_EXTRACTOR), ValueSource::Default)
        };

        Self {
            source_path: source_path.into(),
            out_dir,
            platform,
            extractor,
            extractor_source,
        }
    }

    pub fn with_out_dir(mut self, out_dir: impl AsRef<Path>) -> Self {
        self.out_dir = out_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn layout(&self) -> BundleLayout {
        BundleLayout::resolve(&self.source_path, &self.out_dir)
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "out_dir={}\nplatform={}\nextractor={} ({})\n{}",
            normalize_path(&self.out_dir),
            self.platform,
            normalize_path(&self.extractor),
            self.extractor_source.as_str(),
            self.layout().diagnostics()
        )
    }
}
