//! Runtime table of bundled firmware images, keyed by hardware variant.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::protocol::DeviceType;

/// One `[[firmware]]` entry of the session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareEntry {
    /// Hardware variant the image is built for.
    pub variant: DeviceType,
    /// Firmware version the image contains.
    pub version: u16,
    /// Raw image file.
    pub path: PathBuf,
}

/// Immutable firmware image plus its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    version: u16,
    data: Arc<[u8]>,
}

impl FirmwareImage {
    pub fn new(version: u16, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            version,
            data: data.into(),
        }
    }

    /// Load a raw image file.
    pub fn from_file<P: AsRef<Path>>(path: P, version: u16) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .with_context(|| format!("reading firmware image {}", path.display()))?;
        if u32::try_from(data.len()).is_err() {
            bail!("firmware image {} is too large", path.display());
        }
        Ok(Self::new(version, data))
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Firmware images available for update, at most one per variant.
#[derive(Debug, Clone, Default)]
pub struct FirmwareRegistry {
    images: BTreeMap<DeviceType, FirmwareImage>,
}

impl FirmwareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every configured image from disk.
    pub fn from_config(entries: &[FirmwareEntry]) -> Result<Self> {
        let mut registry = Self::new();
        for entry in entries {
            info!(
                variant = %entry.variant,
                version = entry.version,
                path = %entry.path.display(),
                "Loading firmware image"
            );
            let image = FirmwareImage::from_file(&entry.path, entry.version)?;
            if registry.insert(entry.variant, image).is_some() {
                bail!("duplicate firmware entry for {}", entry.variant);
            }
        }
        Ok(registry)
    }

    /// Register an image, returning the one it replaces.
    pub fn insert(&mut self, variant: DeviceType, image: FirmwareImage) -> Option<FirmwareImage> {
        self.images.insert(variant, image)
    }

    pub fn get(&self, variant: DeviceType) -> Option<&FirmwareImage> {
        self.images.get(&variant)
    }

    pub fn variants(&self) -> impl Iterator<Item = DeviceType> + '_ {
        self.images.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// True iff an image is registered for `variant` and is newer than
    /// `device_version`.
    pub fn is_newer_than(&self, variant: DeviceType, device_version: u16) -> bool {
        self.get(variant)
            .is_some_and(|image| device_version < image.version())
    }
}
