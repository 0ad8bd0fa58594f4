//! Translation of a [`DisplayIntent`] into a renderer command line.
//!
//! Nothing here spawns anything. The only side effect is reading the
//! filesystem to resolve media paths against the configured source directory,
//! which is the trust boundary for every client-supplied path.

use std::io;
use std::path::{Component, Path, PathBuf};

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use thiserror::Error;

use crate::config::DisplayConfig;
use crate::intent::DisplayIntent;
use crate::is_media_file_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// The scrolling text renderer.
    Text,
    /// The image/animation viewer.
    Image,
}

/// A renderer kind plus its exact argument list. Arguments are handed to the
/// process as-is; no shell ever sees them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RendererInvocation {
    kind: RendererKind,
    args: Vec<String>,
}

impl RendererInvocation {
    pub fn new(kind: RendererKind, args: Vec<String>) -> Self {
        Self { kind, args }
    }

    pub fn kind(&self) -> RendererKind {
        self.kind
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("text must not be empty")]
    EmptyText,
    #[error("speed must be a positive number, got {0}")]
    InvalidSpeed(f32),
    #[error("{0:?} is outside the media directory")]
    PathEscape(String),
    #[error("{0:?} does not exist")]
    NotFound(String),
    #[error("{0:?} is not a file")]
    NotAFile(String),
    #[error("{0:?} is not a directory")]
    NotADirectory(String),
    #[error("{0:?} contains no playable media")]
    EmptyDirectory(String),
    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("stop has no renderer invocation")]
    NoInvocation,
}

pub struct CommandBuilder {
    font_path: PathBuf,
    hardware_pulse: bool,
}

impl CommandBuilder {
    /// `hardware_pulse = false` adds `--led-no-hardware-pulse`, which is
    /// needed whenever the Pi's sound module is loaded.
    pub fn new(font_path: impl Into<PathBuf>, hardware_pulse: bool) -> Self {
        Self {
            font_path: font_path.into(),
            hardware_pulse,
        }
    }

    pub fn build(
        &self,
        intent: &DisplayIntent,
        config: &DisplayConfig,
    ) -> Result<RendererInvocation, BuildError> {
        self.build_with_rng(intent, config, &mut rand::thread_rng())
    }

    pub fn build_with_rng<R: Rng + ?Sized>(
        &self,
        intent: &DisplayIntent,
        config: &DisplayConfig,
        rng: &mut R,
    ) -> Result<RendererInvocation, BuildError> {
        match intent {
            DisplayIntent::Text {
                content,
                color,
                speed,
            } => {
                if content.trim().is_empty() {
                    return Err(BuildError::EmptyText);
                }
                if !speed.is_finite() || *speed <= 0.0 {
                    return Err(BuildError::InvalidSpeed(*speed));
                }
                let mut args = vec![
                    "-f".to_string(),
                    self.font_path.to_string_lossy().into_owned(),
                    "-C".to_string(),
                    color.to_string(),
                    "-s".to_string(),
                    speed.to_string(),
                ];
                args.extend(self.hardware_flags(config));
                // the text may itself start with '-'
                args.push("--".to_string());
                args.push(content.clone());
                Ok(RendererInvocation::new(RendererKind::Text, args))
            }
            DisplayIntent::SingleMedia { path } => {
                let resolved = resolve(&config.source_dir, path)?;
                if !resolved.is_file() {
                    return Err(BuildError::NotAFile(path.clone()));
                }
                let mut args = self.hardware_flags(config);
                if config.center {
                    args.push("-C".to_string());
                }
                args.push(resolved.to_string_lossy().into_owned());
                Ok(RendererInvocation::new(RendererKind::Image, args))
            }
            DisplayIntent::Folder { path, shuffled } => {
                let resolved = resolve(&config.source_dir, path)?;
                if !resolved.is_dir() {
                    return Err(BuildError::NotADirectory(path.clone()));
                }
                let mut files = media_files_in(&resolved)?;
                if files.is_empty() {
                    return Err(BuildError::EmptyDirectory(path.clone()));
                }

                let mut args = self.hardware_flags(config);
                if config.center {
                    args.push("-C".to_string());
                }
                args.push("-f".to_string());
                args.push(format!("-w{}", config.slide_seconds));
                if *shuffled {
                    // the viewer has no shuffle mode, so hand it an explicit order
                    files.shuffle(rng);
                    args.extend(files);
                } else {
                    args.push(format!("{}/*", resolved.to_string_lossy()));
                }
                Ok(RendererInvocation::new(RendererKind::Image, args))
            }
            DisplayIntent::Stop => Err(BuildError::NoInvocation),
        }
    }

    fn hardware_flags(&self, config: &DisplayConfig) -> Vec<String> {
        let mut flags = vec![
            format!("--led-rows={}", config.led_rows),
            format!("--led-cols={}", config.led_cols),
            format!("--led-chain={}", config.led_chain),
            format!("--led-gpio-mapping={}", config.gpio_mapping),
            format!("--led-slowdown-gpio={}", config.slowdown),
            format!("--led-brightness={}", config.brightness),
        ];
        if !self.hardware_pulse {
            flags.push("--led-no-hardware-pulse".to_string());
        }
        flags
    }
}

/// Resolves `relative` under `source_dir`, refusing anything that ends up
/// outside it. Absolute paths and `..` are rejected before touching the
/// filesystem; symlinks are caught by comparing canonical paths.
fn resolve(source_dir: &Path, relative: &str) -> Result<PathBuf, BuildError> {
    let requested = Path::new(relative);
    let escapes = requested.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(BuildError::PathEscape(relative.to_string()));
    }

    let root = std::fs::canonicalize(source_dir).map_err(|source| BuildError::Unreadable {
        path: source_dir.to_path_buf(),
        source,
    })?;
    let resolved = match std::fs::canonicalize(root.join(requested)) {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BuildError::NotFound(relative.to_string()));
        }
        Err(source) => {
            return Err(BuildError::Unreadable {
                path: root.join(requested),
                source,
            });
        }
    };
    if !resolved.starts_with(&root) {
        return Err(BuildError::PathEscape(relative.to_string()));
    }
    Ok(resolved)
}

/// Absolute paths of the playable regular files directly inside `dir`,
/// sorted by name.
fn media_files_in(dir: &Path) -> Result<Vec<String>, BuildError> {
    let unreadable = |source| BuildError::Unreadable {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if is_media_file_name(&name) && path.is_file() {
            files.push(path.to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}
