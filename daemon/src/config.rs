use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Static daemon settings, read once at startup. The display parameters that
/// clients can change at runtime live in [`marquee::config::DisplayConfig`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub bind_address: IpAddr,
    /// Where the runtime display configuration is persisted.
    pub state_path: PathBuf,
    pub text_renderer: PathBuf,
    pub image_renderer: PathBuf,
    /// BDF font handed to the text renderer.
    pub font_path: PathBuf,
    /// Leave false unless the Pi's onboard sound is disabled.
    pub hardware_pulse: bool,
    pub max_upload_bytes: usize,
    pub debug_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            state_path: PathBuf::from("/var/lib/marquee/display.toml"),
            text_renderer: PathBuf::from("/usr/local/bin/text-scroller"),
            image_renderer: PathBuf::from("/usr/local/bin/led-image-viewer"),
            font_path: PathBuf::from("/usr/local/share/marquee/fonts/7x13.bdf"),
            hardware_pulse: false,
            max_upload_bytes: 16 * 1024 * 1024,
            debug_mode: false,
        }
    }
}

/// Reads the daemon settings. `Ok(None)` means there is no file at `path`;
/// a file that exists but does not parse is an error.
pub async fn parse_config(path: &Path) -> Result<Option<Config>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("reading config {}", path.display()));
        }
    };
    let config = toml::from_str(&contents)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(Some(config))
}
