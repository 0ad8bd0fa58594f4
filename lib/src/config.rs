//! Persisted display configuration.
//!
//! The [`ConfigStore`] owns the single [`DisplayConfig`] of the process. Loading
//! is forgiving (anything unreadable falls back to defaults), updates are
//! strictly validated and written back to disk after every change.

use std::fmt;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const BRIGHTNESS_RANGE: RangeInclusive<i64> = 0..=100;
pub const SLOWDOWN_RANGE: RangeInclusive<i64> = -1..=4;
pub const LED_ROWS_RANGE: RangeInclusive<i64> = 1..=256;
pub const LED_COLS_RANGE: RangeInclusive<i64> = 1..=256;
pub const LED_CHAIN_RANGE: RangeInclusive<i64> = 1..=16;
pub const SLIDE_SECONDS_RANGE: RangeInclusive<i64> = 1..=3600;

/// Wiring profiles understood by the renderers' `--led-gpio-mapping` flag.
pub const GPIO_MAPPINGS: &[&str] = &[
    "regular",
    "regular-pi1",
    "adafruit-hat",
    "adafruit-hat-pwm",
    "classic",
    "classic-pi1",
    "compute-module",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub brightness: u8,
    pub slowdown: i8,
    pub led_rows: u16,
    pub led_cols: u16,
    pub led_chain: u8,
    pub gpio_mapping: String,
    pub source_dir: PathBuf,
    pub slide_seconds: u32,
    /// Whether media is centered on the panel (the viewer's `-C` flag).
    pub center: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            brightness: 100,
            slowdown: 3,
            led_rows: 32,
            led_cols: 128,
            led_chain: 2,
            gpio_mapping: "adafruit-hat".into(),
            source_dir: PathBuf::from("/var/lib/marquee/media"),
            slide_seconds: 10,
            center: true,
        }
    }
}

impl DisplayConfig {
    /// Replaces every out-of-range field with its default. Used on load, where
    /// a hand-edited file must not put the store outside its invariants.
    fn sanitize(mut self) -> Self {
        let defaults = Self::default();
        let checks: [(ConfigField, i64); 6] = [
            (ConfigField::Brightness, self.brightness.into()),
            (ConfigField::Slowdown, self.slowdown.into()),
            (ConfigField::LedRows, self.led_rows.into()),
            (ConfigField::LedCols, self.led_cols.into()),
            (ConfigField::LedChain, self.led_chain.into()),
            (ConfigField::SlideSeconds, self.slide_seconds.into()),
        ];
        for (field, value) in checks {
            let Some(range) = field.range() else { continue };
            if range.contains(&value) {
                continue;
            }
            warn!("persisted {field}={value} is out of range, using default");
            match field {
                ConfigField::Brightness => self.brightness = defaults.brightness,
                ConfigField::Slowdown => self.slowdown = defaults.slowdown,
                ConfigField::LedRows => self.led_rows = defaults.led_rows,
                ConfigField::LedCols => self.led_cols = defaults.led_cols,
                ConfigField::LedChain => self.led_chain = defaults.led_chain,
                ConfigField::SlideSeconds => self.slide_seconds = defaults.slide_seconds,
                ConfigField::GpioMapping | ConfigField::SourceDir | ConfigField::Center => {}
            }
        }
        if !GPIO_MAPPINGS.contains(&self.gpio_mapping.as_str()) {
            warn!(
                "persisted gpio_mapping {:?} is unknown, using default",
                self.gpio_mapping
            );
            self.gpio_mapping = defaults.gpio_mapping;
        }
        self
    }
}

/// A single updatable field of [`DisplayConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Brightness,
    Slowdown,
    LedRows,
    LedCols,
    LedChain,
    GpioMapping,
    SourceDir,
    SlideSeconds,
    Center,
}

impl ConfigField {
    pub const ALL: [ConfigField; 9] = [
        ConfigField::Brightness,
        ConfigField::Slowdown,
        ConfigField::LedRows,
        ConfigField::LedCols,
        ConfigField::LedChain,
        ConfigField::GpioMapping,
        ConfigField::SourceDir,
        ConfigField::SlideSeconds,
        ConfigField::Center,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigField::Brightness => "brightness",
            ConfigField::Slowdown => "slowdown",
            ConfigField::LedRows => "led-rows",
            ConfigField::LedCols => "led-cols",
            ConfigField::LedChain => "led-chain",
            ConfigField::GpioMapping => "gpio-mapping",
            ConfigField::SourceDir => "source-dir",
            ConfigField::SlideSeconds => "slide-seconds",
            ConfigField::Center => "center",
        }
    }

    /// The accepted range for integer fields, `None` for the others.
    pub fn range(self) -> Option<RangeInclusive<i64>> {
        match self {
            ConfigField::Brightness => Some(BRIGHTNESS_RANGE),
            ConfigField::Slowdown => Some(SLOWDOWN_RANGE),
            ConfigField::LedRows => Some(LED_ROWS_RANGE),
            ConfigField::LedCols => Some(LED_COLS_RANGE),
            ConfigField::LedChain => Some(LED_CHAIN_RANGE),
            ConfigField::SlideSeconds => Some(SLIDE_SECONDS_RANGE),
            ConfigField::GpioMapping | ConfigField::SourceDir | ConfigField::Center => None,
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown config field {0:?}")]
pub struct UnknownField(pub String);

impl FromStr for ConfigField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigField::ALL
            .into_iter()
            .find(|field| field.as_str() == s || field.as_str().replace('-', "_") == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be between {} and {}, got {value}", .range.start(), .range.end())]
    OutOfRange {
        field: ConfigField,
        value: i64,
        range: RangeInclusive<i64>,
    },
    #[error("{field} must be {expected}")]
    InvalidType {
        field: ConfigField,
        expected: &'static str,
    },
    #[error("unknown gpio mapping {0:?}")]
    UnknownGpioMapping(String),
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("config updated but could not be saved to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// True for errors caused by the caller's input rather than the device.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ConfigError::Persist { .. })
    }
}

pub struct ConfigStore {
    path: PathBuf,
    current: Mutex<DisplayConfig>,
}

impl ConfigStore {
    /// Loads the persisted config from `path`, falling back to defaults if
    /// the file is missing or cannot be parsed.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<DisplayConfig>(&contents) {
                Ok(config) => config.sanitize(),
                Err(e) => {
                    warn!(
                        "display config at {} is corrupt, using defaults: {e}",
                        path.display()
                    );
                    DisplayConfig::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "no display config at {}, using defaults",
                    path.display()
                );
                DisplayConfig::default()
            }
            Err(e) => {
                warn!(
                    "failed to read display config at {}, using defaults: {e}",
                    path.display()
                );
                DisplayConfig::default()
            }
        };
        Self {
            path,
            current: Mutex::new(config),
        }
    }

    pub fn snapshot(&self) -> DisplayConfig {
        self.lock().clone()
    }

    /// Validates `value` for `field`, applies it and writes the full config
    /// to disk.
    ///
    /// On a validation error nothing changes. On [`ConfigError::Persist`] the
    /// new value is already live in memory; only durability is degraded.
    pub fn update(&self, field: ConfigField, value: Value) -> Result<DisplayConfig, ConfigError> {
        let mut current = self.lock();
        let mut next = current.clone();
        apply(&mut next, field, &value)?;
        *current = next.clone();
        info!("display config {field} updated");

        if let Err(source) = persist(&self.path, &next) {
            warn!(
                "failed to persist display config to {}: {source}",
                self.path.display()
            );
            return Err(ConfigError::Persist {
                path: self.path.clone(),
                source,
            });
        }
        Ok(next)
    }

    fn lock(&self) -> MutexGuard<'_, DisplayConfig> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn integer(field: ConfigField, value: &Value) -> Result<i64, ConfigError> {
    let n = value.as_i64().ok_or(ConfigError::InvalidType {
        field,
        expected: "an integer",
    })?;
    if let Some(range) = field.range()
        && !range.contains(&n)
    {
        return Err(ConfigError::OutOfRange {
            field,
            value: n,
            range,
        });
    }
    Ok(n)
}

fn string(field: ConfigField, value: &Value) -> Result<&str, ConfigError> {
    value.as_str().ok_or(ConfigError::InvalidType {
        field,
        expected: "a string",
    })
}

// The casts below cannot truncate: `integer` has already checked the value
// against a range that fits the target type.
fn apply(config: &mut DisplayConfig, field: ConfigField, value: &Value) -> Result<(), ConfigError> {
    match field {
        ConfigField::Brightness => config.brightness = integer(field, value)? as u8,
        ConfigField::Slowdown => config.slowdown = integer(field, value)? as i8,
        ConfigField::LedRows => config.led_rows = integer(field, value)? as u16,
        ConfigField::LedCols => config.led_cols = integer(field, value)? as u16,
        ConfigField::LedChain => config.led_chain = integer(field, value)? as u8,
        ConfigField::SlideSeconds => config.slide_seconds = integer(field, value)? as u32,
        ConfigField::Center => {
            config.center = value.as_bool().ok_or(ConfigError::InvalidType {
                field,
                expected: "a boolean",
            })?;
        }
        ConfigField::GpioMapping => {
            let mapping = string(field, value)?;
            if !GPIO_MAPPINGS.contains(&mapping) {
                return Err(ConfigError::UnknownGpioMapping(mapping.to_string()));
            }
            config.gpio_mapping = mapping.to_string();
        }
        ConfigField::SourceDir => {
            let requested = PathBuf::from(string(field, value)?);
            let resolved = std::fs::canonicalize(&requested)
                .ok()
                .filter(|p| p.is_dir())
                .ok_or(ConfigError::NotADirectory(requested))?;
            config.source_dir = resolved;
        }
    }
    Ok(())
}

/// Writes the config next to its final location and renames it into place,
/// so readers never observe a partially written file.
fn persist(path: &Path, config: &DisplayConfig) -> std::io::Result<()> {
    let contents = toml::to_string(config).map_err(std::io::Error::other)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
