use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::IncantError;

const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024; // 64 KiB

/// Runtime configuration. Missing keys take the documented defaults, so an
/// empty TOML document is a valid config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub preferences: Preferences,
    pub safety: SafetyLimits,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Require confirmation even for safe (non-destructive) commands.
    pub confirm_by_default: bool,
    /// Directories commands may target. Paths outside this set are blocked.
    pub allowed_directories: Vec<PathBuf>,
    /// Route file deletions to the trash directory instead of `rm`.
    pub trash_instead_of_delete: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetyLimits {
    /// Wall-clock timeout for a single command, in seconds.
    pub timeout_seconds: u64,
    /// Cap on captured output, as a size string ("1MB", "512KB", "4096").
    pub max_output_size: SizeSpec,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferences: Preferences::default(),
            safety: SafetyLimits::default(),
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));
        Self {
            confirm_by_default: true,
            allowed_directories: vec![home],
            trash_instead_of_delete: true,
        }
    }
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_output_size: SizeSpec(1024 * 1024),
        }
    }
}

impl FromStr for Config {
    type Err = IncantError;

    fn from_str(content: &str) -> Result<Self, IncantError> {
        toml::from_str(content).map_err(|e| IncantError::ConfigLoad(e.to_string()))
    }
}

impl Config {
    /// Load a config from a TOML file. Checks file size before reading.
    pub fn load(path: &Path) -> Result<Self, IncantError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| IncantError::ConfigLoad(format!("cannot read {}: {e}", path.display())))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(IncantError::ConfigLoad(format!(
                "config file exceeds {MAX_CONFIG_FILE_SIZE} byte limit"
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| IncantError::ConfigLoad(format!("cannot read {}: {e}", path.display())))?;

        content.parse()
    }
}

/// A byte count parsed from a human size string. Bare numbers are bytes;
/// `KB`/`MB`/`GB` suffixes (case-insensitive, optional `B`) scale by 1024.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSpec(pub u64);

impl SizeSpec {
    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl FromStr for SizeSpec {
    type Err = IncantError;

    fn from_str(s: &str) -> Result<Self, IncantError> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (digits, suffix) = s.split_at(split);
        let value: u64 = digits
            .parse()
            .map_err(|_| IncantError::ConfigLoad(format!("invalid size string: {s:?}")))?;
        let multiplier = match suffix.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "K" | "KB" => 1024,
            "M" | "MB" => 1024 * 1024,
            "G" | "GB" => 1024 * 1024 * 1024,
            other => {
                return Err(IncantError::ConfigLoad(format!(
                    "unknown size unit {other:?} in {s:?}"
                )));
            }
        };
        value
            .checked_mul(multiplier)
            .map(SizeSpec)
            .ok_or_else(|| IncantError::ConfigLoad(format!("size overflows: {s:?}")))
    }
}

impl<'de> Deserialize<'de> for SizeSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = SizeSpec;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a size string like \"1MB\" or a byte count")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<SizeSpec, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<SizeSpec, E> {
                Ok(SizeSpec(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<SizeSpec, E> {
                u64::try_from(v)
                    .map(SizeSpec)
                    .map_err(|_| E::custom("size must be non-negative"))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_takes_defaults() {
        let config = Config::from_str("").expect("empty config should parse");
        assert!(config.preferences.confirm_by_default);
        assert!(config.preferences.trash_instead_of_delete);
        assert_eq!(config.safety.timeout_seconds, 30);
        assert_eq!(config.safety.max_output_size.bytes(), 1024 * 1024);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let toml = r#"
[preferences]
confirm_by_default = false
allowed_directories = ["/srv/data", "/tmp"]
"#;
        let config = Config::from_str(toml).expect("should parse");
        assert!(!config.preferences.confirm_by_default);
        assert_eq!(
            config.preferences.allowed_directories,
            vec![PathBuf::from("/srv/data"), PathBuf::from("/tmp")]
        );
        assert_eq!(config.safety.timeout_seconds, 30);
    }

    #[test]
    fn size_strings() {
        let config = Config::from_str("[safety]\nmax_output_size = \"512KB\"\n").unwrap();
        assert_eq!(config.safety.max_output_size.bytes(), 512 * 1024);

        assert_eq!("4096".parse::<SizeSpec>().unwrap().bytes(), 4096);
        assert_eq!("2M".parse::<SizeSpec>().unwrap().bytes(), 2 * 1024 * 1024);
        assert_eq!("1gb".parse::<SizeSpec>().unwrap().bytes(), 1 << 30);
        assert!("lots".parse::<SizeSpec>().is_err());
        assert!("10parsecs".parse::<SizeSpec>().is_err());
        assert!("18446744073709551615GB".parse::<SizeSpec>().is_err());
    }

    #[test]
    fn numeric_output_size() {
        let config = Config::from_str("[safety]\nmax_output_size = 2048\n").unwrap();
        assert_eq!(config.safety.max_output_size.bytes(), 2048);
    }

    #[test]
    fn oversized_file_rejected() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![b'#'; (MAX_CONFIG_FILE_SIZE + 1) as usize])
            .unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, IncantError::ConfigLoad(_)));
    }
}
