use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

// configuration loader: parses yaml with defaults for every field

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,
    #[serde(default = "default_notifications")]
    pub notifications: bool,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub page: PageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_safety_poll_ms")]
    pub safety_poll_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PageConfig {
    #[serde(default = "default_hide_embeds")]
    pub hide_embeds: bool,
    #[serde(default)]
    pub extra_result_selectors: Vec<String>,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("blocked_domains.json")
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("dynamic_rules.json")
}

fn default_notifications() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_safety_poll_ms() -> u64 {
    5_000
}

fn default_hide_embeds() -> bool {
    true
}

impl Config {
    pub fn load(path: Option<PathBuf>) -> io::Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => {
                let default_path = Path::new("config.yaml");
                if default_path.exists() {
                    Self::from_path(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let cfg: Self = serde_yaml::from_str(&contents)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        Ok(cfg)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            rules_path: default_rules_path(),
            notifications: default_notifications(),
            scan: ScanConfig::default(),
            page: PageConfig::default(),
        }
    }
}

impl ScanConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn safety_poll(&self) -> Duration {
        Duration::from_millis(self.safety_poll_ms.max(1))
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            safety_poll_ms: default_safety_poll_ms(),
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            hide_embeds: default_hide_embeds(),
            extra_result_selectors: Vec::new(),
        }
    }
}
