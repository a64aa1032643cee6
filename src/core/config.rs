use std::path::{Path, PathBuf};

pub const ENV_PORT: &str = "BR_PORT";
pub const ENV_INSTANCE: &str = "BR_INSTANCE";
pub const ENV_HEADLESS: &str = "BR_HEADLESS";
pub const ENV_VIEWPORT_WIDTH: &str = "BR_VIEWPORT_WIDTH";
pub const ENV_VIEWPORT_HEIGHT: &str = "BR_VIEWPORT_HEIGHT";
pub const ENV_ADBLOCK: &str = "BR_ADBLOCK";
pub const ENV_ADBLOCK_BASE: &str = "BR_ADBLOCK_BASE";
pub const ENV_ADBLOCK_LISTS: &str = "BR_ADBLOCK_LISTS";
pub const ENV_HUMANLIKE: &str = "BR_HUMANLIKE";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

/// Lowest port the allocator hands out; the `default` instance prefers it.
pub const BASE_PORT: u16 = 3030;

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see `browser::driver::find_chrome_executable()`).
/// This function only returns a value when `CHROME_EXECUTABLE` is set to an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

fn env_trimmed(key: &str) -> Option<String> {
    let v = std::env::var(key).ok()?;
    let v = v.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let v = env_trimmed(key)?.to_ascii_lowercase();
    Some(!matches!(v.as_str(), "0" | "false" | "no" | "off"))
}

/// Ad-block base list selection. `AdsAndTrackers` is the default level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdblockBase {
    None,
    Ads,
    #[default]
    AdsAndTrackers,
    Full,
}

impl AdblockBase {
    pub fn parse_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "ads" => Some(Self::Ads),
            "adsandtrackers" => Some(Self::AdsAndTrackers),
            "full" => Some(Self::Full),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ads => "ads",
            Self::AdsAndTrackers => "adsandtrackers",
            Self::Full => "full",
        }
    }
}

/// Everything the daemon needs to know at launch, assembled from `BR_*`
/// environment variables (the CLI sets them when spawning a background
/// instance; a foreground run inherits whatever the shell exports).
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub instance: String,
    pub port: Option<u16>,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub adblock: bool,
    pub adblock_base: AdblockBase,
    pub adblock_lists: Vec<String>,
    pub humanlike: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            instance: "default".to_string(),
            port: None,
            headless: false,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            adblock: false,
            adblock_base: AdblockBase::default(),
            adblock_lists: Vec::new(),
            humanlike: false,
        }
    }
}

impl LaunchOptions {
    /// Read the full option set from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            instance: env_trimmed(ENV_INSTANCE).unwrap_or(defaults.instance),
            port: env_trimmed(ENV_PORT).and_then(|v| v.parse::<u16>().ok()),
            headless: env_bool(ENV_HEADLESS).unwrap_or(defaults.headless),
            viewport_width: env_trimmed(ENV_VIEWPORT_WIDTH)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.viewport_width),
            viewport_height: env_trimmed(ENV_VIEWPORT_HEIGHT)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.viewport_height),
            adblock: env_bool(ENV_ADBLOCK).unwrap_or(defaults.adblock),
            adblock_base: env_trimmed(ENV_ADBLOCK_BASE)
                .and_then(|v| AdblockBase::parse_str(&v))
                .unwrap_or(defaults.adblock_base),
            adblock_lists: env_trimmed(ENV_ADBLOCK_LISTS)
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            humanlike: env_bool(ENV_HUMANLIKE).unwrap_or(defaults.humanlike),
        }
    }

    /// Per-instance browser profile directory, fresh per daemon launch.
    /// Not cleaned on exit — the profile is useful for debugging.
    pub fn user_data_dir(&self) -> PathBuf {
        let epoch = chrono::Utc::now().timestamp();
        std::env::temp_dir()
            .join("br_profiles")
            .join(format!("{}-{}", self.instance, epoch))
    }
}

/// Directory for screenshots, PDFs, and downloads when the caller gives no path.
pub fn output_dir() -> PathBuf {
    std::env::temp_dir().join("br_cli")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adblock_base_parses_known_levels() {
        assert_eq!(AdblockBase::parse_str("none"), Some(AdblockBase::None));
        assert_eq!(AdblockBase::parse_str("ads"), Some(AdblockBase::Ads));
        assert_eq!(
            AdblockBase::parse_str("AdsAndTrackers"),
            Some(AdblockBase::AdsAndTrackers)
        );
        assert_eq!(AdblockBase::parse_str(" full "), Some(AdblockBase::Full));
        assert_eq!(AdblockBase::parse_str("aggressive"), None);
    }

    #[test]
    fn default_options_match_documented_defaults() {
        let opts = LaunchOptions::default();
        assert_eq!(opts.instance, "default");
        assert_eq!(opts.viewport_width, 1280);
        assert_eq!(opts.viewport_height, 720);
        assert_eq!(opts.adblock_base, AdblockBase::AdsAndTrackers);
        assert!(!opts.humanlike);
    }
}
