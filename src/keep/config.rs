use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// Retry policy for individual artifact downloads.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            attempts: 3,
            retry_delay_ms: 1000,
            timeout_secs: 60,
        }
    }
}

/// Pacing for batch runs. The inter-item delay is `item_delay_ms` plus a
/// uniform random jitter in `0..=jitter_ms`.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub item_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            item_delay_ms: 1500,
            jitter_ms: 750,
        }
    }
}

/// How live videos count toward completeness. `Subset` accepts any present
/// subset of the expected pairings; `Exact` requires every expected pairing
/// and no stray live-video files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveVideoRule {
    Subset,
    Exact,
}

impl Default for LiveVideoRule {
    fn default() -> Self {
        LiveVideoRule::Subset
    }
}

impl LiveVideoRule {
    fn parse(text: &str) -> Option<LiveVideoRule> {
        match text {
            "subset" => Some(LiveVideoRule::Subset),
            "exact" => Some(LiveVideoRule::Exact),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeepConfig {
    pub fetch: FetchConfig,
    pub batch: BatchConfig,
    pub live_video_rule: LiveVideoRule,
    pub push_key: Option<String>,
    pub cookie: Option<String>,
}

impl Default for KeepConfig {
    fn default() -> Self {
        KeepConfig {
            fetch: FetchConfig::default(),
            batch: BatchConfig::default(),
            live_video_rule: LiveVideoRule::default(),
            push_key: None,
            cookie: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialFetchConfig {
    attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialBatchConfig {
    item_delay_ms: Option<u64>,
    jitter_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialKeepConfig {
    #[serde(default)]
    fetch: PartialFetchConfig,
    #[serde(default)]
    batch: PartialBatchConfig,
    live_video_rule: Option<LiveVideoRule>,
    push_key: Option<String>,
    cookie: Option<String>,
}

fn config_file_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os("NOTEKEEP_CONFIG_PATH") {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|h| h.join(".notekeep").join("notekeep.toml"))
}

fn env_or_u64(var: &str, current: u64) -> Result<u64> {
    match env::var(var) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<u64>()
            .with_context(|| format!("{var} must be an integer, got {raw:?}")),
        _ => Ok(current),
    }
}

fn env_or_u32(var: &str, current: u32) -> Result<u32> {
    match env::var(var) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<u32>()
            .with_context(|| format!("{var} must be an integer, got {raw:?}")),
        _ => Ok(current),
    }
}

fn env_or_opt_string(var: &str, current: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(raw) if !raw.is_empty() => Some(raw),
        _ => current,
    }
}

fn merge(base: KeepConfig, partial: PartialKeepConfig) -> KeepConfig {
    KeepConfig {
        fetch: FetchConfig {
            attempts: partial.fetch.attempts.unwrap_or(base.fetch.attempts),
            retry_delay_ms: partial.fetch.retry_delay_ms.unwrap_or(base.fetch.retry_delay_ms),
            timeout_secs: partial.fetch.timeout_secs.unwrap_or(base.fetch.timeout_secs),
        },
        batch: BatchConfig {
            item_delay_ms: partial.batch.item_delay_ms.unwrap_or(base.batch.item_delay_ms),
            jitter_ms: partial.batch.jitter_ms.unwrap_or(base.batch.jitter_ms),
        },
        live_video_rule: partial.live_video_rule.unwrap_or(base.live_video_rule),
        push_key: partial.push_key.or(base.push_key),
        cookie: partial.cookie.or(base.cookie),
    }
}

fn apply_env(mut cfg: KeepConfig) -> Result<KeepConfig> {
    cfg.fetch.attempts = env_or_u32("NOTEKEEP_FETCH_ATTEMPTS", cfg.fetch.attempts)?;
    cfg.fetch.retry_delay_ms = env_or_u64("NOTEKEEP_FETCH_RETRY_DELAY_MS", cfg.fetch.retry_delay_ms)?;
    cfg.fetch.timeout_secs = env_or_u64("NOTEKEEP_FETCH_TIMEOUT_SECS", cfg.fetch.timeout_secs)?;
    cfg.batch.item_delay_ms = env_or_u64("NOTEKEEP_ITEM_DELAY_MS", cfg.batch.item_delay_ms)?;
    cfg.batch.jitter_ms = env_or_u64("NOTEKEEP_ITEM_JITTER_MS", cfg.batch.jitter_ms)?;
    if let Ok(raw) = env::var("NOTEKEEP_LIVE_VIDEO_RULE")
        && !raw.is_empty()
    {
        cfg.live_video_rule = LiveVideoRule::parse(&raw)
            .with_context(|| format!("NOTEKEEP_LIVE_VIDEO_RULE must be subset or exact, got {raw:?}"))?;
    }
    cfg.push_key = env_or_opt_string("NOTEKEEP_PUSH_KEY", cfg.push_key);
    cfg.cookie = env_or_opt_string("NOTEKEEP_COOKIES", cfg.cookie);
    Ok(cfg)
}

fn validate(cfg: &KeepConfig) -> Result<()> {
    if cfg.fetch.attempts == 0 {
        bail!("fetch attempts must be at least 1");
    }
    if cfg.fetch.timeout_secs == 0 {
        bail!("fetch timeout must be at least 1 second");
    }
    Ok(())
}

/// Defaults, overlaid by the optional TOML config file, overlaid by
/// `NOTEKEEP_*` environment variables, then validated.
pub fn load_config() -> Result<KeepConfig> {
    let mut cfg = KeepConfig::default();

    if let Some(path) = config_file_path()
        && path.is_file()
    {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let partial: PartialKeepConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        cfg = merge(cfg, partial);
    }

    let cfg = apply_env(cfg)?;
    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_merges_over_defaults() {
        let partial: PartialKeepConfig = toml::from_str(
            r#"
            live_video_rule = "exact"

            [fetch]
            attempts = 5

            [batch]
            jitter_ms = 0
            "#,
        )
        .unwrap();
        let cfg = merge(KeepConfig::default(), partial);
        assert_eq!(cfg.fetch.attempts, 5);
        assert_eq!(cfg.fetch.retry_delay_ms, 1000);
        assert_eq!(cfg.batch.jitter_ms, 0);
        assert_eq!(cfg.batch.item_delay_ms, 1500);
        assert_eq!(cfg.live_video_rule, LiveVideoRule::Exact);
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut cfg = KeepConfig::default();
        cfg.fetch.attempts = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rule_parses_known_values_only() {
        assert_eq!(LiveVideoRule::parse("subset"), Some(LiveVideoRule::Subset));
        assert_eq!(LiveVideoRule::parse("exact"), Some(LiveVideoRule::Exact));
        assert_eq!(LiveVideoRule::parse("strict"), None);
    }
}
