use ai_service::DetectorConfig;
use anyhow::{bail, Context, Result};
use common::frame_extractor::FrameSampling;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Densities, defaults and sampling limits for crowd monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct CrowdConfig {
    /// People per square metre considered comfortable
    pub safe_density: f64,

    /// People per square metre that must not be exceeded
    pub max_density: f64,

    /// Venue area used when none (or a non-positive one) is supplied
    pub default_area_sqm: f64,

    /// Assess every Nth frame of a video
    pub frame_skip: u32,

    /// Longest stretch of a video that is analysed
    pub max_video_secs: u32,

    /// Frames wider than this are downscaled before detection
    pub frame_max_width: u32,

    /// Person detections below this confidence are not counted
    pub person_confidence: f32,
}

impl Default for CrowdConfig {
    fn default() -> Self {
        Self {
            safe_density: 0.4,
            max_density: 0.67,
            default_area_sqm: 500.0,
            frame_skip: 2,
            max_video_secs: 300,
            frame_max_width: 1280,
            person_confidence: 0.25,
        }
    }
}

impl CrowdConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            safe_density: parse_or(&lookup, "SAFE_DENSITY", defaults.safe_density)?,
            max_density: parse_or(&lookup, "MAX_DENSITY", defaults.max_density)?,
            default_area_sqm: parse_or(&lookup, "DEFAULT_VENUE_AREA", defaults.default_area_sqm)?,
            frame_skip: parse_or(&lookup, "FRAME_SKIP", defaults.frame_skip)?,
            max_video_secs: parse_or(&lookup, "MAX_VIDEO_LENGTH_SECS", defaults.max_video_secs)?,
            frame_max_width: parse_or(&lookup, "FRAME_MAX_WIDTH", defaults.frame_max_width)?,
            person_confidence: parse_or(
                &lookup,
                "PERSON_CONFIDENCE",
                defaults.person_confidence,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.safe_density.is_finite() && self.safe_density > 0.0) {
            bail!("SAFE_DENSITY must be a positive number, got {}", self.safe_density);
        }
        if !(self.max_density.is_finite() && self.max_density > 0.0) {
            bail!("MAX_DENSITY must be a positive number, got {}", self.max_density);
        }
        if self.safe_density > self.max_density {
            bail!(
                "SAFE_DENSITY ({}) must not exceed MAX_DENSITY ({})",
                self.safe_density,
                self.max_density
            );
        }
        if !(self.default_area_sqm.is_finite() && self.default_area_sqm > 0.0) {
            bail!(
                "DEFAULT_VENUE_AREA must be a positive number, got {}",
                self.default_area_sqm
            );
        }
        if self.frame_skip == 0 {
            bail!("FRAME_SKIP must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.person_confidence) {
            bail!(
                "PERSON_CONFIDENCE must be within 0.0..=1.0, got {}",
                self.person_confidence
            );
        }
        Ok(())
    }

    /// Frame sampling derived from the skip interval and video limits
    pub fn frame_sampling(&self) -> FrameSampling {
        FrameSampling {
            frame_interval: self.frame_skip,
            max_duration_secs: (self.max_video_secs > 0).then_some(self.max_video_secs),
            max_width: self.frame_max_width,
            ..FrameSampling::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Process-level settings for the alert-service binary
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub crowd: CrowdConfig,
    pub detector: DetectorConfig,

    /// Directory whose files may be submitted for video analysis;
    /// video analysis is disabled when unset
    pub video_root: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("CROWD_MONITOR_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8086".to_string())
            .parse()
            .context("Invalid CROWD_MONITOR_ADDR")?;

        Ok(Self {
            bind_addr,
            crowd: CrowdConfig::from_env()?,
            detector: DetectorConfig::from_env()?,
            video_root: video_root(env::var("VIDEO_ROOT").ok())?,
        })
    }
}

fn video_root(raw: Option<String>) -> Result<Option<PathBuf>> {
    let raw = match raw {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(None),
    };
    let root = PathBuf::from(raw.trim())
        .canonicalize()
        .with_context(|| format!("VIDEO_ROOT '{}' does not exist", raw))?;
    if !root.is_dir() {
        bail!("VIDEO_ROOT '{}' is not a directory", raw);
    }
    Ok(Some(root))
}
