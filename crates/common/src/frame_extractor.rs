//! Frame extraction for uploaded crowd videos
//!
//! Decoding is delegated to FFmpeg. Frames are sampled at a fixed interval,
//! downscaled when wider than the configured limit and written to a scratch
//! directory that is removed once the frames are read back.

use anyhow::{Context, Result};
use base64::Engine;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, warn};

/// How frames are picked out of a video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSampling {
    /// Keep frames whose 1-based number is a multiple of this interval
    pub frame_interval: u32,

    /// Stop decoding after this many seconds of video
    pub max_duration_secs: Option<u32>,

    /// Frames wider than this are downscaled, keeping the aspect ratio
    pub max_width: u32,

    /// JPEG quality (2-31, lower is better)
    pub jpeg_quality: u32,
}

impl Default for FrameSampling {
    fn default() -> Self {
        Self {
            frame_interval: 2,
            max_duration_secs: Some(300),
            max_width: 1280,
            jpeg_quality: 2,
        }
    }
}

/// Basic stream properties reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    /// Average frame rate, 0.0 when unknown
    pub fps: f64,
    /// Number of frames when the container records it
    pub frame_count: Option<u64>,
    pub duration_secs: Option<f64>,
}

impl VideoProbe {
    /// Frame count from the container, or estimated from duration and rate
    pub fn estimated_frames(&self) -> Option<u64> {
        self.frame_count.or_else(|| {
            self.duration_secs
                .filter(|_| self.fps > 0.0)
                .map(|d| (d * self.fps).round() as u64)
        })
    }
}

/// A decoded frame kept by the sampler
#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    /// 1-based frame number in the source video
    pub frame_number: u64,

    /// Presentation time in milliseconds
    pub timestamp_ms: u64,

    pub width: u32,
    pub height: u32,

    /// JPEG bytes
    pub data: Vec<u8>,
}

/// Base64 encoding used for JSON frame transport
pub fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// ffmpeg input for a local file, pinned to the `file` protocol
pub fn local_file_uri(path: &Path) -> String {
    format!("file:{}", path.display())
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe dimensions, frame rate and length of a video source
pub fn probe_video(source_uri: &str) -> Result<VideoProbe> {
    debug!(source = %source_uri, "probing video");

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames:format=duration",
            "-of",
            "json",
            source_uri,
        ])
        .output()
        .context("failed to execute ffprobe")?;

    if !output.status.success() {
        anyhow::bail!("ffprobe failed: {:?}", output.status);
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(raw: &[u8]) -> Result<VideoProbe> {
    let parsed: ProbeOutput =
        serde_json::from_slice(raw).context("unexpected ffprobe output format")?;

    let stream = parsed
        .streams
        .into_iter()
        .next()
        .context("source has no video stream")?;

    let width = stream.width.context("ffprobe reported no width")?;
    let height = stream.height.context("ffprobe reported no height")?;
    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);
    let frame_count = stream.nb_frames.and_then(|n| n.parse::<u64>().ok());
    let duration_secs = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok());

    Ok(VideoProbe {
        width,
        height,
        fps,
        frame_count,
        duration_secs,
    })
}

/// Parse an ffprobe rational such as "30000/1001"
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.parse::<f64>().ok()?, d.parse::<f64>().ok()?),
        None => (rate.parse::<f64>().ok()?, 1.0),
    };

    if den == 0.0 || num <= 0.0 {
        return None;
    }

    Some(num / den)
}

/// Video filter selecting every Nth frame (1-based) and capping the width
fn sampling_filter(sampling: &FrameSampling) -> String {
    let interval = sampling.frame_interval.max(1);
    let mut filters = Vec::new();

    if interval > 1 {
        filters.push(format!("select=not(mod(n+1\\,{}))", interval));
    }
    if sampling.max_width > 0 {
        filters.push(format!("scale=min({}\\,iw):-2", sampling.max_width));
    }

    filters.join(",")
}

fn extraction_args(
    source_uri: &str,
    sampling: &FrameSampling,
    output_pattern: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        source_uri.to_string(),
    ];

    if let Some(limit) = sampling.max_duration_secs {
        args.push("-t".to_string());
        args.push(limit.to_string());
    }

    let filter = sampling_filter(sampling);
    if !filter.is_empty() {
        args.push("-vf".to_string());
        args.push(filter);
    }

    // Keep selected frames only instead of duplicating to fill gaps
    args.push("-vsync".to_string());
    args.push("vfr".to_string());

    args.push("-q:v".to_string());
    args.push(sampling.jpeg_quality.clamp(2, 31).to_string());

    args.push(output_pattern.to_string_lossy().into_owned());
    args
}

/// Probe result together with the sampled frames in playback order
#[derive(Debug)]
pub struct SampledVideo {
    pub probe: VideoProbe,
    pub frames: SampledFrames,
}

/// Frames decoded to a scratch directory, read back one at a time.
///
/// Each JPEG is loaded when the iterator reaches it and deleted from disk
/// once read, so memory holds a single frame regardless of video length.
/// The scratch directory is removed when the iterator is dropped.
#[derive(Debug)]
pub struct SampledFrames {
    scratch: tempfile::TempDir,
    files: std::vec::IntoIter<PathBuf>,
    position: u64,
    interval: u64,
    width: u32,
    height: u32,
    fps: f64,
}

impl SampledFrames {
    fn new(
        scratch: tempfile::TempDir,
        probe: &VideoProbe,
        sampling: &FrameSampling,
    ) -> Result<Self> {
        let files = sorted_frame_files(scratch.path())?;
        let (width, height) = scaled_dimensions(probe.width, probe.height, sampling.max_width);

        Ok(Self {
            scratch,
            files: files.into_iter(),
            position: 0,
            interval: sampling.frame_interval.max(1) as u64,
            width,
            height,
            fps: probe.fps,
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

impl Iterator for SampledFrames {
    type Item = Result<ExtractedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files.next()?;
        self.position += 1;
        let frame_number = self.position * self.interval;

        let frame = std::fs::read(&path)
            .with_context(|| format!("failed to read frame {}", path.display()))
            .map(|data| ExtractedFrame {
                frame_number,
                timestamp_ms: frame_timestamp_ms(frame_number, self.fps),
                width: self.width,
                height: self.height,
                data,
            });

        if let Err(e) = std::fs::remove_file(&path) {
            debug!(path = %path.display(), error = %e, "failed to remove sampled frame");
        }

        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.files.size_hint()
    }
}

impl ExactSizeIterator for SampledFrames {}

/// Decode `source_uri` and keep the frames selected by `sampling`
pub fn extract_sampled_frames(source_uri: &str, sampling: &FrameSampling) -> Result<SampledVideo> {
    let probe = probe_video(source_uri)?;
    let scratch = tempfile::Builder::new()
        .prefix("crowd-frames-")
        .tempdir()
        .context("failed to create frame scratch directory")?;

    let pattern = scratch.path().join("frame_%06d.jpg");
    let args = extraction_args(source_uri, sampling, &pattern);

    debug!(args = ?args, "spawning ffmpeg for frame sampling");

    let status = Command::new("ffmpeg")
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("failed to execute ffmpeg")?;

    if !status.success() {
        error!(source = %source_uri, status = ?status, "ffmpeg frame sampling failed");
        anyhow::bail!("ffmpeg exited with error: {:?}", status);
    }

    let frames = SampledFrames::new(scratch, &probe, sampling)?;
    if frames.len() == 0 {
        warn!(source = %source_uri, "ffmpeg produced no frames");
    }

    debug!(
        source = %source_uri,
        frames = frames.len(),
        interval = sampling.frame_interval,
        "frames sampled"
    );

    Ok(SampledVideo { probe, frames })
}

fn sorted_frame_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .context("failed to list sampled frames")?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "jpg"))
        .collect();
    files.sort();
    Ok(files)
}

/// Dimensions after the width cap, rounded to an even height like ffmpeg's `-2`
fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if max_width == 0 || width <= max_width || width == 0 {
        return (width, height);
    }

    let scaled = (height as f64 * max_width as f64 / width as f64).round() as u32;
    (max_width, scaled + scaled % 2)
}

fn frame_timestamp_ms(frame_number: u64, fps: f64) -> u64 {
    if fps <= 0.0 {
        return 0;
    }
    ((frame_number.saturating_sub(1)) as f64 / fps * 1000.0).round() as u64
}
