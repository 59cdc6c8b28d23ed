//! Runs person detection on frames and classifies the resulting counts
//!
//! A failed detection never aborts monitoring: the frame is counted as empty,
//! logged and still classified, so a video keeps producing assessments even
//! when individual frames cannot be decoded or the model errors.

use crate::config::CrowdConfig;
use crate::error::MonitorError;
use crate::rule_engine::evaluate_against;
use crate::types::{AlertResult, AlertStatus, CapacityEstimate};
use ai_service::PluginRegistry;
use common::ai_tasks::{Detection, VideoFrame, PERSON_CLASS};
use common::frame_extractor::{
    encode_base64, extract_sampled_frames, local_file_uri, ExtractedFrame, SampledVideo,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use telemetry::metrics::{
    CROWD_ALERTS, CROWD_CURRENT_COUNT, CROWD_DETECTION_FAILURES, CROWD_FRAMES_PROCESSED,
    CROWD_OCCUPANCY_PERCENT,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Decoded frames allowed in flight between the decoder and the detector
const FRAME_BUFFER: usize = 4;

/// Outcome of assessing one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAssessment {
    pub source_id: String,
    pub sequence: u64,
    pub timestamp: u64,

    /// People counted above the confidence threshold
    pub count: u64,

    /// False when detection failed and the count defaulted to 0
    pub detection_ok: bool,

    pub alert: AlertResult,

    /// Person detections that contributed to the count
    pub detections: Vec<Detection>,
}

/// Per-frame entry of a video report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub sequence: u64,
    pub timestamp: u64,
    pub count: u64,
    pub detection_ok: bool,
    pub status: AlertStatus,
    pub percentage: f64,

    /// Position within the source video, when its length is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
}

/// Summary of a monitored video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoReport {
    pub source: String,
    pub capacity: CapacityEstimate,

    /// Frames in the source, when the container reports it
    pub frames_total: Option<u64>,
    pub frames_processed: usize,
    pub detection_failures: usize,

    pub peak_count: u64,
    pub peak_status: Option<AlertStatus>,

    pub timeline: Vec<FrameSummary>,
}

impl VideoReport {
    fn new(source: &str, capacity: CapacityEstimate, frames_total: Option<u64>) -> Self {
        Self {
            source: source.to_string(),
            capacity,
            frames_total,
            frames_processed: 0,
            detection_failures: 0,
            peak_count: 0,
            peak_status: None,
            timeline: Vec::new(),
        }
    }

    fn record(&mut self, assessment: &FrameAssessment) {
        self.frames_processed += 1;
        if !assessment.detection_ok {
            self.detection_failures += 1;
        }
        self.peak_count = self.peak_count.max(assessment.count);
        self.peak_status = self.peak_status.max(Some(assessment.alert.status));
        self.timeline.push(FrameSummary {
            sequence: assessment.sequence,
            timestamp: assessment.timestamp,
            count: assessment.count,
            detection_ok: assessment.detection_ok,
            status: assessment.alert.status,
            percentage: assessment.alert.percentage,
            progress_percent: self
                .frames_total
                .map(|total| progress(assessment.sequence, total)),
        });
    }
}

/// Detector plus alert evaluation for frames and videos
pub struct FrameMonitor {
    registry: PluginRegistry,
    detector_id: String,
    config: CrowdConfig,
}

impl FrameMonitor {
    pub fn new(
        registry: PluginRegistry,
        detector_id: impl Into<String>,
        config: CrowdConfig,
    ) -> Self {
        Self {
            registry,
            detector_id: detector_id.into(),
            config,
        }
    }

    pub fn detector_id(&self) -> &str {
        &self.detector_id
    }

    pub fn config(&self) -> &CrowdConfig {
        &self.config
    }

    /// Count people in `frame` and classify the count against `capacity`
    pub async fn assess_frame(
        &self,
        frame: &VideoFrame,
        capacity: &CapacityEstimate,
    ) -> FrameAssessment {
        let (count, detections, detection_ok) = match self.detect_people(frame).await {
            Ok((count, detections)) => (count, detections, true),
            Err(e) => {
                warn!(
                    source = %frame.source_id,
                    sequence = frame.sequence,
                    plugin = %self.detector_id,
                    error = %e,
                    "detection failed, counting frame as empty"
                );
                CROWD_DETECTION_FAILURES
                    .with_label_values(&[self.detector_id.as_str()])
                    .inc();
                (0, Vec::new(), false)
            }
        };

        let alert = evaluate_against(count, capacity);

        CROWD_FRAMES_PROCESSED.inc();
        CROWD_CURRENT_COUNT.set(count.min(i64::MAX as u64) as i64);
        CROWD_OCCUPANCY_PERCENT.set(alert.percentage);
        CROWD_ALERTS.with_label_values(&[alert.status.as_str()]).inc();

        if alert.status.requires_action() {
            info!(
                source = %frame.source_id,
                sequence = frame.sequence,
                count,
                status = %alert.status,
                percentage = alert.percentage,
                actions = ?alert.highlighted_actions(3),
                "{}",
                alert.message
            );
        } else {
            debug!(
                source = %frame.source_id,
                sequence = frame.sequence,
                count,
                percentage = alert.percentage,
                "frame assessed"
            );
        }

        FrameAssessment {
            source_id: frame.source_id.clone(),
            sequence: frame.sequence,
            timestamp: frame.timestamp,
            count,
            detection_ok,
            alert,
            detections,
        }
    }

    /// Person tally and the detections behind it
    async fn detect_people(&self, frame: &VideoFrame) -> anyhow::Result<(u64, Vec<Detection>)> {
        let plugin = self.registry.get(&self.detector_id).await?;
        let mut result = plugin.read().await.process_frame(frame).await?;
        let min_confidence = self.config.person_confidence;

        let count = result.person_count(min_confidence) as u64;
        result.retain_class(PERSON_CLASS, min_confidence);
        Ok((count, result.detections))
    }

    /// Sample the video at `path` and assess every kept frame against `capacity`.
    ///
    /// Decoding runs on a blocking thread and hands frames over a bounded
    /// channel, so at most `FRAME_BUFFER` decoded frames are held at once.
    pub async fn assess_video(
        &self,
        path: &Path,
        capacity: &CapacityEstimate,
    ) -> Result<VideoReport, MonitorError> {
        let sampling = self.config.frame_sampling();
        let uri = local_file_uri(path);
        let source = path.display().to_string();
        let started = Instant::now();

        let (probe_tx, probe_rx) = oneshot::channel();
        let (frame_tx, mut frame_rx) = mpsc::channel::<ExtractedFrame>(FRAME_BUFFER);

        let extraction = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let SampledVideo { probe, frames } = extract_sampled_frames(&uri, &sampling)?;
            if probe_tx.send(probe).is_err() {
                return Ok(());
            }
            for frame in frames {
                // A closed receiver means the caller went away
                if frame_tx.blocking_send(frame?).is_err() {
                    break;
                }
            }
            Ok(())
        });

        let probe = match probe_rx.await {
            Ok(probe) => probe,
            Err(_) => {
                return Err(match extraction_outcome(extraction.await) {
                    Err(e) => e,
                    Ok(()) => MonitorError::Video("video could not be probed".to_string()),
                })
            }
        };

        info!(
            source = %source,
            width = probe.width,
            height = probe.height,
            fps = probe.fps,
            "video sampling started"
        );

        let mut report = VideoReport::new(&source, *capacity, probe.estimated_frames());
        while let Some(extracted) = frame_rx.recv().await {
            self.assess_sampled(&mut report, &source, extracted, capacity)
                .await;
        }
        extraction_outcome(extraction.await)?;

        info!(
            source = %source,
            frames = report.frames_processed,
            failures = report.detection_failures,
            peak_count = report.peak_count,
            peak_status = ?report.peak_status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "video assessed"
        );

        Ok(report)
    }

    /// Assess already extracted frames in order, one at a time
    pub async fn assess_frames<I>(
        &self,
        source: &str,
        frames: I,
        frames_total: Option<u64>,
        capacity: &CapacityEstimate,
    ) -> VideoReport
    where
        I: IntoIterator<Item = ExtractedFrame>,
    {
        let mut report = VideoReport::new(source, *capacity, frames_total);
        for extracted in frames {
            self.assess_sampled(&mut report, source, extracted, capacity)
                .await;
        }
        report
    }

    async fn assess_sampled(
        &self,
        report: &mut VideoReport,
        source: &str,
        extracted: ExtractedFrame,
        capacity: &CapacityEstimate,
    ) {
        let frame = VideoFrame {
            source_id: source.to_string(),
            timestamp: extracted.timestamp_ms,
            sequence: extracted.frame_number,
            width: extracted.width,
            height: extracted.height,
            format: "jpeg".to_string(),
            data: encode_base64(&extracted.data),
        };
        drop(extracted);

        let assessment = self.assess_frame(&frame, capacity).await;
        report.record(&assessment);
    }
}

fn extraction_outcome(joined: Result<anyhow::Result<()>, JoinError>) -> Result<(), MonitorError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(MonitorError::Video(format!("{:#}", e))),
        Err(e) => Err(MonitorError::Internal(anyhow::anyhow!(
            "frame extraction task failed: {}",
            e
        ))),
    }
}

fn progress(frame_number: u64, frames_total: u64) -> f64 {
    if frames_total == 0 {
        return 100.0;
    }
    (frame_number as f64 / frames_total as f64 * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_service::plugin::mock_detector::{MockDetectorConfig, MockDetectorPlugin};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    const MOCK_ID: &str = "mock_person_detector";

    async fn monitor_with(config: MockDetectorConfig) -> FrameMonitor {
        let registry = PluginRegistry::new();
        registry
            .register(Arc::new(RwLock::new(MockDetectorPlugin::with_config(config))))
            .await
            .unwrap();
        FrameMonitor::new(registry, MOCK_ID, CrowdConfig::default())
    }

    fn capacity(safe: u64, max: u64) -> CapacityEstimate {
        CapacityEstimate {
            area: 100.0,
            safe_capacity: safe,
            max_capacity: max,
        }
    }

    fn frame(sequence: u64) -> VideoFrame {
        VideoFrame {
            source_id: "gate-a".to_string(),
            timestamp: sequence * 33,
            sequence,
            width: 1280,
            height: 720,
            format: "jpeg".to_string(),
            data: String::new(),
        }
    }

    fn extracted(frame_number: u64) -> ExtractedFrame {
        ExtractedFrame {
            frame_number,
            timestamp_ms: frame_number * 40,
            width: 640,
            height: 360,
            data: vec![0xff, 0xd8, 0xff, 0xd9],
        }
    }

    #[tokio::test]
    async fn test_assess_frame_counts_people_only() {
        let monitor = monitor_with(MockDetectorConfig {
            base_people: 12,
            clutter: 3,
            ..MockDetectorConfig::default()
        })
        .await;

        let assessment = monitor.assess_frame(&frame(1), &capacity(10, 20)).await;
        assert_eq!(assessment.count, 12);
        assert!(assessment.detection_ok);
        assert_eq!(assessment.alert.status, AlertStatus::Warning);
        assert_eq!(assessment.detections.len(), 12);
        assert!(assessment.detections.iter().all(|d| d.class == PERSON_CLASS));
    }

    #[tokio::test]
    async fn test_failed_detection_counts_as_empty() {
        let monitor = monitor_with(MockDetectorConfig {
            fail_every: Some(1),
            ..MockDetectorConfig::default()
        })
        .await;

        let assessment = monitor.assess_frame(&frame(3), &capacity(200, 335)).await;
        assert_eq!(assessment.count, 0);
        assert!(!assessment.detection_ok);
        assert_eq!(assessment.alert.status, AlertStatus::Safe);
        assert_eq!(assessment.alert.percentage, 0.0);
    }

    #[tokio::test]
    async fn test_missing_detector_counts_as_empty() {
        let monitor = FrameMonitor::new(PluginRegistry::new(), "absent", CrowdConfig::default());

        let assessment = monitor.assess_frame(&frame(1), &capacity(0, 0)).await;
        assert_eq!(assessment.count, 0);
        assert!(!assessment.detection_ok);
        // Zero capacity is critical even for an empty frame
        assert_eq!(assessment.alert.status, AlertStatus::Critical);
    }

    #[tokio::test]
    async fn test_confidence_threshold_applied() {
        let registry = PluginRegistry::new();
        registry
            .register(Arc::new(RwLock::new(MockDetectorPlugin::with_config(
                MockDetectorConfig {
                    base_people: 14,
                    clutter: 0,
                    ..MockDetectorConfig::default()
                },
            ))))
            .await
            .unwrap();

        // Mock confidences cycle 0.30..0.95 in 0.05 steps
        let strict = CrowdConfig {
            person_confidence: 0.9,
            ..CrowdConfig::default()
        };
        let monitor = FrameMonitor::new(registry, MOCK_ID, strict);

        let assessment = monitor.assess_frame(&frame(0), &capacity(100, 200)).await;
        assert!(assessment.count < 14);
        assert_eq!(assessment.count as usize, assessment.detections.len());
        assert!(assessment.detections.iter().all(|d| d.confidence >= 0.9));
    }

    #[tokio::test]
    async fn test_assess_frames_builds_report() {
        let monitor = monitor_with(MockDetectorConfig {
            base_people: 8,
            variation: 4,
            fail_every: Some(6),
            ..MockDetectorConfig::default()
        })
        .await;

        let frames = vec![extracted(2), extracted(4), extracted(6), extracted(8)];
        let report = monitor
            .assess_frames("clip.mp4", frames, Some(8), &capacity(10, 12))
            .await;

        assert_eq!(report.frames_processed, 4);
        assert_eq!(report.detection_failures, 1);

        let counts: Vec<u64> = report.timeline.iter().map(|f| f.count).collect();
        // 8 + seq % 5 for seq 2, 4, 8 and a failure on 6
        assert_eq!(counts, vec![10, 12, 0, 11]);
        assert_eq!(report.peak_count, 12);
        assert_eq!(report.peak_status, Some(AlertStatus::Critical));
        assert!(!report.timeline[2].detection_ok);

        let progress: Vec<Option<f64>> =
            report.timeline.iter().map(|f| f.progress_percent).collect();
        assert_eq!(progress, vec![Some(25.0), Some(50.0), Some(75.0), Some(100.0)]);
    }

    #[tokio::test]
    async fn test_long_video_keeps_no_frame_data() {
        let monitor = monitor_with(MockDetectorConfig {
            base_people: 40,
            ..MockDetectorConfig::default()
        })
        .await;

        // 300 frames of 64 KiB each, produced lazily
        let frames = (1..=300u64).map(|i| ExtractedFrame {
            frame_number: i * 2,
            timestamp_ms: i * 80,
            width: 1280,
            height: 720,
            data: vec![0xAB; 64 * 1024],
        });

        let report = monitor
            .assess_frames("long.mp4", frames, Some(600), &capacity(200, 335))
            .await;
        assert_eq!(report.frames_processed, 300);
        assert_eq!(report.timeline.len(), 300);
        assert_eq!(report.peak_count, 40);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.len() < 300 * 512, "report is {} bytes", json.len());
        assert!(!json.contains("detections"));
        assert!(!json.contains("\"data\""));
    }

    #[tokio::test]
    async fn test_empty_video_report() {
        let monitor = monitor_with(MockDetectorConfig::default()).await;
        let report = monitor
            .assess_frames("empty.mp4", Vec::new(), None, &capacity(200, 335))
            .await;

        assert_eq!(report.frames_processed, 0);
        assert_eq!(report.peak_count, 0);
        assert_eq!(report.peak_status, None);
    }

    #[tokio::test]
    async fn test_unreadable_video_is_video_error() {
        let monitor = monitor_with(MockDetectorConfig::default()).await;
        let result = monitor
            .assess_video(Path::new("/nonexistent/crowd-video.mp4"), &capacity(200, 335))
            .await;

        assert!(matches!(result, Err(MonitorError::Video(_))));
    }

    #[tokio::test]
    async fn test_extraction_outcome_mapping() {
        assert!(extraction_outcome(Ok(Ok(()))).is_ok());

        let failed = extraction_outcome(Ok(Err(anyhow::anyhow!("ffmpeg exited"))));
        assert!(matches!(failed, Err(MonitorError::Video(m)) if m == "ffmpeg exited"));

        let panicked = tokio::task::spawn_blocking(|| -> anyhow::Result<()> {
            panic!("decoder crashed")
        })
        .await;
        assert!(matches!(
            extraction_outcome(panicked),
            Err(MonitorError::Internal(_))
        ));
    }

    #[test]
    fn test_progress_is_capped() {
        assert_eq!(progress(50, 100), 50.0);
        assert_eq!(progress(120, 100), 100.0);
        assert_eq!(progress(3, 0), 100.0);
    }
}
