/// End-to-end crowd monitoring: capacity, detection and alert escalation
use ai_service::DetectorConfig;
use alert_service::{estimate_capacity, AlertStatus, CrowdConfig, FrameMonitor};
use anyhow::Result;
use common::ai_tasks::VideoFrame;
use common::frame_extractor::ExtractedFrame;
use serde_json::json;

async fn mock_monitor(
    detector: serde_json::Value,
    config: CrowdConfig,
) -> Result<FrameMonitor> {
    let detector = DetectorConfig::mock(detector);
    let registry = detector.build_registry().await?;
    Ok(FrameMonitor::new(registry, detector.plugin_id, config))
}

#[tokio::test]
async fn test_crowd_growth_escalates_alerts() -> Result<()> {
    let config = CrowdConfig::default();
    // 25 m^2 -> safe 10, max 16
    let capacity = estimate_capacity(&config, Some(25.0));
    assert_eq!((capacity.safe_capacity, capacity.max_capacity), (10, 16));

    // People grow with the sequence: 6 + seq % 13
    let monitor = mock_monitor(json!({ "base_people": 6, "variation": 12 }), config).await?;

    let mut statuses = Vec::new();
    for sequence in 0..=12 {
        let frame = VideoFrame {
            source_id: "concourse".to_string(),
            timestamp: sequence * 40,
            sequence,
            width: 1920,
            height: 1080,
            format: "jpeg".to_string(),
            data: String::new(),
        };
        let assessment = monitor.assess_frame(&frame, &capacity).await;
        assert_eq!(assessment.count, 6 + sequence);
        statuses.push(assessment.alert.status);
    }

    assert_eq!(statuses[3], AlertStatus::Safe); // 9 people
    assert_eq!(statuses[4], AlertStatus::Warning); // 10 people
    assert_eq!(statuses[10], AlertStatus::Critical); // 16 people
    assert!(statuses.windows(2).all(|w| w[0] <= w[1]));

    Ok(())
}

#[tokio::test]
async fn test_sampled_frames_report() -> Result<()> {
    let config = CrowdConfig::default();
    let capacity = estimate_capacity(&config, None);
    let monitor =
        mock_monitor(json!({ "base_people": 150, "fail_every": 10 }), config).await?;

    let frames: Vec<ExtractedFrame> = (1..=5)
        .map(|i| ExtractedFrame {
            frame_number: i * 2,
            timestamp_ms: i * 80,
            width: 1280,
            height: 720,
            data: vec![0xff, 0xd8, 0xff, 0xd9],
        })
        .collect();

    let report = monitor
        .assess_frames("stadium.mp4", frames, Some(10), &capacity)
        .await;

    assert_eq!(report.frames_processed, 5);
    // Frame 10 fails and is counted as empty
    assert_eq!(report.detection_failures, 1);
    assert_eq!(report.timeline[4].count, 0);
    assert_eq!(report.peak_count, 150);
    assert_eq!(report.peak_status, Some(AlertStatus::Safe));
    assert_eq!(report.timeline[4].progress_percent, Some(100.0));

    Ok(())
}

/// Decodes a generated clip with ffmpeg; requires ffmpeg and ffprobe on PATH
#[tokio::test]
#[ignore]
async fn test_video_sampling_with_ffmpeg() -> Result<()> {
    use std::process::Command;

    let dir = tempfile::tempdir()?;
    let video = dir.path().join("crowd.mp4");

    // 2 seconds at 10 fps, wider than the 1280 px limit
    let output = Command::new("ffmpeg")
        .args([
            "-f",
            "lavfi",
            "-i",
            "testsrc=duration=2:size=1920x1080:rate=10",
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-pix_fmt",
            "yuv420p",
            "-y",
        ])
        .arg(&video)
        .output()?;
    assert!(output.status.success(), "ffmpeg failed to generate test video");

    let config = CrowdConfig::default();
    let capacity = estimate_capacity(&config, Some(500.0));
    let monitor = mock_monitor(json!({ "base_people": 250 }), config).await?;

    let report = monitor.assess_video(&video, &capacity).await?;

    // Every second frame of 20
    assert_eq!(report.frames_processed, 10);
    let numbers: Vec<u64> = report.timeline.iter().map(|f| f.sequence).collect();
    assert_eq!(numbers, (1..=10).map(|i| i * 2).collect::<Vec<_>>());
    assert!(report
        .timeline
        .iter()
        .all(|f| f.status == AlertStatus::Warning));
    assert_eq!(report.peak_status, Some(AlertStatus::Warning));

    Ok(())
}
