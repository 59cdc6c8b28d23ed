/// Deterministic person detector for tests, demos and model-less deployments
use super::AiPlugin;
use anyhow::{bail, Result};
use async_trait::async_trait;
use common::ai_tasks::{AiResult, BoundingBox, Detection, VideoFrame, PERSON_CLASS};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockDetectorConfig {
    /// People reported on every frame
    #[serde(default = "default_base_people")]
    pub base_people: usize,

    /// Extra people added as `sequence % (variation + 1)`
    #[serde(default)]
    pub variation: usize,

    /// Non-person detections mixed into every frame
    #[serde(default = "default_clutter")]
    pub clutter: usize,

    /// Fail detection on frames whose sequence is a multiple of this
    #[serde(default)]
    pub fail_every: Option<u64>,

    /// Simulate processing delay in milliseconds
    #[serde(default)]
    pub simulated_delay_ms: u64,
}

fn default_base_people() -> usize {
    12
}

fn default_clutter() -> usize {
    2
}

impl Default for MockDetectorConfig {
    fn default() -> Self {
        Self {
            base_people: default_base_people(),
            variation: 0,
            clutter: default_clutter(),
            fail_every: None,
            simulated_delay_ms: 0,
        }
    }
}

const CLUTTER_CLASSES: [&str; 3] = ["backpack", "bicycle", "handbag"];

/// Mock person detector
pub struct MockDetectorPlugin {
    config: MockDetectorConfig,
}

impl MockDetectorPlugin {
    pub fn new() -> Self {
        Self {
            config: MockDetectorConfig::default(),
        }
    }

    pub fn with_config(config: MockDetectorConfig) -> Self {
        Self { config }
    }

    /// People the detector reports for a given frame sequence
    pub fn people_for(&self, sequence: u64) -> usize {
        let extra = sequence % (self.config.variation as u64 + 1);
        self.config.base_people + extra as usize
    }

    /// Lay detections out on a grid so boxes never overlap
    fn grid_box(index: usize, frame: &VideoFrame) -> BoundingBox {
        let cell_w = (frame.width / 16).max(1);
        let cell_h = (frame.height / 9).max(1);
        let col = (index % 16) as u32;
        let row = ((index / 16) % 9) as u32;

        BoundingBox {
            x: col * cell_w,
            y: row * cell_h,
            width: (cell_w * 3 / 4).max(1),
            height: (cell_h * 3 / 4).max(1),
        }
    }
}

impl Default for MockDetectorPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AiPlugin for MockDetectorPlugin {
    fn id(&self) -> &'static str {
        "mock_person_detector"
    }

    fn name(&self) -> &'static str {
        "Mock Person Detector"
    }

    fn description(&self) -> &'static str {
        "Deterministic person detections derived from the frame sequence"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn config_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "base_people": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 12,
                    "description": "People reported on every frame"
                },
                "variation": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 0,
                    "description": "Extra people added as sequence % (variation + 1)"
                },
                "clutter": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 2,
                    "description": "Non-person detections per frame"
                },
                "fail_every": {
                    "type": ["integer", "null"],
                    "minimum": 1,
                    "description": "Fail frames whose sequence is a multiple of this"
                },
                "simulated_delay_ms": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 0,
                    "description": "Simulated processing delay in milliseconds"
                }
            }
        }))
    }

    fn supported_formats(&self) -> Vec<String> {
        vec!["jpeg".to_string(), "png".to_string(), "raw".to_string()]
    }

    async fn init(&mut self, config: serde_json::Value) -> Result<()> {
        if !config.is_null() {
            self.config = serde_json::from_value(config)?;
        }
        tracing::info!(
            base_people = self.config.base_people,
            variation = self.config.variation,
            fail_every = ?self.config.fail_every,
            "initialized mock person detector"
        );
        Ok(())
    }

    async fn process_frame(&self, frame: &VideoFrame) -> Result<AiResult> {
        let start = std::time::Instant::now();

        if self.config.simulated_delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(
                self.config.simulated_delay_ms,
            ))
            .await;
        }

        if let Some(every) = self.config.fail_every.filter(|n| *n > 0) {
            if frame.sequence % every == 0 {
                bail!("simulated detection failure on frame {}", frame.sequence);
            }
        }

        let people = self.people_for(frame.sequence);
        let mut detections = Vec::with_capacity(people + self.config.clutter);

        for i in 0..people {
            // Confidence cycles through 0.30..0.95, always above the count threshold
            let confidence = 0.30 + ((frame.sequence as usize + i) % 14) as f32 * 0.05;
            detections.push(Detection {
                class: PERSON_CLASS.to_string(),
                confidence,
                bbox: Self::grid_box(i, frame),
                metadata: Some(serde_json::json!({ "mock": true, "class_id": 0 })),
            });
        }

        for i in 0..self.config.clutter {
            detections.push(Detection {
                class: CLUTTER_CLASSES[i % CLUTTER_CLASSES.len()].to_string(),
                confidence: 0.8,
                bbox: Self::grid_box(people + i, frame),
                metadata: Some(serde_json::json!({ "mock": true })),
            });
        }

        Ok(AiResult {
            source_id: frame.source_id.clone(),
            timestamp: frame.timestamp,
            plugin_type: self.id().to_string(),
            detections,
            confidence: Some(0.85),
            processing_time_ms: Some(start.elapsed().as_millis() as u64),
            metadata: Some(serde_json::json!({
                "frame_width": frame.width,
                "frame_height": frame.height,
                "frame_sequence": frame.sequence,
                "mock_mode": true
            })),
        })
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down mock person detector");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> VideoFrame {
        VideoFrame {
            source_id: "test-video".to_string(),
            timestamp: sequence * 40,
            sequence,
            width: 1920,
            height: 1080,
            format: "jpeg".to_string(),
            data: "base64encodeddata".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_detector_init() {
        let mut plugin = MockDetectorPlugin::new();
        let config = serde_json::json!({
            "base_people": 40,
            "variation": 3,
            "fail_every": 5
        });

        plugin.init(config).await.unwrap();
        assert_eq!(plugin.config.base_people, 40);
        assert_eq!(plugin.config.variation, 3);
        assert_eq!(plugin.config.clutter, 2);
        assert_eq!(plugin.config.fail_every, Some(5));
    }

    #[tokio::test]
    async fn test_person_count_ignores_clutter() {
        let mut plugin = MockDetectorPlugin::new();
        plugin.init(serde_json::Value::Null).await.unwrap();

        let result = plugin.process_frame(&frame(42)).await.unwrap();
        assert_eq!(result.plugin_type, "mock_person_detector");
        assert_eq!(result.detections.len(), 14);
        assert_eq!(result.person_count(0.25), 12);
    }

    #[tokio::test]
    async fn test_variation_follows_sequence() {
        let plugin = MockDetectorPlugin::with_config(MockDetectorConfig {
            base_people: 10,
            variation: 2,
            ..MockDetectorConfig::default()
        });

        assert_eq!(plugin.people_for(3), 10);
        assert_eq!(plugin.people_for(4), 11);
        assert_eq!(plugin.people_for(5), 12);

        let result = plugin.process_frame(&frame(5)).await.unwrap();
        assert_eq!(result.person_count(0.25), 12);
    }

    #[tokio::test]
    async fn test_simulated_failure() {
        let plugin = MockDetectorPlugin::with_config(MockDetectorConfig {
            fail_every: Some(4),
            ..MockDetectorConfig::default()
        });

        assert!(plugin.process_frame(&frame(8)).await.is_err());
        assert!(plugin.process_frame(&frame(9)).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_detector_deterministic() {
        let plugin = MockDetectorPlugin::new();

        let result1 = plugin.process_frame(&frame(10)).await.unwrap();
        let result2 = plugin.process_frame(&frame(10)).await.unwrap();

        assert_eq!(result1.detections, result2.detections);
    }
}
