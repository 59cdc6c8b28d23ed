//! Detection contracts shared between the detector plugins and the crowd
//! monitor.
//!
//! A detector receives a [`VideoFrame`] and answers with an [`AiResult`]; the
//! monitor only ever needs the per-frame person tally derived from it.

use serde::{Deserialize, Serialize};

/// COCO label the detectors use for people.
pub const PERSON_CLASS: &str = "person";

/// Video frame handed to a detector plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    /// Source video or camera identifier
    pub source_id: String,

    /// Frame timestamp (milliseconds from the start of the source)
    pub timestamp: u64,

    /// Frame sequence number (1-based frame number in the source)
    pub sequence: u64,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Image format (e.g., "jpeg", "png")
    pub format: String,

    /// Frame data (base64 encoded for JSON transport)
    pub data: String,
}

/// Detection result from a detector plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Object class/label
    pub class: String,

    /// Detection confidence (0.0 to 1.0)
    pub confidence: f32,

    /// Bounding box (x, y, width, height)
    pub bbox: BoundingBox,

    /// Additional metadata (plugin-specific)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Detection {
    pub fn is_class(&self, class: &str, min_confidence: f32) -> bool {
        self.class == class && self.confidence >= min_confidence
    }
}

/// Bounding box coordinates in source-frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersection over union with another box, 0.0 when both are empty
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x) as u64;
        let y1 = self.y.max(other.y) as u64;
        let x2 = (self.x as u64 + self.width as u64).min(other.x as u64 + other.width as u64);
        let y2 = (self.y as u64 + self.height as u64).min(other.y as u64 + other.height as u64);

        let intersection = if x2 > x1 && y2 > y1 {
            ((x2 - x1) * (y2 - y1)) as f32
        } else {
            0.0
        };

        let union = self.area() as f32 + other.area() as f32 - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Output of one detector pass over a frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResult {
    /// Source the frame came from
    pub source_id: String,

    /// Timestamp of the processed frame
    pub timestamp: u64,

    /// Plugin that produced the result
    pub plugin_type: String,

    /// Detected objects
    pub detections: Vec<Detection>,

    /// Overall confidence score
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    /// Processing latency in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,

    /// Additional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AiResult {
    /// Number of detections labelled `class` with at least `min_confidence`
    pub fn count_class(&self, class: &str, min_confidence: f32) -> usize {
        self.detections
            .iter()
            .filter(|d| d.is_class(class, min_confidence))
            .count()
    }

    /// Person tally for this frame
    pub fn person_count(&self, min_confidence: f32) -> usize {
        self.count_class(PERSON_CLASS, min_confidence)
    }

    /// Drop every detection that `count_class` would not count
    pub fn retain_class(&mut self, class: &str, min_confidence: f32) {
        self.detections.retain(|d| d.is_class(class, min_confidence));
    }
}

/// Plugin metadata and capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin unique identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Plugin description
    pub description: String,

    /// Plugin version
    pub version: String,

    /// Configuration schema (JSON Schema)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<serde_json::Value>,

    /// Supported input formats
    pub supported_formats: Vec<String>,

    /// Whether the plugin requires GPU
    pub requires_gpu: bool,
}

/// List of available plugins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginListResponse {
    pub plugins: Vec<PluginInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(class: &str, confidence: f32) -> Detection {
        Detection {
            class: class.to_string(),
            confidence,
            bbox: BoundingBox {
                x: 0,
                y: 0,
                width: 10,
                height: 20,
            },
            metadata: None,
        }
    }

    #[test]
    fn test_person_count_filters_class_and_confidence() {
        let result = AiResult {
            source_id: "cam".to_string(),
            timestamp: 0,
            plugin_type: "test".to_string(),
            detections: vec![
                detection("person", 0.9),
                detection("person", 0.25),
                detection("person", 0.1),
                detection("bicycle", 0.95),
            ],
            confidence: None,
            processing_time_ms: None,
            metadata: None,
        };

        assert_eq!(result.person_count(0.25), 2);
        assert_eq!(result.person_count(0.0), 3);
        assert_eq!(result.count_class("bicycle", 0.5), 1);
    }

    #[test]
    fn test_retain_class_matches_count() {
        let mut result = AiResult {
            source_id: "cam".to_string(),
            timestamp: 0,
            plugin_type: "test".to_string(),
            detections: vec![
                detection("person", 0.9),
                detection("backpack", 0.9),
                detection("person", 0.2),
            ],
            confidence: None,
            processing_time_ms: None,
            metadata: None,
        };

        let tally = result.person_count(0.25);
        result.retain_class(PERSON_CLASS, 0.25);
        assert_eq!(result.detections.len(), tally);
        assert_eq!(result.detections[0], detection("person", 0.9));
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox {
            x: 10,
            y: 10,
            width: 50,
            height: 50,
        };
        let b = BoundingBox {
            x: 30,
            y: 30,
            width: 50,
            height: 50,
        };
        let far = BoundingBox {
            x: 100,
            y: 100,
            width: 50,
            height: 50,
        };

        let iou = a.iou(&b);
        assert!(iou > 0.0 && iou < 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 0.001);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_iou_of_empty_boxes() {
        let empty = BoundingBox {
            x: 5,
            y: 5,
            width: 0,
            height: 0,
        };
        assert_eq!(empty.iou(&empty), 0.0);
    }

    #[test]
    fn test_detection_serialization() {
        let detection = Detection {
            class: "person".to_string(),
            confidence: 0.95,
            bbox: BoundingBox {
                x: 100,
                y: 200,
                width: 50,
                height: 100,
            },
            metadata: Some(serde_json::json!({ "class_id": 0 })),
        };

        let json = serde_json::to_string(&detection).unwrap();
        let deserialized: Detection = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, detection);
    }
}
