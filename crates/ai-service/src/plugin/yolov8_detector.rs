/// YOLOv8 person detector using ONNX Runtime
use super::AiPlugin;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use common::ai_tasks::{AiResult, BoundingBox, Detection, VideoFrame, PERSON_CLASS};
use image::DynamicImage;
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
        TensorRTExecutionProvider,
    },
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloV8Config {
    /// Path to the ONNX model file
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Minimum class score kept before NMS (0.0 to 1.0)
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// IoU above which same-class boxes are suppressed
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum number of detections per frame
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Model input size (width and height)
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Report only person detections
    #[serde(default = "default_persons_only")]
    pub persons_only: bool,

    /// COCO class names (default 80 classes)
    #[serde(default = "default_coco_classes")]
    pub class_names: Vec<String>,

    /// Execution provider preference (CPU, CUDA, TensorRT)
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    /// GPU device ID (0, 1, 2, etc.)
    #[serde(default)]
    pub device_id: i32,

    /// Number of intra-operation threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Number of inter-operation threads
    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,
}

fn default_model_path() -> String {
    "models/yolov8s.onnx".to_string()
}

fn default_confidence() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.5
}

fn default_max_detections() -> usize {
    300
}

fn default_input_size() -> u32 {
    640
}

fn default_persons_only() -> bool {
    true
}

fn default_coco_classes() -> Vec<String> {
    vec![
        "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
        "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
        "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
        "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
        "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
        "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
        "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
        "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
        "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
        "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
        "toothbrush",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_execution_provider() -> String {
    "CUDA".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl Default for YoloV8Config {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            input_size: default_input_size(),
            persons_only: default_persons_only(),
            class_names: default_coco_classes(),
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }
}

/// Candidate box before suppression: (box, score, class index)
type Candidate = (BoundingBox, f32, usize);

/// YOLOv8 person detector plugin
pub struct YoloV8DetectorPlugin {
    config: YoloV8Config,
    session: Option<Arc<Mutex<Session>>>,
    execution_provider_used: Arc<Mutex<String>>,
}

impl YoloV8DetectorPlugin {
    pub fn new() -> Self {
        Self {
            config: YoloV8Config::default(),
            session: None,
            execution_provider_used: Arc::new(Mutex::new("CPU".to_string())),
        }
    }

    /// Provider chain to try, most preferred first; CPU is always last
    fn provider_chain(preference: &str) -> Vec<&'static str> {
        match preference.to_uppercase().as_str() {
            "TENSORRT" => vec!["TensorRT", "CUDA", "CPU"],
            "CUDA" => vec!["CUDA", "CPU"],
            _ => vec!["CPU"],
        }
    }

    fn dispatch_for(&self, provider: &str) -> Vec<ExecutionProviderDispatch> {
        let device_id = self.config.device_id;
        match provider {
            "TensorRT" => vec![
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CPUExecutionProvider::default().build(),
            ],
            "CUDA" => vec![
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CPUExecutionProvider::default().build(),
            ],
            _ => vec![CPUExecutionProvider::default().build()],
        }
    }

    fn build_session(&self, provider: &str) -> Result<Session> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.config.intra_threads)?
            .with_inter_threads(self.config.inter_threads)?
            .with_execution_providers(self.dispatch_for(provider))?
            .commit_from_file(&self.config.model_path)?;
        Ok(session)
    }

    /// Class-aware Non-Maximum Suppression
    fn nms(&self, mut boxes: Vec<Candidate>) -> Vec<Candidate> {
        boxes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut keep: Vec<Candidate> = Vec::new();
        for candidate in boxes {
            let suppressed = keep.iter().any(|kept| {
                kept.2 == candidate.2 && kept.0.iou(&candidate.0) >= self.config.iou_threshold
            });
            if !suppressed {
                keep.push(candidate);
            }
        }

        keep
    }

    fn class_name(&self, class_idx: usize) -> String {
        self.config
            .class_names
            .get(class_idx)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_idx))
    }

    /// Turn raw `[1, 4 + classes, predictions]` output into detections
    fn postprocess_output(
        &self,
        output: &Array<f32, IxDyn>,
        original_width: u32,
        original_height: u32,
    ) -> Result<Vec<Detection>> {
        let shape = output.shape();
        if shape.len() != 3 || shape[1] <= 4 {
            anyhow::bail!("unexpected YOLOv8 output shape {:?}", shape);
        }

        let scale_x = original_width as f32 / self.config.input_size as f32;
        let scale_y = original_height as f32 / self.config.input_size as f32;
        let num_predictions = shape[2];
        let num_classes = shape[1] - 4;

        let mut boxes = Vec::new();

        for i in 0..num_predictions {
            let (best_class, best_score) = (0..num_classes)
                .map(|c| (c, output[[0, 4 + c, i]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            if best_score < self.config.confidence_threshold {
                continue;
            }
            if self.config.persons_only && self.class_name(best_class) != PERSON_CLASS {
                continue;
            }

            let cx = output[[0, 0, i]];
            let cy = output[[0, 1, i]];
            let w = output[[0, 2, i]];
            let h = output[[0, 3, i]];

            let x = ((cx - w / 2.0) * scale_x).max(0.0) as u32;
            let y = ((cy - h / 2.0) * scale_y).max(0.0) as u32;
            let width = (w * scale_x).min(original_width as f32).max(0.0) as u32;
            let height = (h * scale_y).min(original_height as f32).max(0.0) as u32;

            boxes.push((
                BoundingBox {
                    x,
                    y,
                    width,
                    height,
                },
                best_score,
                best_class,
            ));
        }

        let detections = self
            .nms(boxes)
            .into_iter()
            .take(self.config.max_detections)
            .map(|(bbox, confidence, class_idx)| Detection {
                class: self.class_name(class_idx),
                confidence,
                bbox,
                metadata: Some(serde_json::json!({ "class_id": class_idx })),
            })
            .collect();

        Ok(detections)
    }

    fn provider_used(&self) -> Result<String> {
        Ok(self
            .execution_provider_used
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?
            .clone())
    }
}

impl Default for YoloV8DetectorPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AiPlugin for YoloV8DetectorPlugin {
    fn id(&self) -> &'static str {
        "yolov8_person_detector"
    }

    fn name(&self) -> &'static str {
        "YOLOv8 Person Detector"
    }

    fn description(&self) -> &'static str {
        "Person detection for crowd counting using a YOLOv8 ONNX model"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn config_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "model_path": {
                    "type": "string",
                    "default": "models/yolov8s.onnx",
                    "description": "Path to the YOLOv8 ONNX model file"
                },
                "confidence_threshold": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "default": 0.25,
                    "description": "Minimum class score for a detection"
                },
                "iou_threshold": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "default": 0.5,
                    "description": "IoU threshold for Non-Maximum Suppression"
                },
                "max_detections": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 300,
                    "description": "Maximum number of detections per frame"
                },
                "input_size": {
                    "type": "integer",
                    "default": 640,
                    "description": "Model input size (width and height)"
                },
                "persons_only": {
                    "type": "boolean",
                    "default": true,
                    "description": "Drop every class except person"
                },
                "execution_provider": {
                    "type": "string",
                    "enum": ["CPU", "CUDA", "TensorRT"],
                    "default": "CUDA",
                    "description": "Execution provider (CPU, CUDA, TensorRT)"
                },
                "device_id": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 0,
                    "description": "GPU device ID"
                }
            }
        }))
    }

    fn supported_formats(&self) -> Vec<String> {
        vec!["jpeg".to_string(), "png".to_string()]
    }

    async fn init(&mut self, config: serde_json::Value) -> Result<()> {
        if !config.is_null() {
            self.config = serde_json::from_value(config)?;
        }

        if let Ok(provider) = std::env::var("YOLOV8_EXECUTION_PROVIDER") {
            self.config.execution_provider = provider;
        }
        if let Ok(device_id) = std::env::var("YOLOV8_DEVICE_ID") {
            if let Ok(id) = device_id.parse::<i32>() {
                self.config.device_id = id;
            }
        }

        let chain = Self::provider_chain(&self.config.execution_provider);
        let mut last_error = None;
        let mut selected = None;

        for provider in chain {
            tracing::info!(
                provider = provider,
                device = self.config.device_id,
                "attempting YOLOv8 execution provider"
            );
            match self.build_session(provider) {
                Ok(session) => {
                    selected = Some((session, provider));
                    break;
                }
                Err(e) => {
                    tracing::warn!(provider = provider, error = %e, "execution provider failed");
                    last_error = Some(e);
                }
            }
        }

        let (session, provider) = match selected {
            Some(found) => found,
            None => {
                let error = last_error.unwrap_or_else(|| anyhow::anyhow!("no execution provider"));
                return Err(error).with_context(|| {
                    format!("failed to load YOLOv8 model from {}", self.config.model_path)
                });
            }
        };

        self.session = Some(Arc::new(Mutex::new(session)));
        *self
            .execution_provider_used
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))? = provider.to_string();

        tracing::info!(
            model = %self.config.model_path,
            provider = provider,
            confidence = self.config.confidence_threshold,
            iou = self.config.iou_threshold,
            input_size = self.config.input_size,
            "initialized YOLOv8 person detector"
        );

        Ok(())
    }

    async fn process_frame(&self, frame: &VideoFrame) -> Result<AiResult> {
        let start = Instant::now();

        let session = Arc::clone(
            self.session
                .as_ref()
                .context("Model not initialized - call init() first")?,
        );
        let data = frame.data.clone();
        let input_size = self.config.input_size;

        // Decoding and inference are CPU bound; keep them off the async workers
        let raw = tokio::task::spawn_blocking(move || run_inference(&session, &data, input_size))
            .await
            .context("YOLOv8 inference task failed")??;
        let RawInference {
            output,
            frame_width: original_width,
            frame_height: original_height,
            inference_time,
        } = raw;

        let detections = self.postprocess_output(&output, original_width, original_height)?;

        let avg_confidence = if detections.is_empty() {
            0.0
        } else {
            detections.iter().map(|d| d.confidence).sum::<f32>() / detections.len() as f32
        };

        let execution_provider = self.provider_used()?;

        telemetry::metrics::DETECTOR_INFERENCES
            .with_label_values(&[self.id(), &execution_provider])
            .inc();
        telemetry::metrics::DETECTOR_INFERENCE_TIME
            .with_label_values(&[self.id(), &execution_provider])
            .observe(inference_time.as_secs_f64());

        Ok(AiResult {
            source_id: frame.source_id.clone(),
            timestamp: frame.timestamp,
            plugin_type: self.id().to_string(),
            detections,
            confidence: Some(avg_confidence),
            processing_time_ms: Some(start.elapsed().as_millis() as u64),
            metadata: Some(serde_json::json!({
                "frame_width": original_width,
                "frame_height": original_height,
                "frame_sequence": frame.sequence,
                "model_path": self.config.model_path,
                "execution_provider": execution_provider,
                "inference_time_ms": inference_time.as_millis() as u64
            })),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.session.is_some())
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down YOLOv8 person detector");
        self.session = None;
        Ok(())
    }
}

/// Model output for one frame, before postprocessing
struct RawInference {
    output: Array<f32, IxDyn>,
    frame_width: u32,
    frame_height: u32,
    inference_time: Duration,
}

/// Decode a base64 frame and run it through the model; blocks the calling thread
fn run_inference(session: &Mutex<Session>, data: &str, input_size: u32) -> Result<RawInference> {
    let img = decode_frame(data)?;
    let input_tensor = Value::from_array(preprocess_image(&img, input_size))?;

    let inference_start = Instant::now();
    let mut session = session
        .lock()
        .map_err(|e| anyhow::anyhow!("Failed to lock session: {}", e))?;
    let outputs = session.run(ort::inputs![input_tensor])?;
    let inference_time = inference_start.elapsed();

    let output_value = outputs.get("output0").context("No output tensor found")?;
    let (shape, data) = output_value.try_extract_tensor::<f32>()?;
    let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
    let output = Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())?;

    Ok(RawInference {
        output,
        frame_width: img.width(),
        frame_height: img.height(),
        inference_time,
    })
}

fn decode_frame(data: &str) -> Result<DynamicImage> {
    let image_data = base64::prelude::BASE64_STANDARD
        .decode(data)
        .context("Failed to decode base64 image")?;
    image::load_from_memory(&image_data).context("Failed to load image")
}

/// Preprocess image to YOLOv8 NCHW input normalized to [0, 1]
fn preprocess_image(img: &DynamicImage, size: u32) -> Array<f32, IxDyn> {
    let resized = img.resize_exact(size, size, image::imageops::FilterType::Triangle);
    let rgb_img = resized.to_rgb8();

    let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));

    for (x, y, pixel) in rgb_img.enumerate_pixels() {
        for channel in 0..3 {
            input[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
        }
    }

    input
}
