pub mod ai_tasks;
pub mod frame_extractor;
