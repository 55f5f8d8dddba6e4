pub mod infrastructure;
pub mod measure_video_use_case;
pub mod measurement_executor;
pub mod measurement_logger;
