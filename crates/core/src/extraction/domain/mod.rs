pub mod bbox_smoother;
pub mod face_landmarks;
pub mod frame_feature_extractor;
pub mod ppg_sampler;
