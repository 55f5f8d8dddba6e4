pub mod config;
pub mod device_stability;
pub mod dsp;
pub mod estimators;
pub mod events;
pub mod face_quality_gate;
pub mod face_state;
pub mod heartbeat;
pub mod latency_monitor;
pub mod measurement_state;
pub mod result_aggregator;
pub mod results;
pub mod signal_buffer;
pub mod state_machine;
