//! Measurement sessions. Frames go into
//! [`measurement_engine::MeasurementEngine`] in timestamp order; state, face
//! feedback and results are pulled through its query methods, and events are
//! pushed to subscribers over channels.

pub mod domain;
pub mod error;
pub mod measurement_engine;
