//! Remote photoplethysmography: vital signs from face video, plus
//! cardiovascular risk scoring.
//!
//! [`measurement::measurement_engine::MeasurementEngine`] is the entry
//! point for live sessions; [`pipeline`] drives it over recorded input and
//! [`risks`] is independent of any session.

pub mod extraction;
pub mod measurement;
pub mod pipeline;
pub mod risks;
pub mod shared;
pub mod video;
