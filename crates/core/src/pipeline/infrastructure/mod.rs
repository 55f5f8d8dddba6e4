pub mod threaded_measurement_executor;
