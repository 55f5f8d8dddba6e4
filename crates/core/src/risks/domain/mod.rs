pub mod health_risks;
pub mod risk_engine;
pub mod risk_factors;
pub mod score_tables;
