pub mod anomalies;
pub mod export;
pub mod monitor;
pub mod sensors;
