//! Predictive risk engine: per-factory weighted risk scoring, per-sensor
//! at-risk latching, and per-factory fault detection.

pub mod config;
pub mod factory_risk;
pub mod fault_detector;
pub mod sensor_tracker;

pub use config::RiskThresholds;
pub use factory_risk::{predict_factory_risk, should_preemptively_rebalance, RiskAssessment, RiskFactors, RiskInputs};
pub use fault_detector::{FaultDetection, FaultDetector, FaultType, FactoryMetricsSnapshot, Severity};
pub use sensor_tracker::SensorRiskTracker;
