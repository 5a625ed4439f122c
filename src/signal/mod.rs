// =============================================================================
// Signal Module
// =============================================================================
//
// The per-ticker fusion pipeline:
// - Fixed-layout feature extraction
// - Weighted bull/bear scoring with ensemble calibration
// - Short-squeeze composite
// - Trade setup generation
// - Market-regime classification

pub mod engine;
pub mod features;
pub mod regime;
pub mod setup;
pub mod squeeze;

pub use engine::{MlCalibrator, SignalEngine, SignalResult};
pub use features::{FeatureContext, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use regime::{classify_regime, MarketRegime};
pub use setup::{generate_setup, TradeSetup};
pub use squeeze::{score_squeeze, SqueezeLabel, SqueezeScore};
