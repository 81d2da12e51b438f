// Position lifecycle and the per-tick decision pipeline
pub mod engine;
pub mod position_manager;

pub use engine::{EngineSettings, TradingEngine};
pub use position_manager::PositionManager;
