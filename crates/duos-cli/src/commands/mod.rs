pub mod member;
pub mod pair;
pub mod rotate;

use std::sync::Arc;

use duos_core::{Database, EngineConfig, LogNotifier, RotationEngine};

/// Open the shared database and build an engine over it. Every command
/// constructs its own engine; the single-flight guard matters only within
/// one process.
pub(crate) fn open_engine() -> Result<RotationEngine, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let config = EngineConfig::load_or_default();
    Ok(RotationEngine::new(db, Arc::new(LogNotifier), config))
}
