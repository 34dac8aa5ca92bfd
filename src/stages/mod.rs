//! Reference stage implementations.

pub mod deny;
pub mod dummy;
pub mod identification;

use std::sync::Arc;

use crate::flows::stage::StageRegistry;

/// Registry with every built-in stage.
#[must_use]
pub fn registry() -> StageRegistry {
    StageRegistry::new()
        .register(dummy::KIND, Arc::new(dummy::DummyStage))
        .register(deny::KIND, Arc::new(deny::DenyStage))
        .register(identification::KIND, Arc::new(identification::IdentificationStage))
}
