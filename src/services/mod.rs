/// Card index lookups for scanned sleeves.
pub mod card_service;
/// Read-only display snapshot assembly.
pub mod display_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Session lifecycle operations and authorization.
pub mod session_service;
/// Timer-driven auto-transition sweeper.
pub mod session_sweeper;
/// Storage connection supervision and degraded mode handling.
pub mod storage_supervisor;
