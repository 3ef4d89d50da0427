/// Content lifecycle with mention side effects.
pub mod content_service;
/// Directory registration and lookup.
pub mod directory_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Mention resolution, storage and read operations.
pub mod mention_service;
/// Asynchronous fan-out of new mentions.
pub mod notifier;
/// Mention autocomplete.
pub mod search_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;

#[cfg(test)]
pub(crate) mod test_support;
