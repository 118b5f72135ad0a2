//! API constants

/// Prefix of every REST route
pub const API_PREFIX: &str = "/api";

/// Path the OpenAPI document is served from
pub const OPENAPI_PATH: &str = "/api/openapi.json";

/// Upper bound for a single health check
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;
