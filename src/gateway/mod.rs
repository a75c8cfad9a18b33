// ============================================================================
// Gateway core
// ============================================================================
//
// The single entry point for all client traffic. Per request, strictly in
// order: rate-limit check, authentication, authorization, route resolution,
// forwarding, response assembly. Rejections happen at the first failing
// stage; there is no backtracking.
//
// ============================================================================

pub mod authz;
pub mod dispatcher;
pub mod router;
pub mod service_client;

pub use router::{BackendService, RouteTable};
pub use service_client::{ServiceClient, ServiceHealth};
