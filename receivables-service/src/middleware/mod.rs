pub mod errors;
pub mod tenant;

pub use errors::error_counter_middleware;
pub use tenant::TenantContext;
