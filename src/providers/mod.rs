pub mod failover;
pub mod rest;

// Re-export so callers can assemble providers without reaching into
// submodules.
pub use failover::FailoverExchange;
pub use rest::{EndpointStyle, ProviderEndpoints, RestExchangeProvider};
