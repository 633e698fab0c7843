pub mod gateway;
pub mod pool;
pub mod rate_limiter;
pub mod replenisher;

pub use gateway::DocumentGateway;
pub use rate_limiter::PermitPool;
pub use replenisher::{Replenisher, ReplenisherState};
