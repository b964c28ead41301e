pub mod forward;
pub mod target;

pub use forward::{Forwarder, ForwarderConfig, ProxyError};
pub use target::{GatewayTarget, TargetError};
