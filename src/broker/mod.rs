pub mod engine;
pub mod subscription;

pub use engine::Broker;
pub use subscription::Subscription;
