// 服务模块

pub mod credit_service;
pub mod notify_service;
pub mod order_service;
pub mod sweep_service;

#[cfg(test)]
pub mod testutil;

pub use credit_service::CreditService;
pub use notify_service::{NotifyOutcome, NotifyService};
pub use order_service::OrderService;
pub use sweep_service::SweepService;
