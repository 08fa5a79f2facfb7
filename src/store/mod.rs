// 存储层模块
// 订单、回调账本、积分账本、套餐目录的持久化接口与实现

pub mod credit_ledger;
#[cfg(test)]
pub mod memory;
pub mod notify_ledger;
pub mod order_store;
pub mod package_store;

pub use credit_ledger::{CreditLedger, PgCreditLedger};
pub use notify_ledger::{NotifyLedger, PgNotifyLedger};
pub use order_store::{OrderStore, PgOrderStore};
pub use package_store::{PackageStore, PgPackageStore};
