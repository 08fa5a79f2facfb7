// 套餐目录读取
// 目录维护在核心范围之外，这里只提供订单创建时的快照读取

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::PayResult;
use crate::models::Package;

/// 套餐读取接口
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// 读取上架中的套餐
    async fn get_active(&self, package_id: Uuid) -> PayResult<Option<Package>>;
}

/// 基于PostgreSQL的套餐读取实现
pub struct PgPackageStore {
    pool: PgPool,
}

impl PgPackageStore {
    /// 创建新的套餐读取实例
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PackageStore for PgPackageStore {
    async fn get_active(&self, package_id: Uuid) -> PayResult<Option<Package>> {
        let package = sqlx::query_as::<_, Package>(
            "SELECT id, name, amount, points, bonus_points, active, created_at \
             FROM packages WHERE id = $1 AND active = TRUE",
        )
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(package)
    }
}
