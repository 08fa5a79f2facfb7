// 标识符生成工具
// 订单号、商户订单号、协议随机串的生成

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};

/// 生成协议随机串 (nonce_str)
pub fn generate_nonce(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// 生成订单号: 前缀 + 时间戳 + 6位随机数字
///
/// 例如 ORD20250101123059482913；时间戳保证可读可排序，
/// 随机尾数规避同秒碰撞，全局唯一性最终由数据库唯一约束兜底
pub fn generate_order_no(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{}{}{:06}", prefix, timestamp, suffix)
}
