// 工具函数模块
// 包含标识符生成、输入验证等通用工具

pub mod ident;
pub mod validation;

// 重新导出常用函数
pub use ident::*;
pub use validation::*;
