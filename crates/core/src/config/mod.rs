//! 配置模型
//!
//! 配置按 TOML 文件 → 环境变量覆盖 的顺序加载，加载后统一执行 `validate()`。

pub mod models;

pub use models::*;
