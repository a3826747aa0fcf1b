//! # qin-core
//!
//! Qin FLAC 解码库核心层, 提供比特流读取、CRC 校验和统一错误类型.
//!
//! 本 crate 不含任何编解码语义, 为上层 `qin-flac` 提供底层基础设施.

pub mod bitreader;
pub mod crc;
pub mod error;

// 重导出常用类型
pub use bitreader::BitReader;
pub use error::{QinError, QinResult};
