//! # Qin (琴)
//!
//! 纯 Rust 实现的 FLAC 无损音频解码库.
//!
//! Qin 提供完整的帧级解码能力:
//! - **帧解码**: 帧头解析, 四种子帧 (常量/原始/固定预测/LPC), 立体声去相关
//! - **完整性校验**: 帧头 CRC-8 与整帧 CRC-16 双层校验
//! - **容错**: 同步码扫描与损坏区域重同步
//! - **定位**: 帧索引扫描 (可后台执行) 与采样级 seek
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::fs::File;
//! use std::io::{BufReader, Seek, SeekFrom};
//!
//! use qin::flac::{FlacStream, StreamInfo};
//!
//! # fn main() -> Result<(), qin::core::QinError> {
//! // 容器层自备: 解析元数据块取得 STREAMINFO, 定位到首帧
//! let streaminfo_payload = [0u8; 34];
//! let info = StreamInfo::from_bytes(&streaminfo_payload)?;
//!
//! let mut file = BufReader::new(File::open("audio.flac")?);
//! file.seek(SeekFrom::Start(42))?;
//!
//! let stream = FlacStream::new(file, info, None)?;
//! loop {
//!     match stream.decode_next_frame() {
//!         Ok(frame) => println!("解出 {} 采样", frame.samples()),
//!         Err(qin::core::QinError::Eof) => break,
//!         Err(err) if err.is_recoverable() => {
//!             stream.resync()?;
//!         }
//!         Err(err) => return Err(err),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `qin-core` | 比特流读取, CRC, 错误类型 |
//! | `qin-flac` | 帧解码, 扫描索引, 流级驱动 |

/// 比特流读取, CRC 校验与统一错误类型
pub use qin_core as core;

/// FLAC 帧解码, 扫描索引与流级驱动
pub use qin_flac as flac;

/// 获取 Qin 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
