//! # qin-flac
//!
//! FLAC 帧解码核心: 帧头解析、子帧重建、声道去相关、PCM 打包,
//! 以及流级的重同步、扫描索引与采样级定位.
//!
//! 分层自下而上:
//!
//! - [`streaminfo`]: STREAMINFO / SEEKTABLE 元数据载荷解析;
//! - [`header`]: 帧头解析与校验;
//! - [`frame`]: 单帧解码流水线 (子帧 -> 去相关 -> 打包);
//! - [`scan`]: 线性扫描, 帧索引, 后台扫描任务;
//! - [`stream`]: 顺序解码 + seek 的流级驱动.
//!
//! 容器层 (元数据块遍历, 文件探测) 不在本 crate 范围内.

mod decorrelate;
pub mod frame;
pub mod header;
mod pack;
mod residual;
mod sample;
pub mod scan;
pub mod stream;
pub mod streaminfo;
mod subframe;

// 重导出常用类型
pub use frame::{FrameDecoder, PcmFrame};
pub use header::{BlockingStrategy, ChannelAssignment, FrameHeader, FrameNumber};
pub use scan::{
    spawn_scan, CancelToken, FrameIndex, FrameInformation, ScanOutcome, ScanTask, StreamScanner,
};
pub use stream::FlacStream;
pub use streaminfo::{SeekPoint, SeekTable, StreamInfo};
