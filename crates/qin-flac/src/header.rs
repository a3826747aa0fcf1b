//! 帧头解析.
//!
//! 帧头布局 (变长, 6-16 字节):
//! ```text
//! sync:              14 bits (0b11111111111110)
//! reserved:          1 bit  (必须为 0)
//! blocking strategy: 1 bit  (0=固定块大小, 1=可变块大小)
//! block size code:   4 bits
//! sample rate code:  4 bits
//! channel code:      4 bits
//! bps code:          3 bits
//! reserved:          1 bit  (必须为 0)
//! number:            变长编码帧号 (u32 形式) 或采样号 (u64 形式)
//! block size hint:   0/8/16 bits (code 为 6/7 时)
//! sample rate hint:  0/8/16 bits (code 为 12/13/14 时)
//! crc8:              8 bits (覆盖之前全部字节)
//! ```
//!
//! 帧头解析是重同步判定的一部分: 任何字段级失败都视为假同步码,
//! 返回可恢复错误, 由调用方滑动窗口继续尝试.

use log::debug;

use qin_core::crc::crc8;
use qin_core::{BitReader, QinError, QinResult};

use crate::streaminfo::StreamInfo;

/// 帧头最大长度 (字节), 同时是扫描窗口的重叠保留量
pub const FRAME_HEADER_SIZE: usize = 16;

/// 块大小码表; -1 = 保留, 0 = 帧头尾部另有 8/16 位显式值
const BLOCK_SIZE_TABLE: [i32; 16] = [
    -1, 192, 576, 1152, 2304, 4608, 0, 0, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768,
];

/// 采样率码表 (code 1-11); 0 = 继承流参数, 12-14 = 显式值, 15 = 保留
const SAMPLE_RATE_TABLE: [u32; 12] = [
    0, 88200, 176400, 192000, 8000, 16000, 22050, 24000, 32000, 44100, 48000, 96000,
];

/// 位深码表; -1 = 继承流参数或保留
const BITS_PER_SAMPLE_TABLE: [i32; 8] = [-1, 8, 12, -1, 16, 20, 24, 32];

/// 声道分配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// 各声道独立编码
    Independent,
    /// 左声道 + 差值 (side = left - right)
    LeftSide,
    /// 差值 + 右声道 (side = left - right)
    RightSide,
    /// 中值 + 差值 (mid 丢弃了最低位, 由 side 的奇偶恢复)
    MidSide,
}

impl ChannelAssignment {
    /// 差值声道额外携带 1 位精度, 该声道解码位深需加 1
    pub fn bps_adjustment(&self, channel: usize) -> u32 {
        match self {
            ChannelAssignment::LeftSide | ChannelAssignment::MidSide if channel == 1 => 1,
            ChannelAssignment::RightSide if channel == 0 => 1,
            _ => 0,
        }
    }
}

/// 块大小策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingStrategy {
    /// 固定块大小, 帧头携带帧号
    Fixed,
    /// 可变块大小, 帧头携带首采样号
    Variable,
}

/// 帧定位编号: 帧号与采样号互斥, 由块大小策略决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameNumber {
    /// 固定块大小流中的帧序号
    Frame(u32),
    /// 可变块大小流中帧首采样的序号
    Sample(u64),
}

/// 已解析的帧头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// 本帧每声道采样数
    pub block_size: u32,
    /// 采样率
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
    /// 声道分配方式
    pub channel_assignment: ChannelAssignment,
    /// 位深 (不含差值声道的 +1 调整)
    pub bits_per_sample: u32,
    /// 块大小策略
    pub blocking_strategy: BlockingStrategy,
    /// 帧号或采样号
    pub number: FrameNumber,
    /// 帧头长度 (字节, 含 CRC-8 字段)
    pub header_len: usize,
}

/// 字段级失败统一按假同步码处理
fn reject(log_errors: bool, reason: &str) -> QinError {
    if log_errors {
        debug!("帧头解析失败: {}", reason);
    }
    QinError::SyncLoss
}

impl FrameHeader {
    /// 从候选同步点解析帧头
    ///
    /// `data` 从疑似同步码的首字节开始; `stream_info` 提供字段编码为
    /// "继承" 时的默认值; `log_errors` 控制失败时是否输出调试日志
    /// (扫描器逐字节试探时关闭以免刷屏).
    ///
    /// 全部字段合法且 CRC-8 校验通过才返回 `Ok`; 任何字段级失败返回
    /// [`QinError::SyncLoss`], CRC 失败返回 [`QinError::HeaderCrcMismatch`],
    /// 数据不足返回 [`QinError::Eof`], 三者均可恢复.
    pub fn parse(
        data: &[u8],
        stream_info: Option<&StreamInfo>,
        log_errors: bool,
    ) -> QinResult<Self> {
        if data.len() < 6 {
            return Err(QinError::Eof);
        }

        // 同步码 14 位: 11111111 111110; 其后是保留位与块策略位
        if data[0] != 0xFF || data[1] & 0xFC != 0xF8 {
            return Err(reject(log_errors, "同步码不匹配"));
        }
        if data[1] & 0x02 != 0 {
            return Err(reject(log_errors, "保留位非零"));
        }
        let blocking_strategy = if data[1] & 0x01 != 0 {
            BlockingStrategy::Variable
        } else {
            BlockingStrategy::Fixed
        };

        let block_size_code = (data[2] >> 4) as usize;
        let sample_rate_code = (data[2] & 0x0F) as usize;
        let channel_code = (data[3] >> 4) as usize;
        let bps_code = ((data[3] & 0x0E) >> 1) as usize;
        if data[3] & 0x01 != 0 {
            return Err(reject(log_errors, "保留位非零"));
        }

        if BLOCK_SIZE_TABLE[block_size_code] < 0 {
            return Err(reject(log_errors, "块大小码为保留值"));
        }

        let sample_rate = match sample_rate_code {
            0 => match stream_info {
                Some(info) => info.sample_rate,
                None => return Err(reject(log_errors, "采样率继承流参数但流参数缺失")),
            },
            1..=11 => SAMPLE_RATE_TABLE[sample_rate_code],
            // 12-14 的显式值在编号字段之后读取
            12..=14 => 0,
            _ => return Err(reject(log_errors, "采样率码为保留值")),
        };

        let (channels, channel_assignment) = if channel_code & 0x08 != 0 {
            let assignment = match channel_code & 0x07 {
                0 => ChannelAssignment::LeftSide,
                1 => ChannelAssignment::RightSide,
                2 => ChannelAssignment::MidSide,
                _ => return Err(reject(log_errors, "声道分配码为保留值")),
            };
            (2, assignment)
        } else {
            (channel_code as u32 + 1, ChannelAssignment::Independent)
        };

        let bits_per_sample = match BITS_PER_SAMPLE_TABLE[bps_code] {
            -1 if bps_code == 0 => match stream_info {
                Some(info) => info.bits_per_sample,
                None => return Err(reject(log_errors, "位深继承流参数但流参数缺失")),
            },
            -1 => return Err(reject(log_errors, "位深码为保留值")),
            bps => bps as u32,
        };

        let mut reader = BitReader::new(data);
        reader.seek_bytes(4)?;

        // 编号字段形式由整条流的块大小策略决定, 而非仅由本帧的策略位
        let variable = blocking_strategy == BlockingStrategy::Variable
            || stream_info.is_some_and(|info| info.is_variable_block_size());
        let number = if variable {
            match reader.read_utf8_u64() {
                Ok(n) => FrameNumber::Sample(n),
                Err(QinError::Eof) => return Err(QinError::Eof),
                Err(_) => return Err(reject(log_errors, "采样号变长编码无效")),
            }
        } else {
            match reader.read_utf8_u32() {
                Ok(n) => FrameNumber::Frame(n),
                Err(QinError::Eof) => return Err(QinError::Eof),
                Err(_) => return Err(reject(log_errors, "帧号变长编码无效")),
            }
        };

        let block_size = match BLOCK_SIZE_TABLE[block_size_code] {
            0 if block_size_code == 6 => reader.read_bits(8)? + 1,
            0 => reader.read_bits(16)? + 1,
            size => size as u32,
        };

        let sample_rate = match sample_rate_code {
            12 => reader.read_bits(8)? * 1000,
            13 => reader.read_bits(16)?,
            14 => reader.read_bits(16)? * 10,
            _ => sample_rate,
        };
        if sample_rate == 0 {
            return Err(reject(log_errors, "采样率为 0"));
        }

        let crc_span = reader.byte_position();
        let read_crc = reader.read_bits(8)? as u8;
        let calculated = crc8(&data[..crc_span]);
        if read_crc != calculated {
            if log_errors {
                debug!(
                    "帧头 CRC-8 不匹配: 读取=0x{:02X}, 计算=0x{:02X}",
                    read_crc, calculated,
                );
            }
            return Err(QinError::HeaderCrcMismatch {
                read: read_crc,
                calculated,
            });
        }

        Ok(Self {
            block_size,
            sample_rate,
            channels,
            channel_assignment,
            bits_per_sample,
            blocking_strategy,
            number,
            header_len: reader.byte_position(),
        })
    }

    /// 格式三元组 (位深, 声道数, 采样率) 是否与另一帧头一致
    ///
    /// 扫描器用它剔除碰巧通过 CRC 校验但格式突变的假同步点.
    pub fn compare_format(&self, other: &FrameHeader) -> bool {
        self.bits_per_sample == other.bits_per_sample
            && self.channels == other.channels
            && self.sample_rate == other.sample_rate
    }
}
