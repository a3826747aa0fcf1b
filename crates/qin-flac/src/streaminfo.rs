//! 流级参数与 seek 表 (外部协作者边界).
//!
//! 容器层元数据块的遍历不在本库范围内; 调用方取得 STREAMINFO 与
//! SEEKTABLE 块的载荷字节后, 用本模块解析为结构化记录.
//!
//! STREAMINFO 载荷 (34 字节):
//! ```text
//! min_block_size:  16 bits
//! max_block_size:  16 bits
//! min_frame_size:  24 bits
//! max_frame_size:  24 bits
//! sample_rate:     20 bits
//! channels:        3 bits  (channels - 1)
//! bits_per_sample: 5 bits  (bits - 1)
//! total_samples:   36 bits (0 = 未知)
//! md5:             128 bits
//! ```

use qin_core::{BitReader, QinError, QinResult};

use crate::header::FRAME_HEADER_SIZE;

/// STREAMINFO 载荷长度
pub const STREAM_INFO_SIZE: usize = 34;

/// 流级默认参数记录
///
/// 帧头字段编码为 "继承" 时从这里取默认值; 扫描器用 min/max 帧大小
/// 约束读取窗口与跳跃步长.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// 最小块大小 (每声道采样数)
    pub min_block_size: u16,
    /// 最大块大小
    pub max_block_size: u16,
    /// 最小帧大小 (字节, 0 = 未知)
    pub min_frame_size: u32,
    /// 最大帧大小 (字节, 0 = 未知)
    pub max_frame_size: u32,
    /// 采样率
    pub sample_rate: u32,
    /// 声道数 (1-8)
    pub channels: u32,
    /// 位深 (4-32)
    pub bits_per_sample: u32,
    /// 总采样数 (0 = 未知)
    pub total_samples: u64,
    /// 未解码音频的 MD5 摘要
    pub md5: [u8; 16],
}

impl StreamInfo {
    /// 解析 34 字节 STREAMINFO 载荷
    pub fn from_bytes(data: &[u8]) -> QinResult<Self> {
        if data.len() < STREAM_INFO_SIZE {
            return Err(QinError::InvalidData(format!(
                "STREAMINFO 载荷不足: {} < {}",
                data.len(),
                STREAM_INFO_SIZE,
            )));
        }

        let mut reader = BitReader::new(data);
        let min_block_size = reader.read_bits(16)? as u16;
        let max_block_size = reader.read_bits(16)? as u16;
        let min_frame_size = reader.read_bits(24)?;
        let max_frame_size = reader.read_bits(24)?;
        let sample_rate = reader.read_bits(20)?;
        let channels = reader.read_bits(3)? + 1;
        let bits_per_sample = reader.read_bits(5)? + 1;
        let total_samples = reader.read_bits64(36)?;

        let mut md5 = [0u8; 16];
        md5.copy_from_slice(&data[18..34]);

        if sample_rate == 0 {
            return Err(QinError::InvalidData("STREAMINFO 采样率为 0".into()));
        }

        Ok(Self {
            min_block_size,
            max_block_size,
            min_frame_size,
            max_frame_size,
            sample_rate,
            channels,
            bits_per_sample,
            total_samples,
            md5,
        })
    }

    /// 流是否使用可变块大小
    pub fn is_variable_block_size(&self) -> bool {
        self.min_block_size != self.max_block_size
    }

    /// 最小帧大小, 未声明时退化为帧头长度
    pub fn min_frame_size_or_default(&self) -> u32 {
        if self.min_frame_size > 0 {
            self.min_frame_size
        } else {
            FRAME_HEADER_SIZE as u32
        }
    }

    /// 最大帧大小, 未声明时按未压缩上限估算
    pub fn max_frame_size_or_default(&self) -> u32 {
        if self.max_frame_size > 0 {
            self.max_frame_size
        } else {
            (u32::from(self.max_block_size) * self.channels * self.bits_per_sample) / 8
                + FRAME_HEADER_SIZE as u32
        }
    }
}

/// SEEKTABLE 中的一个 seek 点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    /// 目标帧首个采样的序号
    pub sample_number: u64,
    /// 相对于首帧数据起点的字节偏移
    pub byte_offset: u64,
    /// 目标帧的采样数
    pub frame_samples: u16,
}

/// 粗粒度 seek 表 (采样号 -> 字节偏移)
#[derive(Debug, Clone, Default)]
pub struct SeekTable {
    points: Vec<SeekPoint>,
}

impl SeekTable {
    /// 解析 SEEKTABLE 载荷 (每条记录 18 字节, 大端)
    ///
    /// 占位记录 (采样号为全 1) 被跳过.
    pub fn from_bytes(data: &[u8]) -> QinResult<Self> {
        const RECORD_SIZE: usize = 18;
        let count = data.len() / RECORD_SIZE;
        let mut points = Vec::with_capacity(count);

        for i in 0..count {
            let rec = &data[i * RECORD_SIZE..(i + 1) * RECORD_SIZE];
            let mut field = [0u8; 8];
            field.copy_from_slice(&rec[0..8]);
            let sample_number = u64::from_be_bytes(field);
            if sample_number == u64::MAX {
                continue;
            }
            field.copy_from_slice(&rec[8..16]);
            let byte_offset = u64::from_be_bytes(field);
            let frame_samples = u16::from_be_bytes([rec[16], rec[17]]);
            points.push(SeekPoint {
                sample_number,
                byte_offset,
                frame_samples,
            });
        }

        Ok(Self { points })
    }

    /// 全部 seek 点
    pub fn points(&self) -> &[SeekPoint] {
        &self.points
    }

    /// 目标采样之前 (含) 最近的 seek 点
    pub fn nearest_before(&self, target_sample: u64) -> Option<&SeekPoint> {
        self.points
            .iter()
            .take_while(|p| p.sample_number <= target_sample)
            .last()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
