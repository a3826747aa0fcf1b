//! 整帧解码.
//!
//! 把各阶段串成流水线: 帧头解析 -> 逐声道子帧解码 -> 字节对齐 ->
//! CRC-16 整帧校验 -> 声道去相关 -> PCM 打包. CRC-16 覆盖从同步码
//! 到校验字段 (含) 的全部字节, 校验失败时整帧拒绝, 不输出半成品.
//!
//! 声道与残差缓冲跨帧复用, 常规解码路径稳定后不再分配.

use bytes::Bytes;
use log::debug;

use qin_core::crc::crc16;
use qin_core::{BitReader, QinError, QinResult};

use crate::header::{ChannelAssignment, FrameHeader};
use crate::pack::{output_depth, pack_samples};
use crate::sample::SampleBuffer;
use crate::streaminfo::StreamInfo;
use crate::subframe::{decode_subframe, MAX_FIXED_ORDER};

/// 一帧解码产物: 交织小端 PCM 与帧参数
#[derive(Debug, Clone)]
pub struct PcmFrame {
    /// 交织小端 PCM 数据
    pub data: Bytes,
    /// 已解析的帧头
    pub header: FrameHeader,
    /// 输出位深 (源位深向上取整到字节)
    pub output_bits_per_sample: u32,
}

impl PcmFrame {
    /// 本帧每声道采样数
    pub fn samples(&self) -> u32 {
        self.header.block_size
    }
}

/// 帧解码器
///
/// 持有跨帧复用的工作缓冲; 解码本身无帧间状态, 任意帧可独立解码,
/// seek 后无需重置.
pub struct FrameDecoder {
    stream_info: StreamInfo,
    channels: Vec<SampleBuffer>,
    residual: Vec<i32>,
    pcm: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(stream_info: StreamInfo) -> Self {
        Self {
            stream_info,
            channels: Vec::new(),
            residual: Vec::new(),
            pcm: Vec::new(),
        }
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.stream_info
    }

    /// 从缓冲区起点解码一帧
    ///
    /// `data` 须从同步码首字节开始且完整覆盖整帧 (通常按流参数的
    /// 最大帧大小切出窗口). 成功时返回 PCM 帧与消费的字节数;
    /// 失败时不产生输出, 可恢复错误由调用方重同步后重试.
    pub fn decode(&mut self, data: &[u8]) -> QinResult<(PcmFrame, usize)> {
        let header = FrameHeader::parse(data, Some(&self.stream_info), true)?;
        let block_size = header.block_size as usize;
        let channel_count = header.channels as usize;

        // 最坏情况位宽: 有效位深 + 差值声道 + 最大固定预测增益
        let side = header.channel_assignment != ChannelAssignment::Independent;
        let wide = header.bits_per_sample + u32::from(side) + MAX_FIXED_ORDER > 32;

        let mut reader = BitReader::new(data);
        reader.seek_bytes(header.header_len)?;

        self.channels
            .resize_with(channel_count, SampleBuffer::default);
        self.residual.clear();
        self.residual.resize(block_size, 0);

        for (index, channel) in self.channels.iter_mut().enumerate() {
            let bps =
                header.bits_per_sample + header.channel_assignment.bps_adjustment(index);
            channel.prepare(wide, block_size);
            match channel {
                SampleBuffer::Narrow(samples) => {
                    decode_subframe::<i32>(&mut reader, bps, samples, &mut self.residual)?
                }
                SampleBuffer::Wide(samples) => {
                    decode_subframe::<i64>(&mut reader, bps, samples, &mut self.residual)?
                }
            }
        }

        // 子帧区按位紧密排列, 帧尾校验字段前对齐到字节边界
        reader.align_to_byte()?;
        reader.seek_bytes(2)?;
        let frame_len = reader.byte_position();

        // 整帧连同校验字段的 CRC-16 余数必须为 0
        let remainder = crc16(&data[..frame_len]);
        if remainder != 0 {
            debug!("帧 CRC-16 校验失败: 余数=0x{:04X}", remainder);
            return Err(QinError::FrameCrcMismatch { remainder });
        }

        crate::decorrelate::decorrelate(header.channel_assignment, &mut self.channels)?;

        pack_samples(
            &self.channels,
            block_size,
            header.bits_per_sample,
            &mut self.pcm,
        )?;

        let frame = PcmFrame {
            data: Bytes::from(std::mem::take(&mut self.pcm)),
            output_bits_per_sample: output_depth(header.bits_per_sample),
            header,
        };
        Ok((frame, frame_len))
    }
}
