//! 集成测试共用工具: 位写入器与帧构造器.
#![allow(dead_code)]

use qin::core::crc::{crc16, crc8};
use qin::flac::StreamInfo;

/// 按位组装码流, MSB 在前, 末字节低位补零
pub struct BitSink {
    bytes: Vec<u8>,
    bit_count: u32,
}

impl BitSink {
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            bit_count: 0,
        }
    }

    pub fn push_bits(&mut self, value: u64, n: u32) {
        for i in (0..n).rev() {
            let bit = (value >> i) & 1;
            if self.bit_count % 8 == 0 {
                self.bytes.push(0);
            }
            let byte = self.bytes.last_mut().unwrap();
            *byte |= (bit as u8) << (7 - self.bit_count % 8);
            self.bit_count += 1;
        }
    }

    /// Rice 码字: 之字形映射 + 一元商 + 定长余数
    pub fn push_rice(&mut self, value: i32, param: u32) {
        let unsigned = ((value << 1) ^ (value >> 31)) as u32;
        let quotient = unsigned >> param;
        self.push_bits(1, quotient + 1);
        if param > 0 {
            self.push_bits(u64::from(unsigned & ((1 << param) - 1)), param);
        }
    }

    /// 单分区 Rice 残差区 (method 0, 分区阶数 0)
    pub fn push_residual(&mut self, residuals: &[i32], param: u32) {
        self.push_bits(0b00, 2);
        self.push_bits(0, 4);
        self.push_bits(u64::from(param), 4);
        for &r in residuals {
            self.push_rice(r, param);
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// 组装完整帧: 帧头主体补 CRC-8, 接子帧字节, 尾随 CRC-16
pub fn build_frame(header_body: &[u8], subframe_bytes: &[u8]) -> Vec<u8> {
    let mut data = header_body.to_vec();
    data.push(crc8(header_body));
    data.extend_from_slice(subframe_bytes);
    let crc = crc16(&data);
    data.extend_from_slice(&crc.to_be_bytes());
    data
}

/// 流参数样板
pub fn stream_info(block_size: u16, channels: u32, bps: u32) -> StreamInfo {
    StreamInfo {
        min_block_size: block_size,
        max_block_size: block_size,
        min_frame_size: 0,
        max_frame_size: 0,
        sample_rate: 44100,
        channels,
        bits_per_sample: bps,
        total_samples: 0,
        md5: [0; 16],
    }
}

/// 单声道 8 位常量帧, 块大小 4, 总长 11 字节
pub fn make_constant_frame(frame_number: u8, value: u8) -> Vec<u8> {
    build_frame(
        &[0xFF, 0xF8, 0x69, 0x02, frame_number, 0x03],
        &[0x00, value],
    )
}

/// 按小端 16 位交织打包期望 PCM
pub fn interleave_i16(channels: &[&[i16]]) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..channels[0].len() {
        for channel in channels {
            out.extend_from_slice(&channel[i].to_le_bytes());
        }
    }
    out
}
