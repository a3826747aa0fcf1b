//! PCM 打包输出.
//!
//! 将各声道重建信号交织为小端 PCM 字节流: 按采样序遍历, 每个采样
//! 依声道顺序输出. 输出位深为源位深向上取整到字节 (8/16/24/32),
//! 不足整字节时左移补齐低位. 8 位输出遵循 WAV 惯例加 0x80 偏置
//! 转为无符号.

use qin_core::{QinError, QinResult};

use crate::sample::SampleBuffer;

/// 输出位深 (源位深向上取整到字节)
pub(crate) fn output_depth(bits_per_sample: u32) -> u32 {
    bits_per_sample.div_ceil(8) * 8
}

/// 交织打包一帧 PCM
///
/// `channels` 为去相关后的声道缓冲, 每个长度为 `block_size`;
/// 结果追加进 `out` (调用前会清空). 宽缓冲的值在此处收窄,
/// 移位补齐后超出 32 位有符号范围的值按
/// [`QinError::ArithmeticOverflow`] 拒绝, 不回绕.
pub(crate) fn pack_samples(
    channels: &[SampleBuffer],
    block_size: usize,
    bits_per_sample: u32,
    out: &mut Vec<u8>,
) -> QinResult<()> {
    let depth = output_depth(bits_per_sample);
    if !matches!(depth, 8 | 16 | 24 | 32) {
        return Err(QinError::Unsupported(format!("输出位深: {}", depth)));
    }
    for channel in channels {
        if channel.len() < block_size {
            return Err(QinError::InvalidArgument(format!(
                "声道缓冲长度 {} 小于块大小 {}",
                channel.len(),
                block_size,
            )));
        }
    }

    let shift = depth - bits_per_sample;
    out.clear();
    out.reserve(block_size * channels.len() * (depth as usize / 8));

    for i in 0..block_size {
        for channel in channels {
            let wide = channel.get_i64(i) << shift;
            if wide < i64::from(i32::MIN) || wide > i64::from(i32::MAX) {
                return Err(QinError::ArithmeticOverflow);
            }
            let value = wide as i32;
            match depth {
                8 => out.push((value + 0x80) as u8),
                16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
                24 => out.extend_from_slice(&value.to_le_bytes()[..3]),
                _ => out.extend_from_slice(&value.to_le_bytes()),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_depth_rounding() {
        assert_eq!(output_depth(8), 8);
        assert_eq!(output_depth(12), 16);
        assert_eq!(output_depth(16), 16);
        assert_eq!(output_depth(20), 24);
        assert_eq!(output_depth(24), 24);
        assert_eq!(output_depth(32), 32);
    }

    #[test]
    fn test_pack_8bit_bias() {
        let channels = vec![SampleBuffer::Narrow(vec![0, 5, -5, 127, -128])];
        let mut out = Vec::new();
        pack_samples(&channels, 5, 8, &mut out).unwrap();
        assert_eq!(out, [0x80, 0x85, 0x7B, 0xFF, 0x00]);
    }

    #[test]
    fn test_pack_16bit_interleaved() {
        let channels = vec![
            SampleBuffer::Narrow(vec![1, -2]),
            SampleBuffer::Narrow(vec![256, -300]),
        ];
        let mut out = Vec::new();
        pack_samples(&channels, 2, 16, &mut out).unwrap();
        // 采样序遍历, 声道交织, 小端
        assert_eq!(
            out,
            [
                0x01, 0x00, 0x00, 0x01, // s0: L=1, R=256
                0xFE, 0xFF, 0xD4, 0xFE, // s1: L=-2, R=-300
            ],
        );
    }

    #[test]
    fn test_pack_12bit_shifts_into_16() {
        // 12 位源: 左移 4 位补齐到 16 位
        let channels = vec![SampleBuffer::Narrow(vec![1, -1])];
        let mut out = Vec::new();
        pack_samples(&channels, 2, 12, &mut out).unwrap();
        assert_eq!(out, [0x10, 0x00, 0xF0, 0xFF]);
    }

    #[test]
    fn test_pack_24bit() {
        let channels = vec![SampleBuffer::Narrow(vec![0x123456, -0x123456])];
        let mut out = Vec::new();
        pack_samples(&channels, 1, 24, &mut out).unwrap();
        assert_eq!(out, [0x56, 0x34, 0x12, 0xAA, 0xCB, 0xED]);
    }

    #[test]
    fn test_pack_32bit_from_wide() {
        let channels = vec![SampleBuffer::Wide(vec![
            i64::from(i32::MIN),
            i64::from(i32::MAX),
        ])];
        let mut out = Vec::new();
        pack_samples(&channels, 2, 32, &mut out).unwrap();
        assert_eq!(out[..4], i32::MIN.to_le_bytes());
        assert_eq!(out[4..], i32::MAX.to_le_bytes());
    }

    #[test]
    fn test_pack_rejects_out_of_range_wide() {
        let channels = vec![SampleBuffer::Wide(vec![i64::from(i32::MIN) - 1, 0])];
        let mut out = Vec::new();
        assert!(matches!(
            pack_samples(&channels, 2, 32, &mut out),
            Err(QinError::ArithmeticOverflow),
        ));
    }

    #[test]
    fn test_pack_rejects_overflow_after_shift() {
        // 31 位源移位补齐到 32 位后越界
        let channels = vec![SampleBuffer::Wide(vec![0x4000_0000])];
        let mut out = Vec::new();
        assert!(matches!(
            pack_samples(&channels, 1, 31, &mut out),
            Err(QinError::ArithmeticOverflow),
        ));
    }

    #[test]
    fn test_pack_rejects_short_channel() {
        let channels = vec![SampleBuffer::Narrow(vec![0; 3])];
        let mut out = Vec::new();
        assert!(pack_samples(&channels, 4, 16, &mut out).is_err());
    }
}
