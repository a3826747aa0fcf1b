//! 子帧解码与信号重建.
//!
//! 子帧头 (8 bits):
//! ```text
//! padding:     1 bit (必须为 0, 非零视为同步丢失)
//! type:        6 bits (0=常量, 1=原始, 8-12=固定预测, 32-63=LPC)
//! wasted flag: 1 bit (置位时后随一元编码的移位数-1)
//! ```
//!
//! 四种子帧: 常量 (单个采样值), 原始 (逐采样定长存储), 固定预测
//! (0-4 阶固定系数多项式), LPC (1-32 阶量化系数线性预测). 预测类
//! 子帧先读暖启动采样, 再解残差, 最后沿递推关系重建信号.
//!
//! 信号重建统一在 i64 累加; 窄缓冲且位深组合可能越界时逐采样做
//! 范围检查, 超出 32 位补码范围报算术溢出 (不截断不饱和).

use qin_core::{BitReader, QinError, QinResult};

use crate::residual::decode_residual;
use crate::sample::RawSample;

/// 固定预测的最大阶数
pub(crate) const MAX_FIXED_ORDER: u32 = 4;

/// 子帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubframeType {
    Constant,
    Verbatim,
    Fixed(usize),
    Lpc(usize),
}

/// 解析子帧类型码
fn parse_type(code: u32) -> QinResult<SubframeType> {
    if code == 0 {
        Ok(SubframeType::Constant)
    } else if code == 1 {
        Ok(SubframeType::Verbatim)
    } else if code & 0x20 != 0 {
        Ok(SubframeType::Lpc((code as usize & 0x1F) + 1))
    } else if code & 0x18 == 0x08 {
        let order = code as usize & 0x07;
        if order > MAX_FIXED_ORDER as usize {
            return Err(QinError::Structural(format!(
                "固定预测阶数超限: {}",
                order,
            )));
        }
        Ok(SubframeType::Fixed(order))
    } else {
        Err(QinError::Structural(format!("保留的子帧类型: {}", code)))
    }
}

/// 读取一个暖启动采样 (位深可达 33: 32 位源 + 差值声道)
#[inline]
fn read_warmup<S: RawSample>(reader: &mut BitReader<'_>, bps: u32) -> QinResult<S> {
    let value = if bps <= 32 {
        i64::from(reader.read_bits_signed(bps)?)
    } else {
        reader.read_bits64_signed(bps)?
    };
    Ok(S::from_i64(value))
}

/// 解码一个声道的子帧
///
/// `bps` 为该声道的有效位深 (已含差值声道调整); `dest` 长度为块大小;
/// `residual` 为与 `dest` 等长的残差暂存区, 内容会被覆盖.
pub(crate) fn decode_subframe<S: RawSample>(
    reader: &mut BitReader<'_>,
    bps: u32,
    dest: &mut [S],
    residual: &mut [i32],
) -> QinResult<()> {
    let tag = reader.read_bits(8)?;
    if tag & 0x80 != 0 {
        return Err(QinError::SyncLoss);
    }
    let subframe_type = parse_type((tag & 0xFE) >> 1)?;

    // 废弃位: 编码端整体右移过的位数, 重建后左移还原
    let wasted = if tag & 0x01 != 0 {
        reader.read_unary()? + 1
    } else {
        0
    };
    if wasted >= bps {
        return Err(QinError::Structural(format!(
            "废弃位数 {} 不小于位深 {}",
            wasted, bps,
        )));
    }
    let bps = bps - wasted;

    match subframe_type {
        SubframeType::Constant => {
            let value = read_warmup::<S>(reader, bps)?;
            dest.fill(value);
        }
        SubframeType::Verbatim => {
            for sample in dest.iter_mut() {
                *sample = read_warmup::<S>(reader, bps)?;
            }
        }
        SubframeType::Fixed(order) => {
            if order > dest.len() {
                return Err(QinError::Structural(format!(
                    "预测阶数 {} 超过块大小 {}",
                    order,
                    dest.len(),
                )));
            }
            for sample in dest[..order].iter_mut() {
                *sample = read_warmup::<S>(reader, bps)?;
            }
            decode_residual(reader, order, residual)?;
            restore_fixed(dest, residual, order, bps)?;
        }
        SubframeType::Lpc(order) => {
            if order > dest.len() {
                return Err(QinError::Structural(format!(
                    "预测阶数 {} 超过块大小 {}",
                    order,
                    dest.len(),
                )));
            }
            for sample in dest[..order].iter_mut() {
                *sample = read_warmup::<S>(reader, bps)?;
            }

            // 系数精度: 4 位编码值 + 1, 全 1 为保留
            let precision = reader.read_bits(4)? + 1;
            if precision >= 1 << 4 {
                return Err(QinError::Structural("LPC 系数精度为保留值".into()));
            }
            let shift = reader.read_bits_signed(5)?;
            if shift < 0 {
                return Err(QinError::Structural(format!("LPC 移位为负: {}", shift)));
            }

            let mut coefficients = [0i32; 32];
            for c in coefficients[..order].iter_mut() {
                *c = reader.read_bits_signed(precision)?;
            }

            decode_residual(reader, order, residual)?;
            restore_lpc(dest, residual, &coefficients[..order], shift as u32, bps)?;
        }
    }

    if wasted > 0 {
        for sample in dest.iter_mut() {
            *sample = S::from_i64(sample.to_i64() << wasted);
        }
    }

    Ok(())
}

/// 窄路径范围检查: 重建值必须落在 32 位补码范围内
#[inline]
fn check_narrow(value: i64) -> QinResult<i64> {
    if value > i64::from(i32::MAX) || value < i64::from(i32::MIN) {
        return Err(QinError::ArithmeticOverflow);
    }
    Ok(value)
}

/// 沿固定预测递推关系重建信号
///
/// 递推以移位加法表达 (0-2 阶直接展开, 3 阶为 3a-3b+c 形式,
/// 4 阶为 4(a+c)-6b-d 形式). 窄缓冲且位深 + 阶数可能越界时逐采样
/// 范围检查; 宽缓冲 i64 本身即是目标表示.
fn restore_fixed<S: RawSample>(
    dest: &mut [S],
    residual: &[i32],
    order: usize,
    bps: u32,
) -> QinResult<()> {
    let check = !S::IS_WIDE && bps + order as u32 > 32;

    macro_rules! restore {
        (|$i:ident| $predictor:expr) => {
            for $i in order..dest.len() {
                let value = i64::from(residual[$i]) + $predictor;
                let value = if check { check_narrow(value)? } else { value };
                dest[$i] = S::from_i64(value);
            }
        };
    }

    match order {
        0 => restore!(|i| 0),
        1 => restore!(|i| dest[i - 1].to_i64()),
        2 => restore!(|i| (dest[i - 1].to_i64() << 1) - dest[i - 2].to_i64()),
        3 => restore!(|i| {
            let diff = dest[i - 1].to_i64() - dest[i - 2].to_i64();
            (diff << 1) + diff + dest[i - 3].to_i64()
        }),
        4 => restore!(|i| {
            let b = dest[i - 2].to_i64();
            ((dest[i - 1].to_i64() + dest[i - 3].to_i64()) << 2)
                - ((b << 2) + (b << 1))
                - dest[i - 4].to_i64()
        }),
        _ => {
            return Err(QinError::Structural(format!(
                "固定预测阶数超限: {}",
                order,
            )));
        }
    }
    Ok(())
}

/// 沿 LPC 递推关系重建信号
///
/// 预测值 = (Σ 系数 * 历史采样) >> shift, 点积在 i64 累加.
/// 窄缓冲且位深超过 16 时逐采样范围检查.
fn restore_lpc<S: RawSample>(
    dest: &mut [S],
    residual: &[i32],
    coefficients: &[i32],
    shift: u32,
    bps: u32,
) -> QinResult<()> {
    let order = coefficients.len();
    let check = !S::IS_WIDE && bps > 16;

    for i in order..dest.len() {
        let mut acc: i64 = 0;
        for (j, &c) in coefficients.iter().enumerate() {
            acc += i64::from(c) * dest[i - 1 - j].to_i64();
        }
        let value = i64::from(residual[i]) + (acc >> shift);
        let value = if check { check_narrow(value)? } else { value };
        dest[i] = S::from_i64(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BitSink {
        bytes: Vec<u8>,
        bit_count: u32,
    }

    impl BitSink {
        fn new() -> Self {
            Self {
                bytes: Vec::new(),
                bit_count: 0,
            }
        }

        fn push_bits(&mut self, value: u64, n: u32) {
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

        fn push_rice(&mut self, value: i32, param: u32) {
            let unsigned = ((value << 1) ^ (value >> 31)) as u32;
            let quotient = unsigned >> param;
            self.push_bits(1, quotient + 1);
            if param > 0 {
                self.push_bits(u64::from(unsigned & ((1 << param) - 1)), param);
            }
        }

        fn finish(self) -> Vec<u8> {
            self.bytes
        }
    }

    fn decode_narrow(data: &[u8], bps: u32, block_size: usize) -> QinResult<Vec<i32>> {
        let mut dest = vec![0i32; block_size];
        let mut residual = vec![0i32; block_size];
        let mut reader = BitReader::new(data);
        decode_subframe(&mut reader, bps, &mut dest, &mut residual)?;
        Ok(dest)
    }

    #[test]
    fn test_constant_subframe() {
        let mut sink = BitSink::new();
        sink.push_bits(0, 8); // 类型 0 = 常量
        sink.push_bits(5, 8); // 8 位采样值
        let dest = decode_narrow(&sink.finish(), 8, 4).unwrap();
        assert_eq!(dest, [5, 5, 5, 5]);
    }

    #[test]
    fn test_verbatim_subframe() {
        let mut sink = BitSink::new();
        sink.push_bits(0x02, 8); // 类型 1 = 原始
        for v in [1i64, -2, 3, -4] {
            sink.push_bits((v & 0xFFFF) as u64, 16);
        }
        let dest = decode_narrow(&sink.finish(), 16, 4).unwrap();
        assert_eq!(dest, [1, -2, 3, -4]);
    }

    #[test]
    fn test_fixed_order_zero_passthrough() {
        // 0 阶固定预测: 信号即残差
        let mut sink = BitSink::new();
        sink.push_bits(8 << 1, 8); // 类型 8 = 固定 0 阶
        sink.push_bits(0b00, 2);
        sink.push_bits(0, 4);
        sink.push_bits(4, 4);
        for r in [1i32, -2, 3, -4] {
            sink.push_rice(r, 4);
        }
        let dest = decode_narrow(&sink.finish(), 16, 4).unwrap();
        assert_eq!(dest, [1, -2, 3, -4]);
    }

    #[test]
    fn test_fixed_order_one() {
        // 1 阶: s[i] = r[i] + s[i-1], 暖启动 10, 残差 [1, -3, 2]
        let mut sink = BitSink::new();
        sink.push_bits(9 << 1, 8);
        sink.push_bits(10, 8); // 暖启动
        sink.push_bits(0b00, 2);
        sink.push_bits(0, 4);
        sink.push_bits(3, 4);
        for r in [1, -3, 2] {
            sink.push_rice(r, 3);
        }
        let dest = decode_narrow(&sink.finish(), 8, 4).unwrap();
        assert_eq!(dest, [10, 11, 8, 10]);
    }

    #[test]
    fn test_fixed_recurrences_match_polynomial_form() {
        // 各阶递推应与教科书多项式形式一致
        let history = [3i64, -7, 12, -5];
        let r = 2i64;

        let expect2 = r + 2 * history[3] - history[2];
        let expect3 = r + 3 * history[3] - 3 * history[2] + history[1];
        let expect4 = r + 4 * history[3] - 6 * history[2] + 4 * history[1] - history[0];

        for (order, expected) in [(2usize, expect2), (3, expect3), (4, expect4)] {
            let mut dest: Vec<i32> = history.iter().map(|&v| v as i32).collect();
            dest.push(0);
            let mut residual = vec![0i32; 5];
            residual[4] = r as i32;
            // 直接驱动重建例程, 历史区间视为暖启动
            restore_fixed::<i32>(&mut dest[4 - order..], &residual[4 - order..], order, 16)
                .unwrap();
            assert_eq!(i64::from(dest[4]), expected, "order {}", order);
        }
    }

    #[test]
    fn test_lpc_subframe() {
        // 2 阶 LPC, 精度 4 位, 移位 1, 系数 [2, -1]
        // s[i] = r[i] + ((2*s[i-1] - s[i-2]) >> 1)
        let mut sink = BitSink::new();
        sink.push_bits(0x21 << 1, 8); // 类型 0x21 = LPC 2 阶
        sink.push_bits(5, 8);
        sink.push_bits(7, 8);
        sink.push_bits(3, 4); // 精度编码 3 -> 4 位
        sink.push_bits(1, 5); // 移位 1
        sink.push_bits(2, 4); // 系数 2
        sink.push_bits(0xF, 4); // 系数 -1
        sink.push_bits(0b00, 2);
        sink.push_bits(0, 4);
        sink.push_bits(2, 4);
        for r in [1, 0] {
            sink.push_rice(r, 2);
        }
        let dest = decode_narrow(&sink.finish(), 8, 4).unwrap();
        // s[2] = 1 + ((14 - 5) >> 1) = 5; s[3] = 0 + ((10 - 7) >> 1) = 1
        assert_eq!(dest, [5, 7, 5, 1]);
    }

    #[test]
    fn test_lpc_reserved_precision_rejected() {
        let mut sink = BitSink::new();
        sink.push_bits(0x20 << 1, 8); // LPC 1 阶
        sink.push_bits(0, 8);
        sink.push_bits(0xF, 4); // 精度编码全 1 = 保留
        sink.push_bits(0, 32);
        let mut dest = vec![0i32; 4];
        let mut residual = vec![0i32; 4];
        let data = sink.finish();
        let mut reader = BitReader::new(&data);
        assert!(matches!(
            decode_subframe(&mut reader, 8, &mut dest, &mut residual),
            Err(QinError::Structural(_)),
        ));
    }

    #[test]
    fn test_lpc_negative_shift_rejected() {
        let mut sink = BitSink::new();
        sink.push_bits(0x20 << 1, 8);
        sink.push_bits(0, 8);
        sink.push_bits(3, 4);
        sink.push_bits(0x1F, 5); // 5 位补码 -1
        sink.push_bits(0, 32);
        let mut dest = vec![0i32; 4];
        let mut residual = vec![0i32; 4];
        let data = sink.finish();
        let mut reader = BitReader::new(&data);
        assert!(matches!(
            decode_subframe(&mut reader, 8, &mut dest, &mut residual),
            Err(QinError::Structural(_)),
        ));
    }

    #[test]
    fn test_wasted_bits_shift() {
        // 常量子帧, 1 个废弃位: 有效位深 7, 重建后左移 1
        let mut sink = BitSink::new();
        sink.push_bits(0x01, 8); // 类型 0 + 废弃位标志
        sink.push_bits(1, 1); // 一元 0 -> 废弃位数 1
        sink.push_bits(21, 7);
        let dest = decode_narrow(&sink.finish(), 8, 4).unwrap();
        assert_eq!(dest, [42, 42, 42, 42]);
    }

    #[test]
    fn test_padding_bit_is_sync_loss() {
        let mut sink = BitSink::new();
        sink.push_bits(0x80, 8);
        sink.push_bits(0, 8);
        let mut dest = vec![0i32; 4];
        let mut residual = vec![0i32; 4];
        let data = sink.finish();
        let mut reader = BitReader::new(&data);
        assert!(matches!(
            decode_subframe(&mut reader, 8, &mut dest, &mut residual),
            Err(QinError::SyncLoss),
        ));
    }

    #[test]
    fn test_reserved_subframe_types_rejected() {
        for code in [2u32, 5, 13, 16, 31] {
            let mut sink = BitSink::new();
            sink.push_bits(u64::from(code) << 1, 8);
            sink.push_bits(0, 32);
            let mut dest = vec![0i32; 4];
            let mut residual = vec![0i32; 4];
            let data = sink.finish();
            let mut reader = BitReader::new(&data);
            assert!(
                matches!(
                    decode_subframe(&mut reader, 8, &mut dest, &mut residual),
                    Err(QinError::Structural(_)),
                ),
                "类型码 {} 应被拒绝",
                code,
            );
        }
    }

    #[test]
    fn test_narrow_overflow_detected() {
        // 32 位位深 1 阶固定预测: 暖启动 i32::MAX, 残差 1 -> 溢出
        let mut dest = vec![i32::MAX, 0];
        let residual = vec![0, 1];
        assert!(matches!(
            restore_fixed::<i32>(&mut dest, &residual, 1, 32),
            Err(QinError::ArithmeticOverflow),
        ));

        // 相同输入在宽缓冲下正常重建
        let mut wide = vec![i64::from(i32::MAX), 0];
        restore_fixed::<i64>(&mut wide, &residual, 1, 33).unwrap();
        assert_eq!(wide[1], i64::from(i32::MAX) + 1);
    }

    #[test]
    fn test_wide_constant_33_bits() {
        // 33 位暖启动读取走 64 位路径
        let mut sink = BitSink::new();
        sink.push_bits(0, 8);
        sink.push_bits(1 << 32, 33); // 33 位补码最小值
        let mut dest = vec![0i64; 2];
        let mut residual = vec![0i32; 2];
        let data = sink.finish();
        let mut reader = BitReader::new(&data);
        decode_subframe(&mut reader, 33, &mut dest, &mut residual).unwrap();
        assert_eq!(dest, [-(1i64 << 32), -(1i64 << 32)]);
    }
}
