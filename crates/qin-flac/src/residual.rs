//! 分区 Rice 残差解码.
//!
//! 残差区布局:
//! ```text
//! method:          2 bits (0=4 位参数, 1=5 位参数, 2/3=保留)
//! partition order: 4 bits (分区数 = 2^order)
//! 每个分区:        参数 (4/5 bits) + Rice 编码残差
//! ```
//!
//! 每分区残差数为 blocksize >> order, 首分区少 predictor_order 个
//! (暖启动采样不编码残差). 参数为全 1 是逃逸码: 后随 5 位原始位宽,
//! 分区内残差按该位宽定长存储, 位宽 0 表示全零.
//!
//! Rice 码字 = 一元商 + 定长余数, 解出的无符号值经之字形映射还原
//! 符号: value = (u >> 1) ^ -(u & 1).

use qin_core::{BitReader, QinError, QinResult};

/// 解码一个子帧的全部残差
///
/// `out` 长度为块大小, 残差写入 `out[predictor_order..]`,
/// 暖启动区间 `out[..predictor_order]` 不被触碰.
pub(crate) fn decode_residual(
    reader: &mut BitReader<'_>,
    predictor_order: usize,
    out: &mut [i32],
) -> QinResult<()> {
    let block_size = out.len();

    let param_bits = match reader.read_bits(2)? {
        0 => 4,
        1 => 5,
        method => {
            return Err(QinError::Structural(format!(
                "保留的残差编码方式: {}",
                method,
            )));
        }
    };
    let escape = (1u32 << param_bits) - 1;

    let partition_order = reader.read_bits(4)? as usize;
    let partitions = 1usize << partition_order;
    let partition_size = block_size >> partition_order;

    // 块大小必须能整分, 且首分区要容得下暖启动采样
    if partition_size << partition_order != block_size {
        return Err(QinError::Structural(format!(
            "分区阶数 {} 无法整分块大小 {}",
            partition_order, block_size,
        )));
    }
    if partition_size < predictor_order {
        return Err(QinError::Structural(format!(
            "首分区长度 {} 小于预测阶数 {}",
            partition_size, predictor_order,
        )));
    }

    let mut pos = predictor_order;
    for p in 0..partitions {
        let count = if p == 0 {
            partition_size - predictor_order
        } else {
            partition_size
        };
        let chunk = &mut out[pos..pos + count];

        let param = reader.read_bits(param_bits)?;
        if param < escape {
            decode_rice_chunk(reader, param, chunk)?;
        } else {
            // 逃逸分区: 定长原始残差
            let raw_bits = reader.read_bits(5)?;
            if raw_bits == 0 {
                chunk.fill(0);
            } else {
                for value in chunk.iter_mut() {
                    *value = reader.read_bits_signed(raw_bits)?;
                }
            }
        }
        pos += count;
    }

    Ok(())
}

/// 解码一个分区的 Rice 码字序列
fn decode_rice_chunk(
    reader: &mut BitReader<'_>,
    param: u32,
    out: &mut [i32],
) -> QinResult<()> {
    for value in out.iter_mut() {
        let quotient = reader.read_unary()?;
        let unsigned = if param > 0 {
            quotient.wrapping_shl(param) | reader.read_bits(param)?
        } else {
            quotient
        };
        // 之字形映射: 0,1,2,3,... -> 0,-1,1,-2,...
        *value = ((unsigned >> 1) as i32) ^ -((unsigned & 1) as i32);
    }
    Ok(())
}
