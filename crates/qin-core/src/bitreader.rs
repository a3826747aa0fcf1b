//! 比特流读取器.
//!
//! 提供从字节缓冲区中按大端位序 (MSB first) 读取数据的能力,
//! 是 FLAC 帧头与子帧解析的基础设施.
//!
//! 实现基于 32 位前瞻缓存: 缓存始终精确持有从当前 (字节, 位) 位置
//! 开始的接下来 32 个位, 每次游标移动后重新装填. 装填时越过缓冲区
//! 末尾的部分以 0 填充, 逻辑越界读取通过剩余位数预算报告为
//! [`QinError::Eof`], 调用方无需预留尾部冗余字节.

use crate::{QinError, QinResult};

/// 每字节前导 0 游程长度表 (首个 1 位之前的 0 位数, 全 0 字节为 8)
const fn build_unary_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    table[0] = 8;
    let mut i = 1usize;
    while i < 256 {
        let mut zeros = 0u8;
        let mut bit = 0x80u16;
        while (i as u16) & bit == 0 {
            zeros += 1;
            bit >>= 1;
        }
        table[i] = zeros;
        i += 1;
    }
    table
}

static UNARY_TABLE: [u8; 256] = build_unary_table();

/// 比特流读取器
///
/// # 示例
/// ```
/// use qin_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引 (缓存基址)
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u32,
    /// 前瞻缓存: 从当前位置开始的 32 个位
    cache: u32,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        let mut reader = Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
            cache: 0,
        };
        reader.refill();
        reader
    }

    /// 重新装填前瞻缓存
    ///
    /// 越过缓冲区末尾的字节以 0 填充, 由剩余位数预算保证不会被消费.
    fn refill(&mut self) {
        let byte = |i: usize| {
            u32::from(
                self.data
                    .get(self.byte_pos + i)
                    .copied()
                    .unwrap_or(0),
            )
        };
        let mut cache = (byte(0) << 24) | (byte(1) << 16) | (byte(2) << 8) | byte(3);
        if self.bit_pos > 0 {
            cache = (cache << self.bit_pos) | (byte(4) >> (8 - self.bit_pos));
        }
        self.cache = cache;
    }

    /// 获取已消费的总位数
    pub fn position_bits(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取当前字节位置 (向下取整)
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        self.data.len() * 8 - self.position_bits()
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 向前移动 N 个位
    pub fn seek_bits(&mut self, n: u32) -> QinResult<()> {
        if n as usize > self.bits_left() {
            return Err(QinError::Eof);
        }
        let total = self.bit_pos + n;
        self.byte_pos += (total >> 3) as usize;
        self.bit_pos = total & 7;
        self.refill();
        Ok(())
    }

    /// 向前移动 N 个字节
    pub fn seek_bytes(&mut self, n: usize) -> QinResult<()> {
        self.seek_bits(n as u32 * 8)
    }

    /// 对齐到下一个字节边界
    ///
    /// 已在字节边界时不做任何事.
    pub fn align_to_byte(&mut self) -> QinResult<()> {
        if self.bit_pos > 0 {
            self.seek_bits(8 - self.bit_pos)?;
        }
        Ok(())
    }

    /// 从缓存顶端取出 N 个位并前移 (内部使用, N <= 24)
    #[inline]
    fn take(&mut self, n: u32) -> QinResult<u32> {
        let result = self.cache >> (32 - n);
        self.seek_bits(n)?;
        Ok(result)
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> QinResult<u32> {
        if self.bits_left() == 0 {
            return Err(QinError::Eof);
        }
        let bit = self.cache >> 31;
        self.seek_bits(1)?;
        Ok(bit)
    }

    /// 读取 N 个位 (1-32)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    /// N <= 24 时单次缓存读取完成; 25-32 位拆为两次游标前移,
    /// 保证每次读取都落在缓存的有效窗口内.
    pub fn read_bits(&mut self, n: u32) -> QinResult<u32> {
        if n == 0 || n > 32 {
            return Err(QinError::InvalidArgument(format!(
                "read_bits: n={} 必须在 1-32 之间",
                n,
            )));
        }
        if n as usize > self.bits_left() {
            return Err(QinError::Eof);
        }

        if n <= 24 {
            return self.take(n);
        }
        let high = self.take(24)?;
        let low = self.take(n - 24)?;
        Ok((high << (n - 24)) | low)
    }

    /// 读取 N 个位 (1-64)
    ///
    /// 由最多三次 <= 24 位的缓存读取拼接而成.
    pub fn read_bits64(&mut self, n: u32) -> QinResult<u64> {
        if n == 0 || n > 64 {
            return Err(QinError::InvalidArgument(format!(
                "read_bits64: n={} 必须在 1-64 之间",
                n,
            )));
        }
        if n as usize > self.bits_left() {
            return Err(QinError::Eof);
        }

        let mut remaining = n;
        let mut result: u64 = 0;
        while remaining > 0 {
            let chunk = remaining.min(24);
            result = (result << chunk) | u64::from(self.take(chunk)?);
            remaining -= chunk;
        }
        Ok(result)
    }

    /// 读取 N 位有符号整数 (二进制补码, 1-32)
    pub fn read_bits_signed(&mut self, n: u32) -> QinResult<i32> {
        let val = self.read_bits(n)?;
        // 符号扩展: 左移到最高位后算术右移
        Ok(((val << (32 - n)) as i32) >> (32 - n))
    }

    /// 读取 N 位有符号整数 (二进制补码, 1-64)
    pub fn read_bits64_signed(&mut self, n: u32) -> QinResult<i64> {
        let val = self.read_bits64(n)?;
        Ok(((val << (64 - n)) as i64) >> (64 - n))
    }

    /// 读取一元编码值: 终止位 1 之前连续 0 的个数
    ///
    /// 通过按字节查表取得缓存顶端字节内的 0 游程长度, 避免逐位循环.
    pub fn read_unary(&mut self) -> QinResult<u32> {
        let mut count = 0u32;
        loop {
            let zeros = u32::from(UNARY_TABLE[(self.cache >> 24) as usize]);
            if zeros < 8 {
                // 游程 + 终止位
                if (zeros + 1) as usize > self.bits_left() {
                    return Err(QinError::Eof);
                }
                self.seek_bits(zeros + 1)?;
                return Ok(count + zeros);
            }
            if self.bits_left() < 8 {
                return Err(QinError::Eof);
            }
            self.seek_bits(8)?;
            count += 8;
        }
    }

    /// 读取 FLAC 的 UTF-8 风格变长无符号整数 (64 位形式)
    ///
    /// 借用 UTF-8 的首字节长度前缀 (`0xxxxxxx`, `110xxxxx`, `1110xxxx`, ...)
    /// 编码一个无符号整数而非码点. 首字节 0xFF, 后续字节非 `10xxxxxx`,
    /// 或解码结果为全 1 哨兵值时报错.
    pub fn read_utf8_u64(&mut self) -> QinResult<u64> {
        let first = self.read_bits(8)? as u8;

        let (value, extra_bytes) = if first & 0x80 == 0 {
            (u64::from(first), 0)
        } else if first & 0xE0 == 0xC0 {
            (u64::from(first & 0x1F), 1)
        } else if first & 0xF0 == 0xE0 {
            (u64::from(first & 0x0F), 2)
        } else if first & 0xF8 == 0xF0 {
            (u64::from(first & 0x07), 3)
        } else if first & 0xFC == 0xF8 {
            (u64::from(first & 0x03), 4)
        } else if first & 0xFE == 0xFC {
            (u64::from(first & 0x01), 5)
        } else if first == 0xFE {
            (0u64, 6)
        } else {
            return Err(QinError::InvalidData(format!(
                "无效的变长编码首字节: 0x{:02X}",
                first,
            )));
        };

        let mut result = value;
        for _ in 0..extra_bytes {
            let byte = self.read_bits(8)? as u8;
            if byte & 0xC0 != 0x80 {
                return Err(QinError::InvalidData("无效的变长编码后续字节".into()));
            }
            result = (result << 6) | u64::from(byte & 0x3F);
        }

        if result == u64::MAX {
            return Err(QinError::InvalidData("变长编码值为保留哨兵".into()));
        }
        Ok(result)
    }

    /// 读取 FLAC 的 UTF-8 风格变长无符号整数 (32 位形式)
    pub fn read_utf8_u32(&mut self) -> QinResult<u32> {
        let value = self.read_utf8_u64()?;
        if value >= u64::from(u32::MAX) {
            return Err(QinError::InvalidData("变长编码值超出 32 位范围".into()));
        }
        Ok(value as u32)
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
