//! CRC 校验和计算.
//!
//! FLAC 使用两种 CRC: CRC-8 (多项式 x^8+x^2+x+1, 初始值 0) 保护帧头,
//! 覆盖校验字节之前的全部帧头字节; CRC-16 (多项式 x^16+x^15+x^2+1,
//! 初始值 0) 保护整帧, 覆盖范围包含帧尾的校验字段本身 -- 因此对
//! 格式正确的帧, CRC-16(数据 ∥ 校验和) 恒为 0.
//!
//! 两张 256 项查找表在编译期构建, 之后不可变.

const CRC8_POLY: u8 = 0x07;
const CRC16_POLY: u16 = 0x8005;

const fn build_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC8_TABLE: [u8; 256] = build_crc8_table();
static CRC16_TABLE: [u16; 256] = build_crc16_table();

/// 计算 CRC-8 (FLAC 帧头校验)
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        crc = CRC8_TABLE[(crc ^ byte) as usize];
    }
    crc
}

/// 计算 CRC-16 (FLAC 帧尾校验)
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc = (crc << 8) ^ CRC16_TABLE[((crc >> 8) as u8 ^ byte) as usize];
    }
    crc
}
