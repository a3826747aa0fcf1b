//! 统一错误类型定义.
//!
//! 所有 Qin crate 共用的错误类型, 按恢复策略分为两类:
//! 可恢复错误 (同步丢失, 校验和不匹配) 由调用方跳过当前帧后重试;
//! 致命错误 (结构错误, 算术溢出) 表示码流损坏或编码器不兼容, 应中止解码.

use thiserror::Error;

/// Qin 统一错误类型
#[derive(Debug, Error)]
pub enum QinError {
    /// 同步码丢失或保留位非零
    #[error("同步码丢失")]
    SyncLoss,

    /// 帧头 CRC-8 校验失败 (视为假同步码)
    #[error("帧头 CRC-8 不匹配: 读取=0x{read:02X}, 计算=0x{calculated:02X}")]
    HeaderCrcMismatch { read: u8, calculated: u8 },

    /// 帧 CRC-16 校验失败, 整帧被拒绝
    #[error("帧 CRC-16 不匹配: 余数=0x{remainder:04X}")]
    FrameCrcMismatch { remainder: u16 },

    /// 结构错误 (无效子帧类型, 预测阶数, LPC 精度/移位等)
    #[error("结构错误: {0}")]
    Structural(String),

    /// 信号重建时算术溢出 (超出 32 位有符号范围)
    #[error("信号重建算术溢出, 需使用修复后的编码器重新打包")]
    ArithmeticOverflow,

    /// 扫描时帧格式与流格式不一致
    #[error("帧格式与流格式不一致")]
    FormatMismatch,

    /// 帧/采样序号非单调递增
    #[error("帧序号非单调递增")]
    SequenceMismatch,

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 不支持的码流特性
    #[error("不支持的特性: {0}")]
    Unsupported(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达数据末尾
    #[error("已到达数据末尾")]
    Eof,

    /// 操作被取消信号中止
    #[error("操作已取消")]
    Cancelled,
}

impl QinError {
    /// 错误是否可通过重新同步恢复
    ///
    /// 可恢复错误意味着调用方可以向前跳过并重试下一个候选帧;
    /// 不可恢复错误应作为流级失败上报.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            QinError::SyncLoss
                | QinError::HeaderCrcMismatch { .. }
                | QinError::FrameCrcMismatch { .. }
                | QinError::FormatMismatch
                | QinError::SequenceMismatch
                | QinError::Eof
        )
    }
}

/// Qin 统一 Result 类型
pub type QinResult<T> = Result<T, QinError>;
