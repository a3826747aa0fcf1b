//! 声道采样缓冲.
//!
//! 解码位深加上预测增益可能超出 32 位 (32 位源配合差值声道与高阶
//! 预测), 每帧按最坏情况一次性选择缓冲宽度: 常规流走 i32 窄路径,
//! 高位深流走 i64 宽路径. 宽路径仅在打包输出时收窄.

/// 原始采样标量, 由窄 (i32) 与宽 (i64) 两种实现
///
/// 预测器与声道去相关对该 trait 泛型, 中间运算统一在 i64 进行,
/// 窄路径的范围检查由调用方按位深条件触发.
pub trait RawSample: Copy + Default + PartialEq + std::fmt::Debug + Send + 'static {
    /// 是否为宽 (64 位) 表示
    const IS_WIDE: bool;

    fn from_i64(v: i64) -> Self;
    fn to_i64(self) -> i64;
}

impl RawSample for i32 {
    const IS_WIDE: bool = false;

    #[inline]
    fn from_i64(v: i64) -> Self {
        v as i32
    }

    #[inline]
    fn to_i64(self) -> i64 {
        i64::from(self)
    }
}

impl RawSample for i64 {
    const IS_WIDE: bool = true;

    #[inline]
    fn from_i64(v: i64) -> Self {
        v
    }

    #[inline]
    fn to_i64(self) -> i64 {
        self
    }
}

/// 单声道采样缓冲, 宽度在帧级别一次性确定
#[derive(Debug, Clone)]
pub enum SampleBuffer {
    Narrow(Vec<i32>),
    Wide(Vec<i64>),
}

impl Default for SampleBuffer {
    fn default() -> Self {
        SampleBuffer::Narrow(Vec::new())
    }
}

impl SampleBuffer {
    /// 按帧参数准备缓冲: 匹配宽度并清零到目标长度
    ///
    /// 宽度一致时复用已有容量; 宽度切换重新分配.
    pub fn prepare(&mut self, wide: bool, len: usize) {
        match (wide, &mut *self) {
            (false, SampleBuffer::Narrow(v)) => {
                v.clear();
                v.resize(len, 0);
            }
            (true, SampleBuffer::Wide(v)) => {
                v.clear();
                v.resize(len, 0);
            }
            (false, _) => *self = SampleBuffer::Narrow(vec![0; len]),
            (true, _) => *self = SampleBuffer::Wide(vec![0; len]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::Narrow(v) => v.len(),
            SampleBuffer::Wide(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, SampleBuffer::Wide(_))
    }

    /// 取第 i 个采样 (统一为 i64)
    #[inline]
    pub fn get_i64(&self, i: usize) -> i64 {
        match self {
            SampleBuffer::Narrow(v) => i64::from(v[i]),
            SampleBuffer::Wide(v) => v[i],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_reuses_variant() {
        let mut buf = SampleBuffer::default();
        buf.prepare(false, 4);
        assert!(!buf.is_wide());
        assert_eq!(buf.len(), 4);

        if let SampleBuffer::Narrow(v) = &mut buf {
            v[0] = 42;
        }
        buf.prepare(false, 2);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.get_i64(0), 0);
    }

    #[test]
    fn test_prepare_switches_width() {
        let mut buf = SampleBuffer::default();
        buf.prepare(true, 3);
        assert!(buf.is_wide());
        assert_eq!(buf.len(), 3);

        buf.prepare(false, 3);
        assert!(!buf.is_wide());
    }

    #[test]
    fn test_raw_sample_roundtrip() {
        assert_eq!(<i32 as RawSample>::from_i64(-5).to_i64(), -5);
        assert_eq!(<i64 as RawSample>::from_i64(1 << 40).to_i64(), 1 << 40);
        // 窄表示按补码截断
        assert_eq!(<i32 as RawSample>::from_i64(i64::from(i32::MAX) + 1), i32::MIN);
    }
}
