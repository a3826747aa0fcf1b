//! 立体声去相关.
//!
//! 三种差值编码的逆变换, 原地作用于两个声道缓冲:
//! ```text
//! left/side:  right = left - side
//! right/side: left  = side + right
//! mid/side:   mid' = (mid << 1) | (side & 1)   (恢复被丢弃的最低位)
//!             left  = (mid' + side) >> 1
//!             right = (mid' - side) >> 1
//! ```
//!
//! 差值声道在子帧解码时已按 +1 位深处理, 这里不再关心位深.

use qin_core::{QinError, QinResult};

use crate::header::ChannelAssignment;
use crate::sample::{RawSample, SampleBuffer};

/// 对一帧的声道缓冲执行去相关逆变换
///
/// 独立编码时不做任何事; 差值编码要求恰好两个声道且缓冲宽度一致.
pub(crate) fn decorrelate(
    assignment: ChannelAssignment,
    channels: &mut [SampleBuffer],
) -> QinResult<()> {
    if assignment == ChannelAssignment::Independent {
        return Ok(());
    }
    if channels.len() != 2 {
        return Err(QinError::Structural(format!(
            "差值编码要求 2 个声道, 实际 {}",
            channels.len(),
        )));
    }

    let (first, second) = channels.split_at_mut(1);
    match (&mut first[0], &mut second[0]) {
        (SampleBuffer::Narrow(left), SampleBuffer::Narrow(right)) => {
            apply(assignment, left, right)
        }
        (SampleBuffer::Wide(left), SampleBuffer::Wide(right)) => apply(assignment, left, right),
        _ => Err(QinError::Structural("声道缓冲宽度不一致".into())),
    }
}

fn apply<S: RawSample>(
    assignment: ChannelAssignment,
    left: &mut [S],
    right: &mut [S],
) -> QinResult<()> {
    if left.len() != right.len() {
        return Err(QinError::Structural("声道缓冲长度不一致".into()));
    }

    match assignment {
        ChannelAssignment::LeftSide => {
            for (l, r) in left.iter().zip(right.iter_mut()) {
                *r = S::from_i64(l.to_i64() - r.to_i64());
            }
        }
        ChannelAssignment::RightSide => {
            for (l, r) in left.iter_mut().zip(right.iter()) {
                *l = S::from_i64(l.to_i64() + r.to_i64());
            }
        }
        ChannelAssignment::MidSide => {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let side = r.to_i64();
                let mid = (l.to_i64() << 1) | (side & 1);
                *l = S::from_i64((mid + side) >> 1);
                *r = S::from_i64((mid - side) >> 1);
            }
        }
        ChannelAssignment::Independent => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrow_pair(left: &[i32], right: &[i32]) -> Vec<SampleBuffer> {
        vec![
            SampleBuffer::Narrow(left.to_vec()),
            SampleBuffer::Narrow(right.to_vec()),
        ]
    }

    fn narrow_of(buf: &SampleBuffer) -> &[i32] {
        match buf {
            SampleBuffer::Narrow(v) => v,
            SampleBuffer::Wide(_) => panic!("应为窄缓冲"),
        }
    }

    #[test]
    fn test_left_side() {
        // side = left - right -> right = left - side
        let mut channels = narrow_pair(&[10, 20, -5], &[3, -4, 2]);
        decorrelate(ChannelAssignment::LeftSide, &mut channels).unwrap();
        assert_eq!(narrow_of(&channels[0]), [10, 20, -5]);
        assert_eq!(narrow_of(&channels[1]), [7, 24, -7]);
    }

    #[test]
    fn test_right_side() {
        // left = side + right
        let mut channels = narrow_pair(&[3, -4, 2], &[7, 24, -7]);
        decorrelate(ChannelAssignment::RightSide, &mut channels).unwrap();
        assert_eq!(narrow_of(&channels[0]), [10, 20, -5]);
        assert_eq!(narrow_of(&channels[1]), [7, 24, -7]);
    }

    #[test]
    fn test_mid_side_parity() {
        // mid=5, side=3: mid' = 10 | 1 = 11, left = 7, right = 4
        let mut channels = narrow_pair(&[5], &[3]);
        decorrelate(ChannelAssignment::MidSide, &mut channels).unwrap();
        assert_eq!(narrow_of(&channels[0]), [7]);
        assert_eq!(narrow_of(&channels[1]), [4]);
        // 验证逆关系: side = left - right, mid = (left + right) >> 1
        assert_eq!(7 - 4, 3);
        assert_eq!((7 + 4) >> 1, 5);
    }

    #[test]
    fn test_mid_side_even_parity() {
        // side 为偶数时最低位为 0, mid 不需修正
        let mut channels = narrow_pair(&[10], &[4]);
        decorrelate(ChannelAssignment::MidSide, &mut channels).unwrap();
        assert_eq!(narrow_of(&channels[0]), [12]);
        assert_eq!(narrow_of(&channels[1]), [8]);
    }

    #[test]
    fn test_mid_side_negative_side() {
        let mut channels = narrow_pair(&[0, -10], &[-3, -5]);
        decorrelate(ChannelAssignment::MidSide, &mut channels).unwrap();
        let left = narrow_of(&channels[0]).to_vec();
        let right = narrow_of(&channels[1]).to_vec();
        // 任意样本都应满足逆关系
        for i in 0..2 {
            assert_eq!(left[i] - right[i], [-3, -5][i]);
            assert_eq!((left[i] + right[i]) >> 1, [0, -10][i]);
        }
    }

    #[test]
    fn test_independent_untouched() {
        let mut channels = narrow_pair(&[1, 2], &[3, 4]);
        decorrelate(ChannelAssignment::Independent, &mut channels).unwrap();
        assert_eq!(narrow_of(&channels[0]), [1, 2]);
        assert_eq!(narrow_of(&channels[1]), [3, 4]);
    }

    #[test]
    fn test_wide_buffers() {
        let mut channels = vec![
            SampleBuffer::Wide(vec![1i64 << 33]),
            SampleBuffer::Wide(vec![2]),
        ];
        decorrelate(ChannelAssignment::LeftSide, &mut channels).unwrap();
        match &channels[1] {
            SampleBuffer::Wide(v) => assert_eq!(v[0], (1i64 << 33) - 2),
            SampleBuffer::Narrow(_) => panic!("应为宽缓冲"),
        }
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let mut channels = vec![
            SampleBuffer::Narrow(vec![1]),
            SampleBuffer::Wide(vec![2]),
        ];
        assert!(decorrelate(ChannelAssignment::MidSide, &mut channels).is_err());
    }
}
