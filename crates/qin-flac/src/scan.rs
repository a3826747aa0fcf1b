//! 流扫描与帧索引.
//!
//! 扫描器从任意位置线性扫过码流, 找出全部帧边界, 构建采样号 ->
//! 字节偏移的精确索引. 候选同步点逐层过滤:
//!
//! 1. 字节级: 0xFF 后跟 0b111110xx;
//! 2. 帧头级: 全部字段合法且 CRC-8 通过;
//! 3. 流级: 格式三元组与首帧一致, 帧/采样号严格递增.
//!
//! 任一层失败仅回退一个字节继续, 不会让单点损坏毁掉整个索引.
//! 接受一帧后按流声明的最小帧大小向前跳跃, 避免把帧内载荷字节
//! 当作候选.
//!
//! 扫描可在后台线程执行 ([`spawn_scan`]), 通过取消令牌随时中止;
//! 中止时已构建的索引前缀保留在 [`ScanOutcome`] 中送回, 不丢弃.

use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use qin_core::{QinError, QinResult};

use crate::header::{FrameHeader, FrameNumber, FRAME_HEADER_SIZE};
use crate::streaminfo::StreamInfo;

/// 扫描读取窗口大小
const SCAN_BUFFER_SIZE: usize = 0x20000;

/// 索引中的一条帧记录
#[derive(Debug, Clone)]
pub struct FrameInformation {
    /// 帧头
    pub header: FrameHeader,
    /// 帧首字节在流中的绝对偏移
    pub stream_offset: u64,
    /// 本帧首个采样的序号 (从扫描起点累计)
    pub sample_offset: u64,
}

/// 帧索引: 按流偏移与采样号双重单调递增排列
#[derive(Debug, Clone, Default)]
pub struct FrameIndex {
    entries: Vec<FrameInformation>,
}

impl FrameIndex {
    pub fn entries(&self) -> &[FrameInformation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 索引覆盖的总采样数
    pub fn total_samples(&self) -> u64 {
        self.entries
            .last()
            .map_or(0, |e| e.sample_offset + u64::from(e.header.block_size))
    }

    /// 找到覆盖目标采样的帧 (首个起始采样不小于目标的帧)
    pub fn find_sample(&self, target: u64) -> Option<(usize, &FrameInformation)> {
        let index = self.entries.partition_point(|e| e.sample_offset < target);
        self.entries.get(index).map(|e| (index, e))
    }

    /// 找到首个起始偏移大于给定位置的帧
    pub fn find_after_offset(&self, offset: u64) -> Option<(usize, &FrameInformation)> {
        let index = self.entries.partition_point(|e| e.stream_offset <= offset);
        self.entries.get(index).map(|e| (index, e))
    }
}

/// 协作式取消令牌
///
/// 克隆共享同一信号; 置位后扫描在下一个候选点退出.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// 一次完整扫描的产物
///
/// 被取消时 `index` 是中止前已构建的前缀, `cancelled` 置位;
/// 前缀照常可用于 seek 与重同步, 只是覆盖不到流末尾.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub index: FrameIndex,
    pub cancelled: bool,
}

/// 扫描主循环的终止方式
enum ScanStop {
    /// 扫到流末尾
    EndOfStream,
    /// 取消令牌置位
    Cancelled,
    /// 命中目标采样所在的帧
    Found(FrameInformation),
}

/// 流扫描器
pub struct StreamScanner {
    stream_info: StreamInfo,
}

impl StreamScanner {
    pub fn new(stream_info: StreamInfo) -> Self {
        Self { stream_info }
    }

    /// 从流当前位置扫到末尾, 构建完整帧索引
    ///
    /// 被取消时返回中止前已构建的索引前缀并置位 `cancelled`,
    /// 已收集的结果不丢弃.
    pub fn run<R: Read + Seek>(
        &self,
        stream: &mut R,
        cancel: &CancelToken,
    ) -> QinResult<ScanOutcome> {
        let mut entries = Vec::new();
        let stop = self.scan(stream, cancel, None, &mut entries)?;
        let cancelled = matches!(stop, ScanStop::Cancelled);

        let index = FrameIndex { entries };
        let declared = self.stream_info.total_samples;
        if !cancelled && declared > 0 && index.total_samples() != declared {
            warn!(
                "扫描采样总数与流声明不一致: 扫描={}, 声明={}",
                index.total_samples(),
                declared,
            );
        }
        if cancelled {
            debug!("扫描被取消: 已索引 {} 帧", index.len());
        } else {
            debug!("扫描完成: {} 帧, {} 采样", index.len(), index.total_samples());
        }
        Ok(ScanOutcome { index, cancelled })
    }

    /// 扫到首个起始采样不小于目标的帧即停止
    ///
    /// 采样号从扫描起点累计; 目标超出流末尾时返回 `None`.
    /// 点查询没有可保留的索引产物, 被取消时返回
    /// [`QinError::Cancelled`].
    pub fn run_until_sample<R: Read + Seek>(
        &self,
        stream: &mut R,
        target_sample: u64,
        cancel: &CancelToken,
    ) -> QinResult<Option<FrameInformation>> {
        let mut entries = Vec::new();
        match self.scan(stream, cancel, Some(target_sample), &mut entries)? {
            ScanStop::Found(info) => Ok(Some(info)),
            ScanStop::EndOfStream => Ok(None),
            ScanStop::Cancelled => Err(QinError::Cancelled),
        }
    }

    /// 线性扫描主循环
    ///
    /// 接受的帧依次追加到 `entries`; `stop_at` 给定时在命中的瞬间
    /// 返回该帧, 不再继续. 取消只中断循环, 不回滚 `entries`.
    fn scan<R: Read + Seek>(
        &self,
        stream: &mut R,
        cancel: &CancelToken,
        stop_at: Option<u64>,
        entries: &mut Vec<FrameInformation>,
    ) -> QinResult<ScanStop> {
        let min_frame_size = self.stream_info.min_frame_size_or_default() as usize;
        let mut buffer = vec![0u8; SCAN_BUFFER_SIZE];
        let mut base_offset = stream.stream_position()?;
        let mut sample_offset: u64 = 0;
        let mut base_format: Option<FrameHeader> = None;
        let mut previous: Option<FrameNumber> = None;

        loop {
            let filled = fill_buffer(stream, &mut buffer)?;
            if filled < 2 {
                return Ok(ScanStop::EndOfStream);
            }
            // 窗口未到流末尾时保留一个帧头长度的重叠区,
            // 保证候选帧头不被缓冲边界截断; 最后一个窗口扫到底
            let at_eof = filled < buffer.len();
            let scan_end = if at_eof {
                filled - 1
            } else {
                filled - FRAME_HEADER_SIZE
            };

            let mut pos = 0usize;
            while pos < scan_end {
                if cancel.is_cancelled() {
                    return Ok(ScanStop::Cancelled);
                }

                if buffer[pos] != 0xFF || buffer[pos + 1] & 0xFE != 0xF8 {
                    pos += 1;
                    continue;
                }

                let header =
                    match FrameHeader::parse(&buffer[pos..filled], Some(&self.stream_info), false)
                    {
                        Ok(header) => header,
                        Err(_) => {
                            pos += 1;
                            continue;
                        }
                    };

                if let Err(err) = self.validate_candidate(&base_format, previous, &header) {
                    debug!("候选帧被拒绝 (偏移 {}): {}", base_offset + pos as u64, err);
                    pos += 1;
                    continue;
                }

                let info = FrameInformation {
                    stream_offset: base_offset + pos as u64,
                    sample_offset,
                    header,
                };
                if let Some(target) = stop_at {
                    if info.sample_offset >= target {
                        return Ok(ScanStop::Found(info));
                    }
                }

                sample_offset += u64::from(info.header.block_size);
                previous = Some(info.header.number);
                if base_format.is_none() {
                    base_format = Some(info.header.clone());
                }
                entries.push(info);

                // 帧体内不再有候选, 按最小帧大小跳跃
                pos += min_frame_size.max(1);
            }

            if at_eof {
                return Ok(ScanStop::EndOfStream);
            }
            // 回退重叠区后继续下一窗口
            base_offset += scan_end as u64;
            stream.seek(SeekFrom::Start(base_offset))?;
        }
    }

    /// 流级候选校验: 格式一致且序号严格递增
    fn validate_candidate(
        &self,
        base_format: &Option<FrameHeader>,
        previous: Option<FrameNumber>,
        header: &FrameHeader,
    ) -> QinResult<()> {
        if let Some(base) = base_format {
            if !header.compare_format(base) {
                return Err(QinError::FormatMismatch);
            }
        }
        if let Some(previous) = previous {
            let ascending = match (previous, header.number) {
                (FrameNumber::Frame(a), FrameNumber::Frame(b)) => b > a,
                (FrameNumber::Sample(a), FrameNumber::Sample(b)) => b > a,
                _ => false,
            };
            if !ascending {
                return Err(QinError::SequenceMismatch);
            }
        }
        Ok(())
    }
}

/// 读满缓冲区, 流末尾时返回实际读取量
fn fill_buffer<R: Read>(stream: &mut R, buffer: &mut [u8]) -> QinResult<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = stream.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// 后台扫描任务句柄
///
/// 结果经通道送回; 任务自持流的独立句柄, 不与前台解码争用.
pub struct ScanTask {
    handle: Option<JoinHandle<()>>,
    receiver: Receiver<QinResult<ScanOutcome>>,
    cancel: CancelToken,
}

impl ScanTask {
    /// 任务的取消令牌
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 非阻塞查询结果
    pub fn try_result(&self) -> Option<QinResult<ScanOutcome>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(Err(QinError::InvalidData("扫描线程异常退出".into())))
            }
        }
    }

    /// 阻塞等待扫描完成或被取消
    pub fn wait(mut self) -> QinResult<ScanOutcome> {
        let result = match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(QinError::InvalidData("扫描线程异常退出".into())),
        };
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        result
    }
}

/// 在后台线程启动扫描
///
/// `stream` 应是独立句柄且已定位到首帧; 调用方持有返回的任务句柄
/// 取结果, 或用取消令牌中止.
pub fn spawn_scan<R>(stream_info: StreamInfo, mut stream: R) -> ScanTask
where
    R: Read + Seek + Send + 'static,
{
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let (sender, receiver) = mpsc::channel();

    let handle = thread::spawn(move || {
        let scanner = StreamScanner::new(stream_info);
        let result = scanner.run(&mut stream, &token);
        // 接收端先行退出时结果直接丢弃
        let _ = sender.send(result);
    });

    ScanTask {
        handle: Some(handle),
        receiver,
        cancel,
    }
}
