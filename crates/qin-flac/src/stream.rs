//! 流级解码驱动.
//!
//! [`FlacStream`] 把帧解码器、扫描器与 seek 表粘合成顺序解码 +
//! 随机定位的完整通路. 调用方负责容器层: 解析元数据块取得
//! STREAMINFO / SEEKTABLE, 把流定位到首帧后交给本模块.
//!
//! 并发模型: 解码顺序推进, 流句柄与工作缓冲由互斥锁保护;
//! 帧索引可由后台扫描线程 ([`crate::scan::spawn_scan`]) 在独立
//! 流句柄上构建, 经 [`FlacStream::install_index`] 原子发布,
//! 之后的 seek 与重同步自动改走索引路径.

use std::io::{Read, Seek, SeekFrom};
use std::sync::{Mutex, MutexGuard, RwLock};

use log::{debug, warn};

use qin_core::{QinError, QinResult};

use crate::frame::{FrameDecoder, PcmFrame};
use crate::header::{FrameHeader, FRAME_HEADER_SIZE};
use crate::scan::{CancelToken, FrameIndex, StreamScanner};
use crate::streaminfo::{SeekTable, StreamInfo};

/// 互斥锁下的流读取状态
struct IoState<R> {
    stream: R,
    /// 下一帧的起始字节偏移
    position: u64,
    decoder: FrameDecoder,
    scratch: Vec<u8>,
}

/// FLAC 流解码器
pub struct FlacStream<R: Read + Seek> {
    stream_info: StreamInfo,
    seek_table: Option<SeekTable>,
    /// 首帧数据的起始偏移 (seek 表偏移的基准)
    first_frame_offset: u64,
    io: Mutex<IoState<R>>,
    index: RwLock<Option<FrameIndex>>,
}

impl<R: Read + Seek> FlacStream<R> {
    /// 创建流解码器, `stream` 须已定位到首帧起点
    pub fn new(
        mut stream: R,
        stream_info: StreamInfo,
        seek_table: Option<SeekTable>,
    ) -> QinResult<Self> {
        let first_frame_offset = stream.stream_position()?;
        let decoder = FrameDecoder::new(stream_info.clone());
        Ok(Self {
            stream_info,
            seek_table: seek_table.filter(|t| !t.is_empty()),
            first_frame_offset,
            io: Mutex::new(IoState {
                stream,
                position: first_frame_offset,
                decoder,
                scratch: Vec::new(),
            }),
            index: RwLock::new(None),
        })
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.stream_info
    }

    /// 下一帧的流偏移
    pub fn position(&self) -> u64 {
        self.lock_io().position
    }

    /// 总采样数: 优先取索引的精确统计, 否则用流声明值
    pub fn total_samples(&self) -> u64 {
        if let Some(index) = self.read_index().as_ref() {
            return index.total_samples();
        }
        self.stream_info.total_samples
    }

    /// 发布帧索引
    ///
    /// 通常由后台扫描完成后调用; 之后的 seek 与重同步走索引路径.
    pub fn install_index(&self, index: FrameIndex) {
        debug!("发布帧索引: {} 帧", index.len());
        *self.write_index() = Some(index);
    }

    pub fn has_index(&self) -> bool {
        self.read_index().is_some()
    }

    /// 前台构建并发布帧索引 (阻塞直到扫描完成或被取消)
    ///
    /// 被取消时已扫到的索引前缀仍会发布, 随后返回
    /// [`QinError::Cancelled`] 提示覆盖不完整.
    pub fn build_index(&self, cancel: &CancelToken) -> QinResult<()> {
        let outcome = {
            let mut io = self.lock_io();
            io.stream.seek(SeekFrom::Start(self.first_frame_offset))?;
            let scanner = StreamScanner::new(self.stream_info.clone());
            scanner.run(&mut io.stream, cancel)?
        };
        let cancelled = outcome.cancelled;
        self.install_index(outcome.index);
        if cancelled {
            return Err(QinError::Cancelled);
        }
        Ok(())
    }

    /// 解码当前位置的下一帧
    ///
    /// 成功时位置推进到帧尾; 失败时位置停在失败帧起点, 可恢复错误
    /// 经 [`FlacStream::resync`] 跳过后重试, 致命错误应中止解码.
    pub fn decode_next_frame(&self) -> QinResult<PcmFrame> {
        let window = self.stream_info.max_frame_size_or_default() as usize + FRAME_HEADER_SIZE;
        let mut io = self.lock_io();
        let state = &mut *io;

        state.stream.seek(SeekFrom::Start(state.position))?;
        state.scratch.resize(window, 0);
        let filled = fill_buffer(&mut state.stream, &mut state.scratch)?;
        if filled == 0 {
            return Err(QinError::Eof);
        }

        let (frame, consumed) = state.decoder.decode(&state.scratch[..filled])?;
        state.position += consumed as u64;
        Ok(frame)
    }

    /// 跳过损坏区域, 把位置推进到下一个可信的帧头
    ///
    /// 返回新位置. 索引已发布时直接取失败帧之后的首个索引项,
    /// 否则逐字节搜索下一个通过头部校验的同步点.
    pub fn resync(&self) -> QinResult<u64> {
        let mut io = self.lock_io();
        let state = &mut *io;

        if let Some(index) = self.read_index().as_ref() {
            return match index.find_after_offset(state.position) {
                Some((_, entry)) => {
                    warn!(
                        "重同步 (索引): {} -> {}",
                        state.position, entry.stream_offset,
                    );
                    state.position = entry.stream_offset;
                    Ok(state.position)
                }
                None => Err(QinError::Eof),
            };
        }

        let window = self.stream_info.max_frame_size_or_default() as usize + FRAME_HEADER_SIZE;
        let mut search = state.position + 1;
        loop {
            state.stream.seek(SeekFrom::Start(search))?;
            state.scratch.resize(window, 0);
            let filled = fill_buffer(&mut state.stream, &mut state.scratch)?;
            if filled < 2 {
                return Err(QinError::Eof);
            }

            for pos in 0..filled - 1 {
                if state.scratch[pos] != 0xFF || state.scratch[pos + 1] & 0xFE != 0xF8 {
                    continue;
                }
                if FrameHeader::parse(
                    &state.scratch[pos..filled],
                    Some(&self.stream_info),
                    false,
                )
                .is_ok()
                {
                    state.position = search + pos as u64;
                    warn!("重同步 (线性搜索): 新位置 {}", state.position);
                    return Ok(state.position);
                }
            }

            if filled < window {
                return Err(QinError::Eof);
            }
            search += (filled - FRAME_HEADER_SIZE) as u64;
        }
    }

    /// 定位到目标采样所在的帧边界
    ///
    /// 返回实际落点的采样号 (不大于目标的最近帧起点对应的帧边界,
    /// 帧内细调由调用方丢弃多余采样完成). 目标超出流末尾返回
    /// [`QinError::Eof`].
    ///
    /// 路径优先级: 帧索引 (精确) -> seek 表 + 有界扫描 -> 全流扫描.
    pub fn seek_to_sample(&self, target: u64) -> QinResult<u64> {
        // 索引项先拷出再取 io 锁, 避免嵌套持锁
        let indexed = self.read_index().as_ref().map(|index| {
            index
                .find_sample(target)
                .map(|(_, entry)| (entry.stream_offset, entry.sample_offset))
        });
        if let Some(lookup) = indexed {
            let Some((stream_offset, sample_offset)) = lookup else {
                return Err(QinError::Eof);
            };
            let mut io = self.lock_io();
            io.position = stream_offset;
            debug!(
                "seek (索引): 目标 {} -> 帧偏移 {}, 采样 {}",
                target, stream_offset, sample_offset,
            );
            return Ok(sample_offset);
        }

        let (base_sample, start_offset) = match self
            .seek_table
            .as_ref()
            .and_then(|t| t.nearest_before(target))
        {
            Some(point) => (
                point.sample_number,
                self.first_frame_offset + point.byte_offset,
            ),
            None => (0, self.first_frame_offset),
        };

        let mut io = self.lock_io();
        let state = &mut *io;
        state.stream.seek(SeekFrom::Start(start_offset))?;
        let scanner = StreamScanner::new(self.stream_info.clone());
        match scanner.run_until_sample(
            &mut state.stream,
            target - base_sample,
            &CancelToken::new(),
        )? {
            Some(found) => {
                state.position = found.stream_offset;
                debug!(
                    "seek (扫描): 目标 {} -> 帧偏移 {}, 采样 {}",
                    target,
                    found.stream_offset,
                    base_sample + found.sample_offset,
                );
                Ok(base_sample + found.sample_offset)
            }
            None => Err(QinError::Eof),
        }
    }

    fn lock_io(&self) -> MutexGuard<'_, IoState<R>> {
        self.io.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_index(&self) -> std::sync::RwLockReadGuard<'_, Option<FrameIndex>> {
        self.index.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_index(&self) -> std::sync::RwLockWriteGuard<'_, Option<FrameIndex>> {
        self.index.write().unwrap_or_else(|e| e.into_inner())
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
