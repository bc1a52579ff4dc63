//! 模拟外设：虚拟时钟、脚本化测距、舵机、指示灯、相机与网络流。
//!
//! 用于主机侧测试，所有等待都推进虚拟时间而不真正休眠。

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use embedded_svc::io::{ErrorKind, ErrorType, Read, Write};

use crate::barrier::Servo;
use crate::clock::Clock;
use crate::indicator::{Lamp, Signals};
use crate::model::{ActionContext, SensorChannel};
use crate::sensor::EchoTimer;
use crate::upload::{Connector, FrameSource, Uploader};
use crate::verdict::Verdict;

/// 模拟外设的注入故障。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimFault;

/// 虚拟时钟：`sleep_for` 直接推进时间并记录每次等待。
#[derive(Clone, Debug, Default)]
pub struct VirtualClock {
    now: Rc<Cell<Duration>>,
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 不记录为等待的时间推进（模拟外部耗时）。
    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get().saturating_add(duration));
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep_for(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}

/// 单通道读数脚本：先消费队列，队列空后返回常驻读数。
#[derive(Debug, Default)]
struct EchoScript {
    queued: VecDeque<Option<Duration>>,
    steady: Option<Duration>,
}

impl EchoScript {
    fn next(&mut self) -> Option<Duration> {
        self.queued.pop_front().unwrap_or(self.steady)
    }
}

/// 脚本化超声波测距。未设置读数时表现为无回波。
#[derive(Debug, Default)]
pub struct SimEcho {
    entry: EchoScript,
    exit: EchoScript,
    fail_next: bool,
    clock: Option<VirtualClock>,
    pings: Vec<(SensorChannel, Duration)>,
    ping_times: Vec<(SensorChannel, Duration)>,
}

impl SimEcho {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按距离设置常驻读数；`None` 表示无回波。
    pub fn with_distances(exit_cm: Option<f32>, entry_cm: Option<f32>) -> Self {
        let mut echo = Self::new();
        echo.set_distance(SensorChannel::Exit, exit_cm);
        echo.set_distance(SensorChannel::Entry, entry_cm);
        echo
    }

    /// 记录每次 ping 的虚拟时间。
    pub fn timed(mut self, clock: VirtualClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn set_distance(&mut self, channel: SensorChannel, cm: Option<f32>) {
        self.script(channel).steady = cm.map(echo_for_cm);
    }

    /// 追加一次性读数（echo 高电平时长）。
    pub fn push(&mut self, channel: SensorChannel, high_time: Option<Duration>) {
        self.script(channel).queued.push_back(high_time);
    }

    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    pub fn pings(&self) -> &[(SensorChannel, Duration)] {
        &self.pings
    }

    pub fn ping_times(&self) -> &[(SensorChannel, Duration)] {
        &self.ping_times
    }

    fn script(&mut self, channel: SensorChannel) -> &mut EchoScript {
        match channel {
            SensorChannel::Entry => &mut self.entry,
            SensorChannel::Exit => &mut self.exit,
        }
    }
}

impl EchoTimer for SimEcho {
    type Error = SimFault;

    fn ping(
        &mut self,
        channel: SensorChannel,
        timeout: Duration,
    ) -> Result<Option<Duration>, Self::Error> {
        self.pings.push((channel, timeout));
        if let Some(clock) = &self.clock {
            self.ping_times.push((channel, clock.now()));
        }
        if std::mem::take(&mut self.fail_next) {
            return Err(SimFault);
        }
        Ok(self.script(channel).next())
    }
}

/// 距离反推 echo 时长（四舍五入到微秒）。
fn echo_for_cm(cm: f32) -> Duration {
    let micros = (cm * 2.0 / 0.0343).round().max(0.0) as u64;
    Duration::from_micros(micros)
}

/// 记录角度指令的舵机。
#[derive(Debug, Default)]
pub struct SimServo {
    angles: Vec<u8>,
    fail_next: bool,
}

impl SimServo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    pub fn angles(&self) -> &[u8] {
        &self.angles
    }
}

impl Servo for SimServo {
    type Error = SimFault;

    fn set_angle(&mut self, degrees: u8) -> Result<(), Self::Error> {
        if std::mem::take(&mut self.fail_next) {
            return Err(SimFault);
        }
        self.angles.push(degrees);
        Ok(())
    }
}

/// 记录指令历史的指示灯（初始全灭）。
#[derive(Debug, Default)]
pub struct SimSignals {
    red: bool,
    green: bool,
    flash: bool,
    history: Vec<(Lamp, bool)>,
    fail_next: bool,
}

impl SimSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    pub fn is_on(&self, lamp: Lamp) -> bool {
        match lamp {
            Lamp::Red => self.red,
            Lamp::Green => self.green,
            Lamp::Flash => self.flash,
        }
    }

    /// 指定灯收到的熄灭指令次数。
    pub fn off_commands(&self, lamp: Lamp) -> usize {
        self.history
            .iter()
            .filter(|(target, on)| *target == lamp && !*on)
            .count()
    }

    pub fn history(&self) -> &[(Lamp, bool)] {
        &self.history
    }
}

impl Signals for SimSignals {
    type Error = SimFault;

    fn set(&mut self, lamp: Lamp, on: bool) -> Result<(), Self::Error> {
        if std::mem::take(&mut self.fail_next) {
            return Err(SimFault);
        }
        match lamp {
            Lamp::Red => self.red = on,
            Lamp::Green => self.green = on,
            Lamp::Flash => self.flash = on,
        }
        self.history.push((lamp, on));
        Ok(())
    }
}

/// 模拟帧：drop 时归还缓冲区。
#[derive(Debug)]
pub struct SimFrame {
    data: Vec<u8>,
    outstanding: Rc<Cell<usize>>,
}

impl AsRef<[u8]> for SimFrame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for SimFrame {
    fn drop(&mut self) {
        self.outstanding.set(self.outstanding.get().saturating_sub(1));
    }
}

/// 按顺序吐帧的相机，最后一帧会被重复使用。
#[derive(Debug, Default)]
pub struct SimCamera {
    frames: VecDeque<Vec<u8>>,
    failing: bool,
    captures: usize,
    outstanding: Rc<Cell<usize>>,
}

impl SimCamera {
    pub fn with_frames(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames: frames.into(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn captures(&self) -> usize {
        self.captures
    }

    /// 尚未归还的帧数。
    pub fn outstanding(&self) -> usize {
        self.outstanding.get()
    }
}

impl FrameSource for SimCamera {
    type Frame = SimFrame;
    type Error = SimFault;

    fn capture(&mut self) -> Result<Self::Frame, Self::Error> {
        self.captures += 1;
        if self.failing {
            return Err(SimFault);
        }
        let next = if self.frames.len() > 1 {
            self.frames.pop_front()
        } else {
            self.frames.front().cloned()
        };
        let data = next.ok_or(SimFault)?;
        self.outstanding.set(self.outstanding.get() + 1);
        Ok(SimFrame {
            data,
            outstanding: self.outstanding.clone(),
        })
    }
}

/// 单条连接的收发记录。
#[derive(Debug, Default)]
pub struct StreamLog {
    pub written: Vec<u8>,
    pub write_sizes: Vec<usize>,
    pub closed: bool,
}

/// 脚本化字节流：读取预置响应，记录所有写入。
#[derive(Debug)]
pub struct SimStream {
    response: Vec<u8>,
    pos: usize,
    reads: usize,
    trickle: Option<(usize, VirtualClock, Duration)>,
    fail_reads_after: Option<(usize, ErrorKind)>,
    fail_writes_after: Option<usize>,
    log: Rc<RefCell<StreamLog>>,
}

impl SimStream {
    pub fn new() -> Self {
        Self::with_response(b"")
    }

    pub fn with_response(response: &[u8]) -> Self {
        Self {
            response: response.to_vec(),
            pos: 0,
            reads: 0,
            trickle: None,
            fail_reads_after: None,
            fail_writes_after: None,
            log: Rc::new(RefCell::new(StreamLog::default())),
        }
    }

    /// 每次读取最多 `bytes` 字节，并推进虚拟时间 `delay`。
    pub fn trickle(mut self, bytes: usize, clock: VirtualClock, delay: Duration) -> Self {
        self.trickle = Some((bytes.max(1), clock, delay));
        self
    }

    /// 成功读取 `reads` 次后返回错误。
    pub fn fail_reads_after(mut self, reads: usize, kind: ErrorKind) -> Self {
        self.fail_reads_after = Some((reads, kind));
        self
    }

    /// 累计写入超过 `bytes` 字节时返回错误。
    pub fn fail_writes_after(mut self, bytes: usize) -> Self {
        self.fail_writes_after = Some(bytes);
        self
    }

    /// 复制脚本配置，使用独立的收发记录。
    pub fn fork(&self) -> Self {
        Self {
            response: self.response.clone(),
            pos: 0,
            reads: 0,
            trickle: self.trickle.clone(),
            fail_reads_after: self.fail_reads_after,
            fail_writes_after: self.fail_writes_after,
            log: Rc::new(RefCell::new(StreamLog::default())),
        }
    }

    pub fn log(&self) -> Rc<RefCell<StreamLog>> {
        self.log.clone()
    }

    pub fn written(&self) -> Vec<u8> {
        self.log.borrow().written.clone()
    }

    pub fn write_sizes(&self) -> Vec<usize> {
        self.log.borrow().write_sizes.clone()
    }
}

impl Default for SimStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimStream {
    fn drop(&mut self) {
        self.log.borrow_mut().closed = true;
    }
}

impl ErrorType for SimStream {
    type Error = ErrorKind;
}

impl Read for SimStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if let Some((limit, kind)) = self.fail_reads_after {
            if self.reads >= limit {
                return Err(kind);
            }
        }
        self.reads += 1;
        let mut count = buf.len().min(self.response.len() - self.pos);
        if let Some((bytes, clock, delay)) = &self.trickle {
            clock.advance(*delay);
            count = count.min(*bytes);
        }
        buf[..count].copy_from_slice(&self.response[self.pos..self.pos + count]);
        self.pos += count;
        Ok(count)
    }
}

impl Write for SimStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut log = self.log.borrow_mut();
        if let Some(limit) = self.fail_writes_after {
            if log.written.len() + buf.len() > limit {
                return Err(ErrorKind::BrokenPipe);
            }
        }
        log.written.extend_from_slice(buf);
        log.write_sizes.push(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// 每次连接派生一条新的脚本流；`refusing` 时连接总是失败。
#[derive(Debug, Default)]
pub struct SimConnector {
    template: Option<SimStream>,
    connects: Vec<(String, u16)>,
    timeouts: Vec<Duration>,
    streams: Vec<Rc<RefCell<StreamLog>>>,
}

impl SimConnector {
    pub fn answering(template: SimStream) -> Self {
        Self {
            template: Some(template),
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> &[(String, u16)] {
        &self.connects
    }

    pub fn timeouts(&self) -> &[Duration] {
        &self.timeouts
    }

    /// 最近一条连接写出的全部字节。
    pub fn sent(&self) -> Option<Vec<u8>> {
        self.streams.last().map(|log| log.borrow().written.clone())
    }

    /// 所有派生出的连接是否都已关闭。
    pub fn closed(&self) -> bool {
        self.streams.iter().all(|log| log.borrow().closed)
    }
}

impl Connector for SimConnector {
    type Stream = SimStream;
    type Error = ErrorKind;

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self::Stream, Self::Error> {
        self.connects.push((host.to_string(), port));
        self.timeouts.push(timeout);
        let template = self.template.as_ref().ok_or(ErrorKind::ConnectionRefused)?;
        let stream = template.fork();
        self.streams.push(stream.log());
        Ok(stream)
    }
}

/// 返回固定结论的上传器，记录每次提交的方向。
#[derive(Debug)]
pub struct SimUploader {
    verdict: Verdict,
    actions: Vec<ActionContext>,
}

impl SimUploader {
    pub fn answering(verdict: Verdict) -> Self {
        Self {
            verdict,
            actions: Vec::new(),
        }
    }

    pub fn actions(&self) -> &[ActionContext] {
        &self.actions
    }
}

impl Uploader for SimUploader {
    fn submit(&mut self, action: ActionContext) -> Verdict {
        self.actions.push(action);
        self.verdict.clone()
    }
}
