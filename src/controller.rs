use std::time::Duration;

use crate::barrier::{Barrier, Servo};
use crate::clock::Clock;
use crate::events::{CycleOutcome, EventLog};
use crate::indicator::{Indicators, Signals};
use crate::model::{ActionContext, Distance, GateSettings, GateState, SensorChannel};
use crate::sensor::{EchoTimer, RangeFinder};
use crate::upload::Uploader;
use crate::verdict::Verdict;

/// 单个控制周期的处理结果（用于日志与测试）。
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub exit: Distance,
    pub entry: Distance,
    pub outcome: CycleOutcome,
    pub verdict: Option<Verdict>,
}

/// 道闸控制器：每周期交错测距，出口优先，入口依据云端结论开闸。
pub struct GateController<E, S, L, U, C> {
    settings: GateSettings,
    sensors: RangeFinder<E>,
    barrier: Barrier<S, C>,
    indicators: Indicators<L, C>,
    uploader: U,
    clock: C,
    events: EventLog,
}

impl<E, S, L, U, C> GateController<E, S, L, U, C>
where
    E: EchoTimer,
    S: Servo,
    L: Signals,
    U: Uploader,
    C: Clock + Clone,
{
    pub fn new(settings: GateSettings, echo: E, servo: S, signals: L, uploader: U, clock: C) -> Self {
        let sensors = RangeFinder::new(echo, settings.echo_timeout());
        let barrier = Barrier::new(
            servo,
            clock.clone(),
            settings.open_angle,
            settings.closed_angle,
        );
        let indicators = Indicators::new(
            signals,
            clock.clone(),
            settings.warn_cycles,
            settings.warn_half_period(),
        );
        let events = EventLog::new(settings.event_log_max);
        Self {
            settings,
            sensors,
            barrier,
            indicators,
            uploader,
            clock,
            events,
        }
    }

    /// 上电归位：落闸、红灯亮、补光灯灭。
    pub fn start(&mut self) {
        if let Err(err) = self.barrier.home() {
            log::warn!("Barrier homing failed: {:?}", err);
        }
        self.indicators.show(self.barrier.state());
        self.indicators.set_flash(false);
        log::info!(
            "Gate controller ready (threshold {}cm, zero reading {:?})",
            self.settings.detection_threshold_cm,
            self.settings.zero_reading
        );
    }

    /// 主循环，永不返回。
    pub fn run(&mut self) -> ! {
        self.start();
        loop {
            self.run_cycle();
        }
    }

    /// 执行一个控制周期。
    pub fn run_cycle(&mut self) -> CycleReport {
        // 共用 trigger，两路读取之间必须留出回波消散时间
        let exit = self.sensors.measure(SensorChannel::Exit);
        self.clock.sleep_for(self.settings.interleave_settle());
        let entry = self.sensors.measure(SensorChannel::Entry);
        log::debug!("Distances exit={} entry={}", exit, entry);

        if self.settings.detects(exit) {
            return self.service_exit(exit, entry);
        }
        if self.settings.detects(entry) {
            return self.service_entry(exit, entry);
        }

        self.clock.sleep_for(self.settings.idle_delay());
        CycleReport {
            exit,
            entry,
            outcome: CycleOutcome::Idle,
            verdict: None,
        }
    }

    /// 出场：上传仅作记录，无论结论如何都开闸。
    fn service_exit(&mut self, exit: Distance, entry: Distance) -> CycleReport {
        log::info!("Vehicle at exit ({})", exit);
        self.indicators.set_flash(false);
        let verdict = self.uploader.submit(ActionContext::Exit);
        let outcome = self.open_gate(self.settings.exit_dwell(), CycleOutcome::ExitOpened);
        self.clock.sleep_for(self.settings.exit_debounce());
        self.finish(ActionContext::Exit, exit, entry, verdict, outcome)
    }

    /// 入场：仅在结论授权时开闸，否则闪红灯警示。
    fn service_entry(&mut self, exit: Distance, entry: Distance) -> CycleReport {
        log::info!("Vehicle at entry ({})", entry);
        self.indicators.set_flash(false);
        let verdict = self.uploader.submit(ActionContext::Entry);
        let outcome = if verdict.authorizes_entry() {
            self.open_gate(self.settings.entry_dwell(), CycleOutcome::EntryOpened)
        } else {
            log::warn!("Entry denied: {}", verdict);
            self.indicators.warn();
            CycleOutcome::EntryDenied
        };
        self.clock.sleep_for(self.settings.entry_debounce());
        self.finish(ActionContext::Entry, exit, entry, verdict, outcome)
    }

    /// 开闸停留后落闸，指示灯随闸门状态切换；落闸失败时再尝试一次。
    fn open_gate(&mut self, dwell: Duration, opened: CycleOutcome) -> CycleOutcome {
        let indicators = &mut self.indicators;
        let result = self
            .barrier
            .open_for_with(dwell, || indicators.show(GateState::Open));
        let outcome = match result {
            Ok(()) => opened,
            Err(err) => {
                log::warn!("Barrier actuation failed: {:?}", err);
                if self.barrier.state() == GateState::Open {
                    if let Err(err) = self.barrier.close() {
                        log::warn!("Barrier close retry failed: {:?}", err);
                    }
                    opened
                } else {
                    CycleOutcome::ActuationFailed
                }
            }
        };
        self.indicators.show(self.barrier.state());
        outcome
    }

    fn finish(
        &mut self,
        action: ActionContext,
        exit: Distance,
        entry: Distance,
        verdict: Verdict,
        outcome: CycleOutcome,
    ) -> CycleReport {
        let at_ms = self.clock.now().as_millis() as u64;
        let event = self
            .events
            .record(at_ms, action, exit, entry, verdict.text(), outcome);
        log::info!("{}", event.to_json_string());
        CycleReport {
            exit,
            entry,
            outcome,
            verdict: Some(verdict),
        }
    }

    pub fn gate_state(&self) -> GateState {
        self.barrier.state()
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn barrier(&self) -> &Barrier<S, C> {
        &self.barrier
    }

    pub fn indicators(&self) -> &Indicators<L, C> {
        &self.indicators
    }

    pub fn sensors_mut(&mut self) -> &mut RangeFinder<E> {
        &mut self.sensors
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }
}
