use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::model::{ActionContext, Distance};

/// 一次出入场处理的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Idle,
    ExitOpened,
    EntryOpened,
    EntryDenied,
    /// 舵机指令失败，闸门未能打开。
    ActuationFailed,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Idle => "idle",
            CycleOutcome::ExitOpened => "exit_opened",
            CycleOutcome::EntryOpened => "entry_opened",
            CycleOutcome::EntryDenied => "entry_denied",
            CycleOutcome::ActuationFailed => "actuation_failed",
        }
    }

    pub fn opened_gate(&self) -> bool {
        matches!(self, CycleOutcome::ExitOpened | CycleOutcome::EntryOpened)
    }
}

/// 出入场事件记录（日志输出为 JSON 行）。
#[derive(Clone, Debug, Serialize)]
pub struct GateEvent {
    pub seq: u32,
    pub at_ms: u64,
    pub action: ActionContext,
    pub exit_cm: Distance,
    pub entry_cm: Distance,
    pub verdict: String,
    pub outcome: CycleOutcome,
}

impl GateEvent {
    /// 序列化为 JSON 字符串。
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl fmt::Display for GateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} exit={} entry={} verdict={} outcome={}",
            self.seq,
            self.action,
            self.exit_cm,
            self.entry_cm,
            self.verdict,
            self.outcome.as_str()
        )
    }
}

/// 最近事件环形缓存，满时丢弃最旧记录。
pub struct EventLog {
    max_len: usize,
    events: VecDeque<GateEvent>,
    next_seq: u32,
}

impl EventLog {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
            events: VecDeque::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// 分配序号并写入事件。
    pub fn record(
        &mut self,
        at_ms: u64,
        action: ActionContext,
        exit_cm: Distance,
        entry_cm: Distance,
        verdict: &str,
        outcome: CycleOutcome,
    ) -> &GateEvent {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        if self.events.len() >= self.max_len {
            self.events.pop_front();
        }
        self.events.push_back(GateEvent {
            seq,
            at_ms,
            action,
            exit_cm,
            entry_cm,
            verdict: verdict.to_string(),
            outcome,
        });
        &self.events[self.events.len() - 1]
    }

    pub fn latest(&self) -> Option<&GateEvent> {
        self.events.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GateEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(log: &mut EventLog, outcome: CycleOutcome) -> u32 {
        log.record(
            0,
            ActionContext::Entry,
            Distance::NO_ECHO,
            Distance::from_cm(10.0),
            "OPEN_GATE",
            outcome,
        )
        .seq
    }

    #[test]
    fn drops_oldest_when_full() {
        let mut log = EventLog::new(2);
        record(&mut log, CycleOutcome::EntryOpened);
        record(&mut log, CycleOutcome::EntryDenied);
        record(&mut log, CycleOutcome::ExitOpened);
        assert_eq!(log.len(), 2);
        let seqs: Vec<u32> = log.iter().map(|event| event.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(log.latest().unwrap().outcome, CycleOutcome::ExitOpened);
    }

    #[test]
    fn serializes_as_json_line() {
        let mut log = EventLog::new(4);
        log.record(
            1500,
            ActionContext::Exit,
            Distance::from_cm(10.0),
            Distance::NO_ECHO,
            "EXIT_SUCCESS",
            CycleOutcome::ExitOpened,
        );
        let json: serde_json::Value =
            serde_json::from_str(&log.latest().unwrap().to_json_string()).unwrap();
        assert_eq!(json["action"], "EXIT");
        assert_eq!(json["outcome"], "exit_opened");
        assert_eq!(json["verdict"], "EXIT_SUCCESS");
        assert_eq!(json["at_ms"], 1500);
        assert_eq!(json["entry_cm"], 999.0);
    }

    #[test]
    fn opened_gate_only_for_opening_outcomes() {
        assert!(CycleOutcome::ExitOpened.opened_gate());
        assert!(CycleOutcome::EntryOpened.opened_gate());
        assert!(!CycleOutcome::EntryDenied.opened_gate());
        assert!(!CycleOutcome::ActuationFailed.opened_gate());
        assert!(!CycleOutcome::Idle.opened_gate());
    }
}
