//! Shared agent state (spec.md §4.I), grounded in the instance fields of
//! `PoeAgent` (`poed.py`): the two timestamps used to detect a "set
//! event", the last-seen power bank used to detect a "PSU event", the
//! fail-safe flag, and the reported agent state. Bundled behind one
//! `Mutex` since the autosave task and the IPC task both read and write
//! it and updates are infrequent compared to chip I/O.

use chrono::{Local, NaiveDateTime};
use poe_proto::config::{format_timestamp, parse_timestamp, UNIX_START_TIME};

/// Mirrors `PoeAgentState` (`poed.py`): whether the last platform init
/// completed cleanly or was forced into fail-safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    CleanStart,
    UncleanStart,
}

#[derive(Debug)]
pub struct Inner {
    pub last_poe_set_time: NaiveDateTime,
    pub prev_poe_set_time: NaiveDateTime,
    pub last_power_bank: Option<u8>,
    pub failsafe: bool,
    pub agent_state: AgentState,
    pub cfg_serial_num: u64,
    pub rt_counter: u32,
}

impl Default for Inner {
    fn default() -> Self {
        let epoch = parse_timestamp(UNIX_START_TIME).expect("UNIX_START_TIME parses");
        Inner {
            last_poe_set_time: epoch,
            prev_poe_set_time: epoch,
            last_power_bank: None,
            failsafe: false,
            agent_state: AgentState::CleanStart,
            cfg_serial_num: 0,
            rt_counter: 0,
        }
    }
}

/// Shared handle passed to the lifecycle, autosave, and IPC tasks.
pub struct SharedState {
    inner: std::sync::Mutex<Inner>,
}

impl SharedState {
    pub fn new() -> Self {
        SharedState { inner: std::sync::Mutex::new(Inner::default()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("agent state mutex poisoned")
    }

    /// Records "now" as the last time a port setting changed, matching
    /// `update_set_time`.
    pub fn mark_set_time(&self) {
        self.lock().last_poe_set_time = Local::now().naive_local();
    }

    pub fn last_poe_set_time(&self) -> NaiveDateTime {
        self.lock().last_poe_set_time
    }

    pub fn last_poe_set_time_string(&self) -> String {
        format_timestamp(self.lock().last_poe_set_time)
    }

    /// `have_set_event`: true iff `last_poe_set_time` strictly advanced
    /// since the previous check, and advances `prev_poe_set_time` as a
    /// side effect so the next call starts from this point.
    pub fn take_set_event(&self) -> bool {
        let mut inner = self.lock();
        if inner.last_poe_set_time > inner.prev_poe_set_time {
            inner.prev_poe_set_time = inner.last_poe_set_time;
            true
        } else {
            false
        }
    }

    /// `have_psu_event`: true iff the observed power bank id differs
    /// from the last one recorded.
    pub fn take_psu_event(&self, current_bank: u8) -> bool {
        let mut inner = self.lock();
        let changed = inner.last_power_bank != Some(current_bank);
        inner.last_power_bank = Some(current_bank);
        changed
    }

    pub fn set_failsafe(&self, failsafe: bool) {
        self.lock().failsafe = failsafe;
    }

    pub fn is_failsafe(&self) -> bool {
        self.lock().failsafe
    }

    pub fn set_agent_state(&self, state: AgentState) {
        self.lock().agent_state = state;
    }

    pub fn agent_state(&self) -> AgentState {
        self.lock().agent_state
    }

    pub fn next_cfg_serial_num(&self) -> u64 {
        let mut inner = self.lock();
        inner.cfg_serial_num += 1;
        inner.cfg_serial_num
    }

    pub fn record_cfg_serial_num(&self, n: u64) {
        self.lock().cfg_serial_num = n;
    }

    /// Bumps `rt_counter` up to the save cadence so the next autosave
    /// tick writes immediately, matching the IPC loop's reaction to a
    /// `poecli_set` notification (`poed.py`'s `main` set-event branch).
    pub fn expedite_next_autosave(&self, cadence: u32) {
        let mut inner = self.lock();
        if inner.rt_counter < cadence {
            inner.rt_counter = cadence;
        }
    }

    pub fn rt_counter(&self) -> u32 {
        self.lock().rt_counter
    }

    pub fn set_rt_counter(&self, value: u32) {
        self.lock().rt_counter = value;
    }

    pub fn increment_rt_counter(&self, by: u32) {
        self.lock().rt_counter += by;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_event_fires_once_per_advance() {
        let state = SharedState::new();
        assert!(!state.take_set_event());
        state.mark_set_time();
        assert!(state.take_set_event());
        assert!(!state.take_set_event());
    }

    #[test]
    fn psu_event_fires_on_bank_change_only() {
        let state = SharedState::new();
        assert!(state.take_psu_event(13));
        assert!(!state.take_psu_event(13));
        assert!(state.take_psu_event(14));
    }
}
