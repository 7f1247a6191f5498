//! Per-control optimistic state: `Idle(state)` → `Pending` → `Idle(observed)`.

use std::{fmt, str::FromStr};

use lunaguard_core::{Command, DeviceSnapshot};

use crate::collaborators::{EventCategory, EventEntry, Notice, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Lock,
    Power,
    Panic,
}

impl ControlKind {
    pub const ALL: [ControlKind; 3] = [ControlKind::Lock, ControlKind::Power, ControlKind::Panic];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlKind::Lock => "lock",
            ControlKind::Power => "power",
            ControlKind::Panic => "panic",
        }
    }

    /// The boolean this control displays. Without a snapshot the vehicle is
    /// shown locked, unpowered and out of panic mode.
    pub fn state_of(self, snapshot: Option<&DeviceSnapshot>) -> bool {
        match (self, snapshot) {
            (ControlKind::Lock, Some(s)) => s.is_locked,
            (ControlKind::Power, Some(s)) => s.has_power,
            (ControlKind::Panic, Some(s)) => s.panic,
            (ControlKind::Lock, None) => true,
            (ControlKind::Power, None) | (ControlKind::Panic, None) => false,
        }
    }

    /// Command that moves the device away from `current`.
    pub fn command_leaving(self, current: bool) -> Command {
        match (self, current) {
            (ControlKind::Lock, true) => Command::Unlock,
            (ControlKind::Lock, false) => Command::Lock,
            (ControlKind::Power, true) => Command::Disconnect,
            (ControlKind::Power, false) => Command::Reconnect,
            (ControlKind::Panic, true) => Command::NoPanic,
            (ControlKind::Panic, false) => Command::Panic,
        }
    }

    pub fn accepted_entry(self, left: bool, vehicle_id: Option<&str>) -> EventEntry {
        let (kind, message, severity, category) = match (self, left) {
            (ControlKind::Lock, true) => (
                "vehicle_unlocked",
                "Vehículo desbloqueado por usuario",
                Severity::Medium,
                EventCategory::Security,
            ),
            (ControlKind::Lock, false) => (
                "vehicle_locked",
                "Vehículo bloqueado por usuario",
                Severity::Medium,
                EventCategory::Security,
            ),
            (ControlKind::Power, true) => (
                "engine_disconnected",
                "Motor desconectado por usuario",
                Severity::Medium,
                EventCategory::Vehicle,
            ),
            (ControlKind::Power, false) => (
                "engine_connected",
                "Motor conectado por usuario",
                Severity::Medium,
                EventCategory::Vehicle,
            ),
            (ControlKind::Panic, true) => (
                "panic_deactivated",
                "Modo pánico desactivado por usuario",
                Severity::Medium,
                EventCategory::Security,
            ),
            (ControlKind::Panic, false) => (
                "panic_activated",
                "Modo pánico activado por usuario",
                Severity::High,
                EventCategory::Security,
            ),
        };
        EventEntry {
            kind: kind.to_owned(),
            message: message.to_owned(),
            related_entity_id: vehicle_id.map(str::to_owned),
            severity,
            category,
        }
    }

    pub fn accepted_notice(self, left: bool) -> Notice {
        match (self, left) {
            (ControlKind::Lock, true) => Notice::success(
                "Vehículo desbloqueado",
                "El vehículo ha sido desbloqueado exitosamente",
            ),
            (ControlKind::Lock, false) => Notice::success(
                "Vehículo bloqueado",
                "El vehículo ha sido bloqueado exitosamente",
            ),
            (ControlKind::Power, true) => {
                Notice::success("Motor desconectado", "La energía del motor ha sido cortada")
            }
            (ControlKind::Power, false) => {
                Notice::success("Motor conectado", "El motor ha sido reconectado")
            }
            (ControlKind::Panic, true) => Notice::success(
                "Modo pánico desactivado",
                "El dispositivo ha vuelto al modo normal",
            ),
            (ControlKind::Panic, false) => Notice::success(
                "Modo pánico activado",
                "El dispositivo ha entrado en modo pánico",
            ),
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControlKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown control {s:?} (expected lock, power or panic)"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPhase {
    Idle(bool),
    Pending { intended: bool, previous: bool },
}

impl ControlPhase {
    pub fn is_pending(self) -> bool {
        matches!(self, ControlPhase::Pending { .. })
    }

    /// What the control shows: the intent while pending.
    pub fn displayed(self) -> bool {
        match self {
            ControlPhase::Idle(state) => state,
            ControlPhase::Pending { intended, .. } => intended,
        }
    }

    /// Enters `Pending(¬s)` from `Idle(s)` and returns `s`. `None` while a
    /// command is already in flight.
    pub fn begin(&mut self) -> Option<bool> {
        match *self {
            ControlPhase::Idle(current) => {
                *self = ControlPhase::Pending {
                    intended: !current,
                    previous: current,
                };
                Some(current)
            }
            ControlPhase::Pending { .. } => None,
        }
    }

    /// The polled state wins over the intent.
    pub fn confirm(&mut self, observed: bool) {
        *self = ControlPhase::Idle(observed);
    }

    pub fn revert(&mut self) {
        if let ControlPhase::Pending { previous, .. } = *self {
            *self = ControlPhase::Idle(previous);
        }
    }

    /// Follows a new snapshot while idle; an in-flight command is left alone.
    pub fn observe(&mut self, state: bool) {
        if let ControlPhase::Idle(current) = self {
            *current = state;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    lock: ControlPhase,
    power: ControlPhase,
    panic: ControlPhase,
}

impl Controls {
    pub fn from_snapshot(snapshot: Option<&DeviceSnapshot>) -> Self {
        Self {
            lock: ControlPhase::Idle(ControlKind::Lock.state_of(snapshot)),
            power: ControlPhase::Idle(ControlKind::Power.state_of(snapshot)),
            panic: ControlPhase::Idle(ControlKind::Panic.state_of(snapshot)),
        }
    }

    pub fn get(&self, kind: ControlKind) -> ControlPhase {
        match kind {
            ControlKind::Lock => self.lock,
            ControlKind::Power => self.power,
            ControlKind::Panic => self.panic,
        }
    }

    pub fn get_mut(&mut self, kind: ControlKind) -> &mut ControlPhase {
        match kind {
            ControlKind::Lock => &mut self.lock,
            ControlKind::Power => &mut self.power,
            ControlKind::Panic => &mut self.panic,
        }
    }

    pub fn observe(&mut self, snapshot: Option<&DeviceSnapshot>) {
        for kind in ControlKind::ALL {
            self.get_mut(kind).observe(kind.state_of(snapshot));
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn begin_flips_intent_and_blocks_second_action() {
        let mut phase = ControlPhase::Idle(true);
        assert_eq!(phase.begin(), Some(true));
        assert_eq!(
            phase,
            ControlPhase::Pending {
                intended: false,
                previous: true
            }
        );
        assert!(!phase.displayed());
        assert_eq!(phase.begin(), None);
    }

    #[test]
    fn confirm_takes_observed_state_not_intent() {
        let mut phase = ControlPhase::Idle(true);
        phase.begin();
        phase.confirm(true);
        assert_eq!(phase, ControlPhase::Idle(true));
    }

    #[test]
    fn revert_restores_previous_state() {
        let mut phase = ControlPhase::Idle(false);
        phase.begin();
        phase.revert();
        assert_eq!(phase, ControlPhase::Idle(false));

        let mut idle = ControlPhase::Idle(true);
        idle.revert();
        assert_eq!(idle, ControlPhase::Idle(true));
    }

    #[test]
    fn observe_skips_pending_controls() {
        let mut snapshot = lunaguard_core::DeviceSnapshot::initial(Utc::now());
        let mut controls = Controls::from_snapshot(Some(&snapshot));
        controls.get_mut(ControlKind::Lock).begin();

        snapshot.is_locked = false;
        snapshot.has_power = false;
        controls.observe(Some(&snapshot));

        assert!(controls.get(ControlKind::Lock).is_pending());
        assert_eq!(controls.get(ControlKind::Power), ControlPhase::Idle(false));
    }

    #[test]
    fn commands_leave_the_current_state() {
        assert_eq!(ControlKind::Lock.command_leaving(true), Command::Unlock);
        assert_eq!(ControlKind::Lock.command_leaving(false), Command::Lock);
        assert_eq!(ControlKind::Power.command_leaving(true), Command::Disconnect);
        assert_eq!(ControlKind::Power.command_leaving(false), Command::Reconnect);
        assert_eq!(ControlKind::Panic.command_leaving(true), Command::NoPanic);
        assert_eq!(ControlKind::Panic.command_leaving(false), Command::Panic);
    }

    #[test]
    fn defaults_without_snapshot() {
        assert!(ControlKind::Lock.state_of(None));
        assert!(!ControlKind::Power.state_of(None));
        assert!(!ControlKind::Panic.state_of(None));
    }

    #[test]
    fn audit_entries_carry_vehicle_and_category() {
        let entry = ControlKind::Power.accepted_entry(true, Some("veh-1"));
        assert_eq!(entry.kind, "engine_disconnected");
        assert_eq!(entry.category, EventCategory::Vehicle);
        assert_eq!(entry.related_entity_id.as_deref(), Some("veh-1"));

        let entry = ControlKind::Panic.accepted_entry(false, None);
        assert_eq!(entry.severity, Severity::High);
    }
}
