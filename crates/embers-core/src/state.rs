use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle phase of one supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InstanceState {
    Inactive = 0,
    Activating = 1,
    Active = 2,
    Deactivating = 3,
    Failed = 4,
}

impl InstanceState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => InstanceState::Inactive,
            1 => InstanceState::Activating,
            2 => InstanceState::Active,
            3 => InstanceState::Deactivating,
            _ => InstanceState::Failed,
        }
    }
}

const ELIGIBLE_FOR_START: &[InstanceState] = &[InstanceState::Inactive, InstanceState::Failed];
const ELIGIBLE_FOR_STOP: &[InstanceState] = &[InstanceState::Activating, InstanceState::Active];
const ELIGIBLE_FOR_FAIL: &[InstanceState] =
    &[InstanceState::Activating, InstanceState::Deactivating];

/// Atomically updated state cell.
///
/// Every transition is a compare-and-swap keyed on the expected prior
/// state(s); competing actors (caller, output scanner, watchdog) can never
/// both apply the same transition.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        StateCell(AtomicU8::new(InstanceState::Inactive as u8))
    }

    pub fn get(&self) -> InstanceState {
        InstanceState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.get() == InstanceState::Active
    }

    pub fn is_activating(&self) -> bool {
        self.get() == InstanceState::Activating
    }

    pub fn is_deactivating(&self) -> bool {
        self.get() == InstanceState::Deactivating
    }

    pub fn set_activating(&self) -> bool {
        self.transition(ELIGIBLE_FOR_START, InstanceState::Activating)
    }

    pub fn set_active(&self) -> bool {
        self.compare_and_set(InstanceState::Activating, InstanceState::Active)
    }

    pub fn set_failed(&self) -> bool {
        self.transition(ELIGIBLE_FOR_FAIL, InstanceState::Failed)
    }

    pub fn set_deactivating(&self) -> bool {
        self.transition(ELIGIBLE_FOR_STOP, InstanceState::Deactivating)
    }

    /// The watchdog path: only yanks the instance out of `Activating`.
    /// Firing against any other state must be a no-op so a readiness
    /// success that happened a moment earlier is never clobbered.
    pub fn set_deactivating_by_timeout(&self) -> bool {
        self.compare_and_set(InstanceState::Activating, InstanceState::Deactivating)
    }

    pub fn set_inactive(&self) -> bool {
        self.compare_and_set(InstanceState::Deactivating, InstanceState::Inactive)
    }

    pub fn compare_and_set(&self, expect: InstanceState, update: InstanceState) -> bool {
        self.0
            .compare_exchange(
                expect as u8,
                update as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Applies `update` if the current state matches any of `expect`.
    pub fn transition(&self, expect: &[InstanceState], update: InstanceState) -> bool {
        expect
            .iter()
            .any(|state| self.compare_and_set(*state, update))
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
