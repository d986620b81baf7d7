use parking_lot::Mutex;

use crate::chain::BypassFlags;
use crate::order::{ChainOrder, OrderMirror};
use crate::params::ParamStore;

/// State owned once and read by both sides: parameters, bypass flags, the
/// active-order mirror, and the restored-order cell.
///
/// The audio thread touches only lock-free members (`params`, `bypass`,
/// `active`). The restored-order cell is written by `load_state` and polled by
/// the control surface, both off the audio thread.
pub struct SharedState {
    params: ParamStore,
    bypass: BypassFlags,
    active: OrderMirror,
    restored: Mutex<Option<ChainOrder>>,
}

impl SharedState {
    pub fn new(params: ParamStore, initial: ChainOrder) -> Self {
        Self {
            params,
            bypass: BypassFlags::default(),
            active: OrderMirror::new(initial),
            restored: Mutex::new(None),
        }
    }

    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    pub fn bypass(&self) -> &BypassFlags {
        &self.bypass
    }

    pub fn active_order(&self) -> ChainOrder {
        self.active.load()
    }

    pub(crate) fn publish_active(&self, order: ChainOrder) {
        self.active.store(order);
    }

    /// Replace whatever restored order is waiting to be picked up.
    pub(crate) fn publish_restored(&self, order: ChainOrder) {
        *self.restored.lock() = Some(order);
    }

    pub(crate) fn take_restored(&self) -> Option<ChainOrder> {
        self.restored.lock().take()
    }
}
