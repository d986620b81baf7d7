//! Control-side handle: everything a UI, CLI or host calls off the audio thread.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::order::{ChainOrder, EffectKind, OrderError, OrderProducer};
use crate::params::{ParamError, ParamStore};
use crate::shared::SharedState;
use crate::state::{decode_order, encode_order, StateError};

pub struct ChainControl {
    shared: Arc<SharedState>,
    orders: OrderProducer,
}

impl ChainControl {
    pub fn new(shared: Arc<SharedState>, orders: OrderProducer) -> Self {
        Self { shared, orders }
    }

    /// Queue a new order for the audio thread.
    ///
    /// `Err` if `order` is not a permutation of all five effects (nothing is
    /// queued). `Ok(false)` if the queue was full and the request was
    /// dropped; the previous order stays active.
    pub fn request_order_change(&mut self, order: ChainOrder) -> Result<bool, OrderError> {
        order.validate()?;
        let queued = self.orders.push(order);
        if queued {
            debug!("queued chain order {order}");
        } else {
            warn!("order queue full, dropped {order}");
        }
        Ok(queued)
    }

    pub fn set_bypass(&self, kind: EffectKind, bypassed: bool) {
        self.shared.bypass().set(kind, bypassed);
        debug!("{kind} bypass {}", if bypassed { "on" } else { "off" });
    }

    pub fn is_bypassed(&self, kind: EffectKind) -> bool {
        self.shared.bypass().get(kind)
    }

    /// Set a parameter by name. Returns the value actually stored, after
    /// clamping to the parameter's range.
    pub fn set_parameter(&self, name: &str, value: f32) -> Result<f32, ParamError> {
        self.shared.params().set_by_name(name, value)
    }

    pub fn parameter(&self, name: &str) -> Option<f32> {
        self.shared.params().get_by_name(name)
    }

    pub fn params(&self) -> &ParamStore {
        self.shared.params()
    }

    /// The order the audio thread last applied.
    pub fn active_order(&self) -> ChainOrder {
        self.shared.active_order()
    }

    /// Serialize the active order.
    pub fn save_state(&self) -> Vec<u8> {
        encode_order(&self.active_order())
    }

    /// Restore an order from a blob produced by [`save_state`](Self::save_state).
    ///
    /// A blob that does not decode to a full permutation changes nothing.
    /// A good one is queued like any other order change and also published
    /// for [`take_restored_order`](Self::take_restored_order).
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<ChainOrder, StateError> {
        let order = decode_order(bytes).map_err(|e| {
            warn!("ignoring saved state: {e}");
            e
        })?;
        if !self.orders.push(order) {
            warn!("order queue full, restored order {order} not applied");
        }
        self.shared.publish_restored(order);
        info!("restored chain order {order}");
        Ok(order)
    }

    /// The most recently restored order, at most once per restore.
    pub fn take_restored_order(&self) -> Option<ChainOrder> {
        self.shared.take_restored()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::snapshot_queue;
    use crate::params::names;
    use EffectKind::*;

    fn control(capacity: usize) -> (ChainControl, crate::order::OrderConsumer) {
        let shared = Arc::new(SharedState::new(ParamStore::with_default_layout(), ChainOrder::default()));
        let (tx, rx) = snapshot_queue(capacity);
        (ChainControl::new(shared, tx), rx)
    }

    #[test]
    fn invalid_order_is_rejected_before_queueing() {
        let (mut ctl, mut rx) = control(4);
        let bad = ChainOrder::from_slots([Some(Phase), Some(Phase), Some(Chorus), Some(Overdrive), Some(LadderFilter)]);
        assert_eq!(ctl.request_order_change(bad), Err(OrderError::Duplicate(Phase)));
        assert_eq!(ctl.request_order_change(ChainOrder::SENTINEL), Err(OrderError::EmptySlot));
        assert_eq!(rx.pull(), None);
    }

    #[test]
    fn full_queue_reports_false() {
        let (mut ctl, _rx) = control(1);
        let cap = ctl.orders.capacity();
        for _ in 0..cap {
            assert_eq!(ctl.request_order_change(ChainOrder::default()), Ok(true));
        }
        assert_eq!(ctl.request_order_change(ChainOrder::default()), Ok(false));
    }

    #[test]
    fn save_reflects_mirror() {
        let (ctl, _rx) = control(4);
        let order = ChainOrder::new([Overdrive, Phase, Chorus, GeneralFilter, LadderFilter]).unwrap();
        ctl.shared.publish_active(order);
        let bytes = ctl.save_state();
        assert_eq!(bytes.len(), crate::state::STATE_LEN);
        assert_eq!(decode_order(&bytes), Ok(order));
    }

    #[test]
    fn load_queues_and_publishes() {
        let (mut ctl, mut rx) = control(4);
        let order = ChainOrder::new([LadderFilter, GeneralFilter, Phase, Chorus, Overdrive]).unwrap();
        assert_eq!(ctl.load_state(&encode_order(&order)), Ok(order));
        assert_eq!(rx.drain_latest(), Some(order));
        assert_eq!(ctl.take_restored_order(), Some(order));
        assert_eq!(ctl.take_restored_order(), None);
    }

    #[test]
    fn corrupt_state_changes_nothing() {
        let (mut ctl, mut rx) = control(4);
        let mut bytes = encode_order(&ChainOrder::default());
        bytes[4] = 0; // slot 1 now duplicates slot 0
        assert!(matches!(ctl.load_state(&bytes), Err(StateError::InvalidOrder(_))));
        assert!(matches!(ctl.load_state(&bytes[..12]), Err(StateError::WrongLength(12))));
        assert_eq!(rx.pull(), None);
        assert_eq!(ctl.take_restored_order(), None);
        assert_eq!(ctl.active_order(), ChainOrder::default());
    }

    #[test]
    fn parameters_and_bypass_round_through_shared_state() {
        let (ctl, _rx) = control(4);
        assert_eq!(ctl.set_parameter(names::OUTPUT_GAIN, 40.0), Ok(18.0));
        assert_eq!(ctl.parameter(names::OUTPUT_GAIN), Some(18.0));
        assert!(ctl.set_parameter("Reverb Size", 1.0).is_err());
        ctl.set_bypass(Chorus, true);
        assert!(ctl.is_bypassed(Chorus));
        assert!(!ctl.is_bypassed(Phase));
    }
}
