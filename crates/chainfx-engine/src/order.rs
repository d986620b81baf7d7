//! Effect kinds, chain orders and the snapshot queue that hands orders from
//! the control thread to the audio thread.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ring::{self, Consumer, Producer};

/// Number of slots in a chain; one per effect kind.
pub const NUM_EFFECTS: usize = 5;

/// Default capacity of the order queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 30;

/// The closed set of effects in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Phase,
    Chorus,
    Overdrive,
    #[serde(rename = "ladder")]
    LadderFilter,
    #[serde(rename = "filter")]
    GeneralFilter,
}

impl EffectKind {
    pub const ALL: [EffectKind; NUM_EFFECTS] = [
        EffectKind::Phase,
        EffectKind::Chorus,
        EffectKind::Overdrive,
        EffectKind::LadderFilter,
        EffectKind::GeneralFilter,
    ];

    /// Stable index, also the persisted integer value.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: i64) -> Option<Self> {
        usize::try_from(i).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Phase => "phase",
            EffectKind::Chorus => "chorus",
            EffectKind::Overdrive => "overdrive",
            EffectKind::LadderFilter => "ladder",
            EffectKind::GeneralFilter => "filter",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectKind {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or(OrderError::UnknownKind(s))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("unknown effect kind `{0}`")]
    UnknownKind(String),
    #[error("chain order needs 5 entries, got {0}")]
    WrongLength(usize),
    #[error("effect `{0}` appears more than once")]
    Duplicate(EffectKind),
    #[error("chain order has an empty slot")]
    EmptySlot,
}

/// Execution order of the chain.
///
/// A valid order is a permutation of [`EffectKind::ALL`]. The all-empty order
/// ([`ChainOrder::SENTINEL`]) marks uninitialized or corrupt state and is never
/// applied to the signal path.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainOrder {
    slots: [Option<EffectKind>; NUM_EFFECTS],
}

impl ChainOrder {
    pub const SENTINEL: ChainOrder = ChainOrder { slots: [None; NUM_EFFECTS] };

    /// Validated constructor.
    pub fn new(kinds: [EffectKind; NUM_EFFECTS]) -> Result<Self, OrderError> {
        let order = Self { slots: kinds.map(Some) };
        order.validate()?;
        Ok(order)
    }

    /// Raw constructor; the result may be invalid. Used by decoders before
    /// validation and by tests.
    pub fn from_slots(slots: [Option<EffectKind>; NUM_EFFECTS]) -> Self {
        Self { slots }
    }

    pub fn from_slice(kinds: &[EffectKind]) -> Result<Self, OrderError> {
        let kinds: [EffectKind; NUM_EFFECTS] =
            kinds.try_into().map_err(|_| OrderError::WrongLength(kinds.len()))?;
        Self::new(kinds)
    }

    pub fn slots(&self) -> &[Option<EffectKind>; NUM_EFFECTS] {
        &self.slots
    }

    /// Kinds in execution order. Empty slots are skipped.
    pub fn kinds(&self) -> impl Iterator<Item = EffectKind> + '_ {
        self.slots.iter().flatten().copied()
    }

    pub fn validate(&self) -> Result<(), OrderError> {
        let mut seen = [false; NUM_EFFECTS];
        for slot in &self.slots {
            let kind = slot.ok_or(OrderError::EmptySlot)?;
            if std::mem::replace(&mut seen[kind.index()], true) {
                return Err(OrderError::Duplicate(kind));
            }
        }
        Ok(())
    }

    pub fn is_permutation(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn is_sentinel(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Pack into a `u64`: one byte per slot, `0xff` for an empty slot.
    pub(crate) fn pack(&self) -> u64 {
        self.slots.iter().enumerate().fold(0u64, |acc, (i, slot)| {
            let byte = slot.map_or(0xff, |k| k.index() as u64);
            acc | (byte << (i * 8))
        })
    }

    pub(crate) fn unpack(bits: u64) -> Self {
        let mut slots = [None; NUM_EFFECTS];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = EffectKind::from_index(((bits >> (i * 8)) & 0xff) as i64);
        }
        Self { slots }
    }
}

impl Default for ChainOrder {
    fn default() -> Self {
        Self { slots: EffectKind::ALL.map(Some) }
    }
}

impl fmt::Debug for ChainOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainOrder{}", self)
    }
}

impl fmt::Display for ChainOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 { f.write_str(", ")?; }
            match slot {
                Some(k) => write!(f, "{k}")?,
                None => f.write_str("-")?,
            }
        }
        f.write_str("]")
    }
}

impl FromStr for ChainOrder {
    type Err = OrderError;

    /// Comma separated kind names, e.g. `chorus,phase,overdrive,ladder,filter`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kinds = s
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(EffectKind::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_slice(&kinds)
    }
}

impl Serialize for ChainOrder {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.kinds())
    }
}

impl<'de> Deserialize<'de> for ChainOrder {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kinds = Vec::<EffectKind>::deserialize(deserializer)?;
        Self::from_slice(&kinds).map_err(serde::de::Error::custom)
    }
}

/* ---------- snapshot queue ---------- */

/// Create the order queue, split into its two ends.
pub fn snapshot_queue(capacity: usize) -> (OrderProducer, OrderConsumer) {
    let (tx, rx) = ring::channel(capacity);
    (OrderProducer { ring: tx }, OrderConsumer { ring: rx })
}

/// Control-thread end of the order queue. Not `Clone`, and `push` takes
/// `&mut self`, so only one thread can produce.
pub struct OrderProducer {
    ring: Producer<ChainOrder>,
}

impl OrderProducer {
    /// Never blocks or allocates. False if the queue is full; the order is dropped.
    pub fn push(&mut self, order: ChainOrder) -> bool {
        self.ring.push(order)
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// Audio-thread end of the order queue. Same single-owner rule as the producer.
pub struct OrderConsumer {
    ring: Consumer<ChainOrder>,
}

impl OrderConsumer {
    pub fn pull(&mut self) -> Option<ChainOrder> {
        self.ring.pop()
    }

    /// Drain everything queued and return only the newest entry.
    pub fn drain_latest(&mut self) -> Option<ChainOrder> {
        let mut latest = None;
        while let Some(order) = self.ring.pop() {
            latest = Some(order);
        }
        latest
    }
}

/// Lock-free mirror of the audio thread's active order, readable from any
/// thread.
pub struct OrderMirror(AtomicU64);

impl OrderMirror {
    pub fn new(order: ChainOrder) -> Self {
        Self(AtomicU64::new(order.pack()))
    }

    pub fn store(&self, order: ChainOrder) {
        self.0.store(order.pack(), Ordering::Release);
    }

    pub fn load(&self) -> ChainOrder {
        ChainOrder::unpack(self.0.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EffectKind::*;

    #[test]
    fn default_order_is_declaration_order() {
        let order = ChainOrder::default();
        assert!(order.is_permutation());
        assert_eq!(order.kinds().collect::<Vec<_>>(), EffectKind::ALL.to_vec());
    }

    #[test]
    fn rejects_duplicates_and_empty_slots() {
        assert_eq!(
            ChainOrder::new([Phase, Phase, Overdrive, LadderFilter, GeneralFilter]),
            Err(OrderError::Duplicate(Phase))
        );
        let holed = ChainOrder::from_slots([Some(Phase), None, Some(Overdrive), Some(LadderFilter), Some(GeneralFilter)]);
        assert_eq!(holed.validate(), Err(OrderError::EmptySlot));
        assert!(ChainOrder::SENTINEL.is_sentinel());
        assert!(!ChainOrder::SENTINEL.is_permutation());
    }

    #[test]
    fn parses_names() {
        let order: ChainOrder = "chorus, phase,overdrive,ladder,filter".parse().unwrap();
        assert_eq!(order, ChainOrder::new([Chorus, Phase, Overdrive, LadderFilter, GeneralFilter]).unwrap());
        assert_eq!("chorus,phase".parse::<ChainOrder>(), Err(OrderError::WrongLength(2)));
        assert!(matches!("chorus,reverb".parse::<ChainOrder>(), Err(OrderError::UnknownKind(_))));
    }

    #[test]
    fn display_marks_empty_slots() {
        let order = ChainOrder::from_slots([Some(Chorus), None, None, None, None]);
        assert_eq!(order.to_string(), "[chorus, -, -, -, -]");
    }

    #[test]
    fn json_uses_kind_names() {
        let order = ChainOrder::new([GeneralFilter, LadderFilter, Overdrive, Chorus, Phase]).unwrap();
        let json = serde_json::to_string(&order).unwrap();
        assert_eq!(json, r#"["filter","ladder","overdrive","chorus","phase"]"#);
        let back: ChainOrder = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
        assert!(serde_json::from_str::<ChainOrder>(r#"["phase","phase","overdrive","chorus","ladder"]"#).is_err());
    }

    #[test]
    fn mirror_preserves_order_and_sentinel() {
        let order = ChainOrder::new([Overdrive, Chorus, Phase, GeneralFilter, LadderFilter]).unwrap();
        let mirror = OrderMirror::new(ChainOrder::SENTINEL);
        assert!(mirror.load().is_sentinel());
        mirror.store(order);
        assert_eq!(mirror.load(), order);
    }

    #[test]
    fn drain_keeps_only_the_newest() {
        let (mut tx, mut rx) = snapshot_queue(8);
        let a = ChainOrder::new([Chorus, Phase, Overdrive, LadderFilter, GeneralFilter]).unwrap();
        let b = ChainOrder::new([Overdrive, Chorus, Phase, LadderFilter, GeneralFilter]).unwrap();
        let c = ChainOrder::new([GeneralFilter, LadderFilter, Overdrive, Chorus, Phase]).unwrap();
        assert!(tx.push(a));
        assert!(tx.push(b));
        assert!(tx.push(c));
        assert_eq!(rx.drain_latest(), Some(c));
        assert_eq!(rx.drain_latest(), None);
        assert_eq!(rx.pull(), None);
    }

    #[test]
    fn full_queue_drops_the_push() {
        let (mut tx, mut rx) = snapshot_queue(2);
        let order = ChainOrder::default();
        let mut accepted = 0;
        while tx.push(order) {
            accepted += 1;
        }
        assert_eq!(accepted, tx.capacity());
        assert!(rx.pull().is_some());
        assert!(tx.push(order));
    }
}
