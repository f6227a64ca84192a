//! `GCProducer`: background reclamation of superseded versions is out of
//! scope per spec.md §1; this crate only needs to hand it retire-hints at
//! commit/abort time (spec.md §4.12 "pushes retire-hints to GC").

use tracing::trace;

/// A retire-hint: "this chain may have garbage older than `floor`". The real
/// GC worker would use this to decide when it is safe to trim committed
/// items no active reader can still see.
#[derive(Debug, Clone, Copy)]
pub struct RetireHint {
    pub chain_id: u64,
    pub floor: crate::ids::Timestamp,
}

pub trait GCProducer: Send + Sync {
    fn retire(&self, hint: RetireHint);
}

/// Discards every hint. Used in tests and single-shot scenarios where GC
/// never needs to run.
#[derive(Default)]
pub struct NoopGc;

impl GCProducer for NoopGc {
    fn retire(&self, hint: RetireHint) {
        trace!(chain_id = hint.chain_id, floor = %hint.floor, "discarding retire hint (NoopGc)");
    }
}

/// Forwards hints over a `crossbeam` channel to whatever out-of-process GC
/// worker is consuming them.
pub struct ChannelGc {
    sender: crossbeam::channel::Sender<RetireHint>,
}

impl ChannelGc {
    pub fn new() -> (Self, crossbeam::channel::Receiver<RetireHint>) {
        let (sender, receiver) = crossbeam::channel::unbounded();
        (ChannelGc { sender }, receiver)
    }
}

impl GCProducer for ChannelGc {
    fn retire(&self, hint: RetireHint) {
        let _ = self.sender.send(hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Timestamp;

    #[test]
    fn channel_gc_forwards_hints() {
        let (gc, rx) = ChannelGc::new();
        gc.retire(RetireHint { chain_id: 1, floor: Timestamp::new(5) });
        let hint = rx.recv().unwrap();
        assert_eq!(hint.chain_id, 1);
    }

    #[test]
    fn noop_gc_accepts_hints_without_panicking() {
        let gc = NoopGc;
        gc.retire(RetireHint { chain_id: 1, floor: Timestamp::new(0) });
    }
}
