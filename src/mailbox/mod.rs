//! C11 — Mailbox: typed per-thread message queues (spec.md §4.11). Delivery
//! is in-process via `crossbeam-channel`; cross-machine transport is out of
//! scope (spec.md §1) and would sit behind the same [`Mailbox`] trait.

use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::ids::TrxId;
use crate::plan::message::Message;
use crate::txn::rct::Primitive;
use crate::txn::trx_client::TrxStat;

/// Out-of-band notifications (spec.md §6.2), delivered separately from data
/// messages so C9 and the GC producer don't compete with expert traffic.
#[derive(Debug, Clone)]
pub enum Notification {
    UpdateStatus(TrxId, TrxStat),
    RctTids(Vec<TrxId>),
    QueryRct(TrxId, Primitive),
}

/// Per-`(node, thread)` typed queues (spec.md §4.11).
pub trait Mailbox: Send + Sync {
    /// Non-blocking; staged for `sweep` to flush rather than delivered
    /// immediately (this crate's way of modeling "delivered eventually at
    /// most once").
    fn send(&self, src_tid: usize, dst_tid: usize, msg: Message);
    fn try_recv(&self, tid: usize) -> Option<Message>;
    fn recv(&self, tid: usize) -> Option<Message>;
    /// Lets an idle thread pull a message out of a peer's queue directly
    /// (spec.md §5 "cooperative" work stealing). Same underlying channel as
    /// `try_recv(tid)`; a message taken this way is gone from `tid`'s queue.
    fn try_steal(&self, tid: usize) -> Option<Message> {
        self.try_recv(tid)
    }
    /// Flushes `tid`'s staged outgoing sends into their destination queues.
    fn sweep(&self, tid: usize);
    fn send_notification(&self, dst_nid: usize, note: Notification);
    fn recv_notification(&self, tid: usize) -> Option<Notification>;
}

/// Single-node mailbox: one `crossbeam` channel pair per thread for data
/// messages, a second pair per thread for notifications, and a per-source
/// staging buffer that `sweep` drains.
pub struct LocalMailbox {
    data_tx: Vec<Sender<Message>>,
    data_rx: Vec<Receiver<Message>>,
    note_tx: Vec<Sender<Notification>>,
    note_rx: Vec<Receiver<Notification>>,
    outbox: Vec<Mutex<Vec<(usize, Message)>>>,
}

impl LocalMailbox {
    pub fn new(thread_count: usize) -> Self {
        let mut data_tx = Vec::with_capacity(thread_count);
        let mut data_rx = Vec::with_capacity(thread_count);
        let mut note_tx = Vec::with_capacity(thread_count);
        let mut note_rx = Vec::with_capacity(thread_count);
        let mut outbox = Vec::with_capacity(thread_count);
        for _ in 0..thread_count {
            let (dtx, drx) = unbounded();
            data_tx.push(dtx);
            data_rx.push(drx);
            let (ntx, nrx) = unbounded();
            note_tx.push(ntx);
            note_rx.push(nrx);
            outbox.push(Mutex::new(Vec::new()));
        }
        LocalMailbox { data_tx, data_rx, note_tx, note_rx, outbox }
    }
}

impl Mailbox for LocalMailbox {
    fn send(&self, src_tid: usize, dst_tid: usize, msg: Message) {
        self.outbox[src_tid].lock().push((dst_tid, msg));
    }

    fn try_recv(&self, tid: usize) -> Option<Message> {
        match self.data_rx[tid].try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn recv(&self, tid: usize) -> Option<Message> {
        self.data_rx[tid].recv().ok()
    }

    fn sweep(&self, tid: usize) {
        let pending = std::mem::take(&mut *self.outbox[tid].lock());
        for (dst_tid, msg) in pending {
            let _ = self.data_tx[dst_tid].send(msg);
        }
    }

    fn send_notification(&self, dst_nid: usize, note: Notification) {
        // Single-node: `dst_nid` addresses a thread slot directly.
        if let Some(tx) = self.note_tx.get(dst_nid) {
            let _ = tx.send(note);
        }
    }

    fn recv_notification(&self, tid: usize) -> Option<Notification> {
        match self.note_rx[tid].try_recv() {
            Ok(n) => Some(n),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::message::{Meta, MsgPath, MsgType};

    fn msg() -> Message {
        Message {
            meta: Meta {
                qid: 1,
                step: 0,
                query_count_in_trx: 1,
                recver_nid: 0,
                recver_tid: 1,
                parent_nid: 0,
                parent_tid: 0,
                msg_type: MsgType::Spawn,
                msg_path: MsgPath::default(),
                branch_infos: Vec::new(),
                plan: None,
            },
            data: Vec::new(),
            current_bytes: 0,
            max_bytes: 1024,
        }
    }

    #[test]
    fn send_stages_until_swept() {
        let mb = LocalMailbox::new(2);
        mb.send(0, 1, msg());
        assert!(mb.try_recv(1).is_none());
        mb.sweep(0);
        assert!(mb.try_recv(1).is_some());
    }

    #[test]
    fn notifications_are_independent_of_data_queue() {
        let mb = LocalMailbox::new(2);
        mb.send_notification(1, Notification::UpdateStatus(TrxId::new(5), TrxStat::Abort));
        assert!(mb.try_recv(1).is_none());
        match mb.recv_notification(1) {
            Some(Notification::UpdateStatus(trx, TrxStat::Abort)) => assert_eq!(trx, TrxId::new(5)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
