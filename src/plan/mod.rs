//! C10 — plan and message model: an immutable prebuilt [`Plan`] plus the
//! mutable [`Message`] that carries it (and later, data) between experts.

pub mod message;
pub mod plan;
pub mod wire;

pub use message::{
    create_abort_msg, create_branched_msg, create_branched_msg_with_history_label, create_broadcast_msg,
    create_feed_msg, create_init_messages, create_next_msg, BranchInfo, History, Message, Meta, MsgPath, MsgType,
};
pub use plan::{Expert, ExpertType, Plan, TrxType, Value};
pub use wire::{decode_message, encode_message, tag_and_bytes_to_value, value_to_tag_and_bytes, WireError};
