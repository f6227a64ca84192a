//! Transaction-side bookkeeping: dependency tracking (C3 support), the
//! recent-action table (C8), the transaction-status client (C9), and the
//! per-transaction write set used to commit/abort everything a transaction
//! touched.

pub mod dep;
pub mod rct;
pub mod trx_client;
pub mod write_set;

pub use dep::DepTrxMap;
pub use rct::{Primitive, RecentActionTable, WriteRecord};
pub use trx_client::{InMemoryMaster, TrxClient, TrxStat};
pub use write_set::{WriteHandle, WriteSet};
