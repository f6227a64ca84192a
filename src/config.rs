//! Recognized configuration options (spec.md §6.4) plus the sizing knobs the
//! storage and execution layers need at construction time. Mirrors the
//! teacher's `db::config::Config` builder-of-defaults style.

use std::time::Duration;

/// Isolation level a transaction requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoLevel {
    Snapshot,
    Serializable,
}

/// Runtime configuration for a single worker. Every field has a documented
/// default and a concrete runtime effect, per spec.md §6.4.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of fixed OS threads per worker (§5 "Scheduling model").
    pub num_threads: usize,
    /// Whether experts may cache intermediate index lookups. Default: true.
    pub caching: bool,
    /// Pin worker threads to cores when the platform allows it. Default: false.
    pub core_bind: bool,
    /// Allow the plan builder to split/merge adjacent experts. Default: false
    /// (this crate receives prebuilt plans so it is a no-op hook).
    pub expert_division: bool,
    /// Allow reordering independent filter steps. Default: false (same as above).
    pub step_reorder: bool,
    /// Whether property index lookups are consulted by `init`/`has`. Default: true.
    pub indexing: bool,
    /// Whether idle worker threads may steal from peers. Default: true.
    pub stealing: bool,
    /// Max serialized bytes per message (`Message::max_bytes`). Default: 65536.
    pub data_size: usize,
    /// Whether non-read-only transactions may pre-read uncommitted tails
    /// (spec.md §4.3). Default: true.
    pub opt_preread: bool,
    /// Whether validation may use the optimistic-wait path for `VALIDATING`
    /// writers (spec.md §4.13 step 6) rather than aborting immediately.
    /// Default: true.
    pub opt_validation: bool,
    /// Isolation level. Default: `Serializable`.
    pub iso_level: IsoLevel,
    /// Number of times a client may resubmit an aborted transaction.
    /// Default: 3.
    pub abort_rerun_times: u32,

    /// Number of cells per thread-local allocator block (spec.md §4.1 `B`).
    /// Default: 1024.
    pub cell_block_size: usize,
    /// Total cell count backing the [`crate::alloc::CellAllocator`].
    /// Default: 1 << 20.
    pub cell_count: usize,
    /// Byte-cell size for the value store; must be divisible by 8.
    /// Default: 64.
    pub value_cell_size: usize,
    /// Total byte-cell count backing the [`crate::alloc::ValueStore`].
    /// Default: 1 << 22.
    pub value_cell_count: usize,
    /// Typical row capacity for property/topology row lists. Default: 12.
    pub row_capacity: usize,
    /// `MSG_LOCK_NUM`: number of per-transaction reader-priority rwlocks
    /// (spec.md §5 "Per-transaction serialization"). Default: 64.
    pub msg_lock_num: usize,
    /// Sleep interval for the validation expert's bounded poll loop.
    /// Default: 1ms.
    pub validation_poll_interval: Duration,
    /// Max poll iterations before giving up and treating an optimistic
    /// writer as still-conflicting. Default: 200.
    pub validation_poll_retries: u32,
    /// Staleness window before an idle worker thread may steal from a peer.
    /// Default: 500us.
    pub stealing_staleness: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            num_threads: 4,
            caching: true,
            core_bind: false,
            expert_division: false,
            step_reorder: false,
            indexing: true,
            stealing: true,
            data_size: 64 * 1024,
            opt_preread: true,
            opt_validation: true,
            iso_level: IsoLevel::Serializable,
            abort_rerun_times: 3,
            cell_block_size: 1024,
            cell_count: 1 << 20,
            value_cell_size: 64,
            value_cell_count: 1 << 22,
            row_capacity: 12,
            msg_lock_num: 64,
            validation_poll_interval: Duration::from_millis(1),
            validation_poll_retries: 200,
            stealing_staleness: Duration::from_micros(500),
        }
    }
}

impl Config {
    /// Applies a single named option, as the parser/config file would, per
    /// the `config` expert's `(name, value)` params (spec.md §6.1 table).
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name {
            "caching" => self.caching = parse_bool(value)?,
            "core_bind" => self.core_bind = parse_bool(value)?,
            "expert_division" => self.expert_division = parse_bool(value)?,
            "step_reorder" => self.step_reorder = parse_bool(value)?,
            "indexing" => self.indexing = parse_bool(value)?,
            "stealing" => self.stealing = parse_bool(value)?,
            "opt_preread" => self.opt_preread = parse_bool(value)?,
            "opt_validation" => self.opt_validation = parse_bool(value)?,
            "data_size" => {
                self.data_size = value.parse().map_err(|_| "invalid data_size".to_string())?
            }
            "abort_rerun_times" => {
                self.abort_rerun_times = value
                    .parse()
                    .map_err(|_| "invalid abort_rerun_times".to_string())?
            }
            "iso_level" => {
                self.iso_level = match value {
                    "SNAPSHOT" => IsoLevel::Snapshot,
                    "SERIALIZABLE" => IsoLevel::Serializable,
                    other => return Err(format!("unknown iso_level {other}")),
                }
            }
            other => return Err(format!("unknown config option {other}")),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(format!("invalid bool {other}")),
    }
}
