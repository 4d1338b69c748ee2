//! # Ingestion Jobs
//!
//! The [`ResumableJob`](crate::job::ResumableJob) implementations. Each one is
//! a configuration of the same bounded-time loop: how its work sequence is
//! built and what side effect one item has.
//!
//! | Job | Sequence | Item side effect |
//! |-----|----------|------------------|
//! | [`CallLogFetchJob`] | paginated provider call log | call JSON + recording to storage |
//! | [`RecordingDownloadJob`] | CSV rows or stored call-log JSON | recording to storage |
//! | [`RowLoadJob`] | CSV rows | delete-then-insert into the warehouse |
//! | [`StorageSweepJob`] | container listing | delete expired object |

pub mod call_log_fetch;
pub mod csv_source;
pub mod recording_download;
pub mod row_load;
pub mod storage_sweep;

pub use call_log_fetch::{CallLogFetchJob, CallLogFetchSettings, CallRecord};
pub use csv_source::{load_rows, parse_rows, CsvRow};
pub use recording_download::{RecordingDownloadJob, RecordingDownloadSettings, RecordingItem, RecordingSource};
pub use row_load::{
    parse_timestamp, reorder_broker_name, BrokerLookup, ColumnKind, ColumnMapping, LeadUpsert, RowLoadJob, TableMapping,
};
pub use storage_sweep::{StorageSweepJob, StorageSweepSettings, SweepCandidate};
