pub mod assertion;
pub mod codec;
pub mod compare;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod http_message;
pub mod lifecycle;
pub mod location;
pub mod record;
pub mod store;
pub mod substitute;

pub use assertion::{
    Abide, AssertionError, Outcome, assert, assert_http_request, assert_http_request_out,
    assert_http_response, assert_reader,
};
pub use compare::{JsonMatch, SnapshotFormat, compare};
pub use config::{AbideConfig, RunMode};
pub use diagnostics::{TelemetryGuard, init_test_tracing, init_tracing};
pub use error::{DecodeError, SnapshotError};
pub use http_message::{HttpMessage, is_json_content_type};
pub use lifecycle::{cleanup, cleanup_or_fail};
pub use location::{DEFAULT_SNAPSHOTS_DIR, SnapshotLocation};
pub use record::{SnapshotId, SnapshotRecord};
pub use store::{FileStatus, LoadOutcome, SnapshotStore};
