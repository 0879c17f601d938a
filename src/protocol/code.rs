//! Protocol opcodes and revision gates.

// === request ===
pub(crate) const CLIENT_HELLO: u64 = 0;
pub(crate) const CLIENT_QUERY: u64 = 1;
pub(crate) const CLIENT_DATA: u64 = 2;
pub(crate) const CLIENT_PING: u64 = 4;

// === response ===
pub(crate) const SERVER_HELLO: u64 = 0;
pub(crate) const SERVER_DATA: u64 = 1;
pub(crate) const SERVER_EXCEPTION: u64 = 2;
pub(crate) const SERVER_PROGRESS: u64 = 3;
pub(crate) const SERVER_PONG: u64 = 4;
pub(crate) const SERVER_END_OF_STREAM: u64 = 5;
pub(crate) const SERVER_PROFILE_INFO: u64 = 6;
pub(crate) const SERVER_TOTALS: u64 = 7;
pub(crate) const SERVER_EXTREMES: u64 = 8;

// Revision gates. A frame field guarded by a gate is present on the wire
// only when the negotiated revision is at least the gate value.
pub(crate) const DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES: u64 = 50264;
pub(crate) const DBMS_MIN_REVISION_WITH_TOTAL_ROWS_IN_PROGRESS: u64 = 51554;
pub(crate) const DBMS_MIN_REVISION_WITH_BLOCK_INFO: u64 = 51903;
pub(crate) const DBMS_MIN_REVISION_WITH_CLIENT_INFO: u64 = 54032;
pub(crate) const DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE: u64 = 54058;
pub(crate) const DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO: u64 = 54060;

/// Query processing stage, always `Complete`
pub(crate) const STAGE_COMPLETE: u64 = 2;
/// Block compression negotiation, always `Disable`
pub(crate) const COMPRESSION_DISABLE: u64 = 0;

/// Client info constants
pub(crate) const QUERY_KIND_INITIAL: u64 = 1;
pub(crate) const IFACE_TYPE_TCP: u64 = 1;
