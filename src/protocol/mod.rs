//! Wire format of the native TCP protocol.
//!
//! There is no official format specification; the layout below was
//! assembled from other open-source drivers and packet captures. All
//! framing integers are VarInt64 (7 data bits per byte, high bit set
//! while more bytes follow, at most 9 bytes); fixed-width scalar
//! payloads are little-endian.
//!
//! ## Frames
//!
//! Every frame starts with an opcode VarInt64. Outbound: Hello(0),
//! Query(1), Data(2), Ping(4). Inbound: Hello(0), Data(1),
//! Exception(2), Progress(3), Pong(4), EndOfStream(5), ProfileInfo(6).
//! Strings are length-prefixed: VarInt64 byte count, then raw UTF-8.
//! Several frame fields are revision-gated, see `code.rs`; both sides
//! format for the lower of the two advertised revisions.
//!
//! ## Data frame
//!
//! After the opcode:
//!
//! 1. temporary table name, almost always empty (revision-gated);
//! 2. block info, encoded as numbered field pairs closed by a zero tag:
//!    tag 1 + `is_overflows` u8, tag 2 + `bucket_num` i32, tag 0;
//! 3. column count, then row count, both VarInt64;
//! 4. per column: name string, type descriptor string (for example
//!    `Nullable(UInt32)` or `Enum8('a' = 1)`), then the value payload.
//!
//! A block with no columns and no rows is the end-of-data marker in
//! both directions: the client sends one to finish a query preamble or
//! an insert, the server sends one before EndOfStream.
//!
//! ## Column payloads
//!
//! Values of one column are stored densely, not interleaved with other
//! columns. Per element type:
//!
//! * integers and floats: raw little-endian, 1 to 8 bytes each;
//! * `Bool`: one byte per value, 0 or 1;
//! * `String`: each value length-prefixed like any other string;
//! * `FixedString(n)`: exactly n bytes per value, short values padded
//!   with NUL, long values cut at the byte level even mid code point;
//! * `Date` u16 days, `Date32` i32 days, `DateTime` u32 seconds since
//!   epoch; `DateTime64(p)` i64 ticks of 10^-p seconds, p in 0..=9;
//! * `UUID`: 16 bytes with each 8-byte half reversed relative to the
//!   canonical big-endian form;
//! * `Enum8`/`Enum16`: i8/i16 codes; the name-to-code dictionary lives
//!   in the type descriptor text, not in the payload;
//! * `Nullable(T)`: one flag byte per row (1 = null) first, then a
//!   full-length payload of T with defaults in the null slots;
//! * `Array(T)`: u64 cumulative element counts, one per row, then the
//!   flattened element payload (nested arrays repeat this per level);
//! * `Map(String, String)`: offsets as for arrays, then all keys, then
//!   all values.
//!
//! Compressed payloads exist in the protocol but this client always
//! negotiates compression off.
pub(crate) mod block;
pub(crate) mod code;
pub(crate) mod column;
pub(crate) mod command;
pub(crate) mod decoder;
pub(crate) mod encoder;
pub(crate) mod packet;
pub(crate) mod state;
