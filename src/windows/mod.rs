//! Windows shared memory access
//!
//! Maps the producer's named segment read-only. The producer is the sole
//! writer; consumers never lock, so a read racing a producer update may see a
//! partially written element. That staleness is bounded to one poll.

mod connection;

pub use connection::MappedSegment;
