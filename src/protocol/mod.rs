//! Pool-side protocol module
//!
//! Mining pools speak line-delimited JSON over a byte stream. This module
//! turns such a stream into discrete messages and describes how a pool is
//! addressed and dialed.

mod framed;
mod target;

pub use framed::{Frame, FrameError, FrameReader, FrameWriter, FramedConnection, LINE_DELIMITER};
pub use target::{PoolScheme, PoolTarget, POOL_HEADER};
