//! Client half of the pipeline: the unread store and the stream reader
//! that feeds it.

pub mod backoff;
pub mod listener;
pub mod store;
