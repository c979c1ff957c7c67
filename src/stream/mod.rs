//! Server side of the notification stream: one [`session::StreamSession`]
//! per open SSE connection.

pub mod buffer;
pub mod directory;
pub mod session;
