//! WebSocket transport: translates JSON frames into delivery coordinator
//! calls and core events back into frames.

pub mod actor;
pub mod handler;
pub mod protocol;
