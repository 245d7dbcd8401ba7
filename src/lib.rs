//! node-relay — listens to chat sources, extracts proxy-node links,
//! filters them by policy, and republishes to destination chats.

pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod pipeline;
