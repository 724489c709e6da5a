mod action;
mod action_log;
mod client_session;
mod clock;
mod document;
mod interaction;
mod message;
pub mod split;
pub mod timeline;

pub use action::*;
pub use action_log::*;
pub use client_session::*;
pub use clock::*;
pub use document::*;
pub use interaction::*;
pub use message::*;

pub extern crate bincode;
pub extern crate serde;
pub extern crate serde_json;
