//! Actors: mailboxes, state graph declarations and the per-instance engine.

pub mod machine;
pub mod mailbox;
pub mod schema;
