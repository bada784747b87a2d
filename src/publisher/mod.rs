//! Publisher module
//!
//! The publish loop, its startup phase and the event dispatcher.

mod dispatcher;
mod engine;

pub use dispatcher::spawn_dispatcher;
pub use engine::{
    abort_startup, start, topic_for, PassSummary, PublishLoop, PublishLoopConfig, RunSummary, StopReason,
    PASS_INTERVAL, TOPIC_PREFIX,
};
