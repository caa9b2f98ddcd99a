pub mod context;
pub mod control;
pub mod events;
pub mod executor;
pub mod job;
pub mod queue;
pub mod state;
