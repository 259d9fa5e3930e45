pub mod assignment;
pub mod authorization;
pub mod messaging;
pub mod orders;
pub mod queue;
pub mod tracking;
pub mod transitions;
