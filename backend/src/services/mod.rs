pub mod authorization;
pub mod coordinator;
pub mod directory;
pub mod dose_guard;
pub mod ledger;
pub mod notifier;
pub mod recorder;
pub mod registry;
pub mod resolver;
