pub(crate) mod bootstrap;
mod scenario;
pub(crate) mod show_runner;
