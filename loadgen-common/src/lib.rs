pub mod controller;
pub mod error;
pub mod host;
pub mod metrics;
pub mod registry;
pub mod shutdown;
pub mod supervisor;
