mod app;
mod error;
mod host;
mod load;
mod probes;

pub use app::{app, AppState};
