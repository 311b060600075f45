//! Host-side implementations of the bot's collaborator traits.

pub mod media;
pub mod probe;
pub mod remote;
pub mod runner;
pub mod signal;

pub use media::{Platform, YtDlpFetcher};
pub use probe::HostProbe;
pub use remote::LanRemotePc;
pub use runner::SystemRunner;
pub use signal::HttpWakeSignal;
