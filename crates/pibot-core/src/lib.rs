pub mod collab;
pub mod confirm;
pub mod format;
pub mod gate;
pub mod logbook;
pub mod menu;
pub mod message;
pub mod router;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod watch;

pub use collab::{
    DownloadedMedia, Invocation, MediaFetcher, MessageSink, ProcessOutput, ProcessRunner,
    RemotePc, SystemProbe, SystemSnapshot, WakeSignalSource,
};
pub use confirm::{ConfirmationBroker, Decision, GuardedAction};
pub use gate::CapabilityGate;
pub use logbook::LogBook;
pub use message::{
    CallerIdentity, InboundMessage, Keyboard, KeyboardAction, OutgoingMessage, TextFormat,
};
pub use router::{Collaborators, Outcome, Router, RouterSettings};
