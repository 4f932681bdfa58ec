pub mod collect;
pub mod lifecycle;
pub mod registry;

pub use collect::collect_response;
pub use lifecycle::supervise;
pub use registry::{SessionHandle, SessionRegistry, StreamPhase, StreamState};
