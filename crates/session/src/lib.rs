//! Session state machine, registry, chunk emitter, retention ring and
//! backpressure send loop (spec §3, §4.3–§4.6, §5).

pub mod emitter;
pub mod error;
pub mod params;
pub mod registry;
pub mod retention;
pub mod session;
pub mod state;
pub mod transport;

pub use emitter::ChunkEmitter;
pub use error::SessionError;
pub use params::{AdmissionParams, SessionParams};
pub use registry::SessionManager;
pub use retention::RetentionRing;
pub use session::{run_send_task, run_synthesis_task, Session};
pub use state::SessionState;
pub use transport::{InboundTransport, OutboundTransport};
