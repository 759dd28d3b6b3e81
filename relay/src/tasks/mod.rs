//! Concrete pipeline stages run through [`crate::task::run_task`].

pub mod endpoint;
pub mod instantiate;
pub mod signal;
pub mod stub;
pub mod terminate;

pub use endpoint::Endpoint;
pub use instantiate::{Instantiate, Phase};
pub use signal::{Signal, SignalOp};
pub use stub::Stub;
pub use terminate::Terminate;
