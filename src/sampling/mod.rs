pub mod sampler;
pub mod session;

pub use sampler::{Sampler, SamplingConfig};
pub use session::{FrameSample, SamplingSession, SessionState};
