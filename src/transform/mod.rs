//! Transform requests: prompt-templated style transfer with bounded retry.

pub mod request;
pub mod retry;

pub use request::{parse_suitability_reply, TransformFailure, Transformer};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
