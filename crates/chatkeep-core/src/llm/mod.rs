mod traits;
mod openai;
mod retry;

pub use traits::*;
pub use openai::OpenAIClient;
pub use retry::{InvocationError, RetryPolicy, RetryingInvoker};
