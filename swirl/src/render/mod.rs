pub mod capabilities;
pub mod display;
pub mod fluid;
pub mod framebuffer;
pub mod limiter;
pub mod program;

pub use capabilities::{request_context, Capabilities, Context};
pub use framebuffer::{DoubleBuffer, DoubleFramebuffer, Framebuffer};
pub use program::{Frame, Keywords};
