pub mod clock;
pub mod color;
pub mod grid;
pub mod pointer;
pub mod render;
pub mod rng;
pub mod settings;
mod swirl;

pub use pointer::{PointerEvent, Splat, PRIMARY_POINTER_ID};
pub use render::{request_context, Capabilities};
pub use settings::Settings;
pub use swirl::{FrameStats, Problem, Swirl};
