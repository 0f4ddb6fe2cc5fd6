pub mod requests;
pub mod space;

#[cfg(target_arch = "wasm32")]
mod wasm_wrapper;
