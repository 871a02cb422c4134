pub mod capture;
pub mod config;
pub mod detect;
mod error;
pub mod overlay;
pub mod session;
pub mod shapes;
pub mod still;

pub use error::Error;
