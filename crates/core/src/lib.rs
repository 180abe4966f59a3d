pub mod config;
pub mod envelope;
pub mod models;
pub mod traits;

pub use config::*;
pub use envelope::*;
pub use models::*;
pub use traits::*;
