pub mod cli;
pub mod corrupt;
pub mod error;
pub mod hub;
pub mod language;
pub mod pool;
pub mod prompt;
pub mod reasoning;
pub mod record;
pub mod reward;
pub mod split;
pub mod stats;
pub mod text;
pub mod wiki;

pub use error::{PunktError, Result};
