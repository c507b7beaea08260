pub mod io;
pub mod types;

pub use io::ConfigIO;
pub use types::Config;
