mod file;
mod session;

pub use file::*;
pub use session::*;
