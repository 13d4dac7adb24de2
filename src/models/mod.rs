mod record;
mod roster;
mod status;

pub use record::*;
pub use roster::*;
pub use status::*;
