pub mod clock;
pub mod config;
pub mod error;
pub mod page;
pub mod sync;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::WarConfig;
pub use error::{Result, WarError};
pub use page::Page;
