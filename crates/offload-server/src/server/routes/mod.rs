pub mod compute;
pub mod default;
pub mod stats;
