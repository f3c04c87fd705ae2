pub mod sweeper;

pub use sweeper::RetentionSweeper;
