pub mod expiry_sweeper;
