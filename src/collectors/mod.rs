pub mod hardware;

pub use hardware::collect_hardware;
