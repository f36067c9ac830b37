pub mod backtrace;
pub mod record;
pub mod sink;
pub mod writer;
pub mod host;
pub mod locale;
pub mod normalize;
pub mod context;
pub mod config;
pub mod capture;
pub mod layer;

pub mod init;
pub mod noop_sink;

pub use capture::{ErrorCapture, Exception, Propagation, ShutdownGuard};
pub use config::CaptureConfig;
