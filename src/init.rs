use crate::capture::{ErrorCapture, Exception};
use crate::config::CaptureConfig;
use crate::layer::ErrorCaptureLayer;
use crate::record::SourceLocation;
use std::any::Any;
use std::panic::Location;
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the capture layer.
///
/// **Fields**
/// - `min_level`: least severe `tracing` level turned into a record.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   added next to [`ErrorCaptureLayer`] and events are also printed to
///   the console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_level: Level::WARN,
            enable_stdout: true,
        }
    }
}

/// Initialize global `tracing` subscriber using the provided capture and
/// [`LayerConfig`].
///
/// **Effects**
///
/// This installs a [`Registry`] combined with [`ErrorCaptureLayer`] as the
/// global default subscriber, so `tracing` events at or above
/// `min_level` anywhere in the process end up in the daily log.
pub fn init_tracing_with_config(
    capture: Arc<ErrorCapture>,
    config: LayerConfig,
) -> Result<(), SetGlobalDefaultError> {
    let layer = ErrorCaptureLayer::new(capture, config.min_level);

    // Two subscriber shapes because the layer stacks differ in type.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing(capture: Arc<ErrorCapture>) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(capture, LayerConfig::default())
}

/// Log every panic as an uncaught exception, then run the hook that was
/// installed before, so the usual panic output and behavior still happen.
pub fn install_panic_hook(capture: Arc<ErrorCapture>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let exception = panic_exception(info.payload(), info.location(), capture.current_stack());
        capture.handle_exception(&exception);
        previous(info);
    }));
}

/// Build the capture, route panics and `tracing` events into it, and
/// return it for direct use (shutdown guard, [`ErrorCapture::observe`]).
pub fn init(
    config: CaptureConfig,
    layer: LayerConfig,
) -> Result<Arc<ErrorCapture>, SetGlobalDefaultError> {
    let capture = Arc::new(ErrorCapture::new(config));
    init_tracing_with_config(Arc::clone(&capture), layer)?;
    install_panic_hook(Arc::clone(&capture));
    Ok(capture)
}

pub(crate) fn panic_exception(
    payload: &(dyn Any + Send),
    location: Option<&Location<'_>>,
    trace: Vec<crate::backtrace::Frame>,
) -> Exception {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    };
    let location = location
        .map(SourceLocation::from)
        .unwrap_or_else(SourceLocation::unknown);
    Exception::new(message, location, trace)
}
