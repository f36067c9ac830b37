use std::sync::Arc;

use tracing::{error, info, warn};

use daily_debug_log::init::{init_tracing_with_config, LayerConfig};
use daily_debug_log::{CaptureConfig, ErrorCapture};

fn main() {
    let capture = Arc::new(ErrorCapture::new(CaptureConfig::from_env()));
    println!("writing to {}", capture.log_path().display());

    let layer_config = LayerConfig {
        enable_stdout: true,
        ..LayerConfig::default()
    };
    if let Err(e) = init_tracing_with_config(Arc::clone(&capture), layer_config) {
        eprintln!("tracing already initialized: {}", e);
        return;
    }

    info!("service started");
    warn!(retries = 3, "upstream responded slowly");
    error!(order_id = 123, "order failed");
}
