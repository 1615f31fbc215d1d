use tracing::{info, warn};

pub mod api;
pub mod assembler;
pub mod cancel;
pub mod caption;
pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod fitter;
pub mod init;
pub mod keywords;
pub mod overlay;
pub mod planner;
pub mod selector;
pub mod source;

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => warn!("[{}] {}", tag, message),
        _ => info!("[{}] {}", tag, message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
