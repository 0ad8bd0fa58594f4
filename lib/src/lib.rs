/// Initialize logging with the given default level. Respects `RUST_LOG`
/// overrides.
pub fn init_logging(default_level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(default_level)
        // axum/hyper connection chatter is never useful on the device
        .filter_module("hyper", log::LevelFilter::Warn)
        .parse_default_env()
        .init();
}

pub mod catalog;
pub mod command;
pub mod config;
pub mod intent;
pub mod supervisor;

/// File extensions (lowercase, no dot) the image renderer can play.
pub const MEDIA_EXTENSIONS: &[&str] = &["gif", "jpg", "jpeg", "png"];

/// Returns true if `name` ends in one of [`MEDIA_EXTENSIONS`], ignoring case.
pub fn is_media_file_name(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            MEDIA_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
}
