use crate::types::DisplayConfig;

pub struct Capabilities {
    pub http: bool,
    /// Config changes and uploads are allowed.
    pub writable: bool,
    /// The source directory has at least one subfolder with media in it.
    pub has_folders: bool,
}

impl Capabilities {
    pub fn new(config: &DisplayConfig, folders: &[String], read_only: bool) -> Self {
        Self {
            http: true,
            writable: !read_only,
            has_folders: !folders.is_empty() && !config.source_dir.is_empty(),
        }
    }
}
