//! Server configuration.

/// Configuration for the sync server shell.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Page size for conflict listings when the caller gives none.
    pub default_page_size: usize,
    /// Upper bound on the caller-supplied page size.
    pub max_page_size: usize,
}

impl ServerConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
        }
    }

    /// Sets the default page size.
    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Sets the maximum page size.
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
