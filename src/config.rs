use crate::resolver::{self, ResolveError};

/// Runtime options the HTTP actions read.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Comma-separated domains to connect; overrides the app URL host.
    pub domain_override: Option<String>,
    /// Public URL of the site (e.g. https://www.example.com).
    pub app_url: Option<String>,
    pub admin_user: String,
    /// Argon2 PHC string for the admin password.
    pub admin_password_hash: String,
}

impl AppConfig {
    /// Domains the connect action should resolve, before root-domain reduction.
    pub fn connect_domains(&self) -> Result<Vec<String>, ResolveError> {
        resolver::configured_domains(self.domain_override.as_deref(), self.app_url.as_deref())
    }
}
