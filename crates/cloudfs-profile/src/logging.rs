use log::{debug, error, info, warn};

/// Logging handle for one profile session.
///
/// Every message is prefixed with the session identity
/// (`"<service label> - <profile name>"`). Debug messages are dropped unless
/// the session is verbose.
#[derive(Debug, Clone)]
pub struct SessionLog {
    identity: String,
    verbose: bool,
}

impl SessionLog {
    pub fn new(service_label: &str, profile_name: &str, verbose: bool) -> Self {
        Self {
            identity: format!("{} - {}", service_label, profile_name),
            verbose,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        if self.verbose {
            debug!("[{}] {}", self.identity, message.as_ref());
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        info!("[{}] {}", self.identity, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        warn!("[{}] {}", self.identity, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        error!("[{}] {}", self.identity, message.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_joins_label_and_profile() {
        let log = SessionLog::new("Demo Service", "alice", true);
        assert_eq!(log.identity(), "Demo Service - alice");
        assert!(log.is_verbose());
    }
}
