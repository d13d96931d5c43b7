use std::time::Duration;

use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct LockOptions {
    /// Lease written with each acquisition and each renewal.
    pub lease: Duration,
    /// Upper bound on a blocking `lock` call, independent of the caller's deadline.
    pub wait_timeout: Duration,
    /// Prefix of every owner token issued by this process.
    pub owner_prefix: String,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(10),
            wait_timeout: Duration::from_secs(5),
            owner_prefix: format!("quota-{}", std::process::id()),
        }
    }
}

impl LockOptions {
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn with_owner_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.owner_prefix = prefix.into();
        self
    }

    pub fn renew_interval(&self) -> Duration {
        (self.lease / 3).max(Duration::from_millis(1))
    }

    /// A token unique to one acquisition attempt.
    pub fn new_token(&self) -> String {
        format!("{}:{}", self.owner_prefix, Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renews_at_a_third_of_the_lease() {
        let options = LockOptions::default().with_lease(Duration::from_millis(900));
        assert_eq!(options.renew_interval(), Duration::from_millis(300));
    }

    #[test]
    fn tokens_are_unique_and_prefixed() {
        let options = LockOptions::default().with_owner_prefix("node-a");
        let first = options.new_token();
        let second = options.new_token();
        assert_ne!(first, second);
        assert!(first.starts_with("node-a:"));
    }
}
