//! Test data builders

use chrono::{DateTime, Duration, Utc};
use coordinator_core::InstanceRegistration;

/// Builder for creating test InstanceRegistration rows
pub struct InstanceRegistrationBuilder {
    registration: InstanceRegistration,
}

impl InstanceRegistrationBuilder {
    pub fn new() -> Self {
        Self {
            registration: InstanceRegistration {
                instance_registration_id: "coordinator-test-100".to_string(),
                worker_type_name: "conversion".to_string(),
                is_active: false,
                last_updated: Utc::now(),
                version: 0,
            },
        }
    }

    /// Id in the `{prefix}-{host}-{tick}` shape used by the elector
    pub fn with_tick(mut self, tick: u64) -> Self {
        self.registration.instance_registration_id = format!("coordinator-test-{tick}");
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.registration.instance_registration_id = id.to_string();
        self
    }

    pub fn with_worker_type(mut self, worker_type_name: &str) -> Self {
        self.registration.worker_type_name = worker_type_name.to_string();
        self
    }

    pub fn active(mut self) -> Self {
        self.registration.is_active = true;
        self
    }

    pub fn with_last_updated(mut self, last_updated: DateTime<Utc>) -> Self {
        self.registration.last_updated = last_updated;
        self
    }

    /// Heartbeat `seconds` before `now`
    pub fn updated_seconds_ago(mut self, now: DateTime<Utc>, seconds: i64) -> Self {
        self.registration.last_updated = now - Duration::seconds(seconds);
        self
    }

    pub fn build(self) -> InstanceRegistration {
        self.registration
    }
}

impl Default for InstanceRegistrationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
