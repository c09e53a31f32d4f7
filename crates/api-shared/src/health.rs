use crate::HealthRes;

/// Simple health service that can be used by both the REST API and the CLI
///
/// This service provides a standardised way to check the health status of the intake system.
#[derive(Clone)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Static method to check health without creating an instance
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Intake is alive".into(),
        }
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}
