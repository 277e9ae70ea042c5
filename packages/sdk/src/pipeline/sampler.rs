// packages/sdk/src/pipeline/sampler.rs
//! Admission sampling
//!
//! Per-kind Bernoulli sampling, decided once at admission to the queue.
//! Two overrides bypass the coin flip: errors of high or critical severity,
//! and performance events from pathologically slow loads.

use crate::event::types::{EventKind, EventPayload, MonitorEvent, Severity};
use crate::utils::config::SamplingConfig;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sampling decisions for event admission.
pub struct Sampler {
    config: SamplingConfig,
    rng: Mutex<StdRng>,
}

impl Sampler {
    pub fn new(config: SamplingConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sampler for tests.
    pub fn with_seed(config: SamplingConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn rate_for(&self, kind: EventKind) -> f64 {
        match kind {
            EventKind::Performance => self.config.performance,
            EventKind::Error => self.config.errors,
            EventKind::Behavior => self.config.behavior,
            EventKind::Replay => self.config.replay,
        }
    }

    /// Decide whether `event` is admitted.
    pub fn admit(&self, event: &MonitorEvent) -> bool {
        match &event.payload {
            EventPayload::Error(payload) if payload.severity >= Severity::High => return true,
            EventPayload::Performance(payload)
                if payload.metrics.page_load_time > self.config.slow_load_threshold_ms =>
            {
                return true
            }
            _ => {}
        }

        let rate = self.rate_for(event.kind());
        if rate >= 1.0 {
            return true;
        }
        if rate <= 0.0 {
            return false;
        }

        self.rng.lock().gen::<f64>() < rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::envelope::{DeviceInfo, Envelope};
    use crate::event::types::{
        BehaviorAction, BehaviorPayload, ErrorKind, ErrorPayload, PerformanceMetrics,
        PerformancePayload,
    };

    fn envelope() -> Envelope {
        Envelope {
            event_id: "evt_1".to_string(),
            app_id: "app".to_string(),
            session_id: "s1".to_string(),
            user_id: None,
            timestamp: 0,
            page_url: "https://app.example/".to_string(),
            user_agent: "TestAgent/1.0".to_string(),
            device_info: DeviceInfo::default(),
        }
    }

    fn behavior_event() -> MonitorEvent {
        MonitorEvent {
            envelope: envelope(),
            payload: EventPayload::Behavior(BehaviorPayload {
                action: BehaviorAction::Click,
                target: None,
                value: None,
                coordinates: None,
                duration: None,
                context: None,
            }),
        }
    }

    fn error_event(severity: Severity) -> MonitorEvent {
        MonitorEvent {
            envelope: envelope(),
            payload: EventPayload::Error(ErrorPayload {
                error_type: ErrorKind::Javascript,
                message: "Boom".to_string(),
                stack_trace: None,
                file_name: None,
                line_number: None,
                column_number: None,
                severity,
                context: serde_json::Value::Null,
                fingerprint: "f".to_string(),
            }),
        }
    }

    fn performance_event(page_load_time: f64) -> MonitorEvent {
        MonitorEvent {
            envelope: envelope(),
            payload: EventPayload::Performance(PerformancePayload {
                metrics: PerformanceMetrics {
                    page_load_time,
                    ..Default::default()
                },
                resources: vec![],
            }),
        }
    }

    #[test]
    fn test_rate_one_admits_everything() {
        let config = SamplingConfig {
            behavior: 1.0,
            ..Default::default()
        };
        let sampler = Sampler::with_seed(config, 7);
        assert!((0..100).all(|_| sampler.admit(&behavior_event())));
    }

    #[test]
    fn test_rate_zero_admits_nothing() {
        let config = SamplingConfig {
            behavior: 0.0,
            ..Default::default()
        };
        let sampler = Sampler::with_seed(config, 7);
        assert!((0..100).all(|_| !sampler.admit(&behavior_event())));
    }

    #[test]
    fn test_admission_fraction_converges() {
        let config = SamplingConfig {
            behavior: 0.1,
            ..Default::default()
        };
        let sampler = Sampler::with_seed(config, 42);

        let admitted = (0..10_000).filter(|_| sampler.admit(&behavior_event())).count();
        let fraction = admitted as f64 / 10_000.0;
        assert!((fraction - 0.1).abs() < 0.02, "fraction was {}", fraction);
    }

    #[test]
    fn test_high_severity_bypasses_rate() {
        let config = SamplingConfig {
            errors: 0.0,
            ..Default::default()
        };
        let sampler = Sampler::with_seed(config, 7);

        assert!(sampler.admit(&error_event(Severity::High)));
        assert!(sampler.admit(&error_event(Severity::Critical)));
        assert!(!sampler.admit(&error_event(Severity::Medium)));
    }

    #[test]
    fn test_slow_load_bypasses_rate() {
        let config = SamplingConfig {
            performance: 0.0,
            slow_load_threshold_ms: 3_000.0,
            ..Default::default()
        };
        let sampler = Sampler::with_seed(config, 7);

        assert!(sampler.admit(&performance_event(5_000.0)));
        assert!(!sampler.admit(&performance_event(800.0)));
    }
}
