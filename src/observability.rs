use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("chatline.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("chatline.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("chatline.client.request_duration_seconds");

pub(crate) static SEND_ACCEPTED: Counter = Counter::new("chatline.controller.sends_accepted");
pub(crate) static SEND_REJECTED: Counter = Counter::new("chatline.controller.sends_rejected");
pub(crate) static SEND_FAILED: Counter = Counter::new("chatline.controller.sends_failed");
pub(crate) static SEND_DURATION: Moments =
    Moments::new("chatline.controller.send_duration_seconds");
pub(crate) static SESSION_SWITCHES: Counter = Counter::new("chatline.controller.session_switches");
pub(crate) static SESSION_SWITCH_FAILURES: Counter =
    Counter::new("chatline.controller.session_switch_failures");
pub(crate) static STALE_SESSION_LISTS: Counter =
    Counter::new("chatline.controller.stale_session_lists");
pub(crate) static HISTORY_CACHE_FALLBACKS: Counter =
    Counter::new("chatline.controller.history_cache_fallbacks");

pub(crate) static HEALTH_PROBES: Counter = Counter::new("chatline.health.probes");
pub(crate) static HEALTH_FAILURES: Counter = Counter::new("chatline.health.failures");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&SEND_ACCEPTED);
    collector.register_counter(&SEND_REJECTED);
    collector.register_counter(&SEND_FAILED);
    collector.register_moments(&SEND_DURATION);
    collector.register_counter(&SESSION_SWITCHES);
    collector.register_counter(&SESSION_SWITCH_FAILURES);
    collector.register_counter(&STALE_SESSION_LISTS);
    collector.register_counter(&HISTORY_CACHE_FALLBACKS);

    collector.register_counter(&HEALTH_PROBES);
    collector.register_counter(&HEALTH_FAILURES);
}
