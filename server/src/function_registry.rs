//! Names the server registers into every engine connection (spec §4.6:
//! "the user/privilege functions registered into each engine connection
//! (`user`, `current_user`, `database`, `version`, `sleep`, `start_time`,
//! etc.)"). The engine trait (spec §1 Non-goals) doesn't expose a function-
//! registration hook, so this is metadata the processor consults when it
//! needs one of these values itself (e.g. rendering `SHOW GRANTS FOR
//! CURRENT_USER()`) rather than a live call into the engine.

use std::sync::OnceLock;
use std::time::Instant;

pub const REGISTERED_FUNCTIONS: &[&str] =
    &["user", "current_user", "database", "version", "sleep", "start_time"];

pub fn is_registered(name: &str) -> bool {
    REGISTERED_FUNCTIONS.iter().any(|f| f.eq_ignore_ascii_case(name))
}

static BOOT_TIME: OnceLock<Instant> = OnceLock::new();

/// Backs the `start_time()` function: the server process's boot instant.
/// `StartTime::now()` is idempotent — the first call in the process fixes
/// the instant every later call measures against (SHOW STATUS's uptime
/// must grow monotonically across the whole server lifetime, not reset
/// per connection).
pub struct StartTime(Instant);

impl StartTime {
    pub fn now() -> Self {
        StartTime(*BOOT_TIME.get_or_init(Instant::now))
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognizes_case_insensitively() {
        assert!(is_registered("CURRENT_USER"));
        assert!(!is_registered("not_a_function"));
    }
}
