use std::time::{SystemTime, UNIX_EPOCH};

use quanta::Instant;

/// Unit for reporting elapsed time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scale {
    /// Seconds.
    Seconds,
    /// Milliseconds.
    Millis,
    /// Microseconds.
    Micros,
    /// Nanoseconds.
    Nanos,
}

impl Scale {
    fn per_nanosecond(self) -> f64 {
        match self {
            Scale::Seconds => 1.0e-9,
            Scale::Millis => 1.0e-6,
            Scale::Micros => 1.0e-3,
            Scale::Nanos => 1.0,
        }
    }
}

/// Monotonic stopwatch for timing operations fed into distributions.
///
/// ```
/// use aperture::{Registry, Scale, Timer};
///
/// # fn main() -> Result<(), aperture::Error> {
/// let registry = Registry::create("db")?;
/// let latency = registry.dist("query_latency")?;
///
/// let timer = Timer::start();
/// // ... run the query ...
/// latency.record(timer.elapsed(Scale::Millis));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Starts the stopwatch.
    pub fn start() -> Timer {
        Timer { start: Instant::now() }
    }

    /// Time elapsed since [`start`](Timer::start), in the requested unit.
    pub fn elapsed(&self, scale: Scale) -> f64 {
        self.start.elapsed().as_nanos() as f64 * scale.per_nanosecond()
    }
}

/// Wall-clock seconds since the epoch; zero if the system clock sits before it.
pub(crate) fn wall_clock() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{Scale, Timer};
    use std::time::Duration;

    #[test]
    fn test_elapsed_moves_forward() {
        let timer = Timer::start();
        let first = timer.elapsed(Scale::Nanos);
        let second = timer.elapsed(Scale::Nanos);
        assert!(second >= first);
    }

    #[test]
    fn test_scales_agree() {
        let timer = Timer::start();
        std::thread::sleep(Duration::from_millis(5));

        // Each read happens later than the one before it, so rescaling an earlier reading can
        // never overshoot a later one.
        let nanos = timer.elapsed(Scale::Nanos);
        let micros = timer.elapsed(Scale::Micros);
        let millis = timer.elapsed(Scale::Millis);
        let secs = timer.elapsed(Scale::Seconds);

        assert!(nanos >= 1.0e6, "slept for at least a millisecond, got {}ns", nanos);
        assert!(micros * 1.0e3 >= nanos);
        assert!(millis * 1.0e6 >= nanos);
        assert!(secs * 1.0e9 >= nanos);
        assert!(secs < 60.0);
    }
}
