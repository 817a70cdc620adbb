//! Read-time recording for directional streams.

use std::io::{self, Read};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the time recorded for each successful read.
pub trait Clock: Send {
    fn now(&self) -> SystemTime;
}

/// Wall-clock time at the moment of the read.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

const UNSET: i64 = i64::MIN;

/// Capture time of the bytes most recently handed out by a reassembly pipe.
///
/// The pipe and the clock share one cell: the pipe stores the capture
/// timestamp of each chunk before returning its bytes, the clock reports it.
/// Until the pipe stores anything the clock falls back to wall-clock time.
#[derive(Debug, Clone)]
pub struct CaptureClock {
    micros: Arc<AtomicI64>,
}

impl CaptureClock {
    pub fn new() -> Self {
        Self {
            micros: Arc::new(AtomicI64::new(UNSET)),
        }
    }

    /// Record a capture timestamp in microseconds since the Unix epoch.
    pub fn set_micros(&self, timestamp_us: i64) {
        self.micros.store(timestamp_us, Ordering::Release);
    }
}

impl Default for CaptureClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for CaptureClock {
    fn now(&self) -> SystemTime {
        match self.micros.load(Ordering::Acquire) {
            UNSET => SystemTime::now(),
            us if us >= 0 => UNIX_EPOCH + Duration::from_micros(us as u64),
            us => UNIX_EPOCH - Duration::from_micros(us.unsigned_abs()),
        }
    }
}

/// Decorates a directional stream and remembers when data was last read.
///
/// Bytes, errors and end-of-stream pass through untouched. Decoders call
/// [`seen`](Self::seen) after each message to timestamp it without knowing
/// anything about the underlying I/O.
pub struct TimedStreamReader<R, C = WallClock> {
    inner: R,
    clock: C,
    seen: Option<SystemTime>,
    bytes_read: u64,
}

impl<R: Read> TimedStreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_clock(inner, WallClock)
    }
}

impl<R: Read, C: Clock> TimedStreamReader<R, C> {
    pub fn with_clock(inner: R, clock: C) -> Self {
        Self {
            inner,
            clock,
            seen: None,
            bytes_read: 0,
        }
    }

    /// Time of the most recent read that returned data, `None` before any.
    pub fn seen(&self) -> Option<SystemTime> {
        self.seen
    }

    /// Total bytes passed through so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read, C: Clock> Read for TimedStreamReader<R, C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.seen = Some(self.clock.now());
            self.bytes_read += n as u64;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FixedClock(SystemTime);

    impl Clock for FixedClock {
        fn now(&self) -> SystemTime {
            self.0
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn test_seen_unset_before_read() {
        let reader = TimedStreamReader::new(Cursor::new(b"abc".to_vec()));
        assert!(reader.seen().is_none());
    }

    #[test]
    fn test_seen_records_clock_on_data() {
        let at = UNIX_EPOCH + Duration::from_secs(1_589_900_000);
        let mut reader = TimedStreamReader::with_clock(Cursor::new(b"hello".to_vec()), FixedClock(at));

        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(reader.seen(), Some(at));
        assert_eq!(reader.bytes_read(), 5);
    }

    #[test]
    fn test_eof_does_not_touch_seen() {
        let mut reader = TimedStreamReader::new(Cursor::new(Vec::new()));
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert!(reader.seen().is_none());
    }

    #[test]
    fn test_wall_clock_bounds() {
        let before = SystemTime::now();
        let mut reader = TimedStreamReader::new(Cursor::new(b"x".to_vec()));
        let mut buf = [0u8; 1];
        reader.read(&mut buf).unwrap();
        let after = SystemTime::now();

        let seen = reader.seen().unwrap();
        assert!(seen >= before && seen <= after);
    }

    #[test]
    fn test_errors_pass_through() {
        let mut reader = TimedStreamReader::new(FailingReader);
        let mut buf = [0u8; 4];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(reader.seen().is_none());
    }

    #[test]
    fn test_capture_clock() {
        let clock = CaptureClock::new();
        let before = SystemTime::now();
        assert!(clock.now() >= before);

        clock.set_micros(1_500_000);
        assert_eq!(clock.now(), UNIX_EPOCH + Duration::from_micros(1_500_000));

        let shared = clock.clone();
        shared.set_micros(2_000_000);
        assert_eq!(clock.now(), UNIX_EPOCH + Duration::from_secs(2));
    }
}
