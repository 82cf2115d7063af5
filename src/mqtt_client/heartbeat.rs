//! Keep-alive scheduling: PINGREQ emission and PINGRESP timeout.

use std::time::{Duration, Instant};

/// What the connection should do at a tick.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HeartbeatAction {
    Idle,
    /// No outbound traffic for half the keep-alive interval: issue a
    /// PINGREQ.
    SendPing,
    /// The outstanding PINGREQ went unanswered for a full keep-alive
    /// interval.
    PingTimeout,
}

/// Tracks outbound write activity and the outstanding ping, if any.
///
/// The owning run loop drives it through [`HeartbeatMonitor::on_tick`] and
/// sleeps until [`HeartbeatMonitor::next_deadline`]. The timeout check is
/// anchored to the instant recorded when the ping went out, so a PINGRESP
/// that clears one ping can never mask the timeout of a later one.
pub(crate) struct HeartbeatMonitor {
    keep_alive: Duration,
    last_write: Instant,
    pinged_at: Option<Instant>,
    read_suspended: bool,
}

impl HeartbeatMonitor {
    pub(crate) fn new(keep_alive: Duration, now: Instant) -> Self {
        Self {
            keep_alive,
            last_write: now,
            pinged_at: None,
            read_suspended: false,
        }
    }

    /// The write interval is half the keep-alive period.
    fn write_interval(&self) -> Duration {
        self.keep_alive / 2
    }

    pub(crate) fn note_write(&mut self, now: Instant) {
        self.last_write = now;
    }

    /// A PINGREQ was accepted by the transport at `now`.
    pub(crate) fn mark_pinged(&mut self, now: Instant) {
        self.pinged_at = Some(now);
        self.last_write = now;
    }

    pub(crate) fn on_pingresp(&mut self) {
        self.pinged_at = None;
    }

    pub(crate) fn suspend_read(&mut self) {
        self.read_suspended = true;
    }

    /// Inbound delivery resumed. An outstanding ping gets a fresh window:
    /// its response may have been parked behind the suspended read side.
    pub(crate) fn resume_read(&mut self, now: Instant) {
        self.read_suspended = false;
        if self.pinged_at.is_some() {
            self.pinged_at = Some(now);
        }
    }

    pub(crate) fn on_tick(&self, now: Instant) -> HeartbeatAction {
        if let Some(pinged_at) = self.pinged_at {
            // While reads are suspended no PINGRESP can arrive; failing
            // would be spurious.
            if !self.read_suspended && now.duration_since(pinged_at) >= self.keep_alive {
                return HeartbeatAction::PingTimeout;
            }
            return HeartbeatAction::Idle;
        }
        if now.duration_since(self.last_write) >= self.write_interval() {
            HeartbeatAction::SendPing
        } else {
            HeartbeatAction::Idle
        }
    }

    /// When the run loop should call back in.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        match self.pinged_at {
            Some(_) if self.read_suspended => None,
            Some(pinged_at) => Some(pinged_at + self.keep_alive),
            None => Some(self.last_write + self.write_interval()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEEP_ALIVE: Duration = Duration::from_secs(2);

    #[test]
    fn test_ping_after_write_silence() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(KEEP_ALIVE, start);
        assert_eq!(hb.on_tick(start), HeartbeatAction::Idle);
        assert_eq!(
            hb.on_tick(start + Duration::from_secs(1)),
            HeartbeatAction::SendPing
        );

        // Traffic pushes the write deadline out.
        hb.note_write(start + Duration::from_secs(1));
        assert_eq!(
            hb.on_tick(start + Duration::from_millis(1500)),
            HeartbeatAction::Idle
        );
    }

    #[test]
    fn test_ping_timeout_fires_after_keep_alive() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(KEEP_ALIVE, start);
        hb.mark_pinged(start + Duration::from_secs(1));
        assert_eq!(
            hb.on_tick(start + Duration::from_secs(2)),
            HeartbeatAction::Idle
        );
        assert_eq!(
            hb.on_tick(start + Duration::from_secs(3)),
            HeartbeatAction::PingTimeout
        );
    }

    #[test]
    fn test_pingresp_clears_outstanding_ping() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(KEEP_ALIVE, start);
        hb.mark_pinged(start + Duration::from_secs(1));
        hb.on_pingresp();
        assert_eq!(
            hb.on_tick(start + Duration::from_secs(10)),
            HeartbeatAction::SendPing
        );
    }

    #[test]
    fn test_no_second_ping_while_awaiting_response() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(KEEP_ALIVE, start);
        hb.mark_pinged(start + Duration::from_secs(1));
        assert_eq!(
            hb.on_tick(start + Duration::from_millis(2500)),
            HeartbeatAction::Idle
        );
    }

    #[test]
    fn test_suspend_defers_timeout() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(KEEP_ALIVE, start);
        hb.mark_pinged(start + Duration::from_secs(1));
        hb.suspend_read();
        assert_eq!(
            hb.on_tick(start + Duration::from_secs(10)),
            HeartbeatAction::Idle
        );
        assert!(hb.next_deadline().is_none());

        // Resuming rebases the outstanding ping window.
        hb.resume_read(start + Duration::from_secs(10));
        assert_eq!(
            hb.on_tick(start + Duration::from_secs(11)),
            HeartbeatAction::Idle
        );
        assert_eq!(
            hb.on_tick(start + Duration::from_secs(12)),
            HeartbeatAction::PingTimeout
        );
    }

    #[test]
    fn test_next_deadline_tracks_state() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(KEEP_ALIVE, start);
        assert_eq!(hb.next_deadline(), Some(start + Duration::from_secs(1)));
        hb.mark_pinged(start + Duration::from_secs(1));
        assert_eq!(hb.next_deadline(), Some(start + Duration::from_secs(3)));
    }
}
