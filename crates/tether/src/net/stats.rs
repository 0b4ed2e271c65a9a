#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    pub datagrams_received: u64,
    pub bytes_received: u64,
    pub datagrams_accepted: u64,
    pub datagrams_stale: u64,
}

impl ChannelStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.datagrams_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize, accepted: bool) {
        self.datagrams_received += 1;
        self.bytes_received += bytes as u64;
        if accepted {
            self.datagrams_accepted += 1;
        } else {
            self.datagrams_stale += 1;
        }
    }

    pub fn stale_percent(&self) -> f32 {
        if self.datagrams_received == 0 {
            return 0.0;
        }
        self.datagrams_stale as f32 / self.datagrams_received as f32 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counting() {
        let mut stats = ChannelStats::default();
        assert_eq!(stats.stale_percent(), 0.0);

        stats.record_sent(10);
        stats.record_received(8, true);
        stats.record_received(8, false);
        stats.record_received(8, true);
        stats.record_received(8, false);

        assert_eq!(stats.datagrams_sent, 1);
        assert_eq!(stats.bytes_received, 32);
        assert_eq!(stats.datagrams_accepted, 2);
        assert_eq!(stats.datagrams_stale, 2);
        assert_eq!(stats.stale_percent(), 50.0);
    }
}
