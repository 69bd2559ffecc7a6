use std::time::Duration;

/// Sender shown on server-generated notices (e.g. a new group chat)
pub const SYSTEM_SENDER: &str = "huddle";

/// Time allowed to write a single frame to a peer, in seconds
pub const WRITE_WAIT_SECS: u64 = 10;

/// Time allowed between two reads (or pongs) from a peer, in seconds
pub const PONG_WAIT_SECS: u64 = 60;

/// Maximum inbound frame size in bytes
pub const MAX_FRAME_SIZE: usize = 512;

/// Per-connection outbound queue bound (messages)
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Smallest group the matching engine forms
pub const MIN_GROUP_SIZE: usize = 3;

/// Largest group the matching engine forms
pub const MAX_GROUP_SIZE: usize = 6;

/// Default number of waiting users fed to one matching pass
pub const DEFAULT_MAX_WAITING_POOL: usize = 24;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Header carrying the session token on HTTP requests
pub const SESSION_HEADER: &str = "session-token";

/// Descriptions handed out to newly matched group chats
pub const GROUP_DESCRIPTIONS: [&str; 4] = [
    "In The Forest",
    "At The Store",
    "In The Mighty Jungle",
    "At The Bar",
];

/// Keepalive period derived from the peer read timeout.
///
/// Pings go out at 9/10 of the read timeout so they land before the peer
/// gives up on the connection.
pub fn ping_period(pong_wait: Duration) -> Duration {
    pong_wait * 9 / 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_period_precedes_read_timeout() {
        let pong_wait = Duration::from_secs(PONG_WAIT_SECS);
        assert_eq!(ping_period(pong_wait), Duration::from_secs(54));
        assert_eq!(ping_period(Duration::from_secs(1)), Duration::from_millis(900));
    }
}
