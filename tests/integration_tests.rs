//! Integration tests for the session state server
//!
//! Each test drives a real in-process server over loopback TCP and validates
//! the connect/update/disconnect protocol flows end to end.

use server::network::{Server, ServerConfig};
use shared::{decode, Packet, PlayerColor, RosterEntry, DEFAULT_USERNAME};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Starts a server with test-friendly timings on an ephemeral port.
async fn start_server() -> SocketAddr {
    let config = ServerConfig {
        tick_interval: Duration::from_millis(10),
        join_grace: Duration::from_millis(50),
    };
    let server = Server::new("127.0.0.1:0", config)
        .await
        .expect("failed to bind test server");
    let addr = server.local_addr().expect("failed to read bound address");
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("failed to connect");
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    async fn send(&mut self, frame: &str) {
        self.writer
            .write_all(frame.as_bytes())
            .await
            .expect("failed to send frame");
        self.writer
            .write_all(b"\n")
            .await
            .expect("failed to send terminator");
    }

    async fn read_frame(&mut self) -> String {
        let mut type_line = String::new();
        let n = timeout(READ_TIMEOUT, self.reader.read_line(&mut type_line))
            .await
            .expect("timed out waiting for a frame")
            .expect("failed to read type line");
        assert!(n > 0, "connection closed while waiting for a frame");

        let mut payload_line = String::new();
        timeout(READ_TIMEOUT, self.reader.read_line(&mut payload_line))
            .await
            .expect("timed out waiting for a payload line")
            .expect("failed to read payload line");

        format!(
            "{}\n{}",
            type_line.trim_end_matches(['\r', '\n']),
            payload_line.trim_end_matches(['\r', '\n'])
        )
    }

    async fn read_packet(&mut self) -> Packet {
        let frame = self.read_frame().await;
        decode(&frame).expect("received undecodable frame")
    }

    /// Asserts nothing arrives within the window.
    async fn expect_silence(&mut self, window: Duration) {
        let mut line = String::new();
        match timeout(window, self.reader.read_line(&mut line)).await {
            Err(_) => {}
            Ok(Ok(0)) => panic!("connection closed during silence window"),
            Ok(_) => panic!("unexpected frame data: {:?}", line),
        }
    }

    /// Consumes the greeting sequence, returning the assigned id and roster.
    async fn greet(&mut self) -> (u32, Vec<RosterEntry>) {
        let roster = match self.read_packet().await {
            Packet::Roster { entries } => entries,
            other => panic!("expected roster snapshot first, got {:?}", other),
        };
        let id = match self.read_packet().await {
            Packet::IdAssign { id } => id,
            other => panic!("expected id assignment, got {:?}", other),
        };
        (id, roster)
    }
}

/// Connects two clients, completing both greetings and the first client's
/// view of the second one's join announce so later broadcasts are ordered.
async fn connect_pair(addr: SocketAddr) -> (TestClient, u32, TestClient, u32) {
    let mut a = TestClient::connect(addr).await;
    let (id_a, _) = a.greet().await;

    let mut b = TestClient::connect(addr).await;
    let (id_b, _) = b.greet().await;

    match a.read_packet().await {
        Packet::Join { entry } => assert_eq!(entry.id, id_b),
        other => panic!("expected join announce, got {:?}", other),
    }

    (a, id_a, b, id_b)
}

mod greeting_tests {
    use super::*;

    /// The first client sees an empty world and becomes id 0.
    #[tokio::test]
    async fn first_client_gets_empty_roster_and_id_zero() {
        let addr = start_server().await;
        let mut client = TestClient::connect(addr).await;

        let (id, roster) = client.greet().await;
        assert_eq!(id, 0);
        assert!(roster.is_empty());
    }

    /// A second client sees the first in its roster; the first is told about
    /// the join.
    #[tokio::test]
    async fn second_client_sees_roster_and_first_sees_join() {
        let addr = start_server().await;

        let mut a = TestClient::connect(addr).await;
        let (id_a, _) = a.greet().await;

        let mut b = TestClient::connect(addr).await;
        let (id_b, roster) = b.greet().await;

        assert_eq!(id_a, 0);
        assert_eq!(id_b, 1);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, 0);
        assert_eq!(roster[0].username, DEFAULT_USERNAME);
        assert_eq!(roster[0].color, PlayerColor::Red);

        match a.read_packet().await {
            Packet::Join { entry } => {
                assert_eq!(entry.id, 1);
                assert_eq!(entry.username, DEFAULT_USERNAME);
            }
            other => panic!("expected join announce, got {:?}", other),
        }
    }
}

mod update_tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Position updates reach every other session tagged with the sender id,
    /// and the sender never hears its own echo.
    #[tokio::test]
    async fn position_update_fans_out_without_echo() {
        let addr = start_server().await;
        let (mut a, id_a, mut b, _id_b) = connect_pair(addr).await;

        a.send("2\n100 100 45.0").await;

        match b.read_packet().await {
            Packet::PositionUpdate { from, x, y, rot } => {
                assert_eq!(from, Some(id_a));
                assert_eq!((x, y), (100, 100));
                assert_approx_eq!(rot, 45.0);
            }
            other => panic!("expected position update, got {:?}", other),
        }

        a.expect_silence(Duration::from_millis(300)).await;
    }

    /// A malformed line is dropped without killing the sender's session or
    /// the processing loop.
    #[tokio::test]
    async fn malformed_line_is_dropped_and_session_survives() {
        let addr = start_server().await;
        let (mut a, id_a, mut b, _id_b) = connect_pair(addr).await;

        a.send("2\nabc def").await;
        a.send("2\n7 8 9").await;

        match b.read_packet().await {
            Packet::PositionUpdate { from, x, y, .. } => {
                assert_eq!(from, Some(id_a));
                assert_eq!((x, y), (7, 8));
            }
            other => panic!("expected the valid update only, got {:?}", other),
        }
    }

    /// Username changes are sanitized server-side before re-broadcast.
    #[tokio::test]
    async fn username_update_is_sanitized_and_broadcast() {
        let addr = start_server().await;
        let (mut a, id_a, mut b, _id_b) = connect_pair(addr).await;

        a.send("5\nne:a t").await;

        match b.read_packet().await {
            Packet::UsernameUpdate { from, username } => {
                assert_eq!(from, Some(id_a));
                assert_eq!(username, "ne_a_t");
            }
            other => panic!("expected username update, got {:?}", other),
        }
    }

    /// Out-of-palette color codes are coerced to the safe default.
    #[tokio::test]
    async fn out_of_range_color_is_coerced() {
        let addr = start_server().await;
        let (mut a, id_a, mut b, _id_b) = connect_pair(addr).await;

        a.send("6\n9").await;

        match b.read_packet().await {
            Packet::ColorUpdate { from, code } => {
                assert_eq!(from, Some(id_a));
                assert_eq!(code, PlayerColor::Red.code());
            }
            other => panic!("expected color update, got {:?}", other),
        }
    }

    /// Projectile fire is re-broadcast with a normalized rotation.
    #[tokio::test]
    async fn projectile_fire_fans_out_normalized() {
        let addr = start_server().await;
        let (mut a, id_a, mut b, _id_b) = connect_pair(addr).await;

        a.send("10\n725.0").await;

        match b.read_packet().await {
            Packet::ProjectileFire { from, rot } => {
                assert_eq!(from, Some(id_a));
                assert_approx_eq!(rot, 5.0);
            }
            other => panic!("expected projectile fire, got {:?}", other),
        }
    }
}

mod lifecycle_tests {
    use super::*;

    /// Departures produce a leave notice, and the freed id goes to the next
    /// connection once teardown has finished.
    #[tokio::test]
    async fn leave_notice_and_id_reuse() {
        let addr = start_server().await;
        let (a, id_a, mut b, id_b) = connect_pair(addr).await;
        assert_eq!(id_a, 0);
        assert_eq!(id_b, 1);

        drop(a);

        match b.read_packet().await {
            Packet::Leave { id } => assert_eq!(id, 0),
            other => panic!("expected leave notice, got {:?}", other),
        }

        // Give the reaper time to finish releasing the id.
        sleep(Duration::from_millis(100)).await;

        let mut c = TestClient::connect(addr).await;
        let (id_c, roster) = c.greet().await;
        assert_eq!(id_c, 0);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, 1);
    }

    /// The end-to-end narrative: connect, observe, update, disconnect.
    #[tokio::test]
    async fn full_connect_update_disconnect_scenario() {
        let addr = start_server().await;

        // Client A connects to an empty world.
        let mut a = TestClient::connect(addr).await;
        let (id_a, roster_a) = a.greet().await;
        assert_eq!(id_a, 0);
        assert!(roster_a.is_empty());

        // Client B connects and sees A; A is told about B.
        let mut b = TestClient::connect(addr).await;
        let (id_b, roster_b) = b.greet().await;
        assert_eq!(id_b, 1);
        assert_eq!(roster_b.len(), 1);
        assert_eq!(roster_b[0].id, 0);
        match a.read_packet().await {
            Packet::Join { entry } => assert_eq!(entry.id, 1),
            other => panic!("expected join announce, got {:?}", other),
        }

        // A moves; B sees the tagged update.
        a.send("2\n100 100 45.0").await;
        match b.read_packet().await {
            Packet::PositionUpdate { from, x, y, .. } => {
                assert_eq!(from, Some(0));
                assert_eq!((x, y), (100, 100));
            }
            other => panic!("expected position update, got {:?}", other),
        }

        // A leaves; B is notified and the next connection is id 0 again.
        drop(a);
        match b.read_packet().await {
            Packet::Leave { id } => assert_eq!(id, 0),
            other => panic!("expected leave notice, got {:?}", other),
        }
        sleep(Duration::from_millis(100)).await;

        let mut c = TestClient::connect(addr).await;
        let (id_c, _) = c.greet().await;
        assert_eq!(id_c, 0);
    }
}
