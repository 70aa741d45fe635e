use shared::{decode, encode, Packet};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::time::sleep;

// Reads one two-line frame (type line, payload line) off the stream.
async fn read_frame(reader: &mut BufReader<OwnedReadHalf>) -> Option<String> {
    let mut type_line = String::new();
    if reader.read_line(&mut type_line).await.ok()? == 0 {
        return None;
    }
    let mut payload_line = String::new();
    if reader.read_line(&mut payload_line).await.ok()? == 0 {
        return None;
    }
    Some(format!(
        "{}\n{}",
        type_line.trim_end_matches(['\r', '\n']),
        payload_line.trim_end_matches(['\r', '\n'])
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let stream = TcpStream::connect("127.0.0.1:50000").await?;
    println!("Connected to {}", stream.peer_addr()?);

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    // The server greets with the roster snapshot, then the id assignment.
    match read_frame(&mut reader).await.as_deref().map(decode) {
        Some(Ok(Packet::Roster { entries })) => {
            println!("Roster snapshot with {} player(s):", entries.len());
            for entry in entries {
                println!(
                    "  {}: {} at ({}, {}), color {}",
                    entry.id,
                    entry.username,
                    entry.x,
                    entry.y,
                    entry.color.code()
                );
            }
        }
        other => println!("Expected roster but got: {:?}", other),
    }

    let my_id = match read_frame(&mut reader).await.as_deref().map(decode) {
        Some(Ok(Packet::IdAssign { id })) => {
            println!("Assigned id {}", id);
            id
        }
        other => {
            println!("Expected id assignment but got: {:?}", other);
            return Ok(());
        }
    };

    // Print whatever the server pushes from here on.
    tokio::spawn(async move {
        while let Some(frame) = read_frame(&mut reader).await {
            match decode(&frame) {
                Ok(packet) => println!("Received: {:?}", packet),
                Err(e) => println!("Undecodable frame ({}): {:?}", e, frame),
            }
        }
        println!("Server closed the connection");
    });

    let send = |packet: Packet| {
        let mut frame = encode(&packet);
        frame.push('\n');
        frame
    };

    // Introduce ourselves, then walk a small square while rotating.
    println!("Sending username and color");
    write_half
        .write_all(
            send(Packet::UsernameUpdate {
                from: None,
                username: format!("tester{}", my_id),
            })
            .as_bytes(),
        )
        .await?;
    write_half
        .write_all(send(Packet::ColorUpdate { from: None, code: 3 }).as_bytes())
        .await?;

    let waypoints = [(200, 200), (400, 200), (400, 400), (200, 400)];
    for (i, (x, y)) in waypoints.iter().enumerate() {
        let packet = Packet::PositionUpdate {
            from: None,
            x: *x,
            y: *y,
            rot: (i as f32) * 90.0,
        };
        println!("Sending position update: {:?}", packet);
        write_half.write_all(send(packet).as_bytes()).await?;
        sleep(Duration::from_millis(500)).await;
    }

    println!("Firing a projectile");
    write_half
        .write_all(send(Packet::ProjectileFire { from: None, rot: 45.0 }).as_bytes())
        .await?;

    // Linger briefly so broadcasts from other players show up, then let the
    // connection drop and the server reap us.
    sleep(Duration::from_secs(2)).await;
    println!("Test client finished");

    Ok(())
}
