use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, Level};

use mstp_link::network::{LinkDriver, SimulatedBus};
use mstp_link::util::init_tracing;
use mstp_link::{NodeConfig, Outbound};

#[tokio::main]
async fn main() -> mstp_link::Result<()> {
    init_tracing(Level::INFO)?;

    let bus = SimulatedBus::new();
    let stations = [3u8, 7, 12];
    let mut handles = Vec::new();
    let mut inboxes = Vec::new();

    for &station in &stations {
        let config = NodeConfig {
            station,
            max_master: 15,
            max_info_frames: 2,
            ..NodeConfig::for_station(station)
        };
        let (tx, rx) = mpsc::channel(16);
        let (driver, handle) = LinkDriver::new(config, bus.attach(), tx)?;
        tokio::spawn(async move {
            if let Err(e) = driver.run().await {
                eprintln!("station {} stopped: {}", station, e);
            }
        });
        handles.push(handle);
        inboxes.push(rx);
    }

    println!("Ring of stations {:?} on a simulated segment", stations);
    println!("Waiting for the token to form...");
    sleep(Duration::from_secs(2)).await;

    // Station 12 answers every request it receives
    let responder = handles[2].clone();
    let mut requests = inboxes.remove(2);
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            if request.expects_reply {
                let mut answer = b"echo: ".to_vec();
                answer.extend_from_slice(&request.payload);
                if let Err(e) = responder.reply(answer).await {
                    eprintln!("reply failed: {}", e);
                }
            }
        }
    });

    handles[0]
        .send(Outbound::new(Bytes::from_static(b"read property"), 12, true))
        .await?;
    handles[1]
        .send(Outbound::new(Bytes::from_static(b"who-is"), 255, false))
        .await?;

    for _ in 0..2 {
        if let Some(delivery) = inboxes[0].recv().await {
            info!(
                source = delivery.source,
                payload = %String::from_utf8_lossy(&delivery.payload),
                "station 3 received"
            );
        }
    }

    sleep(Duration::from_millis(500)).await;
    for handle in &handles {
        let status = handle.status().await?;
        match serde_json::to_string_pretty(&status) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("status encoding failed: {}", e),
        }
    }

    Ok(())
}
