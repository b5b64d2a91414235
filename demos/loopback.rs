//! Hub, camera and viewer wired together in one process
//!
//! Run with: cargo run --example loopback [CODE]
//!
//! Examples:
//!   cargo run --example loopback             # hub picks a random code
//!   cargo run --example loopback AB12CD      # hub tries AB12CD first
//!
//! The camera publishes its front track, the viewer renders whatever the
//! hub relays, and after a few seconds the camera flips to its back track
//! and the hub rotates its code. Connections survive the rotation.

use std::time::Duration;

use tokio::sync::mpsc;

use viewcal::client::{DeviceDescriptor, DeviceSelector, NoCapture, StaticSource};
use viewcal::transport::MemoryNetwork;
use viewcal::{
    HubCommand, HubConfig, HubSession, PeerCommand, PeerConfig, PeerRole, PeerSession, RoleTag,
    SessionEvent, SessionIdentity,
};

fn print_event(who: &str, event: &SessionEvent) {
    match event {
        SessionEvent::IdentityChanged { code, endpoint } => {
            println!("[{}] code {} (dial {})", who, code, endpoint)
        }
        SessionEvent::PeerListChanged { peers } => {
            let list: Vec<String> = peers
                .iter()
                .map(|p| format!("{}={}", p.peer, p.role))
                .collect();
            println!("[{}] peers: {}", who, list.join(", "));
        }
        SessionEvent::LatencyUpdated { peer, latency } => {
            println!("[{}] latency to {}: {:?}", who, peer, latency)
        }
        SessionEvent::StreamAvailable { tag, origin, track } => println!(
            "[{}] showing {} from {:?} (track {})",
            who,
            tag,
            origin,
            track.id()
        ),
        SessionEvent::StreamEnded { tag } => println!("[{}] {} ended", who, tag),
        other => tracing::debug!(who = who, event = ?other, "Session event"),
    }
}

fn spawn_printer(who: &'static str, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(who, &event);
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let preferred = match std::env::args().nth(1) {
        Some(code) => Some(SessionIdentity::parse(&code)?),
        None => None,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("viewcal=debug".parse()?)
                .add_directive("loopback=debug".parse()?),
        )
        .init();

    let network = MemoryNetwork::new();

    // Hub
    let (hub_transport, hub_rx) = network.attach();
    let config = HubConfig::default().probe_interval(Duration::from_secs(1));
    let (mut hub, hub_events) = HubSession::new(config, hub_transport);
    let endpoint = hub.start(preferred).await?;
    spawn_printer("hub", hub_events);
    let (hub_commands, commands_rx) = mpsc::channel(16);
    let hub_task = tokio::spawn(hub.run(hub_rx, commands_rx));

    // Camera
    let source = StaticSource::new(vec![
        DeviceDescriptor::new("cam-front", "Front camera"),
        DeviceDescriptor::new("cam-back", "Back camera"),
    ]);
    let (cam_transport, cam_rx) = network.attach();
    let (mut camera, cam_events) =
        PeerSession::new(PeerConfig::producer("front"), cam_transport, source);
    spawn_printer("camera", cam_events);
    camera.acquire_media().await?;
    camera.connect(endpoint.identity.as_str())?;
    let (cam_commands, commands_rx) = mpsc::channel(16);
    let cam_task = tokio::spawn(camera.run(cam_rx, commands_rx));

    // Viewer
    let (viewer_transport, viewer_rx) = network.attach();
    let (mut viewer, viewer_events) =
        PeerSession::new(PeerConfig::subscriber(), viewer_transport, NoCapture);
    spawn_printer("viewer", viewer_events);
    viewer.connect(endpoint.name.as_str())?;
    let (viewer_commands, commands_rx) = mpsc::channel(16);
    let viewer_task = tokio::spawn(viewer.run(viewer_rx, commands_rx));

    tokio::time::sleep(Duration::from_secs(3)).await;

    println!("--- switching camera to back ---");
    cam_commands
        .send(PeerCommand::ApplyDevice(DeviceSelector::Id("cam-back".into())))
        .await?;
    cam_commands
        .send(PeerCommand::ChangeRole(PeerRole::Producer(RoleTag::back())))
        .await?;

    tokio::time::sleep(Duration::from_secs(3)).await;

    println!("--- rotating hub code ---");
    hub_commands.send(HubCommand::RotateIdentity).await?;

    tokio::time::sleep(Duration::from_secs(3)).await;

    cam_commands.send(PeerCommand::Shutdown).await?;
    viewer_commands.send(PeerCommand::Shutdown).await?;
    hub_commands.send(HubCommand::Shutdown).await?;
    cam_task.await?;
    viewer_task.await?;
    hub_task.await?;

    Ok(())
}
