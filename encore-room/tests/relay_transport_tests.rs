//! Room clients talking through a live relay over HTTP

use encore_common::config::{RoomSettings, TomlConfig};
use encore_common::events::{GamePhase, Instrument, Player, Role};
use encore_room::{PhaseDriver, RelayTransport, RoomClient};
use encore_relay::{create_router, AppContext};
use std::time::Duration;

async fn start_relay() -> (String, AppContext) {
    let ctx = AppContext::from_config(&TomlConfig::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(ctx.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), ctx)
}

fn player(id: &str, role: Role, instrument: Option<Instrument>) -> Player {
    Player {
        id: id.into(),
        name: id.to_uppercase(),
        role,
        instrument,
    }
}

/// Feed `client` events until `done` holds on its mirror
async fn wait_until<F>(client: &mut RoomClient, mut done: F)
where
    F: FnMut(&RoomClient) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(client) {
            if client.next_event().await.is_none() {
                panic!("channel closed while waiting");
            }
        }
    })
    .await
    .expect("timed out waiting for relay traffic");
}

#[tokio::test]
async fn test_game_update_travels_through_relay() {
    let (url, ctx) = start_relay().await;
    let relay = RelayTransport::new(&url, 64).unwrap();

    let mut band = RoomClient::join(
        &relay,
        "AB12CD",
        player("b", Role::Band, Some(Instrument::Guitar)),
        RoomSettings::default(),
    )
    .await;
    assert!(band.is_connected());

    let mut singer =
        RoomClient::join(&relay, "AB12CD", player("s", Role::Singer, None), RoomSettings::default())
            .await;
    wait_until(&mut band, |c| c.mirror().driver_id() == Some("s")).await;
    assert_eq!(ctx.state.subscriber_count("AB12CD").await, 2);

    // Singer learns about the band from the roster reply
    wait_until(&mut singer, |c| c.mirror().player("b").is_some()).await;

    let mut driver = PhaseDriver::new(3_000);
    singer.send_game_update(driver.select_song("aogeba").unwrap()).unwrap();
    wait_until(&mut band, |c| c.mirror().game_state().phase == GamePhase::Ready).await;
    assert_eq!(
        band.mirror().game_state().current_song_id.as_deref(),
        Some("aogeba")
    );

    let ids: Vec<String> = ctx
        .state
        .players("AB12CD")
        .await
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec!["b", "s"]);
}

#[tokio::test]
async fn test_dropped_client_leaves_through_relay() {
    let (url, _ctx) = start_relay().await;
    let relay = RelayTransport::new(&url, 64).unwrap();

    let mut singer =
        RoomClient::join(&relay, "R", player("s", Role::Singer, None), RoomSettings::default()).await;
    let band = RoomClient::join(&relay, "R", player("b", Role::Band, None), RoomSettings::default())
        .await;
    wait_until(&mut singer, |c| c.mirror().player("b").is_some()).await;

    drop(band);
    wait_until(&mut singer, |c| c.mirror().player("b").is_none()).await;
    assert_eq!(singer.mirror().player_count(), 1);
}

#[tokio::test]
async fn test_unreachable_relay_leaves_client_disconnected() {
    // Bind then drop so nothing listens on the port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let relay = RelayTransport::new(&format!("http://{}", addr), 64).unwrap();
    let client =
        RoomClient::join(&relay, "R", player("a", Role::Band, None), RoomSettings::default()).await;
    assert!(!client.is_connected());
}
