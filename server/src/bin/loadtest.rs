//! Load test for the arcade server.
//!
//! Spawns multiple fake WebSocket clients that:
//! - Connect and start a session
//! - Hold random inputs, changing them a few times per second
//! - Count session_state messages and restart after each game over
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 50)
//!   --duration S     Test duration in seconds (default: 30)
//!   --input-rate R   Input changes per second per client (default: 4)
//!   --url URL        Server URL (default: ws://127.0.0.1:9001/ws)

use arcade_shared::protocol::{ClientMsg, Phase, ServerMsg};
use futures_util::{SinkExt, StreamExt};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    sessions_started: AtomicU64,
    session_states: AtomicU64,
    game_overs: AtomicU64,
    commits: AtomicU64,
    rejected: AtomicU64,
    inputs_sent: AtomicU64,
    errors: AtomicU64,
}

fn to_text(msg: &ClientMsg) -> Option<Message> {
    serde_json::to_string(msg)
        .ok()
        .map(|json| Message::Text(json.into()))
}

async fn run_client(
    client_id: u32,
    url: String,
    input_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let start = ClientMsg::Start {
        user_id: client_id + 1,
        width: None,
        height: None,
    };
    let Some(start_frame) = to_text(&start) else {
        return;
    };
    if ws.send(start_frame.clone()).await.is_err() {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        metrics.connected.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(client_id as u64);
    let mut input_timer =
        tokio::time::interval(Duration::from_secs_f64(1.0 / input_rate.max(0.01)));
    input_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last_phase = Phase::Menu;
    let test_end = Instant::now() + duration;

    while Instant::now() < test_end {
        tokio::select! {
            _ = input_timer.tick() => {
                let input = ClientMsg::Input {
                    turn_left: rng.gen_bool(0.3),
                    turn_right: rng.gen_bool(0.3),
                    thrust: rng.gen_bool(0.5),
                    fire: rng.gen_bool(0.7),
                };
                let Some(frame) = to_text(&input) else { continue };
                if ws.send(frame).await.is_err() {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                metrics.inputs_sent.fetch_add(1, Ordering::Relaxed);
            }

            msg = ws.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(Ok(_)) => continue,
                };
                let Ok(server_msg) = serde_json::from_str::<ServerMsg>(&text) else {
                    continue;
                };
                match server_msg {
                    ServerMsg::SessionState(state) => {
                        metrics.session_states.fetch_add(1, Ordering::Relaxed);
                        if state.phase != last_phase {
                            match state.phase {
                                Phase::Playing if last_phase != Phase::Paused => {
                                    metrics.sessions_started.fetch_add(1, Ordering::Relaxed);
                                }
                                Phase::GameOver => {
                                    metrics.game_overs.fetch_add(1, Ordering::Relaxed);
                                    // Retry straight away
                                    if ws.send(start_frame.clone()).await.is_err() {
                                        break;
                                    }
                                }
                                _ => {}
                            }
                            last_phase = state.phase;
                        }
                    }
                    ServerMsg::ScoreCommitted(_) => {
                        metrics.commits.fetch_add(1, Ordering::Relaxed);
                    }
                    ServerMsg::StartRejected(_) => {
                        metrics.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

fn print_stats(label: &str, metrics: &Metrics) {
    println!(
        "[{}] connected={}, started={}, states={}, game_overs={}, commits={}, rejected={}, inputs={}, errors={}",
        label,
        metrics.connected.load(Ordering::Relaxed),
        metrics.sessions_started.load(Ordering::Relaxed),
        metrics.session_states.load(Ordering::Relaxed),
        metrics.game_overs.load(Ordering::Relaxed),
        metrics.commits.load(Ordering::Relaxed),
        metrics.rejected.load(Ordering::Relaxed),
        metrics.inputs_sent.load(Ordering::Relaxed),
        metrics.errors.load(Ordering::Relaxed),
    );
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 50;
    let mut duration_secs: u64 = 30;
    let mut input_rate: f64 = 4.0;
    let mut url = "ws://127.0.0.1:9001/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(50);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--input-rate" => {
                i += 1;
                input_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(4.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Arcade Server Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Input rate: {}/s per client", input_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);
    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(run_client(
            client_id, url, input_rate, duration, metrics,
        )));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    let stats_metrics = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();
        loop {
            interval.tick().await;
            print_stats(&format!("{:3}s", start.elapsed().as_secs()), &stats_metrics);
        }
    });

    for handle in handles {
        let _ = handle.await;
    }
    stats_handle.abort();

    println!();
    print_stats("final", &metrics);
    let states = metrics.session_states.load(Ordering::Relaxed);
    println!(
        "Session states per client per second: {:.1}",
        states as f64 / num_clients.max(1) as f64 / duration_secs.max(1) as f64
    );
}
