//! Performance benchmarks for critical server systems

use client::network::Connection;
use server::config::ServerConfig;
use server::dispatch::Dispatcher;
use server::network::Server;
use server::state::ServerState;
use server::world::{BlockHit, World};
use shared::{decode, encode, BlockKind, MapLayout, MapSize, Packet, INDESTRUCTIBLE_HARDNESS};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc;

/// Benchmarks encoding and decoding of a busy lobby's traffic
#[test]
fn benchmark_codec() {
    let packets = vec![
        Packet::PositionUpdate {
            player_id: 3,
            x: 120.5,
            y: -33.25,
            rotation_y: 270.0,
        },
        Packet::VelocityUpdate {
            player_id: 3,
            current_x: 12.0,
            current_y: -4.5,
            goal_x: 15.0,
            goal_y: 0.0,
        },
        Packet::BlockDamage {
            grid_x: 14,
            grid_y: 40,
            damage: 8.0,
        },
    ];

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        for packet in &packets {
            let bytes = encode(packet).unwrap();
            let decoded = decode(&bytes).unwrap();
            assert_eq!(&decoded, packet);
        }
    }

    let duration = start.elapsed();
    println!(
        "Codec: {} packets in {:?} ({:.2} μs/packet)",
        iterations * packets.len(),
        duration,
        duration.as_micros() as f64 / (iterations * packets.len()) as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks map layout generation for the largest size
#[test]
fn benchmark_map_generation() {
    let iterations = 50;
    let start = Instant::now();

    for seed in 0..iterations {
        let layout = MapLayout::generate(MapSize::Large, seed);
        assert_eq!(layout.kind_at(0, 0), Some(BlockKind::Grass));
    }

    let duration = start.elapsed();
    println!(
        "Map generation: {} large maps in {:?} ({:.2} ms/map)",
        iterations,
        duration,
        duration.as_millis() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 3000);
}

/// Eight threads dig through the whole grid at once; every breakable block
/// must be destroyed exactly once
#[test]
fn benchmark_concurrent_block_damage() {
    let layout = MapLayout::generate(MapSize::Small, 77);
    let breakable = layout
        .cells()
        .filter(|(_, _, kind)| kind.is_solid() && kind.base_hardness() < INDESTRUCTIBLE_HARDNESS)
        .count();

    let world = Arc::new(World::from_layout(&layout));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let (width, height) = (layout.width as i32, layout.height as i32);

    let start = Instant::now();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let world = Arc::clone(&world);
            let destroyed = Arc::clone(&destroyed);
            thread::spawn(move || {
                // 8 rounds of 4 damage break even the hardest blocks (30).
                for _ in 0..8 {
                    for y in 0..height {
                        for x in 0..width {
                            if let Ok(BlockHit::Destroyed { .. }) = world.damage_block(x, y, 4.0) {
                                destroyed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    let duration = start.elapsed();

    println!(
        "Concurrent damage: {} blocks destroyed by 8 threads in {:?}",
        breakable, duration
    );

    assert_eq!(destroyed.load(Ordering::Relaxed), breakable);
    let obsidian = layout
        .cells()
        .filter(|(_, _, kind)| *kind == BlockKind::Obsidian)
        .count();
    assert_eq!(world.solid_blocks(), obsidian);
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks dispatching movement reports inside a lobby
#[test]
fn benchmark_dispatch_movement() {
    let dispatcher = Dispatcher::new(Arc::new(ServerState::new(ServerConfig {
        rng_seed: Some(1),
        ..ServerConfig::default()
    })));
    let registry = &dispatcher.state().registry;
    let addr = "127.0.0.1:9000".parse().unwrap();

    let mut receivers = Vec::new();
    let mut conns = Vec::new();
    for i in 0..4 {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = registry.register(addr, tx);
        receivers.push(rx);
        conns.push(conn);

        let out = dispatcher.handle_packet(
            conn,
            Packet::Login {
                username: format!("Player{}", i),
            },
        );
        dispatcher.deliver(conn, out);
        let lobby = if i == 0 {
            Packet::CreateLobby {
                name: "Bench".to_string(),
                size: MapSize::Medium,
            }
        } else {
            Packet::JoinLobby {
                name: "Bench".to_string(),
            }
        };
        let out = dispatcher.handle_packet(conn, lobby);
        dispatcher.deliver(conn, out);
    }

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let conn = conns[i % conns.len()];
        let out = dispatcher.handle_packet(
            conn,
            Packet::PositionSync {
                x: (i % 300) as f32,
                y: -((i % 400) as f32),
                rotation_y: (i % 360) as f32,
            },
        );
        dispatcher.deliver(conn, out);
    }

    let duration = start.elapsed();
    println!(
        "Dispatch: {} position reports in {:?} ({:.2} μs/report)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Each report reaches the three other members.
    let relayed: usize = receivers
        .iter_mut()
        .map(|rx| {
            let mut count = 0;
            while let Ok(packet) = rx.try_recv() {
                if matches!(packet, Packet::PositionUpdate { .. }) {
                    count += 1;
                }
            }
            count
        })
        .sum();
    assert_eq!(relayed, iterations * 3);
    assert!(duration.as_millis() < 3000);
}

/// Benchmarks request/reply round trips over a real socket
#[test]
fn benchmark_tcp_round_trips() {
    tokio_test::block_on(async {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::bind(Arc::new(ServerState::new(config))).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let mut conn = Connection::connect(&addr.to_string()).await.unwrap();
        conn.send(&Packet::Login {
            username: "Bench".to_string(),
        })
        .await
        .unwrap();
        assert!(matches!(
            conn.recv().await.unwrap(),
            Packet::LoginSuccessful { .. }
        ));

        let iterations = 200;
        let start = Instant::now();
        for _ in 0..iterations {
            conn.send(&Packet::GetLobbies).await.unwrap();
            assert!(matches!(
                conn.recv().await.unwrap(),
                Packet::LobbyOverview { .. }
            ));
        }

        let duration = start.elapsed();
        println!(
            "TCP round trips: {} in {:?} ({:.2} μs/trip)",
            iterations,
            duration,
            duration.as_micros() as f64 / iterations as f64
        );
        assert!(duration.as_millis() < 5000);
    });
}
