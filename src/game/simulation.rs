//! Authoritative tick loop

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::config::{EndNotice, GameConfig};
use crate::util::time::{sanitize_delta, tick_delta, tick_duration, unix_millis};
use crate::ws::protocol::ServerMsg;

use super::collision::{Body, CollisionDetector, Hit};
use super::router::{EventRouter, Routed};
use super::snapshot::{Broadcaster, SnapshotBuilder};
use super::world::World;
use super::PlayerInput;

/// Queued inputs the simulation accepts before senders have to wait
pub const INPUT_QUEUE_CAPACITY: usize = 256;

/// Handle used by connections to feed the simulation
#[derive(Clone)]
pub struct SimulationHandle {
    input_tx: mpsc::Sender<PlayerInput>,
}

impl SimulationHandle {
    /// Queue an input for the next tick. Fails once the simulation has stopped.
    pub async fn submit(&self, input: PlayerInput) -> Result<(), SimulationStopped> {
        self.input_tx.send(input).await.map_err(|_| SimulationStopped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("simulation is no longer running")]
pub struct SimulationStopped;

/// What happened during one step
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub fired: usize,
    pub culled: usize,
    pub blocked: usize,
    pub hits: Vec<Hit>,
}

/// The single owner of simulated time
pub struct Simulation {
    world: Arc<World>,
    broadcaster: Arc<Broadcaster>,
    rules: GameConfig,
    input_rx: mpsc::Receiver<PlayerInput>,
    snapshot_builder: SnapshotBuilder,
    tick: u64,
}

impl Simulation {
    pub fn new(
        world: Arc<World>,
        broadcaster: Arc<Broadcaster>,
        rules: GameConfig,
    ) -> (Self, SimulationHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);

        let simulation = Self {
            world,
            broadcaster,
            rules,
            input_rx,
            snapshot_builder: SnapshotBuilder::new(),
            tick: 0,
        };

        (simulation, SimulationHandle { input_tx })
    }

    /// Run the authoritative tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(tick_ms = tick_duration().as_millis() as u64, "Simulation started");

        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            // Drain input queue
            if !self.process_inputs() {
                break;
            }

            self.step(tick_delta());
            self.broadcast();
        }

        info!(ticks = self.tick, "Simulation stopped");
    }

    /// Apply every queued input. Returns false once no handle is left.
    pub fn process_inputs(&mut self) -> bool {
        loop {
            match self.input_rx.try_recv() {
                Ok(input) => self.apply_input(input),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn apply_input(&self, input: PlayerInput) {
        let PlayerInput {
            player_id,
            event,
            received_at,
        } = input;
        trace!(
            player_id = %player_id,
            queued_ms = unix_millis().saturating_sub(received_at),
            "Applying input"
        );

        let needs_config = self.world.with_player_mut(&player_id, |player| {
            match EventRouter::route(player, event) {
                Routed::Login if !player.config_sent => {
                    player.config_sent = true;
                    true
                }
                _ => false,
            }
        });

        match needs_config {
            Some(true) => {
                let bounds = self.world.bounds();
                self.broadcaster.deliver(
                    &player_id,
                    ServerMsg::Config {
                        game_width: bounds.width as u32,
                        game_height: bounds.height as u32,
                    },
                );
            }
            Some(false) => {}
            None => {
                debug!(player_id = %player_id, "Dropped input for unregistered player");
            }
        }
    }

    /// Run a single simulation step of `dt` seconds
    pub fn step(&mut self, dt: f32) -> TickReport {
        let dt = sanitize_delta(dt);
        self.tick += 1;

        let mut report = TickReport {
            fired: self.update_players(dt),
            ..Default::default()
        };
        report.culled = self.update_projectiles(dt);
        report.blocked = self.resolve_player_collisions();
        report.hits = self.resolve_projectile_hits();

        self.notify_deaths(&report.hits);

        if report.fired > 0 || report.culled > 0 || !report.hits.is_empty() {
            trace!(
                tick = self.tick,
                fired = report.fired,
                culled = report.culled,
                hits = report.hits.len(),
                "Tick"
            );
        }

        report
    }

    /// Integrate every player and register the shots they fire
    fn update_players(&self, dt: f32) -> usize {
        let bounds = *self.world.bounds();
        let mut fired = Vec::new();

        self.world.for_each_player_mut(|player| {
            if let Some(projectile) = player.update(dt, &bounds) {
                fired.push(projectile);
            }
        });

        let count = fired.len();
        for projectile in fired {
            self.world.add_projectile(projectile);
        }
        count
    }

    /// Advance projectiles, dropping the ones that left the world
    fn update_projectiles(&self, dt: f32) -> usize {
        let bounds = *self.world.bounds();
        let mut expired: Vec<Uuid> = Vec::new();

        self.world.for_each_projectile_mut(|projectile| {
            if !projectile.advance(dt, &bounds) {
                expired.push(projectile.id);
            }
        });

        for id in &expired {
            self.world.remove_projectile(id);
        }
        expired.len()
    }

    fn alive_bodies(&self) -> Vec<Body> {
        self.world
            .players()
            .iter()
            .filter(|p| p.alive)
            .map(Body::from)
            .collect()
    }

    /// Roll back every alive player that ended up inside another
    fn resolve_player_collisions(&self) -> usize {
        let blocked = CollisionDetector::blocked_players(&self.alive_bodies());

        for id in &blocked {
            self.world.with_player_mut(id, |player| player.roll_back());
        }
        blocked.len()
    }

    fn resolve_projectile_hits(&self) -> Vec<Hit> {
        let hits = CollisionDetector::projectile_hits(
            &self.world.projectiles(),
            &self.alive_bodies(),
            self.rules.self_damage,
        );

        for hit in &hits {
            self.world.remove_projectile(&hit.projectile_id);
            self.world.with_player_mut(&hit.victim_id, |player| player.kill());

            info!(
                shooter_id = %hit.shooter_id,
                victim_id = %hit.victim_id,
                "Player shot down"
            );
        }

        hits
    }

    fn notify_deaths(&self, hits: &[Hit]) {
        for hit in hits {
            let victim = self
                .world
                .player(&hit.victim_id)
                .map(|p| p.name)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| hit.victim_id.to_string());

            match self.rules.end_notice {
                EndNotice::Victim => self.broadcaster.deliver(
                    &hit.victim_id,
                    ServerMsg::End {
                        data: "You were eliminated".to_string(),
                    },
                ),
                EndNotice::Shooter => self.broadcaster.deliver(
                    &hit.shooter_id,
                    ServerMsg::End {
                        data: format!("You eliminated {}", victim),
                    },
                ),
                EndNotice::All => self.broadcaster.deliver_all(&ServerMsg::End {
                    data: format!("{} was eliminated", victim),
                }),
            }
        }
    }

    /// Push each connected player its view of the world
    pub fn broadcast(&mut self) {
        let frame = self.snapshot_builder.build(&self.world);
        self.broadcaster.broadcast_frame(&frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldBounds;
    use crate::game::combat::{Projectile, WeaponStats};
    use crate::game::physics::Position;
    use crate::game::player::Player;
    use crate::ws::protocol::{ClientEvent, Key};
    use assert_approx_eq::assert_approx_eq;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        world: Arc<World>,
        broadcaster: Arc<Broadcaster>,
        simulation: Simulation,
        handle: SimulationHandle,
    }

    fn harness(rules: GameConfig) -> Harness {
        let world = Arc::new(World::with_seed(WorldBounds::default(), 9));
        let broadcaster = Arc::new(Broadcaster::new());
        let (simulation, handle) = Simulation::new(world.clone(), broadcaster.clone(), rules);
        Harness {
            world,
            broadcaster,
            simulation,
            handle,
        }
    }

    fn add_player(world: &World, x: f32, y: f32) -> Uuid {
        let player = Player::new("", Position::new(x, y), 0.0);
        let id = player.id;
        world.add_player(player);
        id
    }

    fn input(player_id: Uuid, event: ClientEvent) -> PlayerInput {
        PlayerInput {
            player_id,
            event,
            received_at: unix_millis(),
        }
    }

    fn shot(owner: Uuid, x: f32, y: f32) -> Projectile {
        Projectile::new(owner, Position::new(x, y), 0.0, &WeaponStats::default())
    }

    #[tokio::test]
    async fn test_inputs_reach_player() {
        let mut h = harness(GameConfig::default());
        let id = add_player(&h.world, 100.0, 100.0);

        assert_ok!(h.handle.submit(input(id, ClientEvent::KeyDown(Key::Forward))).await);
        assert!(h.simulation.process_inputs());
        h.simulation.step(0.1);

        let player = h.world.player(&id).unwrap();
        assert!(player.keys.forward);
        assert_approx_eq!(player.position.x, 125.0, 1e-4);
        assert_approx_eq!(player.position.y, 100.0, 1e-4);
    }

    #[tokio::test]
    async fn test_config_sent_once_per_player() {
        let mut h = harness(GameConfig::default());
        let id = add_player(&h.world, 100.0, 100.0);
        let mut rx = h.broadcaster.register(id);

        assert_ok!(h.handle.submit(input(id, ClientEvent::Login("ada".into()))).await);
        assert_ok!(h.handle.submit(input(id, ClientEvent::Login("ada2".into()))).await);
        h.simulation.process_inputs();

        assert_eq!(
            rx.try_recv().ok(),
            Some(ServerMsg::Config {
                game_width: 1280,
                game_height: 720
            })
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(h.world.player(&id).unwrap().name, "ada2");
    }

    #[tokio::test]
    async fn test_input_for_removed_player_is_dropped() {
        let mut h = harness(GameConfig::default());
        let id = add_player(&h.world, 100.0, 100.0);
        h.world.remove_player(&id);

        assert_ok!(h.handle.submit(input(id, ClientEvent::KeyDown(Key::Left))).await);

        assert!(h.simulation.process_inputs());
        assert_eq!(h.world.player_count(), 0);
    }

    #[test]
    fn test_process_inputs_reports_shutdown() {
        let Harness {
            mut simulation,
            handle,
            ..
        } = harness(GameConfig::default());
        drop(handle);
        assert!(!simulation.process_inputs());
    }

    #[test]
    fn test_submit_after_stop_fails() {
        let Harness {
            simulation, handle, ..
        } = harness(GameConfig::default());
        drop(simulation);

        let stray = input(Uuid::new_v4(), ClientEvent::KeyUp(Key::Space));
        let result = tokio_test::block_on(handle.submit(stray));
        assert_eq!(assert_err!(result), SimulationStopped);
    }

    #[test]
    fn test_fired_projectile_is_registered() {
        let mut h = harness(GameConfig::default());
        let id = add_player(&h.world, 300.0, 300.0);
        h.world.with_player_mut(&id, |p| p.keys.fire = true);

        let report = h.simulation.step(0.016);
        assert_eq!(report.fired, 1);
        assert_eq!(h.world.projectile_count(), 1);

        // cooldown holds the next shot back
        let report = h.simulation.step(0.016);
        assert_eq!(report.fired, 0);
        assert_eq!(h.world.projectile_count(), 1);
    }

    #[test]
    fn test_projectile_advance_over_half_second() {
        let mut h = harness(GameConfig::default());
        let projectile = shot(Uuid::new_v4(), 100.0, 200.0);
        let id = projectile.id;
        h.world.add_projectile(projectile);

        h.simulation.step(0.5);

        let moved = h.world.projectiles().into_iter().find(|p| p.id == id).unwrap();
        assert_approx_eq!(moved.position.x, 250.0, 1e-3);
        assert_approx_eq!(moved.position.y, 200.0, 1e-3);
    }

    #[test]
    fn test_projectile_culled_and_absent_from_snapshot() {
        let mut h = harness(GameConfig::default());
        let viewer = add_player(&h.world, 100.0, 100.0);
        let mut rx = h.broadcaster.register(viewer);
        h.world.add_projectile(shot(Uuid::new_v4(), 1278.0, 500.0));

        let report = h.simulation.step(0.016);
        h.simulation.broadcast();

        assert_eq!(report.culled, 1);
        assert_eq!(h.world.projectile_count(), 0);
        match rx.try_recv() {
            Ok(ServerMsg::Update { bullets, .. }) => assert!(bullets.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_blocking_collision_rolls_back_exactly() {
        let mut h = harness(GameConfig::default());
        let mover = add_player(&h.world, 100.0, 100.0);
        let wall = add_player(&h.world, 160.0, 100.0);
        h.world.with_player_mut(&mover, |p| p.keys.forward = true);

        let report = h.simulation.step(0.1);

        assert_eq!(report.blocked, 2);
        assert_eq!(h.world.player(&mover).unwrap().position, Position::new(100.0, 100.0));
        assert_eq!(h.world.player(&wall).unwrap().position, Position::new(160.0, 100.0));
    }

    #[test]
    fn test_players_spawned_overlapping_can_separate() {
        let mut h = harness(GameConfig::default());
        let bot = add_player(&h.world, 250.0, 250.0);
        let driver = add_player(&h.world, 270.0, 250.0);
        h.world.with_player_mut(&driver, |p| p.keys.forward = true);

        for _ in 0..120 {
            h.simulation.step(0.016);
        }

        let driver = h.world.player(&driver).unwrap();
        assert!(driver.position.x > 700.0);
        assert_eq!(h.world.player(&bot).unwrap().position, Position::new(250.0, 250.0));
    }

    #[test]
    fn test_dead_players_do_not_block() {
        let mut h = harness(GameConfig::default());
        let mover = add_player(&h.world, 100.0, 100.0);
        let corpse = add_player(&h.world, 160.0, 100.0);
        h.world.with_player_mut(&corpse, |p| p.kill());
        h.world.with_player_mut(&mover, |p| p.keys.forward = true);

        let report = h.simulation.step(0.1);

        assert_eq!(report.blocked, 0);
        assert_approx_eq!(h.world.player(&mover).unwrap().position.x, 125.0, 1e-4);
    }

    #[test]
    fn test_projectile_hit_kills_in_same_tick() {
        let mut h = harness(GameConfig::default());
        let shooter = add_player(&h.world, 800.0, 500.0);
        let victim = add_player(&h.world, 300.0, 300.0);
        let projectile = shot(shooter, 292.0, 325.0);
        let projectile_id = projectile.id;
        h.world.add_projectile(projectile);

        let report = h.simulation.step(0.016);

        assert_eq!(
            report.hits,
            vec![Hit {
                projectile_id,
                shooter_id: shooter,
                victim_id: victim,
            }]
        );
        assert_eq!(h.world.projectile_count(), 0);
        let victim_state = h.world.player(&victim).expect("dead players stay registered");
        assert!(!victim_state.alive);
        assert!(h.world.player(&shooter).unwrap().alive);

        // frozen afterwards
        h.world.with_player_mut(&victim, |p| p.keys.forward = true);
        h.simulation.step(0.1);
        assert_eq!(h.world.player(&victim).unwrap().position, Position::new(300.0, 300.0));
    }

    #[test]
    fn test_projectile_passes_dead_player() {
        let mut h = harness(GameConfig::default());
        let corpse = add_player(&h.world, 300.0, 300.0);
        h.world.with_player_mut(&corpse, |p| p.kill());
        h.world.add_projectile(shot(Uuid::new_v4(), 310.0, 325.0));

        let report = h.simulation.step(0.016);

        assert!(report.hits.is_empty());
        assert_eq!(h.world.projectile_count(), 1);
    }

    #[test]
    fn test_self_damage_enabled() {
        let mut h = harness(GameConfig {
            self_damage: true,
            ..Default::default()
        });
        let id = add_player(&h.world, 300.0, 300.0);
        h.world.add_projectile(shot(id, 310.0, 325.0));

        let report = h.simulation.step(0.016);

        assert_eq!(report.hits.len(), 1);
        assert!(!h.world.player(&id).unwrap().alive);
    }

    #[test]
    fn test_self_damage_disabled() {
        let mut h = harness(GameConfig {
            self_damage: false,
            ..Default::default()
        });
        let id = add_player(&h.world, 300.0, 300.0);
        h.world.add_projectile(shot(id, 310.0, 325.0));

        let report = h.simulation.step(0.016);

        assert!(report.hits.is_empty());
        assert!(h.world.player(&id).unwrap().alive);
        assert_eq!(h.world.projectile_count(), 1);
    }

    fn end_notice_run(policy: EndNotice) -> (Option<ServerMsg>, Option<ServerMsg>, Option<ServerMsg>) {
        let mut h = harness(GameConfig {
            end_notice: policy,
            ..Default::default()
        });
        let shooter = add_player(&h.world, 800.0, 500.0);
        let victim = add_player(&h.world, 300.0, 300.0);
        let bystander = add_player(&h.world, 1000.0, 100.0);
        h.world.with_player_mut(&victim, |p| p.name = "ada".into());
        let mut shooter_rx = h.broadcaster.register(shooter);
        let mut victim_rx = h.broadcaster.register(victim);
        let mut bystander_rx = h.broadcaster.register(bystander);
        h.world.add_projectile(shot(shooter, 292.0, 325.0));

        h.simulation.step(0.016);

        (
            shooter_rx.try_recv().ok(),
            victim_rx.try_recv().ok(),
            bystander_rx.try_recv().ok(),
        )
    }

    #[test]
    fn test_end_notice_victim() {
        let (shooter, victim, bystander) = end_notice_run(EndNotice::Victim);
        assert_eq!(shooter, None);
        assert_eq!(
            victim,
            Some(ServerMsg::End {
                data: "You were eliminated".into()
            })
        );
        assert_eq!(bystander, None);
    }

    #[test]
    fn test_end_notice_shooter() {
        let (shooter, victim, bystander) = end_notice_run(EndNotice::Shooter);
        assert_eq!(
            shooter,
            Some(ServerMsg::End {
                data: "You eliminated ada".into()
            })
        );
        assert_eq!(victim, None);
        assert_eq!(bystander, None);
    }

    #[test]
    fn test_end_notice_all() {
        let (shooter, victim, bystander) = end_notice_run(EndNotice::All);
        let expected = Some(ServerMsg::End {
            data: "ada was eliminated".into(),
        });
        assert_eq!(shooter, expected);
        assert_eq!(victim, expected);
        assert_eq!(bystander, expected);
    }

    #[test]
    fn test_snapshot_lists_other_players() {
        let mut h = harness(GameConfig::default());
        let a = add_player(&h.world, 100.0, 100.0);
        let b = add_player(&h.world, 400.0, 100.0);
        let c = add_player(&h.world, 700.0, 100.0);
        let mut rx = h.broadcaster.register(a);

        h.world.remove_player(&c);
        h.simulation.broadcast();

        match rx.try_recv() {
            Ok(ServerMsg::Update { player, other_players, .. }) => {
                assert_eq!(player.id, a);
                let ids: Vec<Uuid> = other_players.iter().map(|p| p.id).collect();
                assert_eq!(ids, vec![b]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_loop_pushes_updates() {
        let world = Arc::new(World::with_seed(WorldBounds::default(), 1));
        let broadcaster = Arc::new(Broadcaster::new());
        let (simulation, handle) =
            Simulation::new(world.clone(), broadcaster.clone(), GameConfig::default());
        let id = world.spawn_player("ada");
        let mut rx = broadcaster.register(id);

        let task = tokio::spawn(simulation.run());

        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("an update within two seconds");
        assert!(matches!(msg, Some(ServerMsg::Update { .. })));

        drop(handle);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop stops once handles are gone")
            .unwrap();
    }
}
