//! Bounded-concurrency game dispatcher.
//!
//! The manager accepts game requests from the controller, keeps at most
//! `concurrency` games running on worker threads, queues the rest, and
//! pools idle engine processes so that sequential games with the same
//! builder reuse them instead of respawning.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;
use engine_interface::{ChessPlayer, PlayerBuilder, RestartMode};
use tracing::{trace, warn};

use crate::game::{ChessGame, GameOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartMode {
    /// Wait for a free slot.
    Enqueue,
    /// Start now even above the concurrency limit.
    StartImmediately,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReuseMode {
    ReusePlayers,
    NewPlayers,
}

/// Events sent to the controller thread.
pub enum TournamentEvent {
    GameStarted {
        number: usize,
    },
    GameFinished {
        number: usize,
        outcome: Box<GameOutcome>,
        /// The players, keyed by builder name, handed back for pooling.
        players: Vec<(String, Box<dyn ChessPlayer>)>,
    },
    GameStartFailed {
        number: usize,
        error: String,
    },
}

pub struct GameRequest {
    pub number: usize,
    pub game: ChessGame,
    pub white: Arc<dyn PlayerBuilder>,
    pub black: Arc<dyn PlayerBuilder>,
    pub mode: StartMode,
    pub reuse: ReuseMode,
}

pub struct GameManager {
    concurrency: usize,
    active: usize,
    queue: VecDeque<GameRequest>,
    idle: Vec<(String, Box<dyn ChessPlayer>)>,
    restart_modes: HashMap<String, RestartMode>,
    tx: Sender<TournamentEvent>,
    workers: Vec<JoinHandle<()>>,
}

impl GameManager {
    pub fn new(concurrency: usize, tx: Sender<TournamentEvent>) -> GameManager {
        GameManager {
            concurrency: concurrency.max(1),
            active: 0,
            queue: VecDeque::new(),
            idle: Vec::new(),
            restart_modes: HashMap::new(),
            tx,
            workers: Vec::new(),
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.active < self.concurrency && self.queue.is_empty()
    }

    pub fn active_games(&self) -> usize {
        self.active
    }

    /// Accepts a game; it starts now or when a slot frees up.
    pub fn new_game(&mut self, request: GameRequest) {
        if request.mode == StartMode::StartImmediately || self.active < self.concurrency {
            self.spawn(request);
        } else {
            trace!(game = request.number, "queued game");
            self.queue.push_back(request);
        }
    }

    fn obtain_player(
        &mut self,
        builder: &Arc<dyn PlayerBuilder>,
        reuse: ReuseMode,
    ) -> Result<Box<dyn ChessPlayer>> {
        if reuse == ReuseMode::ReusePlayers && builder.restart_mode() != RestartMode::Always {
            let name = builder.name();
            if let Some(pos) = self
                .idle
                .iter()
                .position(|(n, player)| *n == name && player.is_alive())
            {
                trace!(engine = %name, "reusing idle engine");
                return Ok(self.idle.remove(pos).1);
            }
        }
        builder.build()
    }

    fn spawn(&mut self, request: GameRequest) {
        let GameRequest {
            number,
            game,
            white,
            black,
            reuse,
            ..
        } = request;

        self.restart_modes
            .insert(white.name(), white.restart_mode());
        self.restart_modes
            .insert(black.name(), black.restart_mode());

        let white_player = match self.obtain_player(&white, reuse) {
            Ok(player) => player,
            Err(e) => {
                warn!(engine = %white.name(), error = %e, "cannot start engine");
                let _ = self.tx.send(TournamentEvent::GameStartFailed {
                    number,
                    error: format!("cannot start engine {}: {e}", white.name()),
                });
                return;
            }
        };
        let black_player = match self.obtain_player(&black, reuse) {
            Ok(player) => player,
            Err(e) => {
                // hold on to the already-built white player
                self.idle.push((white.name(), white_player));
                warn!(engine = %black.name(), error = %e, "cannot start engine");
                let _ = self.tx.send(TournamentEvent::GameStartFailed {
                    number,
                    error: format!("cannot start engine {}: {e}", black.name()),
                });
                return;
            }
        };

        self.active += 1;
        let tx = self.tx.clone();
        let started_tx = self.tx.clone();
        let white_name = white.name();
        let black_name = black.name();
        let handle = std::thread::spawn(move || {
            let (outcome, [white_player, black_player]) =
                game.run(white_player, black_player, move || {
                    let _ = started_tx.send(TournamentEvent::GameStarted { number });
                });
            let _ = tx.send(TournamentEvent::GameFinished {
                number,
                outcome: Box::new(outcome),
                players: vec![(white_name, white_player), (black_name, black_player)],
            });
        });
        self.workers.push(handle);
    }

    /// Returns a game's players to the pool and dispatches the next queued
    /// game, if any.
    pub fn on_game_finished(&mut self, players: Vec<(String, Box<dyn ChessPlayer>)>) {
        self.active = self.active.saturating_sub(1);

        for (name, mut player) in players {
            let mode = self
                .restart_modes
                .get(&name)
                .copied()
                .unwrap_or(RestartMode::Auto);
            if mode != RestartMode::Always && player.is_alive() {
                self.idle.push((name, player));
            } else {
                player.kill();
            }
        }

        if let Some(request) = self.queue.pop_front() {
            self.spawn(request);
        }
    }

    /// Kills pooled engines and joins finished worker threads.
    pub fn cleanup(&mut self) {
        for (_, player) in self.idle.iter_mut() {
            player.kill();
        }
        self.idle.clear();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use engine_interface::{GameResult, Poll, Side, TimeControl};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::time::Duration;

    struct InertPlayer {
        name: String,
        alive: bool,
    }

    impl ChessPlayer for InertPlayer {
        fn name(&self) -> String {
            self.name.clone()
        }
        fn new_game(&mut self, _: Side, _: &str, _: &TimeControl) -> Result<()> {
            Ok(())
        }
        fn go(&mut self, _: &TimeControl) -> Result<()> {
            Ok(())
        }
        fn make_move(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn make_book_move(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn poll(&mut self, _: Duration) -> Poll {
            Poll::Timeout
        }
        fn end_game(&mut self, _: &GameResult) {}
        fn kill(&mut self) {
            self.alive = false;
        }
        fn is_alive(&self) -> bool {
            self.alive
        }
    }

    struct CountingBuilder {
        name: String,
        builds: Arc<AtomicUsize>,
        fail: bool,
        restart: RestartMode,
    }

    impl PlayerBuilder for CountingBuilder {
        fn name(&self) -> String {
            self.name.clone()
        }
        fn build(&self) -> Result<Box<dyn ChessPlayer>> {
            if self.fail {
                bail!("spawn failed");
            }
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(InertPlayer {
                name: self.name.clone(),
                alive: true,
            }))
        }
        fn restart_mode(&self) -> RestartMode {
            self.restart
        }
    }

    fn builder(name: &str, builds: &Arc<AtomicUsize>, restart: RestartMode) -> Arc<dyn PlayerBuilder> {
        Arc::new(CountingBuilder {
            name: name.to_string(),
            builds: Arc::clone(builds),
            fail: false,
            restart,
        })
    }

    #[test]
    fn idle_players_are_reused() {
        let (tx, _rx) = channel();
        let mut manager = GameManager::new(1, tx);
        let builds = Arc::new(AtomicUsize::new(0));
        let alpha = builder("alpha", &builds, RestartMode::Auto);

        let player = manager.obtain_player(&alpha, ReuseMode::ReusePlayers).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        manager.on_game_finished(vec![("alpha".to_string(), player)]);
        let _again = manager.obtain_player(&alpha, ReuseMode::ReusePlayers).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1, "idle engine must be reused");
    }

    #[test]
    fn restart_always_rebuilds() {
        let (tx, _rx) = channel();
        let mut manager = GameManager::new(1, tx);
        let builds = Arc::new(AtomicUsize::new(0));
        let alpha = builder("alpha", &builds, RestartMode::Always);
        manager
            .restart_modes
            .insert("alpha".to_string(), RestartMode::Always);

        let player = manager.obtain_player(&alpha, ReuseMode::ReusePlayers).unwrap();
        manager.on_game_finished(vec![("alpha".to_string(), player)]);
        let _again = manager.obtain_player(&alpha, ReuseMode::ReusePlayers).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dead_players_are_not_pooled() {
        let (tx, _rx) = channel();
        let mut manager = GameManager::new(1, tx);
        let builds = Arc::new(AtomicUsize::new(0));
        let alpha = builder("alpha", &builds, RestartMode::Auto);

        let mut player = manager.obtain_player(&alpha, ReuseMode::ReusePlayers).unwrap();
        player.kill();
        manager.on_game_finished(vec![("alpha".to_string(), player)]);
        assert!(manager.idle.is_empty());
        let _again = manager.obtain_player(&alpha, ReuseMode::ReusePlayers).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn spawn_failure_surfaces_the_error() {
        let (tx, _rx) = channel();
        let mut manager = GameManager::new(1, tx);
        let failing: Arc<dyn PlayerBuilder> = Arc::new(CountingBuilder {
            name: "broken".to_string(),
            builds: Arc::new(AtomicUsize::new(0)),
            fail: true,
            restart: RestartMode::Auto,
        });

        let err = manager
            .obtain_player(&failing, ReuseMode::NewPlayers)
            .err()
            .unwrap();
        assert!(err.to_string().contains("spawn failed"));
    }
}
