//! Stub boards and engines for driving whole tournaments in-process.
//!
//! The stub board accepts any move and never ends the game on its own; the
//! stub players encode their name in their moves and decide games through
//! trusted result claims, so a test can script every outcome through a
//! verdict function of the two engine names.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arbiter::engine_interface::{
    Board, BoardFactory, ChessPlayer, GameResult, MoveEvaluation, PlayerBuilder, PlayerEvent,
    Poll, ResultKind, Side, TimeControl,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    WhiteWins,
    BlackWins,
    Draw,
}

pub type VerdictFn = Arc<dyn Fn(&str, &str) -> Verdict + Send + Sync>;

/// A verdict from fixed engine strengths: stronger wins, equal draws.
pub fn strength_verdict(pairs: &[(&str, i32)]) -> VerdictFn {
    let table: Vec<(String, i32)> = pairs
        .iter()
        .map(|(name, strength)| (name.to_string(), *strength))
        .collect();
    Arc::new(move |white, black| {
        let strength = |name: &str| {
            table
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, s)| *s)
                .unwrap_or(0)
        };
        match strength(white).cmp(&strength(black)) {
            std::cmp::Ordering::Greater => Verdict::WhiteWins,
            std::cmp::Ordering::Less => Verdict::BlackWins,
            std::cmp::Ordering::Equal => Verdict::Draw,
        }
    })
}

pub struct StubBoard {
    plies: u32,
    reversible: u32,
}

impl Board for StubBoard {
    fn variant(&self) -> &str {
        "standard"
    }
    fn default_fen(&self) -> String {
        "stub-start".to_string()
    }
    fn set_fen(&mut self, _fen: &str) -> bool {
        self.plies = 0;
        self.reversible = 0;
        true
    }
    fn fen(&self) -> String {
        format!("stub-{}", self.plies)
    }
    fn side_to_move(&self) -> Side {
        if self.plies % 2 == 0 {
            Side::White
        } else {
            Side::Black
        }
    }
    fn ply_count(&self) -> u32 {
        self.plies
    }
    fn reversible_move_count(&self) -> u32 {
        self.reversible
    }
    fn is_legal_move(&self, _mv: &str) -> bool {
        true
    }
    fn make_move(&mut self, _mv: &str) {
        self.plies += 1;
        self.reversible += 1;
    }
    fn undo_move(&mut self) {
        self.plies -= 1;
    }
    fn result(&self) -> GameResult {
        GameResult::null()
    }
    fn key(&self) -> u64 {
        u64::from(self.plies)
    }
}

pub struct StubBoardFactory;

impl BoardFactory for StubBoardFactory {
    fn create(&self, variant: &str) -> Option<Box<dyn Board>> {
        (variant == "standard").then(|| {
            Box::new(StubBoard {
                plies: 0,
                reversible: 0,
            }) as Box<dyn Board>
        })
    }
}

/// A player that makes name-tagged moves; on black's first turn it settles
/// the game with a result claim according to the verdict function.
pub struct OraclePlayer {
    name: String,
    side: Side,
    opponent: Option<String>,
    verdict: VerdictFn,
    moves_made: usize,
    queue: VecDeque<PlayerEvent>,
    claimed: bool,
}

impl OraclePlayer {
    fn claim(&mut self) {
        let Some(opponent) = self.opponent.clone() else {
            return;
        };
        let (white, black) = match self.side {
            Side::White => (self.name.clone(), opponent),
            Side::Black => (opponent, self.name.clone()),
        };
        let result = match (self.verdict)(&white, &black) {
            Verdict::WhiteWins => GameResult::win(
                Side::White,
                ResultKind::Resignation,
                format!("{black} resigns"),
            ),
            Verdict::BlackWins => GameResult::win(
                Side::Black,
                ResultKind::Resignation,
                format!("{white} resigns"),
            ),
            Verdict::Draw => GameResult::draw(ResultKind::Normal, "draw agreed"),
        };
        self.queue.push_back(PlayerEvent::ResultClaim(result));
        self.claimed = true;
    }
}

impl ChessPlayer for OraclePlayer {
    fn name(&self) -> String {
        self.name.clone()
    }

    // results are settled by claims, so they must be taken at face value
    fn claims_validated(&self) -> bool {
        false
    }

    fn new_game(&mut self, side: Side, _fen: &str, _tc: &TimeControl) -> anyhow::Result<()> {
        self.side = side;
        self.opponent = None;
        self.moves_made = 0;
        self.claimed = false;
        self.queue.clear();
        self.queue.push_back(PlayerEvent::Ready);
        Ok(())
    }

    fn go(&mut self, _tc: &TimeControl) -> anyhow::Result<()> {
        if self.claimed {
            return Ok(());
        }
        if self.side == Side::Black && self.opponent.is_some() {
            self.claim();
            return Ok(());
        }
        self.moves_made += 1;
        self.queue.push_back(PlayerEvent::MoveMade {
            mv: format!("m:{}:{}", self.name, self.moves_made),
            eval: MoveEvaluation {
                depth: 10,
                score: 0,
                ..MoveEvaluation::default()
            },
        });
        // white learns the opponent too late for its first move; claim on
        // the second turn instead
        if self.side == Side::White && self.opponent.is_some() {
            self.claim();
        }
        Ok(())
    }

    fn make_move(&mut self, mv: &str) -> anyhow::Result<()> {
        if let Some(name) = mv.strip_prefix("m:").and_then(|rest| rest.split(':').next()) {
            self.opponent = Some(name.to_string());
        }
        Ok(())
    }

    fn make_book_move(&mut self, _mv: &str) -> anyhow::Result<()> {
        self.moves_made += 1;
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Poll {
        match self.queue.pop_front() {
            Some(event) => Poll::Event(event),
            None => {
                std::thread::sleep(timeout.min(Duration::from_millis(1)));
                Poll::Timeout
            }
        }
    }

    fn end_game(&mut self, _result: &GameResult) {}

    fn kill(&mut self) {}
}

pub struct OracleBuilder {
    pub name: String,
    pub verdict: VerdictFn,
}

impl PlayerBuilder for OracleBuilder {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn build(&self) -> anyhow::Result<Box<dyn ChessPlayer>> {
        Ok(Box::new(OraclePlayer {
            name: self.name.clone(),
            side: Side::White,
            opponent: None,
            verdict: Arc::clone(&self.verdict),
            moves_made: 0,
            queue: VecDeque::new(),
            claimed: false,
        }))
    }
}

/// A player whose process dies as soon as it has to think.
pub struct CrashingPlayer {
    name: String,
    dead: Arc<AtomicBool>,
    queue: Arc<Mutex<VecDeque<PlayerEvent>>>,
}

impl ChessPlayer for CrashingPlayer {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn new_game(&mut self, _side: Side, _fen: &str, _tc: &TimeControl) -> anyhow::Result<()> {
        self.queue.lock().unwrap().push_back(PlayerEvent::Ready);
        Ok(())
    }

    fn go(&mut self, _tc: &TimeControl) -> anyhow::Result<()> {
        self.dead.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn make_move(&mut self, _mv: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn make_book_move(&mut self, _mv: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Poll {
        if self.dead.load(Ordering::SeqCst) {
            return Poll::Disconnected;
        }
        match self.queue.lock().unwrap().pop_front() {
            Some(event) => Poll::Event(event),
            None => {
                std::thread::sleep(timeout.min(Duration::from_millis(1)));
                Poll::Timeout
            }
        }
    }

    fn end_game(&mut self, _result: &GameResult) {}

    fn kill(&mut self) {
        self.dead.store(true, Ordering::SeqCst);
    }

    fn is_alive(&self) -> bool {
        !self.dead.load(Ordering::SeqCst)
    }
}

pub struct CrashingBuilder {
    pub name: String,
}

impl PlayerBuilder for CrashingBuilder {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn build(&self) -> anyhow::Result<Box<dyn ChessPlayer>> {
        Ok(Box::new(CrashingPlayer {
            name: self.name.clone(),
            dead: Arc::new(AtomicBool::new(false)),
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }))
    }
}
