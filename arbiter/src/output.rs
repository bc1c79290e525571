//! Tournament artifacts: the tournament JSON file, schedule and crosstable
//! outputs, ordered PGN/EPD writers and atomic live-game dumps.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use engine_interface::{PgnGame, PgnMode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::settings::{EngineConfiguration, TournamentSettings};

/// One game record in `matchProgress`. Games in progress carry result `*`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchProgressEntry {
    pub index: usize,
    pub white: String,
    pub black: String,
    #[serde(rename = "startTime")]
    pub start_time: String,
    pub result: String,
    #[serde(rename = "terminationDetails")]
    pub termination_details: String,
    #[serde(rename = "gameDuration")]
    pub game_duration: String,
    #[serde(rename = "finalFen")]
    pub final_fen: String,
    #[serde(rename = "ECO")]
    pub eco: String,
    pub opening: String,
    pub variation: String,
    #[serde(rename = "plyCount")]
    pub ply_count: usize,
    #[serde(rename = "whiteEval")]
    pub white_eval: String,
    #[serde(rename = "blackEval")]
    pub black_eval: String,
}

/// The persisted engine configuration block.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettingsDoc {
    pub engines: Vec<EngineConfiguration>,
    pub each: Option<EngineConfiguration>,
}

/// The tournament file: output after every game, input on resume.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TournamentFile {
    #[serde(rename = "tournamentSettings")]
    pub tournament_settings: TournamentSettings,
    #[serde(rename = "engineSettings")]
    pub engine_settings: EngineSettingsDoc,
    #[serde(rename = "matchProgress")]
    pub match_progress: Vec<MatchProgressEntry>,
    #[serde(default)]
    pub strikes: BTreeMap<String, u32>,
}

impl TournamentFile {
    pub fn new(settings: TournamentSettings) -> TournamentFile {
        TournamentFile {
            tournament_settings: settings,
            engine_settings: EngineSettingsDoc::default(),
            match_progress: Vec::new(),
            strikes: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<TournamentFile> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("cannot read tournament file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("cannot parse tournament file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        atomic_write(path, data.as_bytes())
    }

    /// Number of games with a final result, for resume.
    pub fn finished_game_count(&self) -> usize {
        self.match_progress
            .iter()
            .filter(|entry| entry.result != "*" && !entry.result.is_empty())
            .count()
    }
}

/// Writes `contents` to a sibling temp file, then renames over `path`.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs::write(&temp, contents)
        .with_context(|| format!("cannot write {}", temp.display()))?;
    fs::rename(&temp, path)
        .with_context(|| format!("cannot rename {} to {}", temp.display(), path.display()))?;
    Ok(())
}

/// The artifact base name: the tournament file without its `.json` suffix.
fn artifact_base(tournament_file: &Path) -> PathBuf {
    let s = tournament_file.to_string_lossy();
    PathBuf::from(s.strip_suffix(".json").unwrap_or(&s).to_string())
}

/// Atomic per-move dump of the game in progress.
pub struct LiveOutput {
    base: PathBuf,
    mode: PgnMode,
    pgn_format: bool,
    json_format: bool,
}

impl LiveOutput {
    pub fn new(base: PathBuf, mode: PgnMode, pgn_format: bool, json_format: bool) -> LiveOutput {
        LiveOutput {
            base,
            mode,
            pgn_format,
            json_format,
        }
    }

    pub fn write(&self, pgn: &PgnGame) {
        if self.pgn_format {
            let path = self.base.with_extension("pgn");
            if let Err(e) = atomic_write(&path, pgn.render(self.mode).as_bytes()) {
                warn!(error = %e, "cannot write live PGN");
            }
        }
        if self.json_format {
            let moves: Vec<Value> = pgn
                .moves()
                .iter()
                .map(|m| json!({"m": m.san.as_str(), "c": m.comment.as_str()}))
                .collect();
            let doc = json!({
                "White": pgn.white.as_str(),
                "Black": pgn.black.as_str(),
                "Round": pgn.round.as_str(),
                "Result": pgn.result_string(),
                "Moves": moves,
            });
            let path = self.base.with_extension("json");
            if let Err(e) = atomic_write(&path, doc.to_string().as_bytes()) {
                warn!(error = %e, "cannot write live JSON");
            }
        }
    }
}

/// Appends finished games to the PGN file in strict game-number order,
/// buffering games that finish early.
pub struct PgnWriter {
    path: Option<PathBuf>,
    mode: PgnMode,
    write_unfinished: bool,
    saved_game_count: usize,
    pending: BTreeMap<usize, (PgnGame, bool)>,
}

impl PgnWriter {
    pub fn new(path: Option<PathBuf>, mode: PgnMode, write_unfinished: bool) -> PgnWriter {
        PgnWriter {
            path,
            mode,
            write_unfinished,
            saved_game_count: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn saved_game_count(&self) -> usize {
        self.saved_game_count
    }

    /// Hands over game `game_number` (1-based); `faulty` marks results
    /// caused by a misbehaving player. Everything flushable in order is
    /// appended to the file.
    pub fn add(
        &mut self,
        game_number: usize,
        pgn: PgnGame,
        faulty: bool,
        stopping: bool,
    ) -> Result<()> {
        if self.path.is_none() {
            self.saved_game_count = self.saved_game_count.max(game_number);
            return Ok(());
        }
        self.pending.insert(game_number, (pgn, faulty));
        self.flush(stopping)
    }

    /// Marks the next game number as handled without writing it; skipped
    /// games keep the reorder sequence moving.
    pub fn skip(&mut self) {
        self.saved_game_count += 1;
        if let Err(e) = self.flush(false) {
            warn!(error = %e, "could not flush PGN games");
        }
    }

    fn flush(&mut self, stopping: bool) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !self.pending.contains_key(&(self.saved_game_count + 1)) {
            return Ok(());
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("cannot open PGN file {}", path.display()))?;

        while let Some((pgn, faulty)) = self.pending.remove(&(self.saved_game_count + 1)) {
            self.saved_game_count += 1;
            let unfinished = pgn.result_string() == "*";
            if !self.write_unfinished && (unfinished || (stopping && faulty)) {
                warn!(game = self.saved_game_count, "omitted incomplete game");
                continue;
            }
            file.write_all(pgn.render(self.mode).as_bytes())?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Appends one final position per game.
pub struct EpdWriter {
    path: Option<PathBuf>,
}

impl EpdWriter {
    pub fn new(path: Option<PathBuf>) -> EpdWriter {
        EpdWriter { path }
    }

    pub fn write(&mut self, fen: &str) {
        let Some(path) = &self.path else {
            return;
        };
        let result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{fen}"));
        if let Err(e) = result {
            warn!(error = %e, "could not write EPD position");
        }
    }
}

#[derive(Clone, Default)]
struct CrossTableData {
    name: String,
    abbrev: String,
    score: f64,
    neustadtl: f64,
    rating: i32,
    games_as_white: u32,
    games_as_black: u32,
    wins_as_white: u32,
    wins_as_black: u32,
    losses_as_white: u32,
    losses_as_black: u32,
    strikes: u32,
    disqualified: bool,
    performance: f64,
    elo: f64,
    /// Per-opponent result string, '1'/'0'/'=' per game.
    table_data: BTreeMap<String, String>,
    head_to_head: BTreeMap<String, i32>,
}

/// Ranking comparator: disqualified last, then score, strikes, games
/// played, head-to-head, total wins, Neustadtl.
fn crosstable_order(s1: &CrossTableData, s2: &CrossTableData) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    if s1.disqualified != s2.disqualified {
        return if s2.disqualified {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }
    if s1.score != s2.score {
        return s2.score.partial_cmp(&s1.score).unwrap_or(Ordering::Equal);
    }
    if s1.strikes != s2.strikes {
        return s1.strikes.cmp(&s2.strikes);
    }
    let games1 = s1.games_as_white + s1.games_as_black;
    let games2 = s2.games_as_white + s2.games_as_black;
    if games1 != games2 {
        return games1.cmp(&games2);
    }
    let h2h = s1.head_to_head.get(&s2.name).copied().unwrap_or(0);
    if h2h != 0 {
        return if h2h > 0 { Ordering::Less } else { Ordering::Greater };
    }
    let wins1 = s1.wins_as_white + s1.wins_as_black;
    let wins2 = s2.wins_as_white + s2.wins_as_black;
    if wins1 != wins2 {
        return wins2.cmp(&wins1);
    }
    s2.neustadtl
        .partial_cmp(&s1.neustadtl)
        .unwrap_or(Ordering::Equal)
}

/// A player's static info fed into crosstable generation.
pub struct CrosstablePlayer {
    pub name: String,
    pub rating: i32,
    pub crashes: u32,
    pub builder_strikes: u32,
}

pub struct Crosstable {
    rows: Vec<CrossTableData>,
}

impl Crosstable {
    /// Builds the full crosstable from the recorded games.
    pub fn build(
        players: &[CrosstablePlayer],
        progress: &[MatchProgressEntry],
        strikes_limit: u32,
        elo_k_factor: f64,
    ) -> Crosstable {
        let mut table: BTreeMap<String, CrossTableData> = BTreeMap::new();
        let mut abbrevs: Vec<String> = Vec::new();

        for player in players {
            let mut data = CrossTableData {
                name: player.name.clone(),
                rating: player.rating,
                strikes: player.crashes + player.builder_strikes,
                ..CrossTableData::default()
            };
            data.disqualified = strikes_limit > 0 && data.strikes >= strikes_limit;

            // two-letter abbreviation, uniquified by advancing the second
            // letter through the name
            let chars: Vec<char> = player.name.chars().collect();
            let first = chars.first().map(|c| c.to_ascii_uppercase()).unwrap_or('?');
            let mut n = 1;
            let mut abbrev: String = loop {
                let second = chars.get(n).map(|c| c.to_ascii_lowercase()).unwrap_or(' ');
                let candidate: String = [first, second].iter().collect();
                if !abbrevs.contains(&candidate) || n >= chars.len() {
                    break candidate;
                }
                n += 1;
            };
            if abbrevs.contains(&abbrev) {
                abbrev = format!("{}{}", first, abbrevs.len());
            }
            abbrevs.push(abbrev.clone());
            data.abbrev = abbrev;
            table.insert(player.name.clone(), data);
        }

        // scores and per-opponent strings; disqualified games are nullified
        for entry in progress {
            if entry.white.is_empty() || entry.black.is_empty() || entry.result == "*" {
                continue;
            }
            if !table.contains_key(&entry.white) || !table.contains_key(&entry.black) {
                continue;
            }
            let disqualified =
                table[&entry.white].disqualified || table[&entry.black].disqualified;

            let (white_char, black_char, white_pts, black_pts) = match entry.result.as_str() {
                "1-0" => ('1', '0', 1.0, 0.0),
                "0-1" => ('0', '1', 0.0, 1.0),
                "1/2-1/2" => ('=', '=', 0.5, 0.5),
                _ => continue,
            };

            {
                let white = table.get_mut(&entry.white).unwrap();
                white
                    .table_data
                    .entry(entry.black.clone())
                    .or_default()
                    .push(white_char);
                if !disqualified {
                    white.score += white_pts;
                    white.games_as_white += 1;
                    if white_pts == 1.0 {
                        white.wins_as_white += 1;
                    } else if black_pts == 1.0 {
                        white.losses_as_white += 1;
                    }
                    let h2h = white.head_to_head.entry(entry.black.clone()).or_insert(0);
                    *h2h += white_pts as i32 - black_pts as i32;
                }
            }
            {
                let black = table.get_mut(&entry.black).unwrap();
                black
                    .table_data
                    .entry(entry.white.clone())
                    .or_default()
                    .push(black_char);
                if !disqualified {
                    black.score += black_pts;
                    black.games_as_black += 1;
                    if black_pts == 1.0 {
                        black.wins_as_black += 1;
                    } else if white_pts == 1.0 {
                        black.losses_as_black += 1;
                    }
                    let h2h = black.head_to_head.entry(entry.white.clone()).or_insert(0);
                    *h2h += black_pts as i32 - white_pts as i32;
                }
            }
        }

        // Neustadtl: sum of beaten opponents' scores plus half the drawn
        // opponents' scores
        let names: Vec<String> = table.keys().cloned().collect();
        for name in &names {
            if table[name].disqualified {
                continue;
            }
            let mut sb = 0.0;
            for (opponent, results) in table[name].table_data.clone() {
                let other = &table[&opponent];
                if other.disqualified {
                    continue;
                }
                for c in results.chars() {
                    match c {
                        '1' => sb += other.score,
                        '=' => sb += other.score / 2.0,
                        _ => {}
                    }
                }
            }
            table.get_mut(name).unwrap().neustadtl = sb;
        }

        // K-factor Elo exchange against configured ratings
        for (i, name) in names.iter().enumerate() {
            for other_name in names.iter().skip(i + 1) {
                let results = table[name]
                    .table_data
                    .get(other_name)
                    .cloned()
                    .unwrap_or_default();
                let mut score = 0u32;
                let mut games = 0u32;
                for c in results.chars() {
                    match c {
                        '1' => {
                            score += 2;
                            games += 1;
                        }
                        '=' => {
                            score += 1;
                            games += 1;
                        }
                        '0' => games += 1,
                        _ => {}
                    }
                }
                if games == 0 {
                    continue;
                }
                let real = f64::from(score) / f64::from(games * 2);
                let expected = 1.0
                    / (1.0
                        + 10f64.powf(
                            f64::from(table[other_name].rating - table[name].rating) / 400.0,
                        ));
                let delta = elo_k_factor * (real - expected) * f64::from(games);
                table.get_mut(name).unwrap().elo += delta;
                table.get_mut(other_name).unwrap().elo -= delta;
            }
        }

        // performance: percentage of available points
        for name in &names {
            let data = table.get_mut(name).unwrap();
            let games = data.games_as_white + data.games_as_black;
            data.performance = if games > 0 {
                data.score / f64::from(games) * 100.0
            } else {
                0.0
            };
        }

        let mut rows: Vec<CrossTableData> = table.into_values().collect();
        rows.sort_by(crosstable_order);
        Crosstable { rows }
    }

    pub fn ranked_names(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn to_json(&self) -> Value {
        let mut doc = serde_json::Map::new();
        for (rank, row) in self.rows.iter().enumerate() {
            let results: Vec<Value> = row
                .table_data
                .iter()
                .map(|(opponent, games)| json!({"Opponent": opponent.as_str(), "Games": games.as_str()}))
                .collect();
            doc.insert(
                row.name.clone(),
                json!({
                    "Rank": rank + 1,
                    "Abbreviation": row.abbrev.as_str(),
                    "Rating": row.rating,
                    "Score": row.score,
                    "GamesAsWhite": row.games_as_white,
                    "GamesAsBlack": row.games_as_black,
                    "WinsAsWhite": row.wins_as_white,
                    "WinsAsBlack": row.wins_as_black,
                    "LossesAsWhite": row.losses_as_white,
                    "LossesAsBlack": row.losses_as_black,
                    "Neustadtl": row.neustadtl,
                    "Strikes": row.strikes,
                    "Performance": row.performance,
                    "Elo": row.elo,
                    "Results": results,
                }),
            );
        }
        Value::Object(doc)
    }

    pub fn to_text(&self) -> String {
        let max_name = self
            .rows
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(6)
            .max(6);
        let mut out = format!(
            "{:>4} {:<width$} {:>6} {:>7} {:>8} {:>7} {:>7}\n",
            "Rank",
            "Name",
            "Score",
            "SB",
            "Perf",
            "Elo",
            "Strikes",
            width = max_name
        );
        for (rank, row) in self.rows.iter().enumerate() {
            out += &format!(
                "{:>4} {:<width$} {:>6.1} {:>7.2} {:>7.1}% {:>7.1} {:>7}{}\n",
                rank + 1,
                row.name,
                row.score,
                row.neustadtl,
                row.performance,
                row.elo,
                row.strikes,
                if row.disqualified { " DQ" } else { "" },
                width = max_name
            );
        }
        out
    }

    /// Writes `<base>_crosstable.json` (atomically) and
    /// `<base>_crosstable.txt`.
    pub fn write(&self, tournament_file: &Path) -> Result<()> {
        let base = artifact_base(tournament_file);
        let json_path = PathBuf::from(format!("{}_crosstable.json", base.display()));
        atomic_write(&json_path, serde_json::to_string_pretty(&self.to_json())?.as_bytes())?;
        let txt_path = PathBuf::from(format!("{}_crosstable.txt", base.display()));
        fs::write(&txt_path, self.to_text())
            .with_context(|| format!("cannot write {}", txt_path.display()))?;
        Ok(())
    }
}

fn negate_eval(eval: &str) -> String {
    if eval.is_empty() || eval == "0.00" {
        eval.to_string()
    } else if let Some(stripped) = eval.strip_prefix('-') {
        stripped.to_string()
    } else {
        format!("-{eval}")
    }
}

/// Writes `<base>_schedule.json` and `<base>_schedule.txt`: one row per
/// scheduled game, filled from `progress` where the game was played.
pub fn write_schedule(
    tournament_file: &Path,
    pairings: &[(String, String)],
    progress: &[MatchProgressEntry],
    disqualified: &BTreeMap<String, bool>,
    json_format: bool,
    text_format: bool,
) -> Result<()> {
    if pairings.is_empty() {
        return Ok(());
    }
    let base = artifact_base(tournament_file);

    let canceled = |white: &str, black: &str| {
        disqualified.get(white).copied().unwrap_or(false)
            || disqualified.get(black).copied().unwrap_or(false)
    };

    if json_format {
        let mut rows = Vec::with_capacity(pairings.len());
        for (count, (white, black)) in pairings.iter().enumerate() {
            let mut row = serde_json::Map::new();
            row.insert("Game".into(), json!(count + 1));
            if let Some(entry) = progress.get(count) {
                row.insert("White".into(), json!(entry.white.as_str()));
                row.insert("Black".into(), json!(entry.black.as_str()));
                row.insert("Start".into(), json!(entry.start_time.as_str()));
                row.insert("Result".into(), json!(entry.result.as_str()));
                row.insert("Termination".into(), json!(entry.termination_details.as_str()));
                row.insert("Duration".into(), json!(entry.game_duration.as_str()));
                row.insert("FinalFen".into(), json!(entry.final_fen.as_str()));
                row.insert("ECO".into(), json!(entry.eco.as_str()));
                let mut opening = entry.opening.clone();
                if !entry.variation.is_empty() {
                    opening = format!("{}, {}", opening, entry.variation);
                }
                if !opening.is_empty() {
                    row.insert("Opening".into(), json!(opening));
                }
                row.insert("Moves".into(), json!(entry.ply_count));
                row.insert("WhiteEv".into(), json!(entry.white_eval.as_str()));
                row.insert("BlackEv".into(), json!(negate_eval(&entry.black_eval)));
            } else {
                row.insert("White".into(), json!(white.as_str()));
                row.insert("Black".into(), json!(black.as_str()));
                if canceled(white, black) {
                    row.insert("Termination".into(), json!("Canceled"));
                }
            }
            rows.push(Value::Object(row));
        }
        let path = PathBuf::from(format!("{}_schedule.json", base.display()));
        atomic_write(&path, serde_json::to_string_pretty(&rows)?.as_bytes())?;
    }

    if text_format {
        let max_name = pairings
            .iter()
            .flat_map(|(w, b)| [w.len(), b.len()])
            .max()
            .unwrap_or(5)
            .max(5);
        let max_term = progress
            .iter()
            .map(|p| p.termination_details.len())
            .max()
            .unwrap_or(11)
            .max(11);
        let nr_width = if pairings.len() >= 100 { 3 } else { 2 };

        let mut text = format!(
            "{:>nrw$} {:>nw$} {:>3} {:<3} {:<nw$} {:<tw$} {:>3} {:>7} {:<7} {:<22} {:>8} {:>3} {}\n",
            "Nr",
            "White",
            "",
            "",
            "Black",
            "Termination",
            "Mov",
            "WhiteEv",
            "BlackEv",
            "Start",
            "Duration",
            "ECO",
            "FinalFen Opening",
            nrw = nr_width,
            nw = max_name,
            tw = max_term,
        );

        for (count, (white, black)) in pairings.iter().enumerate() {
            let entry = progress.get(count);
            let (white_name, black_name) = match entry {
                Some(e) if !e.white.is_empty() => (e.white.clone(), e.black.clone()),
                _ => (white.clone(), black.clone()),
            };
            let (white_result, black_result) = match entry.map(|e| e.result.as_str()) {
                Some("1-0") => ("1", "0"),
                Some("0-1") => ("0", "1"),
                Some("1/2-1/2") => ("1/2", "1/2"),
                Some("*") => ("*", "*"),
                _ => ("", ""),
            };
            let termination = match entry {
                Some(e) => e.termination_details.clone(),
                None if canceled(&white_name, &black_name) => "Canceled".to_string(),
                None => String::new(),
            };
            let empty = MatchProgressEntry::default();
            let e = entry.unwrap_or(&empty);
            let mut opening = e.opening.clone();
            if !e.variation.is_empty() {
                opening = format!("{}, {}", opening, e.variation);
            }
            text += &format!(
                "{:>nrw$} {:>nw$} {:>3} {:<3} {:<nw$} {:<tw$} {:>3} {:>7} {:<7} {:<22} {:>8} {:>3} {} {}\n",
                count + 1,
                white_name,
                white_result,
                black_result,
                black_name,
                termination,
                if e.ply_count > 0 { e.ply_count.to_string() } else { String::new() },
                e.white_eval,
                negate_eval(&e.black_eval),
                e.start_time,
                e.game_duration,
                e.eco,
                e.final_fen,
                opening,
                nrw = nr_width,
                nw = max_name,
                tw = max_term,
            );
        }

        let path = PathBuf::from(format!("{}_schedule.txt", base.display()));
        fs::write(&path, text).with_context(|| format!("cannot write {}", path.display()))?;
    }
    Ok(())
}
