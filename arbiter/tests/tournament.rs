//! End-to-end tournaments over stub engines.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arbiter::engine_interface::{PlayerBuilder, TimeControl};
use arbiter::output::TournamentFile;
use arbiter::settings::{ScheduleKind, SprtSettings, TournamentSettings};
use arbiter::sprt::SprtResult;
use arbiter::tournament::Tournament;

mod common;

use common::{
    strength_verdict, CrashingBuilder, OracleBuilder, StubBoardFactory, Verdict, VerdictFn,
};

fn oracle(name: &str, verdict: &VerdictFn) -> Arc<dyn PlayerBuilder> {
    Arc::new(OracleBuilder {
        name: name.to_string(),
        verdict: Arc::clone(verdict),
    })
}

fn add_oracles(tournament: &mut Tournament, names: &[&str], verdict: &VerdictFn) {
    for name in names {
        tournament.add_player(oracle(name, verdict), TimeControl::infinite(), None, 0);
    }
}

#[test]
fn berger_round_robin_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let verdict = strength_verdict(&[("alpha", 3), ("beta", 2), ("gamma", 1), ("delta", 0)]);

    let mut settings = TournamentSettings::new(ScheduleKind::RoundRobin)
        .with_name("nightly")
        .with_games_per_encounter(2)
        .with_round_multiplier(1)
        .with_berger_schedule(true);
    settings.stop_sentinel = dir.path().join("failed.txt");
    settings.live_pgn_output = Some(dir.path().join("live"));
    settings.pgn_output = Some(dir.path().join("games.pgn"));

    let mut tournament = Tournament::new(settings, Arc::new(StubBoardFactory)).unwrap();
    tournament.set_tournament_file(dir.path().join("event.json"));
    add_oracles(&mut tournament, &["alpha", "beta", "gamma", "delta"], &verdict);

    let report = tournament.run().unwrap();

    assert_eq!(tournament.final_game_count(), 12);
    assert_eq!(tournament.finished_game_count(), 12);

    // score conservation: 2 points per game
    let total: i64 = (0..4).map(|i| tournament.player_score(i)).sum();
    assert_eq!(total, 24);

    // strict strength order: 6, 4, 2, 0 wins
    assert_eq!(tournament.player_score(0), 12);
    assert_eq!(tournament.player_score(1), 8);
    assert_eq!(tournament.player_score(2), 4);
    assert_eq!(tournament.player_score(3), 0);
    assert!(report.contains("alpha"));

    // artifacts: tournament file, crosstable, schedule, PGN, live dumps
    let file = TournamentFile::load(&dir.path().join("event.json")).unwrap();
    assert_eq!(file.match_progress.len(), 12);
    assert!(file.match_progress.iter().all(|e| e.result != "*"));

    let crosstable: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("event_crosstable.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(crosstable["alpha"]["Rank"], 1);
    assert_eq!(crosstable["delta"]["Rank"], 4);

    let schedule: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("event_schedule.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(schedule.as_array().unwrap().len(), 12);

    assert!(dir.path().join("games.pgn").exists());
    assert!(dir.path().join("live.pgn").exists());
    assert!(dir.path().join("live.json").exists());
}

#[test]
fn naive_round_robin_alternates_colors() {
    let dir = tempfile::tempdir().unwrap();
    let verdict = strength_verdict(&[("alpha", 1), ("beta", 0)]);

    let mut settings = TournamentSettings::new(ScheduleKind::RoundRobin)
        .with_games_per_encounter(2)
        .with_round_multiplier(1);
    settings.stop_sentinel = dir.path().join("failed.txt");

    let mut tournament = Tournament::new(settings, Arc::new(StubBoardFactory)).unwrap();
    tournament.set_tournament_file(dir.path().join("event.json"));
    add_oracles(&mut tournament, &["alpha", "beta"], &verdict);
    tournament.run().unwrap();

    let file = TournamentFile::load(&dir.path().join("event.json")).unwrap();
    assert_eq!(file.match_progress.len(), 2);
    assert_eq!(file.match_progress[0].white, "alpha");
    assert_eq!(file.match_progress[1].white, "beta");
    // alpha wins with either color
    assert_eq!(file.match_progress[0].result, "1-0");
    assert_eq!(file.match_progress[1].result, "0-1");
}

#[test]
fn sprt_stops_the_match_early() {
    let dir = tempfile::tempdir().unwrap();

    // engine 0 scores 62.5%: W L W D repeating
    let counter = Arc::new(AtomicUsize::new(0));
    let pattern: VerdictFn = {
        let counter = Arc::clone(&counter);
        Arc::new(move |white, _black| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let first_wins = match n % 4 {
                0 | 2 => true,
                1 => false,
                _ => return Verdict::Draw,
            };
            if (white == "first") == first_wins {
                Verdict::WhiteWins
            } else {
                Verdict::BlackWins
            }
        })
    };

    let mut settings = TournamentSettings::new(ScheduleKind::RoundRobin)
        .with_games_per_encounter(1)
        .with_round_multiplier(20_000)
        .with_sprt(SprtSettings {
            elo0: 0.0,
            elo1: 5.0,
            alpha: 0.05,
            beta: 0.05,
        });
    settings.stop_sentinel = dir.path().join("failed.txt");

    let mut tournament = Tournament::new(settings, Arc::new(StubBoardFactory)).unwrap();
    add_oracles(&mut tournament, &["first", "second"], &pattern);
    tournament.run().unwrap();

    assert_eq!(tournament.sprt_status(), Some(SprtResult::AcceptH1));
    assert!(
        tournament.finished_game_count() < tournament.final_game_count(),
        "the tournament must stop before the schedule runs out"
    );
}

#[test]
fn knockout_semifinal_winners_meet_in_the_final() {
    let dir = tempfile::tempdir().unwrap();
    let verdict = strength_verdict(&[("S1", 4), ("S2", 3), ("S3", 2), ("S4", 1)]);

    let mut settings = TournamentSettings::new(ScheduleKind::Knockout)
        .with_games_per_encounter(4);
    settings.stop_sentinel = dir.path().join("failed.txt");

    let mut tournament = Tournament::new(settings, Arc::new(StubBoardFactory)).unwrap();
    tournament.set_tournament_file(dir.path().join("event.json"));
    add_oracles(&mut tournament, &["S1", "S2", "S3", "S4"], &verdict);
    tournament.run().unwrap();

    let file = TournamentFile::load(&dir.path().join("event.json")).unwrap();
    let games = &file.match_progress;

    // each sweep needs three games: two semifinals plus the final
    assert_eq!(games.len(), 9);

    // colors alternate between games of an encounter
    for window in games.windows(2) {
        let same_pair = (window[0].white == window[1].black
            && window[0].black == window[1].white)
            || (window[0].white == window[1].white && window[0].black == window[1].black);
        if same_pair {
            assert_eq!(window[0].white, window[1].black, "colors must alternate");
        }
    }

    // the final is S1 vs S2, and S1 takes it
    let last = games.last().unwrap();
    let mut finalists = [last.white.as_str(), last.black.as_str()];
    finalists.sort_unstable();
    assert_eq!(finalists, ["S1", "S2"]);
    assert_eq!(tournament.player_name(0), "S1");
    assert!(tournament.player_score(0) > tournament.player_score(1));
}

#[test]
fn disconnection_scores_a_penalty_and_stops_without_recover() {
    let dir = tempfile::tempdir().unwrap();
    let verdict = strength_verdict(&[("good", 1), ("flaky", 0)]);

    let mut settings = TournamentSettings::new(ScheduleKind::RoundRobin)
        .with_games_per_encounter(1)
        .with_round_multiplier(4);
    settings.stop_sentinel = dir.path().join("failed.txt");

    let mut tournament = Tournament::new(settings, Arc::new(StubBoardFactory)).unwrap();
    tournament.set_tournament_file(dir.path().join("event.json"));
    tournament.add_player(oracle("good", &verdict), TimeControl::infinite(), None, 0);
    tournament.add_player(
        Arc::new(CrashingBuilder {
            name: "flaky".to_string(),
        }),
        TimeControl::infinite(),
        None,
        0,
    );
    tournament.run().unwrap();

    // the crash ended the tournament after one game
    assert_eq!(tournament.finished_game_count(), 1);
    assert_eq!(tournament.player_score(0), 2);
    assert_eq!(tournament.player_score(1), -1);

    let file = TournamentFile::load(&dir.path().join("event.json")).unwrap();
    assert_eq!(file.match_progress[0].result, "1-0");
    assert!(file.match_progress[0]
        .termination_details
        .contains("disconnect"));
    assert_eq!(file.strikes.get("flaky"), Some(&1));
}

#[test]
fn strikes_skip_disqualified_players_with_recover() {
    let dir = tempfile::tempdir().unwrap();
    let verdict = strength_verdict(&[("good", 1), ("flaky", 0)]);

    let mut settings = TournamentSettings::new(ScheduleKind::RoundRobin)
        .with_games_per_encounter(1)
        .with_round_multiplier(2)
        .with_strikes(1);
    settings.recover = true;
    settings.stop_sentinel = dir.path().join("failed.txt");

    let mut tournament = Tournament::new(settings, Arc::new(StubBoardFactory)).unwrap();
    tournament.set_tournament_file(dir.path().join("event.json"));
    tournament.add_player(oracle("good", &verdict), TimeControl::infinite(), None, 0);
    tournament.add_player(
        Arc::new(CrashingBuilder {
            name: "flaky".to_string(),
        }),
        TimeControl::infinite(),
        None,
        0,
    );
    tournament.run().unwrap();

    // game 1 crashed, game 2 was skipped because of the strike
    assert_eq!(tournament.finished_game_count(), 2);
    let file = TournamentFile::load(&dir.path().join("event.json")).unwrap();
    assert_eq!(file.match_progress.len(), 2);
    assert_eq!(file.match_progress[1].termination_details, "Canceled");
}

#[test]
fn swiss_resume_matches_a_fresh_run() {
    let verdict = strength_verdict(&[("A", 3), ("B", 2), ("C", 1), ("D", 0)]);

    let run = |resume_from: Option<TournamentFile>, dir: &std::path::Path| {
        let mut settings = TournamentSettings::new(ScheduleKind::Swiss)
            .with_games_per_encounter(1)
            .with_round_multiplier(3);
        settings.stop_sentinel = dir.join("failed.txt");
        let mut tournament = Tournament::new(settings, Arc::new(StubBoardFactory)).unwrap();
        tournament.set_tournament_file(dir.join("event.json"));
        add_oracles(&mut tournament, &["A", "B", "C", "D"], &verdict);
        if let Some(file) = resume_from {
            tournament.resume(file);
        }
        tournament.run().unwrap();
        (0..4).map(|i| tournament.player_score(i)).collect::<Vec<_>>()
    };

    let dir1 = tempfile::tempdir().unwrap();
    let fresh_scores = run(None, dir1.path());
    let full_file = TournamentFile::load(&dir1.path().join("event.json")).unwrap();
    assert_eq!(full_file.match_progress.len(), 6);

    // resume after round 1: keep the first two recorded games
    let mut partial = full_file.clone();
    partial.match_progress.truncate(2);

    let dir2 = tempfile::tempdir().unwrap();
    let resumed_scores = run(Some(partial), dir2.path());

    assert_eq!(fresh_scores, resumed_scores);
    assert_eq!(fresh_scores.iter().sum::<i64>(), 12);
}

#[test]
fn concurrent_games_respect_the_schedule_total() {
    let dir = tempfile::tempdir().unwrap();
    let verdict = strength_verdict(&[("alpha", 3), ("beta", 2), ("gamma", 1), ("delta", 0)]);

    let mut settings = TournamentSettings::new(ScheduleKind::RoundRobin)
        .with_games_per_encounter(2)
        .with_round_multiplier(1)
        .with_concurrency(2);
    settings.stop_sentinel = dir.path().join("failed.txt");

    let mut tournament = Tournament::new(settings, Arc::new(StubBoardFactory)).unwrap();
    add_oracles(&mut tournament, &["alpha", "beta", "gamma", "delta"], &verdict);
    tournament.run().unwrap();

    assert_eq!(tournament.finished_game_count(), 12);
    let total: i64 = (0..4).map(|i| tournament.player_score(i)).sum();
    assert_eq!(total, 24);
}

#[test]
fn gauntlet_reports_the_gauntlet_player_first() {
    let dir = tempfile::tempdir().unwrap();
    let verdict = strength_verdict(&[("champ", 0), ("a", 1), ("b", 2)]);

    let mut settings = TournamentSettings::new(ScheduleKind::Gauntlet)
        .with_games_per_encounter(1)
        .with_round_multiplier(1);
    settings.stop_sentinel = dir.path().join("failed.txt");

    let mut tournament = Tournament::new(settings, Arc::new(StubBoardFactory)).unwrap();
    add_oracles(&mut tournament, &["champ", "a", "b"], &verdict);
    let report = tournament.run().unwrap();

    assert_eq!(tournament.finished_game_count(), 2);
    // the gauntlet player lost both games but still leads the report
    let champ_line = report
        .lines()
        .find(|line| line.contains("champ"))
        .unwrap()
        .to_string();
    let first_ranked = report
        .lines()
        .skip(1)
        .find(|line| !line.trim().is_empty())
        .unwrap();
    assert_eq!(first_ranked, champ_line);
}
