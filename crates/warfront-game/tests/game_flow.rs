//! End-to-end game scenarios through the manager.

use std::collections::BTreeMap;
use std::sync::Arc;

use warfront_combat::{CombatEngine, CombatError, FactionStats, StatTable, UnitDef};
use warfront_game::{GameConfig, GameError, GameManager, GameView, JoinRequest};
use warfront_protocol::{
    Action, Casualties, Color, CombatDeclaration, CombatOutcome, CombatResult, EventKind,
    FactionId, GameId, GameStatus, IdentityId, Phase, UnitKind, UnitStack,
};
use warfront_sync::{Delivery, SyncConfig};

fn faction(attack: u32, defense: u32, count: u32) -> FactionStats {
    FactionStats {
        base_strength: 0,
        units: BTreeMap::from([(UnitKind::new("infantry"), UnitDef { attack, defense })]),
        starting_forces: vec![UnitStack::new("infantry", count)],
    }
}

/// Red is strong enough to wipe blue out in one battle.
fn table() -> Arc<StatTable> {
    Arc::new(
        StatTable::default()
            .with_faction("red", faction(3, 3, 10))
            .with_faction("blue", faction(1, 1, 1))
            .with_faction("green", faction(2, 2, 5)),
    )
}

fn config() -> GameConfig {
    GameConfig {
        seed: Some(42),
        ..GameConfig::default()
    }
}

fn manager() -> GameManager {
    GameManager::new(config(), SyncConfig::default(), table())
}

fn join(id: u64, faction: &str, color: &str) -> JoinRequest {
    JoinRequest {
        identity_id: IdentityId(id),
        faction_id: FactionId::new(faction),
        color: Color::new(color),
        display_name: format!("player-{id}"),
    }
}

fn declare(target: &str, count: u32) -> Action {
    Action::DeclareCombat {
        target_faction_id: FactionId::new(target),
        units: vec![UnitStack::new("infantry", count)],
    }
}

/// Red (1) and blue (2) seated and started; red moves first.
async fn started(manager: &GameManager) -> warfront_game::GameHandle {
    let game_id = manager.create().await.unwrap();
    let game = manager.get(game_id).await.unwrap();
    game.join(join(1, "red", "red")).await.unwrap();
    game.join(join(2, "blue", "blue")).await.unwrap();
    game.start(IdentityId(1)).await.unwrap();
    game
}

// =========================================================================
// Faction registry
// =========================================================================

#[tokio::test]
async fn test_join_taken_faction_conflicts_then_other_faction_succeeds() {
    let manager = manager();
    let game = manager.get(manager.create().await.unwrap()).await.unwrap();

    game.join(join(1, "red", "red")).await.unwrap();
    let conflict = game.join(join(2, "red", "blue")).await;
    let joined = game.join(join(2, "blue", "blue")).await.unwrap();

    assert!(matches!(conflict, Err(GameError::FactionConflict(f)) if f == FactionId::new("red")));
    assert_eq!(joined.faction_id, FactionId::new("blue"));
    let snapshot = game.snapshot().await.unwrap();
    assert_eq!(snapshot.participants.len(), 2);
    assert_eq!(snapshot.last_sequence, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_for_one_faction_exactly_one_wins() {
    let manager = manager();
    let game = manager.get(manager.create().await.unwrap()).await.unwrap();

    let tasks: Vec<_> = (1..=6)
        .map(|id| {
            let game = game.clone();
            tokio::spawn(async move { game.join(join(id, "red", &format!("color-{id}"))).await })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(matches!(e, GameError::FactionConflict(_)), "{e}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(game.snapshot().await.unwrap().participants.len(), 1);
}

#[tokio::test]
async fn test_rejoin_after_start_rebinds_same_seat_without_event() {
    let manager = manager();
    let game = started(&manager).await;
    let before = game.log().last_sequence().await;

    let seat = game.join(join(2, "green", "green")).await.unwrap();

    assert_eq!(seat.faction_id, FactionId::new("blue"));
    assert_eq!(seat.color, Color::new("blue"));
    assert_eq!(game.log().last_sequence().await, before);
}

#[tokio::test]
async fn test_leave_after_start_is_locked() {
    let manager = manager();
    let game = started(&manager).await;

    let result = game.leave(IdentityId(2)).await;

    assert!(matches!(result, Err(GameError::ParticipantLocked(_))));
    assert_eq!(game.snapshot().await.unwrap().participants.len(), 2);
}

#[tokio::test]
async fn test_join_after_start_is_rejected() {
    let manager = manager();
    let game = started(&manager).await;

    let result = game.join(join(3, "green", "green")).await;

    assert!(matches!(result, Err(GameError::NotJoinable { .. })));
}

#[tokio::test]
async fn test_auto_start_when_last_seat_fills() {
    let config = GameConfig {
        max_participants: 2,
        auto_start: true,
        ..config()
    };
    let manager = GameManager::new(config, SyncConfig::default(), table());
    let game = manager.get(manager.create().await.unwrap()).await.unwrap();

    game.join(join(1, "red", "red")).await.unwrap();
    game.join(join(2, "blue", "blue")).await.unwrap();

    let snapshot = game.snapshot().await.unwrap();
    assert_eq!(snapshot.status, GameStatus::Active { phase: Phase::Movement });
    assert_eq!(snapshot.current_turn, Some(IdentityId(1)));
    assert!(manager.list_joinable().await.is_empty());
}

// =========================================================================
// Turns and phases
// =========================================================================

#[tokio::test]
async fn test_act_out_of_turn_commits_nothing() {
    let manager = manager();
    let game = started(&manager).await;
    let before = game.log().last_sequence().await;

    let result = game.act(IdentityId(2), Action::AdvancePhase).await;

    assert!(matches!(
        result,
        Err(GameError::NotYourTurn { current: Some(IdentityId(1)) })
    ));
    assert_eq!(game.log().last_sequence().await, before);
}

#[tokio::test]
async fn test_act_in_wrong_phase_commits_nothing() {
    let manager = manager();
    let game = started(&manager).await;
    let before = game.log().last_sequence().await;

    let result = game.act(IdentityId(1), Action::EndTurn).await;

    assert!(matches!(result, Err(GameError::WrongPhase { action: "end_turn", .. })));
    assert_eq!(game.log().last_sequence().await, before);
}

#[tokio::test]
async fn test_start_with_one_participant_is_rejected() {
    let manager = manager();
    let game = manager.get(manager.create().await.unwrap()).await.unwrap();
    game.join(join(1, "red", "red")).await.unwrap();

    let result = game.start(IdentityId(1)).await;

    assert!(matches!(result, Err(GameError::NotEnoughParticipants { have: 1, need: 2 })));
}

#[tokio::test]
async fn test_combat_to_completion() {
    let manager = manager();
    let game = started(&manager).await;
    let red = IdentityId(1);

    game.act(red, Action::AdvancePhase).await.unwrap();
    let declared = game.act(red, declare("blue", 10)).await.unwrap();
    assert!(matches!(declared[0].kind, EventKind::CombatDeclared { .. }));

    let events = game.act(red, Action::ResolveCombat).await.unwrap();

    assert_eq!(events.len(), 2);
    let EventKind::CombatResolved { result } = &events[0].kind else {
        panic!("expected a resolution, got {:?}", events[0].kind);
    };
    assert_eq!(result.outcome, CombatOutcome::AttackerWins);
    assert_eq!(result.casualties_for(&FactionId::new("blue")), 1);
    assert!(result.casualties_for(&FactionId::new("red")) <= 1);
    assert_eq!(
        events[1].kind,
        EventKind::GameCompleted { winner: Some(FactionId::new("red")) }
    );
    assert_eq!(events[1].sequence, events[0].sequence + 1);

    // The finished game is archived: no actor, history still readable.
    assert!(game.log().is_closed().await);
    assert_eq!(manager.game_count().await, 0);
    assert_eq!(manager.archived_count().await, 1);
    let snapshot = manager.snapshot(game.game_id()).await.unwrap();
    assert!(snapshot.status.is_completed());
    assert_eq!(snapshot.last_sequence, events[1].sequence);
    assert!(matches!(
        manager.get(game.game_id()).await,
        Err(GameError::Archived(_))
    ));
    assert!(matches!(
        game.act(red, Action::EndTurn).await,
        Err(GameError::Unavailable(_))
    ));

    let mut sub = manager.subscribe(game.game_id(), 0).await.unwrap();
    let mut replayed: u64 = 0;
    while sub.next().await.is_some() {
        replayed += 1;
    }
    assert_eq!(replayed, events[1].sequence);
}

#[tokio::test]
async fn test_create_beyond_lobby_limit_is_refused_until_one_starts() {
    let config = GameConfig {
        max_open_lobbies: 2,
        ..config()
    };
    let manager = GameManager::new(config, SyncConfig::default(), table());
    let first = manager.create().await.unwrap();
    manager.create().await.unwrap();

    let refused = manager.create().await;
    assert!(matches!(refused, Err(GameError::TooManyLobbies { limit: 2 })));
    assert_eq!(manager.open_lobbies(), 2);

    let game = manager.get(first).await.unwrap();
    game.join(join(1, "red", "red")).await.unwrap();
    game.join(join(2, "blue", "blue")).await.unwrap();
    game.start(IdentityId(1)).await.unwrap();
    assert_eq!(manager.open_lobbies(), 1);
    manager.create().await.unwrap();

    let lobby = manager.list_joinable().await[0].game_id;
    manager.remove(lobby).await.unwrap();
    // The actor releases its slot as it shuts down.
    while manager.open_lobbies() > 1 {
        tokio::task::yield_now().await;
    }
    manager.create().await.unwrap();
}

#[tokio::test]
async fn test_same_seed_same_resolution_across_games() {
    let manager = manager();
    let mut results = Vec::new();
    for _ in 0..2 {
        let game = started(&manager).await;
        game.act(IdentityId(1), Action::AdvancePhase).await.unwrap();
        game.act(IdentityId(1), declare("blue", 4)).await.unwrap();
        let events = game.act(IdentityId(1), Action::ResolveCombat).await.unwrap();
        results.push(events[0].kind.clone());
    }

    assert_eq!(results[0], results[1]);
}

// =========================================================================
// Invariant violations
// =========================================================================

/// Reports more losses than were committed.
struct InflatingEngine;

impl CombatEngine for InflatingEngine {
    fn resolve(&self, declaration: &CombatDeclaration, seed: u64) -> Result<CombatResult, CombatError> {
        let inflate = |faction: &FactionId| Casualties {
            faction_id: faction.clone(),
            losses: vec![UnitStack::new("infantry", 1_000)],
        };
        Ok(CombatResult {
            declaration_ref: declaration.id,
            outcome: CombatOutcome::MutualLoss,
            casualties: vec![
                inflate(&declaration.instigator_faction_id),
                inflate(&declaration.target_faction_id),
            ],
            seed,
        })
    }
}

#[tokio::test]
async fn test_invalid_resolution_halts_only_that_game() {
    let manager = GameManager::with_engine(
        config(),
        SyncConfig::default(),
        table(),
        Arc::new(InflatingEngine),
    );
    let game = started(&manager).await;
    let other = started(&manager).await;
    game.act(IdentityId(1), Action::AdvancePhase).await.unwrap();
    game.act(IdentityId(1), declare("blue", 5)).await.unwrap();
    let before = game.log().last_sequence().await;

    let result = game.act(IdentityId(1), Action::ResolveCombat).await;

    assert!(matches!(
        result,
        Err(GameError::Combat(CombatError::ResolutionInvariantViolation { .. }))
    ));
    // Only the halt itself is committed, never the bad result.
    let tail = game.log().events_after(before).await;
    assert_eq!(tail.len(), 1);
    assert!(matches!(tail[0].kind, EventKind::GameHalted { .. }));
    assert!(game.log().is_closed().await);
    assert!(game.snapshot().await.unwrap().halted);
    assert!(matches!(
        game.act(IdentityId(1), Action::WithdrawDeclaration).await,
        Err(GameError::GameHalted(_))
    ));

    // Other games keep going.
    other.act(IdentityId(1), Action::AdvancePhase).await.unwrap();
    assert!(!other.snapshot().await.unwrap().halted);
}

// =========================================================================
// Synchronization
// =========================================================================

/// Plays `turns` quiet turns (advance, decline, end) alternating players.
async fn quiet_turns(game: &warfront_game::GameHandle, turns: u64) {
    for turn in 0..turns {
        let player = IdentityId(turn % 2 + 1);
        game.act(player, Action::AdvancePhase).await.unwrap();
        game.act(player, Action::AdvancePhase).await.unwrap();
        game.act(player, Action::EndTurn).await.unwrap();
    }
}

#[tokio::test]
async fn test_subscribe_from_17_replays_from_18_and_view_ignores_duplicates() {
    let manager = manager();
    let game = started(&manager).await;
    quiet_turns(&game, 6).await;
    assert_eq!(game.log().last_sequence().await, 21);

    let mut sub = game.subscribe(17).await;
    let first = sub.next().await.unwrap();
    assert_eq!(first.sequence, 18);

    let mut view = GameView::new(game.game_id());
    for event in game.log().events_after(0).await {
        assert_eq!(view.apply(&event).unwrap(), Delivery::Apply);
    }
    // Redelivery after a reconnect.
    assert_eq!(view.apply(&first).unwrap(), Delivery::Duplicate);

    assert_eq!(view.snapshot(), game.snapshot().await.unwrap());
}

#[tokio::test]
async fn test_restore_resumes_journaled_games() {
    let dir = tempfile::tempdir().unwrap();
    let sync = SyncConfig {
        journal_dir: Some(dir.path().to_path_buf()),
        ..SyncConfig::default()
    };

    let original = GameManager::new(config(), sync.clone(), table());
    let game = started(&original).await;
    game.act(IdentityId(1), Action::AdvancePhase).await.unwrap();
    let expected = game.snapshot().await.unwrap();
    game.shutdown().await.unwrap();

    let restored = GameManager::new(config(), sync, table());
    assert_eq!(restored.restore().await.unwrap(), 1);

    let game = restored.get(expected.game_id).await.unwrap();
    assert_eq!(game.snapshot().await.unwrap(), expected);
    game.act(IdentityId(1), Action::AdvancePhase).await.unwrap();
    assert_eq!(game.log().last_sequence().await, expected.last_sequence + 1);

    // New games don't collide with restored ids.
    assert_eq!(restored.create().await.unwrap(), GameId(2));
}

#[tokio::test]
async fn test_restore_keeps_halted_game_halted() {
    let dir = tempfile::tempdir().unwrap();
    let sync = SyncConfig {
        journal_dir: Some(dir.path().to_path_buf()),
        ..SyncConfig::default()
    };
    let original =
        GameManager::with_engine(config(), sync.clone(), table(), Arc::new(InflatingEngine));
    let game = started(&original).await;
    game.act(IdentityId(1), Action::AdvancePhase).await.unwrap();
    game.act(IdentityId(1), declare("blue", 5)).await.unwrap();
    assert!(game.act(IdentityId(1), Action::ResolveCombat).await.is_err());
    let halted_at = game.log().last_sequence().await;
    game.shutdown().await.unwrap();

    let restored = GameManager::new(config(), sync, table());
    assert_eq!(restored.restore().await.unwrap(), 1);

    let game = restored.get(GameId(1)).await.unwrap();
    assert!(game.snapshot().await.unwrap().halted);
    assert!(matches!(
        game.act(IdentityId(1), Action::WithdrawDeclaration).await,
        Err(GameError::GameHalted(_))
    ));
    assert_eq!(game.log().last_sequence().await, halted_at);
}

#[tokio::test]
async fn test_restore_archives_completed_games() {
    let dir = tempfile::tempdir().unwrap();
    let sync = SyncConfig {
        journal_dir: Some(dir.path().to_path_buf()),
        ..SyncConfig::default()
    };
    let original = GameManager::new(config(), sync.clone(), table());
    let game = started(&original).await;
    game.act(IdentityId(1), Action::AdvancePhase).await.unwrap();
    game.act(IdentityId(1), declare("blue", 10)).await.unwrap();
    game.act(IdentityId(1), Action::ResolveCombat).await.unwrap();

    let restored = GameManager::new(config(), sync, table());
    assert_eq!(restored.restore().await.unwrap(), 1);

    assert_eq!(restored.game_count().await, 0);
    assert_eq!(restored.archived_count().await, 1);
    let snapshot = restored.snapshot(GameId(1)).await.unwrap();
    assert!(snapshot.status.is_completed());
}

#[tokio::test]
async fn test_get_unknown_game_not_found() {
    let manager = manager();
    assert!(matches!(
        manager.get(GameId(99)).await,
        Err(GameError::NotFound(GameId(99)))
    ));
}
