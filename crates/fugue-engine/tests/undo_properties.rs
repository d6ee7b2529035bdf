//! Property tests for the undo/redo round-trip laws.
//!
//! Random command sequences run through the pipeline and history; undoing
//! everything must restore the world graph and ledger exactly (the clock is
//! monotonic and exempt), and redoing everything must reproduce the
//! post-sequence state.

use proptest::prelude::*;

use fugue_engine::prelude::*;
use fugue_world::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    TakeLamp,
    TakeCoin,
    StashLamp,
    OpenChest,
    CloseChest,
    Ponder(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::TakeLamp),
        Just(Op::TakeCoin),
        Just(Op::StashLamp),
        Just(Op::OpenChest),
        Just(Op::CloseChest),
        (1..3u64).prop_map(Op::Ponder),
    ]
}

struct Fixture {
    graph: WorldGraph,
    ledger: ResourceLedger,
    queue: EventQueue,
    log: NarrationLog,
    me: EntityId,
    lamp: EntityId,
    coin: EntityId,
    chest: EntityId,
}

impl Fixture {
    fn new() -> Self {
        let mut graph = WorldGraph::new();
        let den = graph.spawn(EntityProto::location("den"), None).unwrap();
        let me = graph
            .spawn(EntityProto::actor("me", Some(200)), Some(den))
            .unwrap();
        let lamp = graph.spawn(EntityProto::item("lamp", 10), Some(den)).unwrap();
        let coin = graph.spawn(EntityProto::item("coin", 1), Some(den)).unwrap();
        let chest = graph
            .spawn(EntityProto::openable("chest", Some(50)), Some(den))
            .unwrap();
        Self {
            graph,
            // Deep vitality so random sequences never bottom out.
            ledger: ResourceLedger::with_values(1_000_000, 100),
            queue: EventQueue::new(),
            log: NarrationLog::new(),
            me,
            lamp,
            coin,
            chest,
        }
    }

    fn pipeline(&mut self) -> CommandPipeline<'_> {
        CommandPipeline {
            graph: &mut self.graph,
            ledger: &mut self.ledger,
            queue: &mut self.queue,
            log: &mut self.log,
            actor: self.me,
        }
    }

    fn command_for(&self, op: &Op) -> Command {
        match op {
            Op::TakeLamp => Command::take(self.lamp),
            Op::TakeCoin => Command::take(self.coin),
            Op::StashLamp => Command::put(self.lamp, self.chest),
            Op::OpenChest => Command::open(self.chest),
            Op::CloseChest => Command::close(self.chest),
            Op::Ponder(hours) => Command::ponder(*hours),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn undo_all_restores_graph_and_ledger(ops in proptest::collection::vec(op_strategy(), 1..20)) {
        let mut fx = Fixture::new();
        let mut history = CommandHistory::new(64);

        let graph_before = fx.graph.snapshot();
        let balance_before = fx.ledger.balance();
        let vitality_before = fx.ledger.vitality();

        for op in &ops {
            let command = fx.command_for(op);
            let recorded = command.clone();
            let mut result = fx.pipeline().execute(command);
            if result.success {
                if let Some(token) = result.undo_token.take() {
                    history.push(HistoryEntry { command: recorded, token });
                }
            }
        }

        while history.can_undo() {
            history.undo(&mut fx.pipeline()).unwrap();
        }

        prop_assert_eq!(fx.graph.snapshot(), graph_before);
        prop_assert_eq!(fx.ledger.balance(), balance_before);
        prop_assert_eq!(fx.ledger.vitality(), vitality_before);
    }

    #[test]
    fn redo_all_reproduces_final_state(ops in proptest::collection::vec(op_strategy(), 1..12)) {
        let mut fx = Fixture::new();
        let mut history = CommandHistory::new(64);

        for op in &ops {
            let command = fx.command_for(op);
            let recorded = command.clone();
            let mut result = fx.pipeline().execute(command);
            if result.success {
                if let Some(token) = result.undo_token.take() {
                    history.push(HistoryEntry { command: recorded, token });
                }
            }
        }

        let graph_after = fx.graph.snapshot();
        let balance_after = fx.ledger.balance();
        let vitality_after = fx.ledger.vitality();
        let undone = {
            let mut count = 0usize;
            while history.can_undo() {
                history.undo(&mut fx.pipeline()).unwrap();
                count += 1;
            }
            count
        };

        for _ in 0..undone {
            let result = history.redo(&mut fx.pipeline());
            prop_assert!(result.is_ok(), "redo of a just-undone command succeeds");
        }

        prop_assert_eq!(fx.graph.snapshot(), graph_after);
        prop_assert_eq!(fx.ledger.balance(), balance_after);
        prop_assert_eq!(fx.ledger.vitality(), vitality_after);
    }
}
