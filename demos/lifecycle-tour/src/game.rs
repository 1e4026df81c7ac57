use beanstack::prelude::*;
use beanstack::transactional::TransactionError;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction manager that only journals what happens.
#[derive(Default)]
pub struct JournalTransactionManager {
    next: AtomicU64,
}

struct JournalTransaction {
    id: u64,
}

impl TransactionManager for JournalTransactionManager {
    fn begin(
        &self,
        options: &TransactionOptions,
    ) -> std::result::Result<Box<dyn Transaction>, TransactionError> {
        let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("begin tx#{} ({:?})", id, options.propagation);
        Ok(Box::new(JournalTransaction { id }))
    }
}

impl Transaction for JournalTransaction {
    fn commit(&mut self) -> std::result::Result<(), TransactionError> {
        tracing::info!("commit tx#{}", self.id);
        Ok(())
    }

    fn rollback(&mut self) -> std::result::Result<(), TransactionError> {
        tracing::info!("rollback tx#{}", self.id);
        Ok(())
    }
}

pub trait GameService: Send + Sync {
    fn save_score(&self, player: &str, score: i32) -> std::result::Result<(), InterceptorError>;
    fn scores(&self) -> Vec<(String, i32)>;
}

#[derive(Default)]
struct ScoreBoard {
    scores: Mutex<Vec<(String, i32)>>,
}

impl GameService for ScoreBoard {
    fn save_score(&self, player: &str, score: i32) -> std::result::Result<(), InterceptorError> {
        if current_transaction().is_none() {
            return Err("save_score must run inside a transaction".into());
        }
        if score < 0 {
            return Err(format!("negative score for {player}").into());
        }
        self.scores
            .lock()
            .map_err(|_| "score board poisoned")?
            .push((player.to_string(), score));
        Ok(())
    }

    fn scores(&self) -> Vec<(String, i32)> {
        self.scores.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

struct GameServiceProxy {
    target: Arc<dyn GameService>,
    advisor: Advisor,
}

impl GameService for GameServiceProxy {
    fn save_score(&self, player: &str, score: i32) -> std::result::Result<(), InterceptorError> {
        let jp = self.advisor.join_point("save_score").arg(&player).arg(&score);
        self.advisor.invoke(jp, || self.target.save_score(player, score))
    }

    fn scores(&self) -> Vec<(String, i32)> {
        self.target.scores()
    }
}

pub fn definition() -> beanstack::Result<Definition> {
    Definition::builder::<ScoreBoard>("gameService")
        .constructor(|_| Ok(ScoreBoard::default()))
        .expose::<dyn GameService, _>(|s| s as Arc<dyn GameService>)
        .proxy::<dyn GameService, _>(|target, advisor| {
            Arc::new(GameServiceProxy { target, advisor }) as Arc<dyn GameService>
        })
        .build()
}

pub fn rule() -> beanstack::Result<InterceptionRule> {
    transactional_rule(
        "game-tx",
        Pointcut::type_name("*ScoreBoard").operations("save*"),
        Arc::new(JournalTransactionManager::default()),
        TransactionOptions::default(),
    )
}
