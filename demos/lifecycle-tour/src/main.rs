use beanstack::lifecycle::run_until;
use beanstack::prelude::*;
use std::any::Any;

mod calculator;
mod game;
mod garage;

use calculator::Calculator;
use game::GameService;
use garage::{Car, GarageModule, Shell};

/// Logs each object on both sides of its init hooks.
struct Announcer;

impl BeanPostProcessor for Announcer {
    fn before_initialization(&self, id: &str, _bean: &mut dyn Any) -> anyhow::Result<()> {
        tracing::info!("postProcessBeforeInitialization: {}", id);
        Ok(())
    }

    fn after_initialization(&self, id: &str, bean: beanstack::di::Erased) -> anyhow::Result<beanstack::di::Erased> {
        tracing::info!("postProcessAfterInitialization: {}", id);
        Ok(bean)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("🚀 Starting lifecycle tour...");

    let mut builder = Container::builder()
        .environment(Environment::from_env())
        .bean_post_processor(Announcer)
        .subscribe(EventFilter::Any, |event| {
            tracing::info!("📣 {} {}", event.kind, event.payload);
            Ok(())
        })
        .module::<GarageModule>()?
        .register(calculator::definition()?)?
        .register(game::definition()?)?
        .rule(game::rule()?)?;
    for rule in calculator::rules()? {
        builder = builder.rule(rule)?;
    }
    let container = builder.build()?;

    // 1. Plain injection and lifecycle hooks
    let car = container.resolve::<Car>("car")?;
    tracing::info!("{}: {}", car.model, car.engine.start());

    // 2. Conditional registration
    match container.resolve_by_type::<dyn Shell>() {
        Ok(shell) => tracing::info!("shell for this platform: {}", shell.name()),
        Err(e) => tracing::warn!("no shell registered: {}", e),
    }

    // 3. Interception
    let calc = container.resolve::<dyn Calculator>("calculator")?;
    tracing::info!("1 + 2 = {}", calc.add(1, 2).map_err(|e| anyhow::anyhow!(e))?);
    if let Err(e) = calc.div(1, 0) {
        tracing::info!("1 / 0 failed as expected: {}", e);
    }

    // 4. Transactions
    let games = container.resolve::<dyn GameService>("gameService")?;
    games.save_score("alice", 42).map_err(|e| anyhow::anyhow!(e))?;
    if let Err(e) = games.save_score("bob", -1) {
        tracing::info!("rolled back: {}", e);
    }
    tracing::info!("scores: {:?}", games.scores());

    tracing::info!("destroy order: {:?}", container.destroy_order());

    // Set TOUR_WAIT to keep running until Ctrl+C.
    let destroyed = if std::env::var_os("TOUR_WAIT").is_some() {
        tracing::info!("✅ Tour finished, press Ctrl+C to shut down");
        run_until(&container, shutdown_signal()).await
    } else {
        run_until(&container, std::future::ready(())).await
    };
    tracing::info!("👋 {} singletons destroyed", destroyed);
    Ok(())
}
