use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use duos_core::{next_run_after, WeeklyScheduler};

#[derive(Subcommand)]
pub enum RotateAction {
    /// Run a reshuffle now
    Run,
    /// Show when the next scheduled reshuffle would fire
    Next,
    /// Run the weekly schedule loop in the foreground
    Watch,
}

pub fn run(action: RotateAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::open_engine()?;
    match action {
        RotateAction::Run => {
            let stats = engine.reshuffle()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        RotateAction::Next => {
            let next = next_run_after(Utc::now(), &engine.config().schedule)?;
            println!("{next}");
        }
        RotateAction::Watch => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(WeeklyScheduler::new(Arc::new(engine)).run())?;
        }
    }
    Ok(())
}
