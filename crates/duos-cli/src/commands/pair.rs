use clap::Subcommand;

#[derive(Subcommand)]
pub enum PairAction {
    /// Manually pair two unpaired members
    Create { id1: String, id2: String },
    /// Dissolve an active pairing
    Remove { id1: String, id2: String },
    /// Show active pairs and unpaired members
    List,
    /// Show the partnership ledger, newest first
    History {
        /// Maximum number of records
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

pub fn run(action: PairAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::open_engine()?;
    match action {
        PairAction::Create { id1, id2 } => {
            let record = engine.create_manual_pair(&id1, &id2)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        PairAction::Remove { id1, id2 } => {
            engine.remove_pair(&id1, &id2)?;
            println!("pair removed");
        }
        PairAction::List => {
            let current = engine.current_pairs()?;
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
        PairAction::History { limit } => {
            let records = engine.pairing_history(limit)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }
    Ok(())
}
