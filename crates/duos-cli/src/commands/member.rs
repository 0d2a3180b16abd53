use clap::Subcommand;

#[derive(Subcommand)]
pub enum MemberAction {
    /// Register a member; pairs them immediately if someone is waiting
    Add {
        /// Stable member identifier
        id: String,
        /// Display name
        name: String,
    },
    /// List the roster
    List,
}

pub fn run(action: MemberAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::open_engine()?;
    match action {
        MemberAction::Add { id, name } => {
            let member = engine.register_member(&id, &name)?;
            println!("{}", serde_json::to_string_pretty(&member)?);
        }
        MemberAction::List => {
            let members = engine.members()?;
            println!("{}", serde_json::to_string_pretty(&members)?);
        }
    }
    Ok(())
}
