use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(command: Commands, flags: &GlobalFlags) -> anyhow::Result<()> {
    match command {
        Commands::Init(args) => commands::init::handle(&args, flags).await,
        Commands::Log(args) => commands::log::handle(&args, flags).await,
        Commands::Show(args) => commands::show::handle(&args, flags).await,
        Commands::Config => commands::config::handle(flags),
        Commands::Schema(args) => commands::schema::handle(&args, flags),
    }
}
