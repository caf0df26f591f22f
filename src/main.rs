use std::process::ExitCode;

use clap::Parser;

use ghsnap::app::App;
use ghsnap::config::{CliArgs, Command, Settings};
use ghsnap::error::Result;
use ghsnap::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let settings = Settings::from_args(&args)?;
    telemetry::init(&settings.logging)?;

    let app = App::new(&settings)?;
    match args.command.unwrap_or(Command::Run) {
        Command::Run => app.run().await?,
        Command::Show { login } => {
            let served = app.show(&login).await?;
            println!("{}", serde_json::to_string_pretty(&served)?);
        }
    }
    Ok(())
}
