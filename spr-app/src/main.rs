mod app;
mod cli;
mod keys;

use std::env;

use app::App;
use cli::Command;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    match cli::parse(env::args().skip(1))? {
        Command::Run => {
            let app = App::new()?;
            app.run()?;
        }
        Command::MakeLists { master, out_dir } => cli::make_lists(&master, &out_dir)?,
        Command::ListData { dir } => cli::list_data(dir)?,
    }

    Ok(())
}
