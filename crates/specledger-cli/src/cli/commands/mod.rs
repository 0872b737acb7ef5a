use super::args::*;

pub mod cache;
pub mod deps;
pub mod refs;

use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let dir = cli.dir.as_deref();
    match cli.cmd {
        Command::Deps(args) => match args.cmd {
            DepsCmd::Add(a) => deps::cmd_add(dir, a).await,
            DepsCmd::List(a) => deps::cmd_list(dir, a).await,
            DepsCmd::Remove(a) => deps::cmd_remove(dir, a).await,
            DepsCmd::Resolve(a) => deps::cmd_resolve(dir, a).await,
            DepsCmd::Verify => deps::cmd_verify(dir).await,
        },
        Command::Refs(args) => match args.cmd {
            RefsCmd::Validate(a) => refs::cmd_validate(dir, a).await,
        },
        Command::Cache(args) => cache::run(args.cmd).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}
