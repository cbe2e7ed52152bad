use runall::command;
use runall::EntryPoint;
use std::process::ExitCode;


#[tokio::main]
async fn main() -> ExitCode {
    command::run(EntryPoint::RunAll).await
}
