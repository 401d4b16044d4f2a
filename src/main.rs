use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pctimer_lib::run(pctimer_lib::Cli::parse()).await
}
