use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = student_risk_cli::Cli::parse();
    student_risk_cli::run_cli(cli)
}
