use anyhow::Result;

fn main() -> Result<()> {
    fdscope::cli::run()
}
