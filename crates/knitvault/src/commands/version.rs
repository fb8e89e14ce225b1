//! Version command implementation

use anyhow::Result;

pub fn execute() -> Result<()> {
    println!("knitvault {}", knitvault_util::cli_version());
    Ok(())
}
