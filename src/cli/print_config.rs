use anyhow::{Context, Result};

use super::context::CliContext;

pub fn cmd_print_config(ctx: &CliContext) -> Result<()> {
    match ctx.config_path() {
        Some(path) => println!("# source: {}", path.display()),
        None => println!("# source: defaults"),
    }
    let rendered =
        serde_yaml::to_string(ctx.config().as_ref()).context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
