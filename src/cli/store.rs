//! Reward store command

use anyhow::Result;

use questlog::progress::ProgressionEngine;

use super::print_json;

pub fn purchase_command(engine: &ProgressionEngine, user: &str, item: &str) -> Result<()> {
    let redemption = engine.purchase(user, item)?;
    print_json(&redemption)
}
